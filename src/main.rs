use clap::{Parser, Subcommand};
use leafpress::config;
use leafpress::files::PathError;
use leafpress::output::{self, DataFormat};
use leafpress::page::{Page, SiteContext};
use leafpress::render::MarkdownRenderer;
use leafpress::site::Site;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "leafpress")]
#[command(about = "Static site builder for Jekyll-style source trees")]
#[command(long_about = "\
Static site builder for Jekyll-style source trees

Files that start with a front matter block (a YAML mapping between two `---`
lines) are rendered; everything else is copied unchanged.

Source structure:

  site/
  ├── config.toml          # Site config (optional)
  ├── index.md             # Front matter → rendered to /index.html
  ├── about.md             # `permalink: /about/` → /about/index.html
  ├── assets/style.css     # No front matter → copied as-is
  ├── _posts/              # Collection, when listed under [collections]
  │   └── hello.md
  ├── _includes/           # Leading `_` or `.` → never read
  └── _site/               # Default destination

Run 'leafpress gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Site source directory
    #[arg(long, short, default_value = ".", global = true)]
    source: PathBuf,

    /// Output directory (overrides `destination` in config.toml)
    #[arg(long, short, global = true)]
    destination: Option<PathBuf>,

    /// Log debug events to stderr (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the site into the destination directory
    Build {
        /// Report what would change without touching the destination
        #[arg(long)]
        dry_run: bool,
    },
    /// List the site's URLs and the files behind them
    Routes {
        /// Only list pages that are rendered
        #[arg(long)]
        dynamic: bool,
    },
    /// Print a page's variables
    Data {
        /// URL path (starting with `/`) or source-relative file path
        #[arg(default_value = "/")]
        page: String,
        /// Print JSON instead of YAML
        #[arg(long)]
        json: bool,
    },
    /// Print a page's rendered output
    Render {
        /// URL path (starting with `/`) or source-relative file path
        #[arg(default_value = "/")]
        page: String,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let site = load_site(&cli.source, cli.destination.as_deref())?;
    let renderer = MarkdownRenderer::new(site.markdown_extensions().to_vec());

    match cli.command {
        Command::Build { dry_run } => {
            output::print_site(&site);
            let stats = site.build(&renderer, dry_run)?;
            output::print_build_summary(&stats, site.destination(), dry_run);
        }
        Command::Routes { dynamic } => {
            output::print_routes(&site, dynamic);
        }
        Command::Data { page, json } => {
            let page = cli_page(&site, &page)?;
            let format = if json { DataFormat::Json } else { DataFormat::Yaml };
            output::print_page_data(page, format)?;
        }
        Command::Render { page } => {
            let page = cli_page(&site, &page)?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            page.write(&site, &renderer, &mut out)?;
            out.flush()?;
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "leafpress=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Load config, size the thread pool from it, then read the site.
fn load_site(source: &Path, destination: Option<&Path>) -> Result<Site, Box<dyn std::error::Error>> {
    let site_config = config::load_config(source)?;
    init_thread_pool(&site_config.processing);
    Ok(Site::from_config(source, site_config, destination)?)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Resolve a command-line page argument.
///
/// Arguments starting with `/` are URL paths; anything else is a file path
/// relative to the source directory.
fn cli_page<'a>(site: &'a Site, arg: &str) -> Result<&'a Page, PathError> {
    if arg.starts_with('/') {
        return site.page_for_url(arg).ok_or_else(|| {
            PathError::new("render", arg, "the site does not include a file with this URL path")
        });
    }
    site.find_page_by_path(Path::new(arg))
        .ok_or_else(|| PathError::new("render", arg, "no such file"))
}

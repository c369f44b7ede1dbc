//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Every routed page is shown by its URL first, with the source file as
//! secondary context on indented lines. The output reads as a site map while
//! still letting users trace each URL back to a file.
//!
//! # Output Format
//!
//! ## Site
//!
//! ```text
//! Site
//!     Source: /home/me/site
//!     Destination: /home/me/site/_site
//!     Collections: notes (1 page, not written), posts (1 page)
//! ```
//!
//! ## Routes
//!
//! ```text
//! 001 /about/ (dynamic)
//!     Source: about.md
//!     Title: About
//! 002 /assets/style.css
//!     Source: assets/style.css
//!
//! 2 routes (1 dynamic, 1 static)
//! ```
//!
//! ## Build
//!
//! ```text
//! Wrote 6 pages to _site, removed 1 stale file
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>` or `String`)
//! for testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::page::{Page, SiteContext, VariableMap};
use crate::site::{BuildStats, Site};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How `data` prints page variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Yaml,
    Json,
}

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 page`, `2 pages`.
fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

/// Forward-slash display of a source-relative path.
fn display_relpath(path: &Path) -> String {
    crate::permalink::url_path(path)
        .trim_start_matches('/')
        .to_string()
}

// ============================================================================
// Site
// ============================================================================

/// Format the site header shown before a build.
pub fn format_site(site: &Site) -> Vec<String> {
    let mut lines = vec![
        "Site".to_string(),
        format!("{}Source: {}", indent(1), site.source().display()),
        format!("{}Destination: {}", indent(1), site.destination().display()),
    ];
    if !site.collections().is_empty() {
        let summaries: Vec<String> = site
            .collections()
            .iter()
            .map(|c| {
                let dir = c.dir();
                let count = site
                    .pages()
                    .iter()
                    .filter(|p| p.path().starts_with(&dir))
                    .count();
                let mut summary = format!("{} ({}", c.name, plural(count, "page"));
                if !c.config.output {
                    summary.push_str(", not written");
                }
                summary.push(')');
                summary
            })
            .collect();
        lines.push(format!("{}Collections: {}", indent(1), summaries.join(", ")));
    }
    lines
}

/// Print the site header to stdout.
pub fn print_site(site: &Site) {
    for line in format_site(site) {
        println!("{}", line);
    }
}

// ============================================================================
// Routes
// ============================================================================

/// Format the route table.
///
/// With `dynamic_only`, static pages are left out of both the listing and
/// the summary.
pub fn format_routes<'a, I>(routes: I, dynamic_only: bool) -> Vec<String>
where
    I: IntoIterator<Item = (&'a str, &'a Page)>,
{
    let mut lines = Vec::new();
    let (mut dynamic, mut static_count) = (0, 0);
    for (url, page) in routes {
        if page.is_static() {
            if dynamic_only {
                continue;
            }
            static_count += 1;
        } else {
            dynamic += 1;
        }
        let pos = dynamic + static_count;
        if page.is_static() {
            lines.push(format!("{} {}", format_index(pos), url));
        } else {
            lines.push(format!("{} {} (dynamic)", format_index(pos), url));
        }
        lines.push(format!("{}Source: {}", indent(1), display_relpath(page.path())));
        if let Some(title) = page.front_matter().string("title") {
            lines.push(format!("{}Title: {}", indent(1), title));
        }
    }

    if !lines.is_empty() {
        lines.push(String::new());
    }
    if dynamic_only {
        lines.push(plural(dynamic, "dynamic route"));
    } else {
        lines.push(format!(
            "{} ({} dynamic, {} static)",
            plural(dynamic + static_count, "route"),
            dynamic,
            static_count
        ));
    }
    lines
}

/// Print the route table to stdout.
pub fn print_routes(site: &Site, dynamic_only: bool) {
    for line in format_routes(site.routes(), dynamic_only) {
        println!("{}", line);
    }
}

// ============================================================================
// Page data
// ============================================================================

/// Serialize a page's variables for display.
pub fn format_variables(vars: &VariableMap, format: DataFormat) -> Result<String, OutputError> {
    let text = match format {
        DataFormat::Yaml => serde_yaml::to_string(vars)?,
        DataFormat::Json => {
            let mut json = serde_json::to_string_pretty(vars)?;
            json.push('\n');
            json
        }
    };
    Ok(text)
}

/// Print a page's debug variables to stdout.
pub fn print_page_data(page: &Page, format: DataFormat) -> Result<(), OutputError> {
    print!("{}", format_variables(&page.debug_variables(), format)?);
    Ok(())
}

// ============================================================================
// Build
// ============================================================================

/// Format the one-line build summary.
pub fn format_build_summary(stats: &BuildStats, destination: &Path, dry_run: bool) -> String {
    let pages = plural(stats.written, "page");
    let stale = plural(stats.removed, "stale file");
    if dry_run {
        format!(
            "Dry run: would write {pages} to {}, would remove {stale}",
            destination.display()
        )
    } else {
        format!("Wrote {pages} to {}, removed {stale}", destination.display())
    }
}

/// Print the build summary to stdout.
pub fn print_build_summary(stats: &BuildStats, destination: &Path, dry_run: bool) {
    println!("{}", format_build_summary(stats, destination, dry_run));
}

// ============================================================================
// Tests
// ============================================================================

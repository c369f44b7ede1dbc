//! Site orchestrator: source enumeration, collections, routes, and output.
//!
//! A [`Site`] is loaded once from a source directory and then queried or
//! built. Loading reads `config.toml`, registers collections, enumerates the
//! source tree, and classifies every file into a [`Page`] in parallel.
//!
//! ## Source Layout
//!
//! ```text
//! site/
//! ├── config.toml          # Never a page
//! ├── index.md             # Dynamic page → /index.html
//! ├── assets/style.css     # Static page  → /assets/style.css
//! ├── _posts/hello.md      # Collection "posts" (when configured)
//! ├── _includes/           # Skipped: leading "_"
//! ├── .git/                # Skipped: leading "."
//! └── _site/               # Destination, never read
//! ```
//!
//! ## Build
//!
//! [`Site::build`] writes every routed page into the destination, removes
//! files there that this build did not produce, and prunes the directories
//! left empty. The destination is therefore an exact image of the route
//! table after a successful build.

use crate::config::{self, CollectionConfig, ConfigError, SiteConfig};
use crate::files::{self, PathError};
use crate::frontmatter::FrontMatter;
use crate::page::{CollectionId, CollectionInfo, Page, PageError, SiteContext};
use crate::render::Renderer;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum SiteError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Page(#[from] PageError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("destination {} contains the source directory", .0.display())]
    DestinationOverlapsSource(PathBuf),
}

/// A named group of pages read from `_<name>/`.
#[derive(Debug, Clone)]
pub struct Collection {
    pub name: String,
    pub config: CollectionConfig,
    /// Site defaults overlaid by the collection's own defaults.
    pub defaults: FrontMatter,
}

impl Collection {
    /// Source-relative directory holding the collection's pages.
    pub fn dir(&self) -> PathBuf {
        PathBuf::from(format!("_{}", self.name))
    }
}

/// Counts reported by [`Site::build`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Pages written (or that would be, in a dry run).
    pub written: usize,
    /// Stale destination files removed (or that would be).
    pub removed: usize,
}

#[derive(Debug)]
pub struct Site {
    source: PathBuf,
    destination: PathBuf,
    config: SiteConfig,
    markdown_extensions: Vec<String>,
    defaults: FrontMatter,
    collections: Vec<Collection>,
    /// Sorted by source-relative path.
    pages: Vec<Page>,
    /// Permalink → index into `pages`.
    routes: BTreeMap<String, usize>,
}

impl SiteContext for Site {
    fn source(&self) -> &Path {
        &self.source
    }

    fn permalink_pattern(&self) -> &str {
        &self.config.permalink
    }

    fn markdown_extensions(&self) -> &[String] {
        &self.markdown_extensions
    }

    fn collection(&self, id: CollectionId) -> Option<CollectionInfo<'_>> {
        self.collections.get(id.0).map(|c| CollectionInfo {
            name: &c.name,
            permalink: c.config.permalink.as_deref(),
        })
    }
}

impl Site {
    /// Load `config.toml` from `source` and read the whole site.
    ///
    /// `destination` overrides the configured one.
    pub fn load(source: &Path, destination: Option<&Path>) -> Result<Self, SiteError> {
        let config = config::load_config(source)?;
        Self::from_config(source, config, destination)
    }

    /// Read the site at `source` with an already resolved config.
    pub fn from_config(
        source: &Path,
        config: SiteConfig,
        destination: Option<&Path>,
    ) -> Result<Self, SiteError> {
        let source = fs::canonicalize(source).map_err(|e| PathError::wrap(e, "open", source))?;
        let destination = match destination {
            Some(dest) => files::resolve_path(dest)?,
            None => files::resolve_path(&source.join(&config.destination))?,
        };
        if source.starts_with(&destination) {
            return Err(SiteError::DestinationOverlapsSource(destination));
        }

        let defaults = config.default_front_matter();
        let collections = config
            .collections
            .iter()
            .map(|(name, collection)| Collection {
                name: name.clone(),
                config: collection.clone(),
                defaults: collection.default_front_matter().merged_over(&defaults),
            })
            .collect();

        let mut site = Site {
            markdown_extensions: config.markdown_extensions(),
            source,
            destination,
            config,
            defaults,
            collections,
            pages: Vec::new(),
            routes: BTreeMap::new(),
        };
        let jobs = site.source_files()?;
        site.pages = site.read_pages(&jobs)?;
        site.routes = site.build_routes();
        info!(
            source = %site.source.display(),
            pages = site.pages.len(),
            routes = site.routes.len(),
            "site loaded"
        );
        Ok(site)
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Every file to classify, tagged with its collection, sorted by path.
    fn source_files(&self) -> Result<Vec<(Option<CollectionId>, PathBuf)>, SiteError> {
        let mut jobs: Vec<(Option<CollectionId>, PathBuf)> = self
            .walk(&self.source)?
            .into_iter()
            .map(|relpath| (None, relpath))
            .collect();

        for (index, collection) in self.collections.iter().enumerate() {
            let dir = self.source.join(collection.dir());
            if !dir.is_dir() {
                debug!(collection = %collection.name, "collection directory missing");
                continue;
            }
            jobs.extend(
                self.walk(&dir)?
                    .into_iter()
                    .map(|relpath| (Some(CollectionId(index)), relpath)),
            );
        }

        jobs.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(jobs)
    }

    /// Source-relative paths of the regular files under `root`.
    ///
    /// Entries below `root` whose names start with `_` or `.` are skipped
    /// along with their subtrees, as are configured excludes, the config
    /// file, and the destination.
    fn walk(&self, root: &Path) -> Result<Vec<PathBuf>, SiteError> {
        let excludes: Vec<PathBuf> = self.config.exclude.iter().map(PathBuf::from).collect();
        let config_file = self.source.join(config::CONFIG_FILE);

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                if name.starts_with('_') || name.starts_with('.') {
                    return false;
                }
                let path = entry.path();
                if path == self.destination || path == config_file {
                    return false;
                }
                let relpath = path.strip_prefix(&self.source).unwrap_or(path);
                !excludes.iter().any(|ex| relpath.starts_with(ex))
            });

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relpath) = entry.path().strip_prefix(&self.source) {
                files.push(relpath.to_path_buf());
            }
        }
        Ok(files)
    }

    fn read_pages(&self, jobs: &[(Option<CollectionId>, PathBuf)]) -> Result<Vec<Page>, SiteError> {
        let pages = jobs
            .par_iter()
            .map(|(collection, relpath)| -> Result<Page, PageError> {
                let defaults = match collection {
                    Some(id) => &self.collections[id.0].defaults,
                    None => &self.defaults,
                };
                let page = Page::read(self, *collection, relpath.clone(), defaults)?;
                debug!(%page, "read page");
                Ok(page)
            })
            .collect::<Result<Vec<_>, PageError>>()?;
        Ok(pages)
    }

    /// Published pages of outputting collections, keyed by permalink.
    ///
    /// Pages are visited in path order, so on a collision the later path
    /// wins.
    fn build_routes(&self) -> BTreeMap<String, usize> {
        let mut routes = BTreeMap::new();
        for (index, page) in self.pages.iter().enumerate() {
            if !page.published() {
                debug!(path = %page.path().display(), "unpublished, not routed");
                continue;
            }
            let outputs = page
                .collection()
                .is_none_or(|id| self.collections[id.0].config.output);
            if !outputs {
                continue;
            }
            if let Some(previous) = routes.insert(page.permalink().to_string(), index) {
                warn!(
                    permalink = page.permalink(),
                    replaced = %self.pages[previous].path().display(),
                    by = %page.path().display(),
                    "duplicate permalink"
                );
            }
        }
        routes
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// All pages, routed or not, in source path order.
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    /// Routed pages in permalink order.
    pub fn routes(&self) -> impl Iterator<Item = (&str, &Page)> {
        self.routes
            .iter()
            .map(|(url, &index)| (url.as_str(), &self.pages[index]))
    }

    /// The page read from `relpath` (relative to the source), routed or not.
    ///
    /// `.` components are ignored, so `./about.md` finds `about.md`.
    pub fn find_page_by_path(&self, relpath: &Path) -> Option<&Page> {
        let relpath: PathBuf = relpath
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        self.pages
            .binary_search_by(|page| page.path().cmp(&relpath))
            .ok()
            .map(|index| &self.pages[index])
    }

    /// The routed page served at `url`.
    ///
    /// `/about` and `/about/` both find a page routed at `/about/`, and
    /// `/docs/` finds one routed at `/docs/index.html`.
    pub fn page_for_url(&self, url: &str) -> Option<&Page> {
        let alternate = if url.ends_with('/') {
            format!("{url}index.html")
        } else {
            format!("{url}/")
        };
        [url, alternate.as_str()]
            .into_iter()
            .find_map(|candidate| self.routes.get(candidate))
            .map(|&index| &self.pages[index])
    }

    // =========================================================================
    // Building
    // =========================================================================

    /// Write the route table into the destination and clean up after it.
    ///
    /// With `dry_run`, nothing on disk changes; the returned counts say what
    /// would have been written and removed.
    pub fn build<R>(&self, renderer: &R, dry_run: bool) -> Result<BuildStats, SiteError>
    where
        R: Renderer + ?Sized,
    {
        if self.source.starts_with(&self.destination) {
            return Err(SiteError::DestinationOverlapsSource(
                self.destination.clone(),
            ));
        }

        let mut stats = BuildStats::default();
        let mut produced = BTreeSet::new();
        for (_, page) in self.routes() {
            let out = self.destination.join(page.output_path());
            if !dry_run {
                self.write_page(page, &out, renderer)?;
            }
            debug!(page = %page, out = %out.display(), dry_run, "wrote page");
            produced.insert(out);
            stats.written += 1;
        }

        stats.removed = self.remove_stale(&produced, dry_run)?;
        if !dry_run {
            files::remove_empty_directories(&self.destination)?;
        }
        info!(written = stats.written, removed = stats.removed, dry_run, "build complete");
        Ok(stats)
    }

    fn write_page<R>(&self, page: &Page, out: &Path, renderer: &R) -> Result<(), SiteError>
    where
        R: Renderer + ?Sized,
    {
        if page.is_static() {
            files::copy_file_contents(out, &page.source(self))?;
            return Ok(());
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|e| PathError::wrap(e, "mkdir", parent))?;
        }
        files::visit_created_file(out, |w| page.write(self, renderer, w))?;
        Ok(())
    }

    /// Delete destination files that `produced` does not list.
    fn remove_stale(&self, produced: &BTreeSet<PathBuf>, dry_run: bool) -> Result<usize, SiteError> {
        let mut removed = 0;
        files::postfix_walk(&self.destination, |path, metadata| {
            let metadata = match metadata {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(PathError::wrap(e, "stat", path)),
            };
            if metadata.is_dir() || produced.contains(path) {
                return Ok(());
            }
            if !dry_run {
                fs::remove_file(path).map_err(|e| PathError::wrap(e, "remove", path))?;
            }
            debug!(path = %path.display(), dry_run, "removed stale file");
            removed += 1;
            Ok(())
        })?;
        Ok(removed)
    }
}

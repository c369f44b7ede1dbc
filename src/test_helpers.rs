//! Shared test utilities for the leafpress test suite.
//!
//! Provides fixture setup, a minimal [`SiteContext`] for page-level tests,
//! and lookup helpers that panic with a clear message on a miss.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_fixtures();
//! let site = Site::load(tmp.path(), None).unwrap();
//!
//! let post = find_page(&site, "_posts/hello.md");
//! assert_eq!(post.permalink(), "/blog/news/rust/hello/");
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::page::{CollectionId, CollectionInfo, Page, SiteContext};
use crate::permalink::DEFAULT_PATTERN;
use crate::site::Site;

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/site/` to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Write `contents` to `root/relpath`, creating parent directories.
pub fn write_file(root: &Path, relpath: &str, contents: &[u8]) -> PathBuf {
    let path = root.join(relpath);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

// =========================================================================
// Stub site
// =========================================================================

/// A [`SiteContext`] without config files or a page registry.
pub struct StubSite {
    pub source: PathBuf,
    pub permalink: String,
    pub markdown_extensions: Vec<String>,
    /// `(name, permalink)`; a collection's id is its index here.
    pub collections: Vec<(String, Option<String>)>,
}

impl StubSite {
    pub fn new(source: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            permalink: DEFAULT_PATTERN.to_string(),
            markdown_extensions: vec!["md".to_string(), "markdown".to_string()],
            collections: Vec::new(),
        }
    }

    pub fn with_collection(mut self, name: &str, permalink: Option<&str>) -> Self {
        self.collections
            .push((name.to_string(), permalink.map(str::to_string)));
        self
    }
}

impl SiteContext for StubSite {
    fn source(&self) -> &Path {
        &self.source
    }

    fn permalink_pattern(&self) -> &str {
        &self.permalink
    }

    fn markdown_extensions(&self) -> &[String] {
        &self.markdown_extensions
    }

    fn collection(&self, id: CollectionId) -> Option<CollectionInfo<'_>> {
        self.collections
            .get(id.0)
            .map(|(name, permalink)| CollectionInfo {
                name,
                permalink: permalink.as_deref(),
            })
    }
}

// =========================================================================
// Site lookups: panic with a clear message on miss
// =========================================================================

/// Find a page by source-relative path. Panics if not found.
pub fn find_page<'a>(site: &'a Site, relpath: &str) -> &'a Page {
    site.find_page_by_path(Path::new(relpath))
        .unwrap_or_else(|| {
            let paths = page_paths(site);
            panic!("page '{relpath}' not found. Available: {paths:?}")
        })
}

/// All page paths in site order.
pub fn page_paths(site: &Site) -> Vec<String> {
    site.pages()
        .iter()
        .map(|p| p.path().to_string_lossy().into_owned())
        .collect()
}

/// All routed URLs in permalink order.
pub fn route_urls(site: &Site) -> Vec<String> {
    site.routes().map(|(url, _)| url.to_string()).collect()
}

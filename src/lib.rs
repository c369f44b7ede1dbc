//! # leafpress
//!
//! A static site builder for Jekyll-style source trees. Every file under the
//! source directory becomes a page: files that open with a front matter block
//! are rendered, everything else is copied byte-for-byte.
//!
//! # Architecture: Ingest, Route, Write
//!
//! ```text
//! 1. Ingest   source/   →  Vec<Page>       (sniff, parse front matter, permalink)
//! 2. Route    pages     →  route table     (published pages, permalink → page)
//! 3. Write    routes    →  destination/    (copy or render, then prune stale output)
//! ```
//!
//! Ingestion is the foundation. A file's first four bytes decide, once, whether
//! it is a [`page::Page::Static`] or a [`page::Page::Dynamic`] page, and a page
//! is never handed out before its permalink is known. Everything downstream
//! relies on those two facts.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`files`] | Filesystem primitives: scoped file creation, magic-byte sniffing, bottom-up walk, empty-directory pruning, structured path errors |
//! | [`frontmatter`] | Front matter detection and extraction, plus the lenient [`frontmatter::FrontMatter`] accessors |
//! | [`page`] | The closed `Page` enum, its construction from a file, and the [`page::SiteContext`] it reads site state through |
//! | [`permalink`] | Permalink pattern expansion (`/:path:output_ext`, `pretty`, `none`) |
//! | [`render`] | The [`render::Renderer`] seam and the pulldown-cmark Markdown renderer |
//! | [`config`] | `config.toml` loading, merging over stock defaults, validation |
//! | [`site`] | Source enumeration, collections, route table, build and stale-output cleanup |
//! | [`output`] | CLI output formatting: pure `format_*` functions and `print_*` wrappers |
//!
//! # Design Decisions
//!
//! ## No Back-Pointers
//!
//! Pages never hold a reference to their site. A page records its collection
//! as a [`page::CollectionId`] index, and operations that need site state take
//! a [`page::SiteContext`] argument. Pages can therefore be built in parallel
//! (the site uses rayon) and tested against a stub context.
//!
//! ## Lenient Metadata
//!
//! A malformed front matter block is treated as no metadata, and typed
//! accessors fall back to defaults on a type mismatch. A bad block never
//! fails a build; a missing or unreadable file always does.
//!
//! ## Quiet Core
//!
//! [`files`], [`frontmatter`], and [`page`] never log. The [`site`]
//! orchestrator emits `tracing` events, and the binary decides where they go.

pub mod config;
pub mod files;
pub mod frontmatter;
pub mod output;
pub mod page;
pub mod permalink;
pub mod render;
pub mod site;

#[cfg(test)]
pub(crate) mod test_helpers;

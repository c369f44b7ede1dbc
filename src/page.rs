//! Page classification and the page contract.
//!
//! Every file under the source tree becomes a [`Page`]. The variant is fixed
//! once, from the file's first four bytes:
//!
//! | Magic bytes | Variant | Write behavior |
//! |-------------|---------|----------------|
//! | `---\n` (or `---\r\n`) | [`Page::Dynamic`] | body handed to a [`Renderer`] |
//! | anything else | [`Page::Static`] | bytes copied unchanged |
//!
//! ## Lifecycle
//!
//! [`Page::read`] is the only constructor. It sniffs the file, builds the
//! variant, and computes the permalink before returning, so callers only
//! ever see fully initialized pages:
//!
//! ```text
//! Unconstructed → Classified → Permalink-Initialized
//! ```
//!
//! A page whose permalink cannot be computed is never returned.
//!
//! ## Back-References
//!
//! A page does not own or point at its site. It records its collection as a
//! [`CollectionId`] (an index into the site's registry), and every operation
//! that needs site state takes a [`SiteContext`] argument.

use crate::files::{self, PathError};
use crate::frontmatter::{self, FrontMatter};
use crate::permalink::{self, PermalinkError, Placeholders};
use crate::render::{RenderError, Renderer, is_markdown_extension};
use chrono::{DateTime, Utc};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

/// Template-facing variables: the page object seen by renderers.
pub type VariableMap = BTreeMap<String, Value>;

/// Front matter key that hides a page from the route table.
pub const PUBLISHED_KEY: &str = "published";

#[derive(Error, Debug)]
pub enum PageError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("Permalink error in {}: {source}", .path.display())]
    Permalink {
        path: PathBuf,
        #[source]
        source: PermalinkError,
    },
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}

/// Index of a collection in the site's collection registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionId(pub usize);

/// What a page needs to know about its collection.
#[derive(Debug, Clone, Copy)]
pub struct CollectionInfo<'a> {
    pub name: &'a str,
    /// Collection-level permalink pattern; falls back to the site's.
    pub permalink: Option<&'a str>,
}

/// Site state consulted by pages. Implemented by [`crate::site::Site`].
pub trait SiteContext {
    /// Absolute source root that page paths are relative to.
    fn source(&self) -> &Path;

    /// Site-wide permalink pattern or style name.
    fn permalink_pattern(&self) -> &str;

    /// Extensions (without dots) treated as Markdown.
    fn markdown_extensions(&self) -> &[String];

    fn collection(&self, id: CollectionId) -> Option<CollectionInfo<'_>>;

    fn is_markdown(&self, relpath: &Path) -> bool {
        relpath
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| is_markdown_extension(ext, self.markdown_extensions()))
    }
}

/// State shared by both page variants.
#[derive(Debug, Clone)]
pub struct PageFields {
    /// Relative to the site source, e.g. `_posts/hello.md`.
    relpath: PathBuf,
    permalink: String,
    modified: SystemTime,
    /// Defaults merged with the file's own block.
    front_matter: FrontMatter,
    collection: Option<CollectionId>,
}

/// A source file, classified.
#[derive(Debug, Clone)]
pub enum Page {
    /// Copied byte-for-byte to the output tree.
    Static(PageFields),
    /// Metadata plus a body for the rendering collaborator.
    Dynamic {
        fields: PageFields,
        /// The block exactly as parsed from the file, before defaults.
        block: FrontMatter,
        /// Unrendered body, line endings normalized.
        body: String,
    },
}

impl Page {
    /// Read and classify the file at `site.source()/relpath`.
    ///
    /// `defaults` come from the site and collection configuration; a dynamic
    /// page's own block overrides them key by key. Any I/O or permalink
    /// failure aborts construction.
    pub fn read<S>(
        site: &S,
        collection: Option<CollectionId>,
        relpath: impl Into<PathBuf>,
        defaults: &FrontMatter,
    ) -> Result<Self, PageError>
    where
        S: SiteContext + ?Sized,
    {
        let relpath = relpath.into();
        let source = site.source().join(&relpath);
        let magic = files::read_file_magic(&source)?;
        let modified = fs::metadata(&source)
            .and_then(|m| m.modified())
            .map_err(|e| PathError::wrap(e, "stat", &source))?;

        let fields = PageFields {
            relpath,
            permalink: String::new(),
            modified,
            front_matter: defaults.clone(),
            collection,
        };
        let mut page = if frontmatter::has_front_matter(&magic) {
            let document = frontmatter::read_front_matter(&source)?;
            Page::Dynamic {
                fields: PageFields {
                    front_matter: document.front_matter.merged_over(defaults),
                    ..fields
                },
                block: document.front_matter,
                body: document.body,
            }
        } else {
            Page::Static(fields)
        };

        page.init_permalink(site)?;
        Ok(page)
    }

    /// Computed after classification so the pattern can see the merged
    /// front matter.
    fn init_permalink<S>(&mut self, site: &S) -> Result<(), PageError>
    where
        S: SiteContext + ?Sized,
    {
        let permalink = match self {
            Page::Static(fields) => permalink::url_path(&fields.relpath),
            Page::Dynamic { fields, .. } => {
                if let Some(explicit) = fields.front_matter.string("permalink") {
                    permalink::normalize(explicit)
                } else {
                    let collection = fields.collection.and_then(|id| site.collection(id));
                    let pattern = collection
                        .and_then(|c| c.permalink)
                        .unwrap_or_else(|| site.permalink_pattern());
                    let output_ext = output_extension(site, &fields.relpath);
                    let vars = Placeholders {
                        relpath: &fields.relpath,
                        front_matter: &fields.front_matter,
                        collection: collection.map(|c| c.name),
                        output_ext: &output_ext,
                    };
                    permalink::expand(pattern, &vars).map_err(|source| PageError::Permalink {
                        path: fields.relpath.clone(),
                        source,
                    })?
                }
            }
        };
        self.fields_mut().permalink = permalink;
        Ok(())
    }

    fn fields(&self) -> &PageFields {
        match self {
            Page::Static(fields) | Page::Dynamic { fields, .. } => fields,
        }
    }

    fn fields_mut(&mut self) -> &mut PageFields {
        match self {
            Page::Static(fields) | Page::Dynamic { fields, .. } => fields,
        }
    }

    /// Source-relative path.
    pub fn path(&self) -> &Path {
        &self.fields().relpath
    }

    /// Absolute path of the source file.
    pub fn source<S: SiteContext + ?Sized>(&self, site: &S) -> PathBuf {
        site.source().join(self.path())
    }

    pub fn permalink(&self) -> &str {
        &self.fields().permalink
    }

    /// Output file for this page, relative to the destination directory.
    pub fn output_path(&self) -> PathBuf {
        permalink::output_relpath(self.permalink())
    }

    pub fn modified(&self) -> SystemTime {
        self.fields().modified
    }

    pub fn front_matter(&self) -> &FrontMatter {
        &self.fields().front_matter
    }

    pub fn collection(&self) -> Option<CollectionId> {
        self.fields().collection
    }

    pub fn is_static(&self) -> bool {
        matches!(self, Page::Static(_))
    }

    /// `published: false` in front matter (or defaults) hides the page.
    pub fn published(&self) -> bool {
        self.front_matter().bool(PUBLISHED_KEY, true)
    }

    /// The unrendered body of a dynamic page.
    pub fn body(&self) -> Option<&str> {
        match self {
            Page::Static(_) => None,
            Page::Dynamic { body, .. } => Some(body),
        }
    }

    /// The page object handed to renderers.
    ///
    /// Structural keys (`path`, `modified_time`, `name`, `basename`,
    /// `extname`) are always present. A static page also carries its front
    /// matter, which can never shadow a structural key. A dynamic page adds
    /// `url` and its full front matter under `front_matter`.
    pub fn template_object(&self) -> VariableMap {
        let structural = self.structural_variables();
        match self {
            Page::Static(fields) => {
                let mut vars: VariableMap = fields.front_matter.clone().into_inner();
                vars.extend(structural);
                vars
            }
            Page::Dynamic { fields, .. } => {
                let mut vars = structural;
                vars.insert("url".to_string(), Value::from(fields.permalink.as_str()));
                vars.insert("front_matter".to_string(), front_matter_value(&fields.front_matter));
                vars
            }
        }
    }

    /// Variables worth showing when inspecting a page.
    ///
    /// Never contains rendered output: a dynamic page shows its raw block and
    /// raw body.
    pub fn debug_variables(&self) -> VariableMap {
        let mut vars = self.template_object();
        if let Page::Dynamic { block, body, .. } = self {
            vars.insert("raw_front_matter".to_string(), front_matter_value(block));
            vars.insert("raw_body".to_string(), Value::from(body.as_str()));
        }
        vars
    }

    fn structural_variables(&self) -> VariableMap {
        let fields = self.fields();
        let path = permalink::url_path(&fields.relpath);
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        let modified: DateTime<Utc> = fields.modified.into();

        let mut vars = VariableMap::new();
        vars.insert(
            "basename".to_string(),
            Value::from(permalink::strip_extension(&name)),
        );
        vars.insert("extname".to_string(), Value::from(permalink::extension(&name)));
        vars.insert("modified_time".to_string(), Value::from(modified.to_rfc3339()));
        vars.insert("name".to_string(), Value::from(name.as_str()));
        vars.insert("path".to_string(), Value::from(path));
        vars
    }

    /// Write the page's output bytes to `w`.
    ///
    /// Static pages copy their source verbatim; dynamic pages are rendered by
    /// `renderer` from [`Page::template_object`] and the raw body.
    pub fn write<S, R>(&self, site: &S, renderer: &R, w: &mut dyn Write) -> Result<(), PageError>
    where
        S: SiteContext + ?Sized,
        R: Renderer + ?Sized,
    {
        match self {
            Page::Static(_) => {
                let source = self.source(site);
                let mut file = File::open(&source).map_err(|e| PathError::wrap(e, "open", &source))?;
                io::copy(&mut file, w).map_err(|e| PathError::wrap(e, "copy", &source))?;
                Ok(())
            }
            Page::Dynamic { body, .. } => {
                renderer.render(&self.template_object(), body, w)?;
                Ok(())
            }
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_static() { "Static" } else { "Dynamic" };
        write!(
            f,
            "{kind}{{Path={}, Permalink={}}}",
            self.path().display(),
            self.permalink()
        )
    }
}

fn front_matter_value(front_matter: &FrontMatter) -> Value {
    Value::Mapping(
        front_matter
            .iter()
            .map(|(k, v)| (Value::from(k.as_str()), v.clone()))
            .collect(),
    )
}

/// `.html` for Markdown sources, otherwise the source's own extension.
fn output_extension<S: SiteContext + ?Sized>(site: &S, relpath: &Path) -> String {
    if site.is_markdown(relpath) {
        return ".html".to_string();
    }
    let name = relpath
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    permalink::extension(&name).to_string()
}

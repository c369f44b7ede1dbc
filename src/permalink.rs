//! Permalink templates.
//!
//! A permalink pattern is a URL path with `:placeholder` segments filled in
//! from a page's location and front matter:
//!
//! | Placeholder | Value for `_posts/2024/hello.md` with `categories: news` |
//! |-------------|-----------------------------------------------------------|
//! | `:collection` | `posts` |
//! | `:path` | `2024/hello` (collection directory stripped) |
//! | `:name` | `hello` |
//! | `:title` | front matter `slug`, else `hello` |
//! | `:output_ext` | `.html` (Markdown sources), else the source extension |
//! | `:categories` | `news` (sorted, joined with `/`) |
//!
//! Two named styles are recognized: `pretty` (`/:categories/:title/`) and
//! `none` (`/:categories/:title:output_ext`). Repeated slashes collapse, so an
//! empty `:categories` leaves no gap.

use crate::frontmatter::FrontMatter;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// Site-wide pattern when the config does not set one.
pub const DEFAULT_PATTERN: &str = "/:path:output_ext";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":([a-z_]+)").unwrap());

#[derive(Error, Debug, PartialEq)]
pub enum PermalinkError {
    #[error("unknown placeholder :{placeholder} in permalink {pattern:?}")]
    UnknownPlaceholder { placeholder: String, pattern: String },
}

/// Everything a pattern may draw on for one page.
#[derive(Debug, Clone, Copy)]
pub struct Placeholders<'a> {
    /// Source-relative path of the page.
    pub relpath: &'a Path,
    pub front_matter: &'a FrontMatter,
    /// Name of the owning collection, if any.
    pub collection: Option<&'a str>,
    /// Extension of the rendered output, with its leading dot.
    pub output_ext: &'a str,
}

impl Placeholders<'_> {
    fn value(&self, name: &str) -> Option<String> {
        let value = match name {
            "collection" => self.collection.unwrap_or_default().to_string(),
            "path" => self.path_without_extension(),
            "name" => self.name(),
            "title" => self
                .front_matter
                .string("slug")
                .map(str::to_string)
                .unwrap_or_else(|| self.name()),
            "output_ext" => self.output_ext.to_string(),
            "categories" => self.front_matter.sorted_string_array("categories").join("/"),
            _ => return None,
        };
        Some(value)
    }

    fn name(&self) -> String {
        let file_name = self
            .relpath
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        strip_extension(&file_name).to_string()
    }

    /// Relative directory plus basename, without the collection directory.
    fn path_without_extension(&self) -> String {
        let mut segments: Vec<String> = self
            .relpath
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let collection_dir = self.collection.map(|c| format!("_{c}"));
        if collection_dir.is_some() && segments.first() == collection_dir.as_ref() {
            segments.remove(0);
        }
        if let Some(last) = segments.last_mut() {
            *last = strip_extension(last).to_string();
        }
        segments.join("/")
    }
}

/// Expand a style name to its pattern; anything else is already a pattern.
pub fn resolve_style(pattern: &str) -> &str {
    match pattern {
        "pretty" => "/:categories/:title/",
        "none" => "/:categories/:title:output_ext",
        other => other,
    }
}

/// Fill in `pattern` for one page.
pub fn expand(pattern: &str, vars: &Placeholders<'_>) -> Result<String, PermalinkError> {
    let pattern = resolve_style(pattern);
    let mut expanded = String::with_capacity(pattern.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(pattern) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        expanded.push_str(&pattern[last..whole.start()]);
        let value = vars
            .value(name.as_str())
            .ok_or_else(|| PermalinkError::UnknownPlaceholder {
                placeholder: name.as_str().to_string(),
                pattern: pattern.to_string(),
            })?;
        expanded.push_str(&value);
        last = whole.end();
    }
    expanded.push_str(&pattern[last..]);
    Ok(normalize(&expanded))
}

/// Ensure a leading `/` and collapse runs of slashes.
pub fn normalize(permalink: &str) -> String {
    let mut out = String::with_capacity(permalink.len() + 1);
    out.push('/');
    for c in permalink.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}

/// The `/`-prefixed, forward-slash form of a relative path.
///
/// Platform separators never leak into URLs: `about\team.md` on Windows and
/// `about/team.md` elsewhere both give `/about/team.md`.
pub fn url_path(relpath: &Path) -> String {
    let segments: Vec<String> = relpath
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    format!("/{}", segments.join("/"))
}

/// Where a permalink lands inside the destination directory.
///
/// Directory-style permalinks (trailing `/`) get an `index.html`. `.` and
/// `..` segments are dropped so output never escapes the destination.
pub fn output_relpath(permalink: &str) -> PathBuf {
    let mut path: PathBuf = permalink
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();
    if permalink.ends_with('/') || path.as_os_str().is_empty() {
        path.push("index.html");
    }
    path
}

/// Drop the final extension of a file name: `a.tar.gz` → `a.tar`.
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => name,
    }
}

/// The final extension of a file name with its dot, or `""`.
pub fn extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) => &name[dot..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;

    fn vars<'a>(
        relpath: &'a Path,
        front_matter: &'a FrontMatter,
        collection: Option<&'a str>,
    ) -> Placeholders<'a> {
        Placeholders {
            relpath,
            front_matter,
            collection,
            output_ext: ".html",
        }
    }

    #[test]
    fn default_pattern_keeps_directories() {
        let fm = FrontMatter::new();
        let v = vars(Path::new("about/team.md"), &fm, None);
        assert_eq!(expand(DEFAULT_PATTERN, &v).unwrap(), "/about/team.html");
    }

    #[test]
    fn collection_directory_is_stripped_from_path() {
        let fm = FrontMatter::new();
        let v = vars(Path::new("_posts/2024/hello.md"), &fm, Some("posts"));
        assert_eq!(expand("/:collection/:path/", &v).unwrap(), "/posts/2024/hello/");
    }

    #[test]
    fn pretty_style_uses_sorted_categories() {
        let fm: FrontMatter = [("categories".to_string(), Value::from("rust news"))]
            .into_iter()
            .collect();
        let v = vars(Path::new("_posts/hello.md"), &fm, Some("posts"));
        assert_eq!(expand("pretty", &v).unwrap(), "/news/rust/hello/");
    }

    #[test]
    fn none_style_without_categories_collapses_slashes() {
        let fm = FrontMatter::new();
        let v = vars(Path::new("notes/hello.md"), &fm, None);
        assert_eq!(expand("none", &v).unwrap(), "/hello.html");
    }

    #[test]
    fn title_prefers_slug() {
        let fm: FrontMatter = [("slug".to_string(), Value::from("custom"))]
            .into_iter()
            .collect();
        let v = vars(Path::new("hello.md"), &fm, None);
        assert_eq!(expand("/:title/", &v).unwrap(), "/custom/");
    }

    #[test]
    fn unknown_placeholder_is_error() {
        let fm = FrontMatter::new();
        let v = vars(Path::new("hello.md"), &fm, None);
        let err = expand("/:year/:title/", &v).unwrap_err();
        assert_eq!(
            err,
            PermalinkError::UnknownPlaceholder {
                placeholder: "year".to_string(),
                pattern: "/:year/:title/".to_string(),
            }
        );
    }

    #[test]
    fn literal_text_is_kept() {
        let fm = FrontMatter::new();
        let v = vars(Path::new("docs/guide.md"), &fm, None);
        assert_eq!(expand("/v1/:name-page.htm", &v).unwrap(), "/v1/guide-page.htm");
    }

    #[test]
    fn normalize_adds_leading_slash_and_collapses() {
        assert_eq!(normalize("a//b///c/"), "/a/b/c/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize(""), "/");
    }

    #[test]
    fn url_path_uses_forward_slashes() {
        let rel: PathBuf = ["assets", "img", "logo.png"].iter().collect();
        assert_eq!(url_path(&rel), "/assets/img/logo.png");
        assert_eq!(url_path(Path::new("./robots.txt")), "/robots.txt");
    }

    #[test]
    fn output_relpath_variants() {
        assert_eq!(output_relpath("/"), PathBuf::from("index.html"));
        assert_eq!(output_relpath("/about/"), PathBuf::from("about/index.html"));
        assert_eq!(output_relpath("/a/b.html"), PathBuf::from("a/b.html"));
        assert_eq!(output_relpath("/../../etc/x"), PathBuf::from("etc/x"));
    }

    #[test]
    fn extension_helpers() {
        assert_eq!(strip_extension("a.tar.gz"), "a.tar");
        assert_eq!(extension("a.tar.gz"), ".gz");
        assert_eq!(strip_extension("README"), "README");
        assert_eq!(extension("README"), "");
    }
}

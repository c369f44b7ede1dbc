//! Site configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! the base layer; the site's `config.toml` (at the source root) is a sparse
//! overlay on top of them.
//!
//! ## Config File Location
//!
//! ```text
//! site/
//! ├── config.toml        # Site config (overrides stock defaults)
//! ├── index.md
//! ├── _posts/            # Collection "posts"
//! │   └── hello.md
//! └── assets/
//!     └── style.css
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! destination = "_site"                    # Output directory, relative to the source
//! permalink = "/:path:output_ext"          # Site-wide pattern, or "pretty" / "none"
//! markdown_ext = "markdown,mkdown,mkdn,mkd,md"
//! exclude = []                             # Source-relative paths to skip
//!
//! [defaults]                               # Front matter applied to every page
//! layout = "default"
//!
//! [collections.posts]
//! output = true                            # false: read, but never written
//! permalink = "/blog/:categories/:title/"  # Overrides the site pattern
//!
//! [collections.posts.defaults]             # Front matter for this collection only
//! layout = "post"
//!
//! [processing]
//! max_processes = 4                        # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early. Keys under `defaults`
//! tables are free-form: they become front matter.

use crate::frontmatter::FrontMatter;
use crate::permalink::{self, DEFAULT_PATTERN};
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path};
use thiserror::Error;

/// File name of the site config, at the source root.
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `config.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Output directory, relative to the source root unless absolute.
    pub destination: String,
    /// Site-wide permalink pattern or style name.
    pub permalink: String,
    /// Comma-separated list of extensions rendered as Markdown.
    pub markdown_ext: String,
    /// Source-relative files or directories that are never read.
    pub exclude: Vec<String>,
    /// Front matter defaults for every page.
    pub defaults: toml::Table,
    /// Collections by name. Pages live under `_<name>/`.
    pub collections: BTreeMap<String, CollectionConfig>,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            destination: "_site".to_string(),
            permalink: DEFAULT_PATTERN.to_string(),
            markdown_ext: "markdown,mkdown,mkdn,mkd,md".to_string(),
            exclude: Vec::new(),
            defaults: toml::Table::new(),
            collections: BTreeMap::new(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if destination_reaches_source(self.destination.trim()) {
            return Err(ConfigError::Validation(
                "destination must not be the source or one of its parents".into(),
            ));
        }
        validate_pattern("permalink", &self.permalink)?;
        if self.markdown_extensions().is_empty() {
            return Err(ConfigError::Validation(
                "markdown_ext must list at least one extension".into(),
            ));
        }
        for (name, collection) in &self.collections {
            if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
                return Err(ConfigError::Validation(format!(
                    "collection name {name:?} must be a plain directory name"
                )));
            }
            if let Some(pattern) = &collection.permalink {
                validate_pattern(&format!("collections.{name}.permalink"), pattern)?;
            }
        }
        Ok(())
    }

    /// Markdown extensions without dots, e.g. `["markdown", "md"]`.
    pub fn markdown_extensions(&self) -> Vec<String> {
        self.markdown_ext
            .split(',')
            .map(|ext| ext.trim().trim_start_matches('.'))
            .filter(|ext| !ext.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Site-wide front matter defaults.
    pub fn default_front_matter(&self) -> FrontMatter {
        table_to_front_matter(&self.defaults)
    }
}

/// Whether a relative destination folds down to the source or an ancestor.
///
/// A lexical check only; the site repeats it on the resolved path.
fn destination_reaches_source(destination: &str) -> bool {
    let path = Path::new(destination);
    if path.has_root() {
        return false;
    }
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth == 0
}

fn validate_pattern(key: &str, pattern: &str) -> Result<(), ConfigError> {
    if permalink::resolve_style(pattern).starts_with('/') {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{key} must start with '/' or be one of \"pretty\", \"none\" (got {pattern:?})"
        )))
    }
}

/// Settings for one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectionConfig {
    /// Whether the collection's pages are written to the destination.
    pub output: bool,
    /// Collection permalink pattern; the site pattern when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    /// Front matter defaults layered over the site defaults.
    pub defaults: toml::Table,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            output: true,
            permalink: None,
            defaults: toml::Table::new(),
        }
    }
}

impl CollectionConfig {
    pub fn default_front_matter(&self) -> FrontMatter {
        table_to_front_matter(&self.defaults)
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel page-reading workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// TOML defaults → front matter
// =============================================================================

fn table_to_front_matter(table: &toml::Table) -> FrontMatter {
    table
        .iter()
        .map(|(k, v)| (k.clone(), toml_to_yaml(v)))
        .collect()
}

/// Convert a TOML value to the YAML value model used by front matter.
///
/// Datetimes have no YAML counterpart here and become their TOML string form.
pub fn toml_to_yaml(value: &toml::Value) -> YamlValue {
    match value {
        toml::Value::String(s) => YamlValue::from(s.as_str()),
        toml::Value::Integer(i) => YamlValue::from(*i),
        toml::Value::Float(f) => YamlValue::from(*f),
        toml::Value::Boolean(b) => YamlValue::Bool(*b),
        toml::Value::Datetime(dt) => YamlValue::from(dt.to_string()),
        toml::Value::Array(items) => YamlValue::Sequence(items.iter().map(toml_to_yaml).collect()),
        toml::Value::Table(table) => YamlValue::Mapping(
            table
                .iter()
                .map(|(k, v)| (YamlValue::from(k.as_str()), toml_to_yaml(v)))
                .collect(),
        ),
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(SiteConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = path.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# leafpress Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# This file lives at the root of the site source. Unknown keys cause an error.

# Output directory. Relative paths are resolved against the source directory.
destination = "_site"

# Site-wide permalink pattern, or a style name:
#   "pretty" -> /:categories/:title/
#   "none"   -> /:categories/:title:output_ext
# Placeholders: :collection :path :name :title :output_ext :categories
permalink = "/:path:output_ext"

# Comma-separated extensions rendered from Markdown to HTML.
markdown_ext = "markdown,mkdown,mkdn,mkd,md"

# Source-relative files or directories that are never read.
# Names starting with "_" or "." are always skipped.
exclude = []

# ---------------------------------------------------------------------------
# Front matter defaults
# ---------------------------------------------------------------------------
# Keys here are applied to every page. A page's own front matter wins.
[defaults]
# layout = "default"

# ---------------------------------------------------------------------------
# Collections
# ---------------------------------------------------------------------------
# Each collection reads pages from a "_<name>/" directory.
#
# [collections.posts]
# output = true                            # false: read, but never written
# permalink = "/blog/:categories/:title/"  # Overrides the site pattern
#
# [collections.posts.defaults]
# layout = "post"
[collections]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel page-reading workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = SiteConfig::default();
        assert_eq!(config.destination, "_site");
        assert_eq!(config.permalink, "/:path:output_ext");
        assert!(config.exclude.is_empty());
        assert!(config.collections.is_empty());
    }

    #[test]
    fn default_markdown_extensions() {
        let config = SiteConfig::default();
        assert_eq!(
            config.markdown_extensions(),
            vec!["markdown", "mkdown", "mkdn", "mkd", "md"]
        );
    }

    #[test]
    fn markdown_extensions_trim_dots_and_spaces() {
        let config = SiteConfig {
            markdown_ext: " .md, markdown ,,".to_string(),
            ..SiteConfig::default()
        };
        assert_eq!(config.markdown_extensions(), vec!["md", "markdown"]);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
permalink = "pretty"
"#;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.permalink, "pretty");
        assert_eq!(config.destination, "_site");
    }

    #[test]
    fn parse_collections() {
        let toml = r#"
[collections.posts]
permalink = "/blog/:title/"

[collections.posts.defaults]
layout = "post"

[collections.notes]
output = false
"#;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        let posts = &config.collections["posts"];
        assert!(posts.output);
        assert_eq!(posts.permalink.as_deref(), Some("/blog/:title/"));
        assert_eq!(posts.default_front_matter().string("layout"), Some("post"));
        let notes = &config.collections["notes"];
        assert!(!notes.output);
        assert!(notes.permalink.is_none());
    }

    #[test]
    fn defaults_become_front_matter() {
        let toml = r#"
[defaults]
layout = "default"
draft = false
tags = ["a", "b"]
weight = 3
"#;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        let fm = config.default_front_matter();
        assert_eq!(fm.string("layout"), Some("default"));
        assert!(!fm.bool("draft", true));
        assert_eq!(fm.sorted_string_array("tags"), vec!["a", "b"]);
        assert_eq!(fm.get("weight"), Some(&YamlValue::from(3)));
    }

    #[test]
    fn toml_tables_and_datetimes_convert() {
        let value: toml::Value = toml::from_str(
            r#"
when = 2024-05-01T10:00:00Z
[author]
name = "Ann"
"#,
        )
        .unwrap();
        let yaml = toml_to_yaml(&value);
        assert_eq!(yaml["author"]["name"], YamlValue::from("Ann"));
        assert_eq!(yaml["when"], YamlValue::from("2024-05-01T10:00:00Z"));
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.destination, "_site");
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
destination = "public"
exclude = ["drafts", "Gemfile"]
"#,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.destination, "public");
        assert_eq!(config.exclude, vec!["drafts", "Gemfile"]);
        // Unspecified values should be defaults
        assert_eq!(config.permalink, "/:path:output_ext");
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "this is not valid toml [[[").unwrap();

        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str(r#"destination = "_site""#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"destination = "out""#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("destination").unwrap().as_str(), Some("out"));
    }

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str(
            r#"
[defaults]
layout = "default"
author = "Ann"
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[defaults]
layout = "page"
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let defaults = merged.get("defaults").unwrap();
        assert_eq!(defaults.get("layout").unwrap().as_str(), Some("page"));
        assert_eq!(defaults.get("author").unwrap().as_str(), Some("Ann"));
    }

    #[test]
    fn merge_toml_arrays_replace() {
        let base: toml::Value = toml::from_str(r#"exclude = ["a", "b"]"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"exclude = ["c"]"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("exclude").unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn merge_toml_deep_nested() {
        let base: toml::Value = toml::from_str(
            r#"
[collections.posts]
output = true
permalink = "/blog/:title/"
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[collections.posts]
output = false
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let posts = merged.get("collections").unwrap().get("posts").unwrap();
        assert_eq!(posts.get("output").unwrap().as_bool(), Some(false));
        assert_eq!(posts.get("permalink").unwrap().as_str(), Some("/blog/:title/"));
    }

    // =========================================================================
    // Unknown key rejection tests
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let result: Result<SiteConfig, _> = toml::from_str(r#"destinaton = "out""#);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown field"));
    }

    #[test]
    fn unknown_collection_key_rejected() {
        let toml_str = r#"
[collections.posts]
outptu = true
"#;
        let result: Result<SiteConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_key_rejected_via_load_config() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
[processing]
max_procs = 4
"#,
        )
        .unwrap();
        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn defaults_accept_any_keys() {
        let toml_str = r#"
[defaults]
anything = "goes"
"#;
        let config: SiteConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_front_matter().string("anything"), Some("goes"));
    }

    // =========================================================================
    // Validation tests
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(SiteConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_destination_must_not_be_source() {
        for destination in ["", ".", "./", "..", "sub/..", "a/b/../..", "../.."] {
            let config = SiteConfig {
                destination: destination.to_string(),
                ..SiteConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(ConfigError::Validation(_))),
                "destination {destination:?} should be rejected"
            );
        }
    }

    #[test]
    fn validate_destination_may_leave_the_source() {
        for destination in ["_site", "../public", "sub/../out", "/var/www/site"] {
            let config = SiteConfig {
                destination: destination.to_string(),
                ..SiteConfig::default()
            };
            assert!(config.validate().is_ok(), "destination {destination:?} was rejected");
        }
    }

    #[test]
    fn validate_permalink_styles_and_patterns() {
        for permalink in ["pretty", "none", "/:title/"] {
            let config = SiteConfig {
                permalink: permalink.to_string(),
                ..SiteConfig::default()
            };
            assert!(config.validate().is_ok(), "{permalink} should be accepted");
        }
        let config = SiteConfig {
            permalink: "date".to_string(),
            ..SiteConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_markdown_ext_not_empty() {
        let config = SiteConfig {
            markdown_ext: " , ".to_string(),
            ..SiteConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_collection_names_and_patterns() {
        let mut config = SiteConfig::default();
        config
            .collections
            .insert("a/b".to_string(), CollectionConfig::default());
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = SiteConfig::default();
        config.collections.insert(
            "posts".to_string(),
            CollectionConfig {
                permalink: Some("blog/:title".to_string()),
                ..CollectionConfig::default()
            },
        );
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("collections.posts.permalink"));
    }

    #[test]
    fn resolve_config_rejects_invalid_values() {
        let base = stock_defaults_value();
        let overlay: toml::Value = toml::from_str(r#"destination = ".""#).unwrap();
        let result = resolve_config(base, Some(overlay));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // Processing tests
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&ProcessingConfig::default()), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig {
            max_processes: Some(99_999),
        };
        assert_eq!(effective_threads(&config), cores);
    }

    // =========================================================================
    // stock config tests
    // =========================================================================

    #[test]
    fn stock_config_toml_is_valid_toml() {
        let content = stock_config_toml();
        let _: toml::Value = toml::from_str(content).expect("stock config must be valid TOML");
    }

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: SiteConfig = toml::from_str(stock_config_toml()).unwrap();
        let defaults = SiteConfig::default();
        assert_eq!(config.destination, defaults.destination);
        assert_eq!(config.permalink, defaults.permalink);
        assert_eq!(config.markdown_ext, defaults.markdown_ext);
        assert!(config.defaults.is_empty());
        assert!(config.collections.is_empty());
    }

    #[test]
    fn stock_defaults_value_has_all_keys() {
        let val = stock_defaults_value();
        assert!(val.is_table());
        for key in ["destination", "permalink", "markdown_ext", "exclude", "processing"] {
            assert!(val.get(key).is_some(), "missing {key}");
        }
    }
}

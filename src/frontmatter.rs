//! Front matter detection, extraction, and typed access.
//!
//! A content file has front matter when it opens with a `---` line. The block
//! runs to the next line that is exactly `---`, and its text is YAML:
//!
//! ```text
//! ---
//! title: Hello
//! categories: news rust
//! ---
//! Body starts here.
//! ```
//!
//! ## Detection vs. Extraction
//!
//! Detection ([`has_front_matter`]) only looks at the four magic bytes from
//! [`read_file_magic`], so images and other binaries are rejected without
//! reading them. Extraction ([`parse`]) runs only on files that passed
//! detection.
//!
//! ## Leniency
//!
//! Front matter is user-authored, so nothing here fails a build:
//!
//! - A block with no closing marker, invalid YAML, or a YAML document that is
//!   not a mapping all degrade to "no metadata".
//! - [`FrontMatter::bool`] and [`FrontMatter::sorted_string_array`] return
//!   the default or an empty list on a type mismatch.

use crate::files::{PathError, read_file_magic};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

/// Magic bytes of a file with front matter.
pub const MARKER: &[u8] = b"---\n";

static EMPTY_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A---\n(?:[ \t]*\n)*---(?:\n|\z)").unwrap());

static BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A---\n(.+?\n)---(?:\n|\z)").unwrap());

/// Metadata parsed from a front matter block, possibly merged with defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrontMatter(BTreeMap<String, Value>);

impl FrontMatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The value at `key` if it is a string.
    pub fn string(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// The value at `key` if it is a boolean, else `default`.
    pub fn bool(&self, key: &str, default: bool) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// The value at `key` as a sorted list of strings.
    ///
    /// Accepts a whitespace-separated string (`"b a"`), a sequence of
    /// strings, or a sequence of other scalars, which are stringified.
    /// Duplicates are kept. Anything else, including a missing key, gives an
    /// empty list.
    pub fn sorted_string_array(&self, key: &str) -> Vec<String> {
        let mut items: Vec<String> = match self.0.get(key) {
            Some(Value::String(s)) => s.split_whitespace().map(str::to_owned).collect(),
            Some(Value::Sequence(seq)) => seq.iter().map(value_to_string).collect(),
            _ => Vec::new(),
        };
        items.sort();
        items
    }

    /// A new map holding `defaults` overlaid by `self`; `self` wins on conflicts.
    pub fn merged_over(&self, defaults: &FrontMatter) -> FrontMatter {
        let mut merged = defaults.0.clone();
        merged.extend(self.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        FrontMatter(merged)
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl From<BTreeMap<String, Value>> for FrontMatter {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for FrontMatter {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        Value::Tagged(tagged) => value_to_string(&tagged.value),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn key_to_string(key: Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Whether sniffed magic bytes mark a front matter file.
pub fn has_front_matter(magic: &[u8]) -> bool {
    magic == MARKER
}

/// Whether the file at `path` starts with a front matter marker line.
///
/// Reads at most four bytes.
pub fn file_has_front_matter(path: &Path) -> Result<bool, PathError> {
    Ok(has_front_matter(&read_file_magic(path)?))
}

/// A content file split into its metadata and body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Parsed block; empty when the file has none or it could not be parsed.
    pub front_matter: FrontMatter,
    /// Everything after the closing marker line, or the whole text when no
    /// block was extracted. Line endings are normalized to `\n`.
    pub body: String,
}

/// Split `content` into front matter and body.
///
/// `\r\n` line endings are normalized first, so CRLF files behave exactly
/// like LF files, closing marker included.
pub fn parse(content: &str) -> Document {
    let content = normalize_newlines(content);

    if let Some(m) = EMPTY_BLOCK.find(&content) {
        return Document {
            front_matter: FrontMatter::new(),
            body: content[m.end()..].to_string(),
        };
    }

    let extracted = BLOCK.captures(&content).and_then(|caps| {
        let end = caps.get(0)?.end();
        let front_matter = parse_block(caps.get(1)?.as_str())?;
        Some((front_matter, end))
    });
    match extracted {
        Some((front_matter, end)) => Document {
            front_matter,
            body: content[end..].to_string(),
        },
        None => Document {
            front_matter: FrontMatter::new(),
            body: content.into_owned(),
        },
    }
}

/// Deserialize the text of a non-empty block. `None` means malformed.
fn parse_block(text: &str) -> Option<FrontMatter> {
    match serde_yaml::from_str::<Value>(text) {
        Ok(Value::Mapping(mapping)) => Some(
            mapping
                .into_iter()
                .filter_map(|(k, v)| key_to_string(k).map(|k| (k, v)))
                .collect(),
        ),
        // A block holding only comments.
        Ok(Value::Null) => Some(FrontMatter::new()),
        _ => None,
    }
}

fn normalize_newlines(content: &str) -> Cow<'_, str> {
    if content.contains('\r') {
        Cow::Owned(content.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(content)
    }
}

/// Read the file at `path` and split it with [`parse`].
///
/// Invalid UTF-8 is replaced rather than rejected.
pub fn read_front_matter(path: &Path) -> Result<Document, PathError> {
    let bytes = fs::read(path).map_err(|e| PathError::wrap(e, "read", path))?;
    Ok(parse(&String::from_utf8_lossy(&bytes)))
}

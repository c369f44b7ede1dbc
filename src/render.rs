//! Rendering collaborator for dynamic pages.
//!
//! Pages do not render themselves. A dynamic page hands its template-facing
//! object and raw body to a [`Renderer`], which writes the output bytes.
//! [`MarkdownRenderer`] is the stock implementation: Markdown bodies become
//! HTML through pulldown-cmark, and every other body passes through as-is.

use crate::page::VariableMap;
use pulldown_cmark::{Options, Parser, html as md_html};
use serde_yaml::Value;
use std::io::{self, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Turns a page body into output bytes.
pub trait Renderer {
    /// `page` is the page's template-facing object; `body` is unrendered.
    fn render(&self, page: &VariableMap, body: &str, out: &mut dyn Write) -> Result<(), RenderError>;
}

/// Whether `ext` (with or without its leading dot) is in `extensions`.
///
/// Case-insensitive, so `POST.MD` is Markdown when `md` is listed.
pub fn is_markdown_extension(ext: &str, extensions: &[String]) -> bool {
    let ext = ext.trim_start_matches('.');
    !ext.is_empty() && extensions.iter().any(|m| m.eq_ignore_ascii_case(ext))
}

/// Renders Markdown to HTML; other bodies are copied unchanged.
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    extensions: Vec<String>,
}

impl MarkdownRenderer {
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }
}

impl Renderer for MarkdownRenderer {
    fn render(
        &self,
        page: &VariableMap,
        body: &str,
        out: &mut dyn Write,
    ) -> Result<(), RenderError> {
        let ext = page.get("extname").and_then(Value::as_str).unwrap_or("");
        if !is_markdown_extension(ext, &self.extensions) {
            out.write_all(body.as_bytes())?;
            return Ok(());
        }
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_STRIKETHROUGH;
        let mut html = String::with_capacity(body.len() * 3 / 2);
        md_html::push_html(&mut html, Parser::new_ext(body, options));
        out.write_all(html.as_bytes())?;
        Ok(())
    }
}

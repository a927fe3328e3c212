//! CLI command implementations.

pub mod convert;
pub mod gutter;
pub mod store;

pub use convert::convert_document;
pub use gutter::print_gutters;
pub use store::{import_document, list_documents, show_document, ListOptions, StoreArgs};

use crate::DocFormat;
use anyhow::{bail, Context, Result};
use folio_core::{Config, Editor, HtmlRules};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Load the configuration file, falling back to defaults when it is absent
pub(crate) fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        debug!(path = %path.display(), "no configuration file, using defaults");
        return Ok(Config::default());
    }
    Config::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Pick the input format from the flag or the file extension
pub(crate) fn input_format(path: &Path, from: Option<DocFormat>) -> Result<DocFormat> {
    if let Some(format) = from {
        return Ok(format);
    }
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("md" | "markdown") => Ok(DocFormat::Markdown),
        Some("html" | "htm") => Ok(DocFormat::Html),
        Some("json") => Ok(DocFormat::Json),
        _ => bail!("Cannot infer the format of {}; pass --from", path.display()),
    }
}

/// Read a file into a fresh editor
pub(crate) fn read_document(path: &Path, from: Option<DocFormat>, config: Config) -> Result<Editor> {
    let format = input_format(path, from)?;
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut editor = Editor::with_config(config);
    load_into(&mut editor, &contents, format)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    Ok(editor)
}

fn load_into(editor: &mut Editor, contents: &str, format: DocFormat) -> Result<()> {
    match format {
        DocFormat::Markdown => {
            let transformers = editor.markdown_transformers();
            editor.import_markdown(contents, &transformers)?;
        }
        DocFormat::Html => {
            let rules = HtmlRules::with_config(&editor.config().html);
            editor.paste_html(contents, &rules)?;
        }
        DocFormat::Json => editor.load_json(contents)?,
    }
    Ok(())
}

/// Render the editor's document
pub(crate) fn render(editor: &Editor, to: DocFormat) -> Result<String> {
    Ok(match to {
        DocFormat::Markdown => editor.export_markdown(&editor.markdown_transformers()),
        DocFormat::Html => editor.export_html(),
        DocFormat::Json => editor.to_json()?,
    })
}

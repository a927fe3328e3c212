//! Convert a document file between formats.

use super::{load_config, read_document, render};
use crate::DocFormat;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

pub fn convert_document(
    config_path: &Path,
    input: &Path,
    from: Option<DocFormat>,
    to: DocFormat,
    output: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let editor = read_document(input, from, config)?;
    let rendered = render(&editor, to)?;

    match output {
        Some(path) => {
            fs::write(path, format!("{rendered}\n"))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(output = %path.display(), "wrote document");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

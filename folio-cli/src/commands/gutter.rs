//! Print code-block gutters.

use super::{load_config, read_document};
use crate::DocFormat;
use anyhow::Result;
use folio_core::{NodeKind, NodeType};
use serde_json::json;
use std::path::Path;

pub fn print_gutters(
    config_path: &Path,
    input: &Path,
    from: Option<DocFormat>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let editor = read_document(input, from, config)?;

    let mut blocks = Vec::new();
    for key in editor.nodes_of_type(NodeType::Code) {
        let language = match editor.node(key)?.kind() {
            NodeKind::Code { language } => language.clone(),
            _ => None,
        };
        let gutter = editor.gutter(key).unwrap_or_default().to_string();
        blocks.push((language, gutter));
    }

    if json {
        let payload: Vec<_> = blocks
            .iter()
            .map(|(language, gutter)| {
                json!({
                    "language": language,
                    "lines": gutter.lines().count(),
                    "gutter": gutter,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if blocks.is_empty() {
        println!("No code blocks");
    } else {
        for (idx, (language, gutter)) in blocks.iter().enumerate() {
            if idx > 0 {
                println!();
            }
            println!("# {}", language.as_deref().unwrap_or("plain"));
            println!("{gutter}");
        }
    }
    Ok(())
}

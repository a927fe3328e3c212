//! Keeps a paragraph at the end of the document.
//!
//! A document ending in a code block, a table or a display equation gives
//! the caret nowhere to go below it. [`TrailingParagraph`] appends an empty
//! paragraph in that case; exports leave that paragraph out.

use crate::editor::Editor;
use crate::error::Result;
use crate::mutation::NodeTransform;
use crate::node::{NodeKey, NodeKind, NodeType};
use crate::serialized::SerializedNode;

/// Whether a last top-level block of this kind needs a paragraph after it
pub fn needs_trailing_paragraph(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Code { .. } | NodeKind::Table | NodeKind::Equation { inline: false, .. }
    )
}

/// Root transform appending the trailing paragraph
#[derive(Debug, Clone, Default)]
pub struct TrailingParagraph;

impl NodeTransform for TrailingParagraph {
    fn node_type(&self) -> NodeType {
        NodeType::Root
    }

    fn transform(&mut self, editor: &mut Editor, key: NodeKey) -> Result<()> {
        let Some(last) = editor.children(key)?.last().copied() else {
            return Ok(());
        };
        if !needs_trailing_paragraph(editor.node(last)?.kind()) {
            return Ok(());
        }
        let paragraph = editor.create(NodeKind::paragraph())?;
        editor.append(key, paragraph)
    }
}

/// Drop an empty paragraph that only follows a block needing one
pub(crate) fn strip_trailing_paragraph(blocks: &mut Vec<SerializedNode>) {
    let [.., before, last] = blocks.as_slice() else {
        return;
    };
    if last.kind == NodeKind::Paragraph
        && last.children.is_empty()
        && needs_trailing_paragraph(&before.kind)
    {
        blocks.pop();
    }
}

impl Editor {
    /// Top-level blocks as exported: the document without the empty
    /// trailing paragraph kept for editing
    pub fn content_blocks(&self) -> Vec<SerializedNode> {
        let mut blocks = self.snapshot().blocks().to_vec();
        strip_trailing_paragraph(&mut blocks);
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_kinds(ed: &Editor) -> Vec<NodeType> {
        ed.children(ed.root())
            .unwrap()
            .iter()
            .map(|key| ed.node(*key).unwrap().node_type())
            .collect()
    }

    #[test]
    fn paragraph_follows_final_code_block() {
        let mut ed = Editor::new();
        let t = ed.markdown_transformers();
        ed.import_markdown("intro\n\n```rust\nfn main() {}\n```", &t)
            .unwrap();
        assert_eq!(
            root_kinds(&ed),
            [NodeType::Paragraph, NodeType::Code, NodeType::Paragraph]
        );
        assert_eq!(ed.content_blocks().len(), 2);
        assert_eq!(ed.export_markdown(&t), "intro\n\n```rust\nfn main() {}\n```");
    }

    #[test]
    fn headings_and_paragraphs_need_nothing() {
        let mut ed = Editor::new();
        let t = ed.markdown_transformers();
        ed.import_markdown("# Title", &t).unwrap();
        assert_eq!(root_kinds(&ed), [NodeType::Heading]);
    }

    #[test]
    fn paragraph_is_added_once() {
        let mut ed = Editor::new();
        let t = ed.markdown_transformers();
        ed.import_markdown("$$x$$", &t).unwrap();
        let last = *ed.children(ed.root()).unwrap().last().unwrap();
        ed.update(|ed| {
            let text = ed.create(NodeKind::text("after"))?;
            ed.append(last, text)
        })
        .unwrap();
        assert_eq!(root_kinds(&ed), [NodeType::Equation, NodeType::Paragraph]);
        assert_eq!(ed.export_markdown(&t), "$$x$$\n\nafter");
    }

    #[test]
    fn disabled_by_config() {
        let mut config = crate::config::Config::default();
        config.editor.trailing_paragraph = false;
        let mut ed = Editor::with_config(config);
        let t = ed.markdown_transformers();
        ed.import_markdown("| a |", &t).unwrap();
        assert_eq!(root_kinds(&ed), [NodeType::Table]);
    }
}

//! Markdown import, export and typing shortcuts.
//!
//! A [`Transformers`] set is an ordered list of rules. Block rules
//! ([`ElementTransformer`]) own whole lines; inline rules are either text
//! formats (`**bold**`) or text matches that build a node (`$x^2$`). The
//! first rule that accepts a match wins, so more specific rules are listed
//! before generic ones.

pub mod element;
pub mod inline;
pub mod shortcuts;

use crate::config::MarkdownConfig;
use crate::editor::Editor;
use crate::error::Result;
use crate::node::NodeKind;
use crate::serialized::SerializedNode;
use std::sync::Arc;
use tracing::debug;

pub use element::{
    BlockEquationTransformer, CheckListTransformer, CodeFenceTransformer, ElementTransformer,
    GenericCodeFenceTransformer, HeadingTransformer, ListTransformer, QuoteTransformer,
    TableTransformer,
};
pub use inline::{TextFormatTransformer, TextMatchTransformer};
pub use shortcuts::MarkdownShortcuts;

/// One rule in a [`Transformers`] set
#[derive(Clone)]
pub enum Transformer {
    Element(Arc<dyn ElementTransformer>),
    TextFormat(TextFormatTransformer),
    TextMatch(TextMatchTransformer),
}

impl Transformer {
    pub fn name(&self) -> &'static str {
        match self {
            Transformer::Element(rule) => rule.name(),
            Transformer::TextFormat(rule) => rule.name,
            Transformer::TextMatch(rule) => rule.name,
        }
    }
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            Transformer::Element(_) => "Element",
            Transformer::TextFormat(_) => "TextFormat",
            Transformer::TextMatch(_) => "TextMatch",
        };
        write!(f, "{variant}({})", self.name())
    }
}

/// Ordered Markdown rule set
#[derive(Debug, Clone)]
pub struct Transformers {
    rules: Vec<Transformer>,
    block_separator: &'static str,
}

impl Default for Transformers {
    fn default() -> Self {
        Self::with_config(&MarkdownConfig::default())
    }
}

impl Transformers {
    /// The standard rules, configured
    pub fn with_config(config: &MarkdownConfig) -> Self {
        let elements: Vec<Arc<dyn ElementTransformer>> = vec![
            Arc::new(BlockEquationTransformer),
            Arc::new(CodeFenceTransformer),
            Arc::new(GenericCodeFenceTransformer),
            Arc::new(TableTransformer),
            Arc::new(HeadingTransformer),
            Arc::new(QuoteTransformer),
            Arc::new(CheckListTransformer),
            Arc::new(ListTransformer::unordered()),
            Arc::new(ListTransformer::ordered()),
        ];
        let formats = [
            TextFormatTransformer::inline_code(),
            TextFormatTransformer::bold_italic_star(),
            TextFormatTransformer::bold_star(),
            TextFormatTransformer::bold_underscore(),
            TextFormatTransformer::italic_star(),
            TextFormatTransformer::italic_underscore(),
            TextFormatTransformer::strikethrough(),
        ];
        let matches = [
            TextMatchTransformer::inline_equation(),
            TextMatchTransformer::image(),
            TextMatchTransformer::link(),
        ];

        let rules = elements
            .into_iter()
            .map(Transformer::Element)
            .chain(formats.into_iter().map(Transformer::TextFormat))
            .chain(matches.into_iter().map(Transformer::TextMatch))
            .collect();
        Self::from_rules(rules, config)
    }

    /// A custom rule set, used in the given order
    pub fn from_rules(rules: Vec<Transformer>, config: &MarkdownConfig) -> Self {
        Self {
            rules,
            block_separator: if config.blank_line_between_blocks {
                "\n\n"
            } else {
                "\n"
            },
        }
    }

    pub fn rules(&self) -> &[Transformer] {
        &self.rules
    }

    /// Append a rule after the existing ones
    pub fn push(&mut self, rule: Transformer) {
        self.rules.push(rule);
    }

    pub fn elements(&self) -> impl Iterator<Item = &Arc<dyn ElementTransformer>> {
        self.rules.iter().filter_map(|rule| match rule {
            Transformer::Element(rule) => Some(rule),
            _ => None,
        })
    }

    pub fn formats(&self) -> impl Iterator<Item = &TextFormatTransformer> {
        self.rules.iter().filter_map(|rule| match rule {
            Transformer::TextFormat(rule) => Some(rule),
            _ => None,
        })
    }

    pub fn text_matches(&self) -> impl Iterator<Item = &TextMatchTransformer> {
        self.rules.iter().filter_map(|rule| match rule {
            Transformer::TextMatch(rule) => Some(rule),
            _ => None,
        })
    }

    /// Parse a Markdown document into top-level blocks
    pub fn import(&self, markdown: &str) -> Vec<SerializedNode> {
        let normalized = markdown.replace("\r\n", "\n").replace('\r', "\n");
        let lines: Vec<&str> = normalized.split('\n').collect();

        let mut blocks = Vec::new();
        let mut idx = 0;
        while idx < lines.len() {
            if lines[idx].trim().is_empty() {
                idx += 1;
                continue;
            }
            if let Some((block, consumed)) = self.import_element(&lines[idx..]) {
                blocks.push(block);
                idx += consumed.max(1);
                continue;
            }

            let start = idx;
            idx += 1;
            while idx < lines.len()
                && !lines[idx].trim().is_empty()
                && self.import_element(&lines[idx..]).is_none()
            {
                idx += 1;
            }
            blocks.push(self.import_paragraph(&lines[start..idx]));
        }
        debug!(blocks = blocks.len(), "imported markdown");
        blocks
    }

    fn import_element(&self, lines: &[&str]) -> Option<(SerializedNode, usize)> {
        self.elements().find_map(|rule| rule.import(lines, self))
    }

    fn import_paragraph(&self, lines: &[&str]) -> SerializedNode {
        let mut children = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            if idx > 0 {
                children.push(SerializedNode::new(NodeKind::LineBreak));
            }
            children.extend(self.import_inline(line));
        }
        SerializedNode::paragraph(children)
    }

    /// Render top-level blocks as a Markdown document
    pub fn export(&self, blocks: &[SerializedNode]) -> String {
        blocks
            .iter()
            .map(|block| self.export_block(block))
            .collect::<Vec<_>>()
            .join(self.block_separator)
    }

    /// Render one block. Nodes no element rule claims fall back to their
    /// inline content, or to their child blocks.
    pub fn export_block(&self, block: &SerializedNode) -> String {
        if let Some(out) = self.elements().find_map(|rule| rule.export(block, self)) {
            return out;
        }
        if block.children.iter().all(|child| child.kind.is_inline()) {
            self.export_inline(&block.children)
        } else {
            self.export(&block.children)
        }
    }
}

impl Editor {
    /// The standard rule set configured for this editor
    pub fn markdown_transformers(&self) -> Transformers {
        Transformers::with_config(&self.config().markdown)
    }

    /// Render the whole document as Markdown
    pub fn export_markdown(&self, transformers: &Transformers) -> String {
        transformers.export(&self.content_blocks())
    }

    /// Replace the whole document with parsed Markdown, in one transaction
    pub fn import_markdown(&mut self, markdown: &str, transformers: &Transformers) -> Result<()> {
        let blocks = transformers.import(markdown);
        self.update(|ed| ed.replace_content(&blocks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::TextFormat;

    fn round_trip(markdown: &str) -> String {
        let t = Transformers::default();
        t.export(&t.import(markdown))
    }

    #[test]
    fn imports_blocks_in_order() {
        let t = Transformers::default();
        let blocks = t.import("# Title\n\nsome *text*\nmore\n\n> quoted\n\n- a\n- b\n");
        let kinds: Vec<_> = blocks.iter().map(|b| b.node_type().as_str()).collect();
        assert_eq!(kinds, ["heading", "paragraph", "quote", "list"]);
        assert_eq!(blocks[1].children.len(), 4);
        assert_eq!(
            blocks[1].children[1].kind,
            NodeKind::formatted_text("text", TextFormat::ITALIC)
        );
        assert_eq!(blocks[1].children[2].kind, NodeKind::LineBreak);
    }

    #[test]
    fn paragraph_stops_at_block_syntax() {
        let t = Transformers::default();
        let blocks = t.import("intro\n```\ncode\n```");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].kind, NodeKind::code(None));
    }

    #[test]
    fn exports_document() {
        let markdown = round_trip(
            "# Title\n\nplain **bold** and `code`\n\n```python\nprint(1)\n```\n\n$$E=mc^2$$\n\n1. one\n2. two",
        );
        insta::assert_snapshot!(markdown, @r###"
        # Title

        plain **bold** and `code`

        ```python
        print(1)
        ```

        $$E=mc^2$$

        1. one
        2. two
        "###);
    }

    #[test]
    fn custom_fence_wins_for_empty_code() {
        let t = Transformers::default();
        let empty = SerializedNode::new(NodeKind::code(Some("js")));
        assert_eq!(t.export(&[empty]), "```js\n```");
    }

    #[test]
    fn single_newline_separator() {
        let config = MarkdownConfig {
            blank_line_between_blocks: false,
        };
        let t = Transformers::with_config(&config);
        let blocks = vec![
            SerializedNode::new(NodeKind::equation("a", false)),
            SerializedNode::new(NodeKind::equation("b", false)),
        ];
        assert_eq!(t.export(&blocks), "$$a$$\n$$b$$");
    }

    #[test]
    fn editor_import_and_export() {
        let mut ed = Editor::new();
        let t = ed.markdown_transformers();
        ed.import_markdown("## Notes\n\nsee $x$", &t).unwrap();
        assert_eq!(ed.export_markdown(&t), "## Notes\n\nsee $x$");
        assert_eq!(ed.seq(), 1);
    }

    #[test]
    fn rule_order_is_observable() {
        let t = Transformers::default();
        let names: Vec<_> = t.elements().map(|rule| rule.name()).collect();
        assert_eq!(names[..3], ["block-equation", "code", "generic-code"]);
        assert_eq!(t.formats().next().map(|rule| rule.name), Some("inline-code"));
    }
}

//! Markdown shortcuts applied while typing.

use super::inline::is_boundary;
use super::Transformers;
use crate::editor::Editor;
use crate::error::{EditorError, Result};
use crate::node::{NodeKey, NodeKind, NodeType, TextFormat};
use crate::selection::{byte_index, char_len, Caret};
use std::sync::Arc;
use tracing::debug;

/// Runs the shortcut rules of a [`Transformers`] set after each typed
/// character
#[derive(Debug, Clone, Default)]
pub struct MarkdownShortcuts {
    transformers: Arc<Transformers>,
}

/// The text node under the caret and what precedes the caret in it
struct Typed {
    key: NodeKey,
    parent: NodeKey,
    text: String,
    format: TextFormat,
    offset: usize,
}

impl Typed {
    fn before(&self) -> &str {
        &self.text[..byte_index(&self.text, self.offset)]
    }
}

impl MarkdownShortcuts {
    pub fn new(transformers: Arc<Transformers>) -> Self {
        Self { transformers }
    }

    pub fn transformers(&self) -> &Transformers {
        &self.transformers
    }

    /// Type `text` one character at a time, one transaction per character
    pub fn type_text(&self, editor: &mut Editor, text: &str) -> Result<()> {
        let mut buf = [0; 4];
        for ch in text.chars() {
            let typed: &str = ch.encode_utf8(&mut buf);
            editor.update(|ed| {
                ed.insert_text(typed)?;
                self.after_insert(ed, ch)
            })?;
        }
        Ok(())
    }

    /// Apply the first shortcut that matches the text before the caret.
    /// Must run inside the transaction that inserted `typed`. Returns
    /// whether the document changed.
    pub fn after_insert(&self, editor: &mut Editor, typed: char) -> Result<bool> {
        let Some(typed_at) = self.typed_text(editor)? else {
            return Ok(false);
        };
        if typed.is_whitespace() && self.element_shortcut(editor, &typed_at)? {
            return Ok(true);
        }
        if self.text_match_shortcut(editor, &typed_at, typed)? {
            return Ok(true);
        }
        self.format_shortcut(editor, &typed_at, typed)
    }

    fn typed_text(&self, editor: &Editor) -> Result<Option<Typed>> {
        let Some(caret) = editor.caret() else {
            return Ok(None);
        };
        let node = editor.node(caret.key)?;
        let NodeKind::Text { text, format, .. } = node.kind() else {
            return Ok(None);
        };
        let Some(parent) = node.parent() else {
            return Ok(None);
        };
        // Code is literal
        if format.contains(TextFormat::CODE) || editor.node(parent)?.node_type() == NodeType::Code {
            return Ok(None);
        }
        Ok(Some(Typed {
            key: caret.key,
            parent,
            text: text.clone(),
            format: *format,
            offset: caret.offset,
        }))
    }

    fn element_shortcut(&self, editor: &mut Editor, typed: &Typed) -> Result<bool> {
        let block = editor.node(typed.parent)?;
        if block.node_type() != NodeType::Paragraph
            || block.parent() != Some(editor.root())
            || block.children().first() != Some(&typed.key)
        {
            return Ok(false);
        }
        let Some((name, replacement)) = self
            .transformers
            .elements()
            .find_map(|rule| rule.shortcut(typed.before()).map(|node| (rule.name(), node)))
        else {
            return Ok(false);
        };

        let rest = typed.text[byte_index(&typed.text, typed.offset)..].to_string();
        editor.set_text(typed.key, rest)?;
        let siblings = editor.children(typed.parent)?.to_vec();

        let new_block = editor.create_tree(&replacement)?;
        let caret = match text_container(editor, new_block)? {
            Some(container) if editor.node(container)?.node_type() == NodeType::Code => {
                let code = take_text(editor, &siblings)?;
                if !code.is_empty() {
                    let text = editor.create(NodeKind::text(code))?;
                    editor.append(container, text)?;
                }
                Caret::new(container, 0)
            }
            Some(container) => {
                for sibling in siblings {
                    editor.remove(sibling)?;
                    let empty = editor.node(sibling)?.text() == Some("");
                    if !empty {
                        editor.append(container, sibling)?;
                    }
                }
                match editor.children(container)?.first() {
                    Some(first) if editor.node(*first)?.text().is_some() => Caret::new(*first, 0),
                    _ => Caret::new(container, 0),
                }
            }
            None => {
                let source = take_text(editor, &siblings)?;
                if editor.node(new_block)?.node_type() == NodeType::Equation {
                    editor.set_equation(new_block, source)?;
                }
                Caret::new(new_block, 0)
            }
        };
        editor.replace(typed.parent, new_block)?;
        editor.set_caret(Some(caret));
        debug!(rule = name, "applied block shortcut");
        Ok(true)
    }

    fn text_match_shortcut(&self, editor: &mut Editor, typed: &Typed, ch: char) -> Result<bool> {
        let before = typed.before();
        for rule in self.transformers.text_matches().filter(|rule| rule.trigger == ch) {
            let Some(found) = rule.shortcut_regex.find(before) else {
                continue;
            };
            // The shortcut pattern may include a guard character; the span
            // is what the import pattern covers
            let tail = &before[found.start()..];
            let Some(caps) = rule.import_regex.captures(tail) else {
                continue;
            };
            let Some(span) = caps.get(0) else { continue };
            if found.start() + span.end() != before.len() {
                continue;
            }
            let Some(node) = (rule.build)(&caps, &self.transformers) else {
                continue;
            };
            if !editor.node(typed.parent)?.kind().accepts(&node.kind) {
                continue;
            }

            let start = char_len(&before[..found.start() + span.start()]);
            let after = editor.split_text(typed.key, typed.offset)?;
            let matched = split_off(editor, typed.key, start)?;
            let index = editor.index_in_parent(matched).unwrap_or(0);
            editor.remove(matched)?;
            editor.insert_tree(typed.parent, index, &node)?;

            let caret = match after {
                Some(next) => Caret::new(next, 0),
                None => Caret::new(typed.parent, index + 1),
            };
            editor.set_caret(Some(caret));
            debug!(rule = rule.name, "applied text match shortcut");
            return Ok(true);
        }
        Ok(false)
    }

    fn format_shortcut(&self, editor: &mut Editor, typed: &Typed, ch: char) -> Result<bool> {
        let before = typed.before();
        for rule in self.transformers.formats().filter(|rule| rule.trigger() == ch) {
            let Some(caps) = rule.shortcut_regex.captures(before) else {
                continue;
            };
            let (Some(lead), Some(content)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            if rule.marker.starts_with('_') && !is_boundary(lead.as_str().chars().last()) {
                continue;
            }
            if typed.format.contains(rule.format) {
                continue;
            }

            let after = editor.split_text(typed.key, typed.offset)?;
            let prefix = &before[..lead.end()];
            let format = typed.format | rule.format;
            let index = editor.index_in_parent(typed.key).unwrap_or(0);
            let formatted = if prefix.is_empty() {
                editor.set_text(typed.key, content.as_str())?;
                editor.set_text_format(typed.key, format)?;
                index
            } else {
                editor.set_text(typed.key, prefix)?;
                let key = editor.create(NodeKind::formatted_text(content.as_str(), format))?;
                editor.insert(typed.parent, index + 1, key)?;
                index + 1
            };

            let caret = match after {
                Some(next) => Caret::new(next, 0),
                None => {
                    let plain = editor.create(NodeKind::formatted_text("", typed.format))?;
                    editor.insert(typed.parent, formatted + 1, plain)?;
                    Caret::new(plain, 0)
                }
            };
            editor.set_caret(Some(caret));
            debug!(rule = rule.name, "applied format shortcut");
            return Ok(true);
        }
        Ok(false)
    }
}

/// The node's first-descendant element that takes text, if any
fn text_container(editor: &Editor, key: NodeKey) -> Result<Option<NodeKey>> {
    let mut current = key;
    loop {
        let node = editor.node(current)?;
        if node.kind().accepts(&NodeKind::text("")) {
            return Ok(Some(current));
        }
        match node.children().first() {
            Some(child) if editor.node(*child)?.kind().is_element() => current = *child,
            _ => return Ok(None),
        }
    }
}

/// Detach `keys` and return their concatenated text
fn take_text(editor: &mut Editor, keys: &[NodeKey]) -> Result<String> {
    let mut out = String::new();
    for key in keys {
        out.push_str(&editor.text_content(*key));
        editor.remove(*key)?;
    }
    Ok(out)
}

/// Split so that the text from `offset` on is its own node
fn split_off(editor: &mut Editor, key: NodeKey, offset: usize) -> Result<NodeKey> {
    if offset == 0 {
        return Ok(key);
    }
    editor
        .split_text(key, offset)?
        .ok_or_else(|| EditorError::InvalidStructure(format!("nothing to split off {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialized::SerializedNode;

    fn typing(text: &str) -> Editor {
        let mut ed = Editor::new();
        let root = ed.root();
        ed.set_caret(Some(Caret::new(root, 0)));
        MarkdownShortcuts::default().type_text(&mut ed, text).unwrap();
        ed
    }

    fn blocks(ed: &Editor) -> Vec<SerializedNode> {
        ed.snapshot().blocks().to_vec()
    }

    #[test]
    fn heading_shortcut_replaces_paragraph() {
        let ed = typing("## Hello");
        let blocks = blocks(&ed);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, NodeKind::heading(2));
        assert_eq!(blocks[0].text_content(), "Hello");
    }

    #[test]
    fn block_shortcut_only_at_paragraph_start() {
        let ed = typing("a # b");
        assert_eq!(blocks(&ed)[0].kind, NodeKind::Paragraph);
        assert_eq!(ed.text_content(ed.root()), "a # b");
    }

    #[test]
    fn existing_text_moves_into_new_block() {
        let mut ed = Editor::new();
        let text = ed
            .update(|ed| {
                let p = ed.create(NodeKind::paragraph())?;
                let t = ed.create(NodeKind::text("world"))?;
                ed.append(p, t)?;
                let root = ed.root();
                ed.append(root, p)?;
                Ok(t)
            })
            .unwrap();
        ed.set_caret(Some(Caret::new(text, 0)));
        MarkdownShortcuts::default().type_text(&mut ed, "> ").unwrap();

        let blocks = blocks(&ed);
        assert_eq!(blocks[0].kind, NodeKind::Quote);
        assert_eq!(blocks[0].text_content(), "world");
        assert_eq!(ed.caret(), Some(Caret::new(text, 0)));
    }

    #[test]
    fn list_shortcut_builds_item() {
        let ed = typing("1. first");
        let blocks = blocks(&ed);
        assert_eq!(blocks[0].kind, NodeKind::List { ordered: true, start: 1 });
        assert_eq!(blocks[0].children[0].kind, NodeKind::list_item());
        assert_eq!(blocks[0].text_content(), "first");
    }

    #[test]
    fn inline_equation_shortcut() {
        let ed = typing("$x^2$");
        let blocks = blocks(&ed);
        assert_eq!(
            blocks[0].children,
            vec![SerializedNode::new(NodeKind::equation("x^2", true))]
        );
        assert_eq!(ed.caret().map(|c| c.offset), Some(1));
    }

    #[test]
    fn block_equation_shortcut() {
        let ed = typing("$$ ");
        let blocks = blocks(&ed);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, NodeKind::equation("", false));
        assert_eq!(blocks[1], SerializedNode::paragraph(Vec::new()));
    }

    #[test]
    fn check_list_shortcut_builds_checked_item() {
        let ed = typing("[x] milk");
        let blocks = blocks(&ed);
        assert_eq!(blocks[0].kind, NodeKind::list(false));
        assert_eq!(blocks[0].children[0].kind, NodeKind::check_item(true));
        assert_eq!(blocks[0].text_content(), "milk");
        let t = Transformers::default();
        assert_eq!(ed.export_markdown(&t), "- [x] milk");
    }

    #[test]
    fn code_fence_shortcut_then_typing_goes_into_code() {
        let ed = typing("```python x = 1");
        let blocks = blocks(&ed);
        assert_eq!(blocks[0].kind, NodeKind::code(Some("python")));
        assert_eq!(blocks[0].text_content(), "x = 1");
    }

    #[test]
    fn bold_shortcut_then_plain_text() {
        let ed = typing("say **hi** there");
        let t = Transformers::default();
        assert_eq!(ed.export_markdown(&t), "say **hi** there");
        assert_eq!(
            blocks(&ed)[0].children[1].kind,
            NodeKind::formatted_text("hi", TextFormat::BOLD)
        );
    }

    #[test]
    fn link_shortcut_keeps_leading_text() {
        let ed = typing("see [docs](https://x.org)");
        let blocks = blocks(&ed);
        assert_eq!(blocks[0].children[0].kind, NodeKind::text("see "));
        assert_eq!(blocks[0].children[1].kind, NodeKind::link("https://x.org"));
        assert_eq!(blocks[0].children[1].text_content(), "docs");
    }

    #[test]
    fn snake_case_stays_plain() {
        let ed = typing("snake_case_");
        assert_eq!(blocks(&ed)[0].children, vec![SerializedNode::text("snake_case_")]);
    }

    #[test]
    fn inline_code_shortcut() {
        let ed = typing("`x`");
        assert_eq!(
            blocks(&ed)[0].children,
            vec![
                SerializedNode::new(NodeKind::formatted_text("x", TextFormat::CODE)),
                SerializedNode::text(""),
            ]
        );
    }
}

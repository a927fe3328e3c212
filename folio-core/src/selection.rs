//! Collapsed caret and text insertion at the caret.

use crate::editor::Editor;
use crate::error::{EditorError, Result};
use crate::node::{NodeKey, NodeKind};

/// A collapsed selection.
///
/// On a text node `offset` counts characters; on an element it is a child
/// index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Caret {
    pub key: NodeKey,
    pub offset: usize,
}

impl Caret {
    pub fn new(key: NodeKey, offset: usize) -> Self {
        Self { key, offset }
    }
}

/// Byte index of the `offset`-th character, clamped to the string end
pub(crate) fn byte_index(text: &str, offset: usize) -> usize {
    text.char_indices()
        .nth(offset)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

impl Editor {
    pub fn caret(&self) -> Option<Caret> {
        self.caret
    }

    /// Move the caret. Selection is not document content and may change
    /// outside a transaction.
    pub fn set_caret(&mut self, caret: Option<Caret>) {
        self.caret = caret;
    }

    /// Place the caret after the last character (or child) of `key`
    pub fn select_end(&mut self, key: NodeKey) -> Result<()> {
        let node = self.node(key)?;
        let offset = match node.text() {
            Some(text) => char_len(text),
            None => node.children().len(),
        };
        self.caret = Some(Caret::new(key, offset));
        Ok(())
    }

    /// Insert `text` at the caret and advance the caret past it. Returns the
    /// text node that received the characters.
    pub fn insert_text(&mut self, text: &str) -> Result<NodeKey> {
        let caret = self
            .caret
            .ok_or_else(|| EditorError::InvalidStructure("no caret to insert at".into()))?;
        let node = self.node(caret.key)?;

        if let Some(current) = node.text() {
            let mut updated = current.to_string();
            updated.insert_str(byte_index(current, caret.offset), text);
            self.set_text(caret.key, updated)?;
            self.caret = Some(Caret::new(caret.key, caret.offset + char_len(text)));
            return Ok(caret.key);
        }

        if !node.kind().is_element() {
            return Err(EditorError::InvalidStructure(format!(
                "cannot type into a {} node",
                node.node_type()
            )));
        }

        let index = caret.offset.min(node.children().len());
        if node.kind().accepts(&NodeKind::text("")) {
            if index > 0 {
                let previous = node.children()[index - 1];
                if let Some(prev_text) = self.node(previous)?.text() {
                    self.caret = Some(Caret::new(previous, char_len(prev_text)));
                    return self.insert_text(text);
                }
            }
            let key = self.create(NodeKind::text(text))?;
            self.insert(caret.key, index, key)?;
            self.caret = Some(Caret::new(key, char_len(text)));
            Ok(key)
        } else if node.kind().accepts(&NodeKind::paragraph()) {
            let paragraph = self.create(NodeKind::paragraph())?;
            let key = self.create(NodeKind::text(text))?;
            self.append(paragraph, key)?;
            self.insert(caret.key, index, paragraph)?;
            self.caret = Some(Caret::new(key, char_len(text)));
            Ok(key)
        } else {
            Err(EditorError::InvalidStructure(format!(
                "cannot type into a {} node",
                node.node_type()
            )))
        }
    }

    /// Split a text node at a character offset. The original node keeps the
    /// left part; the right part becomes a new sibling with the same format,
    /// returned unless the split point is the end of the text.
    pub fn split_text(&mut self, key: NodeKey, offset: usize) -> Result<Option<NodeKey>> {
        let node = self.node(key)?;
        let NodeKind::Text {
            text,
            format,
            highlight,
        } = node.kind().clone()
        else {
            return Err(EditorError::InvalidStructure(format!(
                "{key} is not a text node"
            )));
        };
        let parent = node
            .parent()
            .ok_or_else(|| EditorError::InvalidStructure(format!("{key} is not attached")))?;
        let split = byte_index(&text, offset);
        if split >= text.len() {
            return Ok(None);
        }

        let right = self.create(NodeKind::Text {
            text: text[split..].to_string(),
            format,
            highlight,
        })?;
        self.set_text(key, &text[..split])?;
        let index = self.index_in_parent(key).map_or(0, |idx| idx + 1);
        self.insert(parent, index, right)?;
        Ok(Some(right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_into_empty_root_creates_paragraph() {
        let mut ed = Editor::new();
        let root = ed.root();
        ed.set_caret(Some(Caret::new(root, 0)));
        let text = ed.update(|ed| ed.insert_text("hé")).unwrap();
        ed.update(|ed| ed.insert_text("llo")).unwrap();

        assert_eq!(ed.text_content(root), "héllo");
        assert_eq!(ed.caret(), Some(Caret::new(text, 5)));
        assert_eq!(ed.node(ed.parent(text).unwrap()).unwrap().kind(), &NodeKind::Paragraph);
    }

    #[test]
    fn insert_in_the_middle_of_text() {
        let mut ed = Editor::new();
        let root = ed.root();
        ed.set_caret(Some(Caret::new(root, 0)));
        let text = ed.update(|ed| ed.insert_text("ac")).unwrap();
        ed.set_caret(Some(Caret::new(text, 1)));
        ed.update(|ed| ed.insert_text("b")).unwrap();
        assert_eq!(ed.node(text).unwrap().text(), Some("abc"));
        assert_eq!(ed.caret(), Some(Caret::new(text, 2)));
    }

    #[test]
    fn split_keeps_format_on_both_sides() {
        use crate::node::TextFormat;

        let mut ed = Editor::new();
        let (text, right) = ed
            .update(|ed| {
                let p = ed.create(NodeKind::paragraph())?;
                let t = ed.create(NodeKind::formatted_text("hello", TextFormat::BOLD))?;
                ed.append(p, t)?;
                let root = ed.root();
                ed.append(root, p)?;
                let right = ed.split_text(t, 2)?;
                Ok((t, right))
            })
            .unwrap();
        let right = right.unwrap();
        assert_eq!(ed.node(text).unwrap().text(), Some("he"));
        assert_eq!(
            ed.node(right).unwrap().kind(),
            &NodeKind::formatted_text("llo", TextFormat::BOLD)
        );
        assert_eq!(ed.index_in_parent(right), Some(1));
    }

    #[test]
    fn split_at_end_is_a_no_op() {
        let mut ed = Editor::new();
        let result = ed
            .update(|ed| {
                let p = ed.create(NodeKind::paragraph())?;
                let t = ed.create(NodeKind::text("abc"))?;
                ed.append(p, t)?;
                let root = ed.root();
                ed.append(root, p)?;
                ed.split_text(t, 3)
            })
            .unwrap();
        assert!(result.is_none());
    }
}

//! Automatic links for web addresses and email addresses in plain text.
//!
//! [`AutoLinker`] is a text node transform. A match only becomes a link when
//! it is set off by whitespace or `.,;` on both sides (the edge of a text
//! node counts when the neighbouring node allows it), and not while the
//! caret still sits at its end, so a half-typed address is left alone.

use crate::editor::Editor;
use crate::error::{EditorError, Result};
use crate::mutation::NodeTransform;
use crate::node::{NodeKey, NodeKind, NodeType, TextFormat};
use crate::selection::{char_len, Caret};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"((https?://(www\.)?)|(www\.))[-a-zA-Z0-9@:%._+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b([-a-zA-Z0-9()@:%_+.~#?&/=]*)",
    )
    .expect("valid url regex")
});
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(([^<>()\[\]\\.,;:\s@"]+(\.[^<>()\[\]\\.,;:\s@"]+)*)|(".+"))@((\[[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\])|(([a-zA-Z\-0-9]+\.)+[a-zA-Z]{2,}))"#,
    )
    .expect("valid email regex")
});

fn is_separator(ch: char) -> bool {
    matches!(ch, '.' | ',' | ';') || ch.is_whitespace()
}

/// A linkable span of a text run, in byte offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMatch {
    pub start: usize,
    pub end: usize,
    pub url: String,
}

/// Every address in `text`, leftmost first. `open_start`/`open_end` say
/// whether the edges of `text` count as separators.
pub fn find_links(text: &str, open_start: bool, open_end: bool) -> Vec<LinkMatch> {
    let urls = URL_RE.find_iter(text).map(|m| LinkMatch {
        start: m.start(),
        end: m.end(),
        url: m.as_str().to_string(),
    });
    let emails = EMAIL_RE.find_iter(text).map(|m| LinkMatch {
        start: m.start(),
        end: m.end(),
        url: format!("mailto:{}", m.as_str()),
    });
    let mut found: Vec<LinkMatch> = urls
        .chain(emails)
        .filter(|m| {
            let before = match text[..m.start].chars().next_back() {
                Some(ch) => is_separator(ch),
                None => open_start,
            };
            let after = match text[m.end..].chars().next() {
                Some(ch) => is_separator(ch),
                None => open_end,
            };
            before && after
        })
        .collect();
    found.sort_by_key(|m| m.start);

    // Drop matches overlapping an earlier one
    let mut out: Vec<LinkMatch> = Vec::with_capacity(found.len());
    for m in found {
        if out.last().map_or(true, |prev| m.start >= prev.end) {
            out.push(m);
        }
    }
    out
}

/// Turns addresses in plain text into link nodes
#[derive(Debug, Clone, Default)]
pub struct AutoLinker;

/// How the neighbour on one side of a text node bounds a match
enum Edge {
    Start,
    End,
}

fn edge_is_open(editor: &Editor, neighbour: Option<NodeKey>, edge: Edge) -> bool {
    let Some(node) = neighbour.and_then(|key| editor.get(key)) else {
        return true;
    };
    match node.kind() {
        NodeKind::LineBreak => true,
        NodeKind::Text { text, .. } => {
            let ch = match edge {
                Edge::Start => text.chars().next_back(),
                Edge::End => text.chars().next(),
            };
            ch.map_or(true, is_separator)
        }
        kind if kind.is_element() => {
            let text = editor.text_content(node.key());
            let ch = match edge {
                Edge::Start => text.chars().next_back(),
                Edge::End => text.chars().next(),
            };
            ch.map_or(true, is_separator)
        }
        _ => false,
    }
}

impl AutoLinker {
    /// The first address in a linkable text node
    fn next_link(&self, editor: &Editor, key: NodeKey) -> Result<Option<LinkMatch>> {
        let node = editor.node(key)?;
        let NodeKind::Text { text, format, .. } = node.kind() else {
            return Ok(None);
        };
        if format.contains(TextFormat::CODE) || text.is_empty() {
            return Ok(None);
        }
        let Some(parent) = node.parent() else {
            return Ok(None);
        };
        let parent_kind = editor.node(parent)?.kind();
        if matches!(parent_kind, NodeKind::Link { .. } | NodeKind::Code { .. })
            || !parent_kind.accepts(&NodeKind::link(""))
        {
            return Ok(None);
        }

        let siblings = editor.children(parent)?;
        let index = editor.index_in_parent(key).unwrap_or(0);
        let previous = index.checked_sub(1).and_then(|idx| siblings.get(idx)).copied();
        let next = siblings.get(index + 1).copied();
        let open_start = edge_is_open(editor, previous, Edge::Start);
        let open_end = edge_is_open(editor, next, Edge::End);

        let typing_at = editor
            .caret()
            .filter(|caret| caret.key == key)
            .map(|caret| caret.offset);
        Ok(find_links(text, open_start, open_end)
            .into_iter()
            .find(|m| typing_at != Some(char_len(&text[..m.end]))))
    }

    /// Wrap `found` in a link. Returns the text node holding what followed
    /// the address, if anything did.
    fn wrap(&self, editor: &mut Editor, key: NodeKey, found: LinkMatch) -> Result<Option<NodeKey>> {
        let (start, end) = {
            let text = editor.node(key)?.text().unwrap_or_default();
            (char_len(&text[..found.start]), char_len(&text[..found.end]))
        };
        let parent = editor
            .parent(key)
            .ok_or_else(|| EditorError::InvalidStructure(format!("{key} is not attached")))?;
        let caret = editor.caret().filter(|caret| caret.key == key);

        let rest = editor.split_text(key, end)?;
        let matched = if start == 0 {
            key
        } else {
            editor.split_text(key, start)?.ok_or_else(|| {
                EditorError::InvalidStructure(format!("nothing to split off {key}"))
            })?
        };
        let index = editor.index_in_parent(matched).unwrap_or(0);
        editor.remove(matched)?;
        let link = editor.create(NodeKind::link(found.url.as_str()))?;
        editor.insert(parent, index, link)?;
        editor.append(link, matched)?;

        if let Some(caret) = caret {
            let moved = if caret.offset > end {
                rest.map(|rest| Caret::new(rest, caret.offset - end))
            } else if caret.offset > start {
                Some(Caret::new(matched, caret.offset - start))
            } else {
                None
            };
            if moved.is_some() {
                editor.set_caret(moved);
            }
        }
        debug!(url = %found.url, "linked address");
        Ok(rest)
    }
}

impl NodeTransform for AutoLinker {
    fn node_type(&self) -> NodeType {
        NodeType::Text
    }

    fn transform(&mut self, editor: &mut Editor, key: NodeKey) -> Result<()> {
        let mut current = key;
        while let Some(found) = self.next_link(editor, current)? {
            match self.wrap(editor, current, found)? {
                Some(rest) => current = rest,
                None => break,
            }
        }
        Ok(())
    }
}

//! Key-free, owned form of the node tree.
//!
//! [`SerializedNode`] is both the persisted document format (stored verbatim
//! by the document service) and the currency of the conversion layer:
//! transformers and DOM rules build `SerializedNode`s which the editor then
//! materializes into its arena.

use crate::error::{EditorError, Result};
use crate::node::{NodeKind, NodeType};
use serde::{Deserialize, Serialize};

/// A node and its descendants, without keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNode {
    #[serde(flatten)]
    pub kind: NodeKind,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SerializedNode>,
}

impl SerializedNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_children(kind: NodeKind, children: Vec<SerializedNode>) -> Self {
        Self { kind, children }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(NodeKind::text(text))
    }

    pub fn paragraph(children: Vec<SerializedNode>) -> Self {
        Self::with_children(NodeKind::Paragraph, children)
    }

    /// Code block holding `text`, one text run per line
    pub fn code(language: Option<&str>, text: &str) -> Self {
        let mut children = Vec::new();
        for (idx, line) in text.split('\n').enumerate() {
            if idx > 0 {
                children.push(Self::new(NodeKind::LineBreak));
            }
            if !line.is_empty() {
                children.push(Self::text(line));
            }
        }
        Self::with_children(NodeKind::code(language), children)
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// Concatenated text of this subtree; line breaks contribute `\n`
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.push_text(&mut out);
        out
    }

    fn push_text(&self, out: &mut String) {
        out.push_str(self.kind.own_text());
        for child in &self.children {
            child.push_text(out);
        }
    }

    /// Check the shape of this subtree: leaves carry no children, every
    /// child is accepted by its parent, payload fields are in range.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.kind.is_element() && !self.children.is_empty() {
            return Err(format!("{} node cannot have children", self.node_type()));
        }
        if let NodeKind::Heading { level } = self.kind {
            if !(1..=6).contains(&level) {
                return Err(format!("heading level {level} out of range"));
            }
        }
        for child in &self.children {
            if !self.kind.accepts(&child.kind) {
                return Err(format!(
                    "{} node cannot contain a {} node",
                    self.node_type(),
                    child.node_type()
                ));
            }
            child.validate()?;
        }
        Ok(())
    }
}

/// The persisted editor state: a single root node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedEditorState {
    pub root: SerializedNode,
}

impl SerializedEditorState {
    pub fn new(blocks: Vec<SerializedNode>) -> Self {
        Self {
            root: SerializedNode::with_children(NodeKind::Root, blocks),
        }
    }

    /// Parse and validate a persisted state. Any error rejects the whole
    /// input with [`EditorError::MalformedNode`].
    pub fn from_json(json: &str) -> Result<Self> {
        let state: SerializedEditorState =
            serde_json::from_str(json).map_err(|e| EditorError::MalformedNode(e.to_string()))?;
        state.validate()?;
        Ok(state)
    }

    pub fn validate(&self) -> Result<()> {
        if self.root.kind != NodeKind::Root {
            return Err(EditorError::MalformedNode(format!(
                "expected root node, found {}",
                self.root.node_type()
            )));
        }
        self.root.validate().map_err(EditorError::MalformedNode)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn blocks(&self) -> &[SerializedNode] {
        &self.root.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::TextFormat;

    #[test]
    fn parses_lexical_like_json() {
        let json = r#"{
            "root": {
                "type": "root",
                "children": [
                    {"type": "heading", "level": 2, "children": [{"type": "text", "text": "Title"}]},
                    {"type": "code", "language": "python", "children": [
                        {"type": "text", "text": "print(1)", "highlight": "support"}
                    ]},
                    {"type": "paragraph", "children": [
                        {"type": "text", "text": "bold", "format": 1},
                        {"type": "equation", "equation": "x^2", "inline": true}
                    ]}
                ]
            }
        }"#;
        let state = SerializedEditorState::from_json(json).unwrap();
        assert_eq!(state.blocks().len(), 3);
        assert_eq!(state.blocks()[0].kind, NodeKind::Heading { level: 2 });
        assert_eq!(
            state.blocks()[2].children[0].kind,
            NodeKind::formatted_text("bold", TextFormat::BOLD)
        );
    }

    #[test]
    fn code_language_is_normalized_on_load() {
        let json = r#"{"root": {"type": "root", "children": [
            {"type": "code", "language": "  python ", "children": []},
            {"type": "code", "language": "   ", "children": []},
            {"type": "code", "language": null, "children": []}
        ]}}"#;
        let state = SerializedEditorState::from_json(json).unwrap();
        assert_eq!(state.blocks()[0].kind, NodeKind::code(Some("python")));
        assert_eq!(state.blocks()[1].kind, NodeKind::Code { language: None });
        assert_eq!(state.blocks()[2].kind, NodeKind::Code { language: None });

        let mut ed = crate::editor::Editor::new();
        ed.load_json(json).unwrap();
        let code = ed.nodes_of_type(crate::node::NodeType::Code)[0];
        assert_eq!(ed.node(code).unwrap().kind(), &NodeKind::code(Some("python")));
    }

    #[test]
    fn list_items_keep_their_checked_state() {
        let json = r#"{"root": {"type": "root", "children": [
            {"type": "list", "children": [
                {"type": "list-item", "checked": true, "children": []},
                {"type": "list-item", "children": []}
            ]}
        ]}}"#;
        let state = SerializedEditorState::from_json(json).unwrap();
        let items = &state.blocks()[0].children;
        assert_eq!(items[0].kind, NodeKind::check_item(true));
        assert_eq!(items[1].kind, NodeKind::list_item());
        let json = state.to_json().unwrap();
        assert!(json.contains(r#""checked":true"#));
        assert_eq!(json.matches("checked").count(), 1);
    }

    #[test]
    fn equation_without_source_is_malformed() {
        let json = r#"{"root": {"type": "root", "children": [
            {"type": "equation", "inline": false}
        ]}}"#;
        let err = SerializedEditorState::from_json(json).unwrap_err();
        assert!(matches!(err, EditorError::MalformedNode(_)));
    }

    #[test]
    fn misplaced_children_are_malformed() {
        let json = r#"{"root": {"type": "root", "children": [
            {"type": "text", "text": "loose text at the root"}
        ]}}"#;
        assert!(matches!(
            SerializedEditorState::from_json(json),
            Err(EditorError::MalformedNode(_))
        ));

        let json = r#"{"root": {"type": "paragraph"}}"#;
        assert!(matches!(
            SerializedEditorState::from_json(json),
            Err(EditorError::MalformedNode(_))
        ));
    }

    #[test]
    fn text_content_counts_line_breaks() {
        let code = SerializedNode::with_children(
            NodeKind::code(None),
            vec![
                SerializedNode::text("a"),
                SerializedNode::new(NodeKind::line_break()),
                SerializedNode::text("b"),
            ],
        );
        assert_eq!(code.text_content(), "a\nb");
    }

    #[test]
    fn serialization_round_trips() {
        let state = SerializedEditorState::new(vec![SerializedNode::paragraph(vec![
            SerializedNode::text("hello"),
        ])]);
        let json = state.to_json().unwrap();
        assert_eq!(SerializedEditorState::from_json(&json).unwrap(), state);
    }
}

//! Document node model.
//!
//! Every element of a document is a [`Node`] living in the arena of one
//! [`Editor`](crate::Editor). Nodes are addressed by [`NodeKey`] handles;
//! parents and children refer to each other by key only.

use bitflags::bitflags;
use folio_types::ReferenceId;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Process-unique node identifier. Keys are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey(u64);

impl NodeKey {
    pub(crate) fn next() -> Self {
        NodeKey(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tag identifying the concrete variant of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Root,
    Paragraph,
    Heading,
    Quote,
    List,
    ListItem,
    Code,
    Equation,
    Image,
    Table,
    TableRow,
    TableCell,
    Text,
    LineBreak,
    Link,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Root => "root",
            NodeType::Paragraph => "paragraph",
            NodeType::Heading => "heading",
            NodeType::Quote => "quote",
            NodeType::List => "list",
            NodeType::ListItem => "list-item",
            NodeType::Code => "code",
            NodeType::Equation => "equation",
            NodeType::Image => "image",
            NodeType::Table => "table",
            NodeType::TableRow => "table-row",
            NodeType::TableCell => "table-cell",
            NodeType::Text => "text",
            NodeType::LineBreak => "line-break",
            NodeType::Link => "link",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Inline formatting applied to a text run
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextFormat: u8 {
        const BOLD = 1;
        const ITALIC = 1 << 1;
        const STRIKETHROUGH = 1 << 2;
        const CODE = 1 << 4;
    }
}

mod format_bits {
    use super::TextFormat;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(format: &TextFormat, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(format.bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<TextFormat, D::Error> {
        let bits = u8::deserialize(d)?;
        TextFormat::from_bits(bits)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown text format bits {bits}")))
    }

    pub fn is_plain(format: &TextFormat) -> bool {
        format.is_empty()
    }
}

/// Where an image's pixels come from
///
/// Serialized as the plain `src` string: `data:`/`blob:` URIs are local
/// previews, `http(s)://` URIs are displayed as they are, an empty string is
/// no image. Anything else is a reference to a stored resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ImageSource {
    Empty,
    Local(String),
    /// Absolute web address, needs no resolution
    Url(String),
    Remote(ReferenceId),
}

fn has_prefix_ignore_case(src: &str, prefix: &str) -> bool {
    src.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

impl ImageSource {
    pub fn parse(src: &str) -> Self {
        let src = src.trim();
        if src.is_empty() {
            ImageSource::Empty
        } else if src.starts_with("data:") || src.starts_with("blob:") {
            ImageSource::Local(src.to_string())
        } else if has_prefix_ignore_case(src, "http://") || has_prefix_ignore_case(src, "https://")
        {
            ImageSource::Url(src.to_string())
        } else {
            ImageSource::Remote(ReferenceId::new(src))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ImageSource::Empty => "",
            ImageSource::Local(uri) | ImageSource::Url(uri) => uri,
            ImageSource::Remote(reference) => reference.as_str(),
        }
    }
}

impl From<String> for ImageSource {
    fn from(src: String) -> Self {
        ImageSource::parse(&src)
    }
}

impl From<ImageSource> for String {
    fn from(src: ImageSource) -> Self {
        src.as_str().to_string()
    }
}

/// Variant-specific payload of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NodeKind {
    Root,
    Paragraph,
    Heading {
        level: u8,
    },
    Quote,
    List {
        #[serde(default)]
        ordered: bool,
        #[serde(default = "default_list_start")]
        start: u32,
    },
    ListItem {
        /// `Some` for checklist items
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checked: Option<bool>,
    },
    Code {
        #[serde(
            default,
            deserialize_with = "deserialize_language",
            skip_serializing_if = "Option::is_none"
        )]
        language: Option<String>,
    },
    Equation {
        equation: String,
        #[serde(default)]
        inline: bool,
    },
    Image {
        src: ImageSource,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        alt: String,
    },
    Table,
    TableRow,
    TableCell {
        #[serde(default)]
        header: bool,
    },
    Text {
        text: String,
        #[serde(
            default,
            with = "format_bits",
            skip_serializing_if = "format_bits::is_plain"
        )]
        format: TextFormat,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        highlight: Option<String>,
    },
    LineBreak,
    Link {
        url: String,
    },
}

fn default_list_start() -> u32 {
    1
}

/// Trim a code language tag; empty tags become `None`.
pub fn normalize_language(language: Option<&str>) -> Option<String> {
    language
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .map(str::to_string)
}

fn deserialize_language<'de, D: serde::Deserializer<'de>>(
    d: D,
) -> Result<Option<String>, D::Error> {
    let language = Option::<String>::deserialize(d)?;
    Ok(normalize_language(language.as_deref()))
}

impl NodeKind {
    pub fn paragraph() -> Self {
        NodeKind::Paragraph
    }

    /// Heading with `level` clamped to 1..=6
    pub fn heading(level: u8) -> Self {
        NodeKind::Heading {
            level: level.clamp(1, 6),
        }
    }

    pub fn quote() -> Self {
        NodeKind::Quote
    }

    pub fn list(ordered: bool) -> Self {
        NodeKind::List { ordered, start: 1 }
    }

    pub fn list_item() -> Self {
        NodeKind::ListItem { checked: None }
    }

    pub fn check_item(checked: bool) -> Self {
        NodeKind::ListItem {
            checked: Some(checked),
        }
    }

    pub fn code(language: Option<&str>) -> Self {
        NodeKind::Code {
            language: normalize_language(language),
        }
    }

    pub fn equation(equation: impl Into<String>, inline: bool) -> Self {
        NodeKind::Equation {
            equation: equation.into(),
            inline,
        }
    }

    pub fn image(src: ImageSource, alt: impl Into<String>) -> Self {
        NodeKind::Image {
            src,
            alt: alt.into(),
        }
    }

    pub fn table() -> Self {
        NodeKind::Table
    }

    pub fn table_row() -> Self {
        NodeKind::TableRow
    }

    pub fn table_cell(header: bool) -> Self {
        NodeKind::TableCell { header }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::formatted_text(text, TextFormat::empty())
    }

    pub fn formatted_text(text: impl Into<String>, format: TextFormat) -> Self {
        NodeKind::Text {
            text: text.into(),
            format,
            highlight: None,
        }
    }

    pub fn line_break() -> Self {
        NodeKind::LineBreak
    }

    pub fn link(url: impl Into<String>) -> Self {
        NodeKind::Link { url: url.into() }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Root => NodeType::Root,
            NodeKind::Paragraph => NodeType::Paragraph,
            NodeKind::Heading { .. } => NodeType::Heading,
            NodeKind::Quote => NodeType::Quote,
            NodeKind::List { .. } => NodeType::List,
            NodeKind::ListItem { .. } => NodeType::ListItem,
            NodeKind::Code { .. } => NodeType::Code,
            NodeKind::Equation { .. } => NodeType::Equation,
            NodeKind::Image { .. } => NodeType::Image,
            NodeKind::Table => NodeType::Table,
            NodeKind::TableRow => NodeType::TableRow,
            NodeKind::TableCell { .. } => NodeType::TableCell,
            NodeKind::Text { .. } => NodeType::Text,
            NodeKind::LineBreak => NodeType::LineBreak,
            NodeKind::Link { .. } => NodeType::Link,
        }
    }

    /// Whether this variant holds an ordered child list
    pub fn is_element(&self) -> bool {
        !matches!(
            self,
            NodeKind::Text { .. }
                | NodeKind::LineBreak
                | NodeKind::Equation { .. }
                | NodeKind::Image { .. }
        )
    }

    /// Whether this variant lives inside a line of text
    pub fn is_inline(&self) -> bool {
        match self {
            NodeKind::Text { .. } | NodeKind::LineBreak | NodeKind::Link { .. } => true,
            NodeKind::Image { .. } => true,
            NodeKind::Equation { inline, .. } => *inline,
            _ => false,
        }
    }

    /// Whether `child` may be placed directly inside a node of this kind
    pub fn accepts(&self, child: &NodeKind) -> bool {
        match self {
            NodeKind::Root | NodeKind::TableCell { .. } => {
                !child.is_inline()
                    && !matches!(
                        child,
                        NodeKind::Root
                            | NodeKind::ListItem { .. }
                            | NodeKind::TableRow
                            | NodeKind::TableCell { .. }
                    )
            }
            NodeKind::Paragraph
            | NodeKind::Heading { .. }
            | NodeKind::Quote
            | NodeKind::ListItem { .. } => child.is_inline(),
            NodeKind::Link { .. } => child.is_inline() && !matches!(child, NodeKind::Link { .. }),
            NodeKind::List { .. } => matches!(child, NodeKind::ListItem { .. }),
            NodeKind::Code { .. } => matches!(child, NodeKind::Text { .. } | NodeKind::LineBreak),
            NodeKind::Table => matches!(child, NodeKind::TableRow),
            NodeKind::TableRow => matches!(child, NodeKind::TableCell { .. }),
            NodeKind::Text { .. }
            | NodeKind::LineBreak
            | NodeKind::Equation { .. }
            | NodeKind::Image { .. } => false,
        }
    }

    /// Text contributed by this node alone (children excluded)
    pub fn own_text(&self) -> &str {
        match self {
            NodeKind::Text { text, .. } => text,
            NodeKind::LineBreak => "\n",
            _ => "",
        }
    }
}

/// A node stored in an editor's arena
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) key: NodeKey,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: Vec<NodeKey>,
    pub(crate) kind: NodeKind,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            key: NodeKey::next(),
            parent: None,
            children: Vec::new(),
            kind,
        }
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// Text payload of a text node
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}

//! Inline rules: text formats and text-match transformers.

use super::Transformers;
use crate::node::{ImageSource, NodeKind, TextFormat};
use crate::serialized::SerializedNode;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

/// Characters a backslash escapes in plain text
const ESCAPABLE: [char; 5] = ['\\', '*', '_', '`', '~'];

/// Stand-ins for escaped characters while inline rules run, so that an
/// escaped marker never opens or closes a format
const HIDDEN_BASE: u32 = 0xE000;

fn hidden(ch: char) -> Option<char> {
    let idx = ESCAPABLE.iter().position(|c| *c == ch)?;
    char::from_u32(HIDDEN_BASE + idx as u32)
}

fn unhidden(ch: char) -> Option<char> {
    let idx = (ch as u32).checked_sub(HIDDEN_BASE)? as usize;
    ESCAPABLE.get(idx).copied()
}

fn hide_escapes(text: &str) -> Cow<'_, str> {
    if !text.contains('\\') || text.chars().any(|ch| unhidden(ch).is_some()) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match (ch, chars.peek().copied().and_then(hidden)) {
            ('\\', Some(stand_in)) => {
                out.push(stand_in);
                chars.next();
            }
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

/// Put escaped characters back: as plain characters, or with their
/// backslash where the text is literal (code, equations, URLs)
fn reveal(text: &str, literal: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match unhidden(ch) {
            Some(original) => {
                if literal {
                    out.push('\\');
                }
                out.push(original);
            }
            None => out.push(ch),
        }
    }
    out
}

fn reveal_node(node: &mut SerializedNode) {
    match &mut node.kind {
        NodeKind::Equation { equation, .. } => *equation = reveal(equation, true),
        NodeKind::Link { url } => *url = reveal(url, true),
        NodeKind::Image { src, alt } => {
            *src = ImageSource::parse(&reveal(src.as_str(), true));
            *alt = reveal(alt, false);
        }
        NodeKind::Text { text, format, .. } => {
            *text = reveal(text, format.contains(TextFormat::CODE))
        }
        _ => {}
    }
    node.children.iter_mut().for_each(reveal_node);
}

/// Backslash-escape marker characters of plain text
fn escape_text(text: &str) -> Cow<'_, str> {
    if !text.contains(ESCAPABLE) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 4);
    for ch in text.chars() {
        if ESCAPABLE.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    Cow::Owned(out)
}

/// A format toggled by a symmetric marker (`**bold**`, `` `code` ``)
#[derive(Debug, Clone)]
pub struct TextFormatTransformer {
    pub name: &'static str,
    pub marker: &'static str,
    pub format: TextFormat,
    /// Content in capture group 1
    pub import_regex: Regex,
    /// End-anchored; group 1 is the character before the opening marker,
    /// group 2 the content
    pub shortcut_regex: Regex,
}

impl TextFormatTransformer {
    fn new(name: &'static str, marker: &'static str, format: TextFormat, import: &str) -> Self {
        let escaped = regex::escape(marker);
        let first = regex::escape(&marker[..1]);
        let shortcut = format!(r"(^|[^{first}]){escaped}([^{first}\s](?:[^{first}]*[^{first}\s])?){escaped}$");
        Self {
            name,
            marker,
            format,
            import_regex: Regex::new(import).expect("valid format regex"),
            shortcut_regex: Regex::new(&shortcut).expect("valid format shortcut regex"),
        }
    }

    /// The typed character that can close this format
    pub fn trigger(&self) -> char {
        self.marker.chars().last().unwrap_or_default()
    }

    /// Whether this rule exports a single format
    fn exports(&self) -> bool {
        self.format.bits().count_ones() == 1
    }

    pub fn inline_code() -> Self {
        Self::new("inline-code", "`", TextFormat::CODE, r"`([^`]+)`")
    }

    pub fn bold_italic_star() -> Self {
        Self::new(
            "bold-italic-star",
            "***",
            TextFormat::BOLD | TextFormat::ITALIC,
            r"\*\*\*([^*]+?)\*\*\*",
        )
    }

    pub fn bold_star() -> Self {
        Self::new("bold-star", "**", TextFormat::BOLD, r"\*\*(.+?)\*\*")
    }

    pub fn bold_underscore() -> Self {
        Self::new("bold-underscore", "__", TextFormat::BOLD, r"\b__(.+?)__\b")
    }

    pub fn italic_star() -> Self {
        Self::new("italic-star", "*", TextFormat::ITALIC, r"\*([^*]+?)\*")
    }

    pub fn italic_underscore() -> Self {
        Self::new("italic-underscore", "_", TextFormat::ITALIC, r"\b_(.+?)_\b")
    }

    pub fn strikethrough() -> Self {
        Self::new(
            "strikethrough",
            "~~",
            TextFormat::STRIKETHROUGH,
            r"~~(.+?)~~",
        )
    }
}

pub type BuildFn = fn(&Captures<'_>, &Transformers) -> Option<SerializedNode>;
pub type ExportFn = fn(&SerializedNode, &Transformers) -> Option<String>;

/// An inline pattern replaced by a node (`$x$`, `[text](url)`)
#[derive(Debug, Clone)]
pub struct TextMatchTransformer {
    pub name: &'static str,
    /// Typing this character runs `shortcut_regex`
    pub trigger: char,
    pub import_regex: Regex,
    /// Matched against the text before the caret; must be end-anchored
    pub shortcut_regex: Regex,
    pub build: BuildFn,
    pub export: ExportFn,
}

fn inline_equation_export(node: &SerializedNode, _: &Transformers) -> Option<String> {
    match &node.kind {
        NodeKind::Equation {
            equation,
            inline: true,
        } => Some(format!("${equation}$")),
        _ => None,
    }
}

fn image_export(node: &SerializedNode, _: &Transformers) -> Option<String> {
    match &node.kind {
        NodeKind::Image { src, alt } => Some(format!("![{alt}]({})", src.as_str())),
        _ => None,
    }
}

fn link_export(node: &SerializedNode, transformers: &Transformers) -> Option<String> {
    let NodeKind::Link { url } = &node.kind else {
        return None;
    };
    // Addresses written out as their own label stay bare
    if let [label] = node.children.as_slice() {
        if let NodeKind::Text { text, format, .. } = &label.kind {
            let bare = text == url || url.strip_prefix("mailto:") == Some(text.as_str());
            if bare && format.is_empty() {
                return Some(text.clone());
            }
        }
    }
    Some(format!(
        "[{}]({url})",
        transformers.export_inline(&node.children)
    ))
}

impl TextMatchTransformer {
    pub fn inline_equation() -> Self {
        Self {
            name: "inline-equation",
            trigger: '$',
            // No space just inside the delimiters, so `$5 and $10` stays text
            import_regex: Regex::new(r"\$([^\s$](?:[^$\n]*?[^\s$])?)\$")
                .expect("valid equation regex"),
            shortcut_regex: Regex::new(r"\$([^$\n]+)\$$").expect("valid equation regex"),
            build: |caps, _| {
                Some(SerializedNode::new(NodeKind::equation(
                    caps.get(1)?.as_str(),
                    true,
                )))
            },
            export: inline_equation_export,
        }
    }

    pub fn image() -> Self {
        Self {
            name: "image",
            trigger: ')',
            import_regex: Regex::new(r"!\[([^\]]*)\]\(([^()\s]*)\)").expect("valid image regex"),
            shortcut_regex: Regex::new(r"!\[([^\]]*)\]\(([^()\s]*)\)$")
                .expect("valid image regex"),
            build: |caps, _| {
                let alt = caps.get(1)?.as_str();
                let src = ImageSource::parse(caps.get(2)?.as_str());
                Some(SerializedNode::new(NodeKind::image(src, alt)))
            },
            export: image_export,
        }
    }

    pub fn link() -> Self {
        Self {
            name: "link",
            trigger: ')',
            import_regex: Regex::new(r"\[([^\]]+)\]\(([^()\s]+)\)").expect("valid link regex"),
            shortcut_regex: Regex::new(r"(?:^|[^!])\[([^\]]+)\]\(([^()\s]+)\)$")
                .expect("valid link regex"),
            build: |caps, transformers| {
                let label = transformers.import_inline(caps.get(1)?.as_str());
                Some(SerializedNode::with_children(
                    NodeKind::link(caps.get(2)?.as_str()),
                    label,
                ))
            },
            export: link_export,
        }
    }
}

/// A candidate inline match
enum InlineMatch<'t> {
    Format(&'t TextFormatTransformer, Captures<'t>),
    Node(&'t TextMatchTransformer, Captures<'t>),
}

fn push_text(out: &mut Vec<SerializedNode>, text: &str, format: TextFormat) {
    if text.is_empty() {
        return;
    }
    let text = reveal(text, format.contains(TextFormat::CODE));
    out.push(SerializedNode::new(NodeKind::formatted_text(text, format)));
}

impl Transformers {
    /// Parse one line of inline Markdown. Backslash escapes of marker
    /// characters are honoured outside code and equations.
    pub fn import_inline(&self, text: &str) -> Vec<SerializedNode> {
        let mut out = Vec::new();
        self.import_inline_into(&hide_escapes(text), TextFormat::empty(), &mut out);
        out
    }

    fn import_inline_into(&self, text: &str, format: TextFormat, out: &mut Vec<SerializedNode>) {
        // Code spans are literal
        if format.contains(TextFormat::CODE) {
            push_text(out, text, format);
            return;
        }

        let mut rest = text;
        while !rest.is_empty() {
            let Some((start, end, found)) = self.earliest_inline(rest) else {
                push_text(out, rest, format);
                return;
            };
            push_text(out, &rest[..start], format);
            match found {
                InlineMatch::Format(rule, caps) => {
                    let inner = caps.get(1).map_or("", |m| m.as_str());
                    self.import_inline_into(inner, format | rule.format, out);
                }
                InlineMatch::Node(rule, caps) => match (rule.build)(&caps, self) {
                    Some(mut node) => {
                        reveal_node(&mut node);
                        out.push(node);
                    }
                    None => push_text(out, &rest[start..end], format),
                },
            }
            rest = &rest[end..];
        }
    }

    fn earliest_inline<'t>(&'t self, text: &'t str) -> Option<(usize, usize, InlineMatch<'t>)> {
        let mut best: Option<(usize, usize, InlineMatch<'t>)> = None;
        for rule in self.formats() {
            if let Some(caps) = rule.import_regex.captures(text) {
                let Some(whole) = caps.get(0) else { continue };
                if best.as_ref().map_or(true, |(s, _, _)| whole.start() < *s) {
                    best = Some((whole.start(), whole.end(), InlineMatch::Format(rule, caps)));
                }
            }
        }
        for rule in self.text_matches() {
            if let Some(caps) = rule.import_regex.captures(text) {
                let Some(whole) = caps.get(0) else { continue };
                if best.as_ref().map_or(true, |(s, _, _)| whole.start() < *s) {
                    best = Some((whole.start(), whole.end(), InlineMatch::Node(rule, caps)));
                }
            }
        }
        best
    }

    /// Render inline children back to Markdown
    pub fn export_inline(&self, children: &[SerializedNode]) -> String {
        let mut out = String::new();
        for child in children {
            out.push_str(&self.export_inline_node(child));
        }
        out
    }

    fn export_inline_node(&self, node: &SerializedNode) -> String {
        match &node.kind {
            NodeKind::Text { text, format, .. } => self.export_text(text, *format),
            NodeKind::LineBreak => "\n".to_string(),
            _ => self
                .text_matches()
                .find_map(|rule| (rule.export)(node, self))
                .unwrap_or_else(|| self.export_inline(&node.children)),
        }
    }

    /// Wrap text in the markers of its formats. The first rule listed for a
    /// format is used; earlier rules end up innermost. Surrounding
    /// whitespace stays outside the markers. Marker characters in non-code
    /// text are backslash-escaped.
    fn export_text(&self, text: &str, format: TextFormat) -> String {
        let escaped;
        let text = if format.contains(TextFormat::CODE) {
            text
        } else {
            escaped = escape_text(text);
            escaped.as_ref()
        };
        if format.is_empty() || text.trim().is_empty() {
            return text.to_string();
        }
        let trimmed = text.trim();
        let start = text.len() - text.trim_start().len();
        let leading = &text[..start];
        let trailing = &text[start + trimmed.len()..];

        let mut body = trimmed.to_string();
        let mut applied = TextFormat::empty();
        for rule in self.formats().filter(|rule| rule.exports()) {
            if format.contains(rule.format) && !applied.contains(rule.format) {
                applied |= rule.format;
                body = format!("{}{body}{}", rule.marker, rule.marker);
            }
        }
        format!("{leading}{body}{trailing}")
    }
}

/// Whether a character may directly precede an opening marker
pub(crate) fn is_boundary(prev: Option<char>) -> bool {
    static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w").expect("valid word regex"));
    match prev {
        None => true,
        Some(c) => !WORD.is_match(c.encode_utf8(&mut [0; 4])),
    }
}

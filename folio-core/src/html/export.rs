//! Render serialized nodes as HTML that the import rules read back.

use crate::gutter::gutter_text;
use crate::node::{NodeKind, TextFormat};
use crate::serialized::SerializedNode;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Render top-level blocks
pub fn export_html(blocks: &[SerializedNode]) -> String {
    let mut out = String::new();
    for block in blocks {
        push_node(&mut out, block);
    }
    out
}

fn push_children(out: &mut String, node: &SerializedNode) {
    for child in &node.children {
        push_node(out, child);
    }
}

fn push_wrapped(out: &mut String, tag: &str, attrs: &str, node: &SerializedNode) {
    out.push_str(&format!("<{tag}{attrs}>"));
    push_children(out, node);
    out.push_str(&format!("</{tag}>"));
}

fn push_node(out: &mut String, node: &SerializedNode) {
    match &node.kind {
        NodeKind::Root => push_children(out, node),
        NodeKind::Paragraph => push_wrapped(out, "p", "", node),
        NodeKind::Heading { level } => push_wrapped(out, &format!("h{level}"), "", node),
        NodeKind::Quote => push_wrapped(out, "blockquote", "", node),
        NodeKind::List { ordered: false, .. } => push_wrapped(out, "ul", "", node),
        NodeKind::List {
            ordered: true,
            start,
        } => {
            let attrs = if *start == 1 {
                String::new()
            } else {
                format!(" start=\"{start}\"")
            };
            push_wrapped(out, "ol", &attrs, node);
        }
        NodeKind::ListItem { checked: None } => push_wrapped(out, "li", "", node),
        NodeKind::ListItem {
            checked: Some(checked),
        } => push_wrapped(
            out,
            "li",
            &format!(" role=\"checkbox\" aria-checked=\"{checked}\""),
            node,
        ),
        NodeKind::Code { language } => {
            let gutter = gutter_text(node.children.iter().map(|child| &child.kind));
            let mut attrs = String::new();
            if let Some(language) = language {
                attrs.push_str(&format!(" data-language=\"{}\"", html_escape(language)));
            }
            attrs.push_str(&format!(" data-gutter=\"{}\"", html_escape(&gutter)));
            out.push_str(&format!("<pre{attrs}>"));
            for child in &node.children {
                match &child.kind {
                    NodeKind::Text {
                        text,
                        highlight: Some(class),
                        ..
                    } => out.push_str(&format!(
                        "<span data-highlight=\"{}\">{}</span>",
                        html_escape(class),
                        html_escape(text)
                    )),
                    NodeKind::Text { text, .. } => out.push_str(&html_escape(text)),
                    NodeKind::LineBreak => out.push_str("<br>"),
                    _ => {}
                }
            }
            out.push_str("</pre>");
        }
        NodeKind::Equation { equation, inline } => {
            let tag = if *inline { "span" } else { "div" };
            out.push_str(&format!(
                "<{tag} data-lexical-equation=\"{}\" data-lexical-inline=\"{inline}\"></{tag}>",
                STANDARD.encode(equation)
            ));
        }
        NodeKind::Image { src, alt } => out.push_str(&format!(
            "<img src=\"{}\" alt=\"{}\">",
            html_escape(src.as_str()),
            html_escape(alt)
        )),
        NodeKind::Table => push_wrapped(out, "table", "", node),
        NodeKind::TableRow => push_wrapped(out, "tr", "", node),
        NodeKind::TableCell { header: true } => push_wrapped(out, "th", "", node),
        NodeKind::TableCell { header: false } => push_wrapped(out, "td", "", node),
        NodeKind::Text { text, format, .. } => push_text(out, text, *format),
        NodeKind::LineBreak => out.push_str("<br>"),
        NodeKind::Link { url } => {
            push_wrapped(out, "a", &format!(" href=\"{}\"", html_escape(url)), node)
        }
    }
}

/// Format tags, innermost first
const FORMAT_TAGS: [(TextFormat, &str); 4] = [
    (TextFormat::CODE, "code"),
    (TextFormat::BOLD, "strong"),
    (TextFormat::ITALIC, "em"),
    (TextFormat::STRIKETHROUGH, "s"),
];

fn push_text(out: &mut String, text: &str, format: TextFormat) {
    let mut html = html_escape(text);
    for (flag, tag) in FORMAT_TAGS {
        if format.contains(flag) {
            html = format!("<{tag}>{html}</{tag}>");
        }
    }
    out.push_str(&html);
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::{import_html, HtmlRules};

    #[test]
    fn renders_formats_and_escapes() {
        let html = export_html(&[SerializedNode::paragraph(vec![
            SerializedNode::text("a < b "),
            SerializedNode::new(NodeKind::formatted_text(
                "x",
                TextFormat::BOLD | TextFormat::CODE,
            )),
        ])]);
        assert_eq!(html, "<p>a &lt; b <strong><code>x</code></strong></p>");
    }

    #[test]
    fn code_block_carries_language_and_gutter() {
        let code = SerializedNode::code(Some("python"), "a\nb");
        assert_eq!(
            export_html(&[code]),
            "<pre data-language=\"python\" data-gutter=\"1\n2\">a<br>b</pre>"
        );
    }

    #[test]
    fn check_list_round_trips_through_html() {
        let blocks = vec![SerializedNode::with_children(
            NodeKind::list(false),
            vec![
                SerializedNode::with_children(
                    NodeKind::check_item(true),
                    vec![SerializedNode::text("done")],
                ),
                SerializedNode::with_children(
                    NodeKind::check_item(false),
                    vec![SerializedNode::text("todo")],
                ),
            ],
        )];
        let html = export_html(&blocks);
        assert_eq!(
            html,
            "<ul><li role=\"checkbox\" aria-checked=\"true\">done</li>\
             <li role=\"checkbox\" aria-checked=\"false\">todo</li></ul>"
        );
        assert_eq!(import_html(&html, &HtmlRules::default()), blocks);
    }

    #[test]
    fn equation_round_trips_through_html() {
        let blocks = vec![
            SerializedNode::new(NodeKind::equation("\\int_0^1 x\\,dx", false)),
            SerializedNode::paragraph(vec![
                SerializedNode::text("so "),
                SerializedNode::new(NodeKind::equation("a<b", true)),
            ]),
        ];
        let html = export_html(&blocks);
        assert_eq!(import_html(&html, &HtmlRules::default()), blocks);
    }
}

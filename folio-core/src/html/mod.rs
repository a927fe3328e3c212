//! HTML import (paste) and export.

pub mod dom;
pub mod export;
pub mod rules;

use crate::editor::Editor;
use crate::error::Result;
use crate::node::{NodeKey, NodeKind, TextFormat};
use crate::serialized::SerializedNode;
use dom::{parse_html, DomElement, DomNode};
use tracing::debug;

pub use export::export_html;
pub use rules::{AfterFn, ConversionOutput, ConversionRule, HtmlRules, Specificity};

/// Elements that start a new block; whitespace next to them is layout
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "dd", "div", "dl", "dt", "figure",
    "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "html", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

/// Elements whose direct text children are never content
const STRUCTURAL_TAGS: &[&str] = &[
    "html", "body", "table", "thead", "tbody", "tfoot", "tr", "ul", "ol", "dl",
];

/// Inherited while walking down the DOM
#[derive(Debug, Clone, Copy, Default)]
struct Scope {
    preformatted: bool,
    format: TextFormat,
}

/// Convert an HTML fragment into top-level blocks
pub fn import_html(html: &str, rules: &HtmlRules) -> Vec<SerializedNode> {
    let dom = parse_html(html);
    let mut ancestors = Vec::new();
    let nodes = convert_nodes(&dom, &mut ancestors, Scope::default(), rules);
    let blocks = attach(&NodeKind::Root, nodes);
    debug!(blocks = blocks.len(), "imported html");
    blocks
}

fn is_structural(parent: Option<&&DomElement>) -> bool {
    parent.map_or(true, |el| STRUCTURAL_TAGS.contains(&el.tag.as_str()))
}

fn is_block_element(node: Option<&DomNode>) -> bool {
    matches!(node, Some(DomNode::Element(el)) if BLOCK_TAGS.contains(&el.tag.as_str()))
}

fn convert_nodes<'a>(
    nodes: &'a [DomNode],
    ancestors: &mut Vec<&'a DomElement>,
    scope: Scope,
    rules: &HtmlRules,
) -> Vec<SerializedNode> {
    let mut out = Vec::new();
    for (idx, node) in nodes.iter().enumerate() {
        match node {
            DomNode::Element(el) => out.extend(convert_element(el, ancestors, scope, rules)),
            DomNode::Text(text) if text.trim().is_empty() && is_structural(ancestors.last()) => {}
            DomNode::Text(text) if scope.preformatted => push_preformatted(&mut out, text, scope.format),
            DomNode::Text(text) => {
                let beside_block = (idx > 0 && is_block_element(nodes.get(idx - 1)))
                    || is_block_element(nodes.get(idx + 1));
                if text.trim().is_empty() && beside_block {
                    continue;
                }
                out.push(SerializedNode::new(NodeKind::formatted_text(
                    collapse_whitespace(text),
                    scope.format,
                )));
            }
        }
    }
    out
}

fn convert_element<'a>(
    el: &'a DomElement,
    ancestors: &mut Vec<&'a DomElement>,
    scope: Scope,
    rules: &HtmlRules,
) -> Vec<SerializedNode> {
    if rules.is_dropped(&el.tag) {
        return Vec::new();
    }
    let output = rules.convert(el, ancestors).unwrap_or_default();
    let inner = Scope {
        preformatted: scope.preformatted || output.preformatted,
        format: scope.format | output.format,
    };

    let mut children = if output.skip_children {
        Vec::new()
    } else {
        ancestors.push(el);
        let children = convert_nodes(&el.children, ancestors, inner, rules);
        ancestors.pop();
        children
    };
    if let Some(after) = output.after {
        children = after(el, ancestors, children);
    }

    match output.node {
        None => children,
        Some(mut node) => {
            let mut content = std::mem::take(&mut node.children);
            content.extend(children);
            node.children = attach(&node.kind, content);
            if node.kind.accepts(&NodeKind::text("")) && !inner.preformatted {
                trim_edges(&mut node.children);
            }
            vec![node]
        }
    }
}

fn push_preformatted(out: &mut Vec<SerializedNode>, text: &str, format: TextFormat) {
    let text = text.replace("\r\n", "\n");
    for (idx, line) in text.split('\n').enumerate() {
        if idx > 0 {
            out.push(SerializedNode::new(NodeKind::LineBreak));
        }
        if !line.is_empty() {
            out.push(SerializedNode::new(NodeKind::formatted_text(line, format)));
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

/// Fit converted nodes under a parent of `kind`. Inline runs the parent
/// cannot hold are wrapped in paragraphs; other misplaced elements are
/// unwrapped; misplaced leaves are dropped.
fn attach(kind: &NodeKind, children: Vec<SerializedNode>) -> Vec<SerializedNode> {
    let mut out = Vec::new();
    let mut run = Vec::new();
    for child in children {
        place(kind, child, &mut out, &mut run);
    }
    flush_run(&mut out, &mut run);
    out
}

fn place(
    kind: &NodeKind,
    child: SerializedNode,
    out: &mut Vec<SerializedNode>,
    run: &mut Vec<SerializedNode>,
) {
    if kind.accepts(&child.kind) {
        flush_run(out, run);
        out.push(child);
    } else if child.kind.is_inline() && kind.accepts(&NodeKind::Paragraph) {
        run.push(child);
    } else if child.kind.is_element() {
        let separate = !child.kind.is_inline()
            && kind.accepts(&NodeKind::LineBreak)
            && out.last().is_some_and(|last| last.kind != NodeKind::LineBreak);
        if separate {
            out.push(SerializedNode::new(NodeKind::LineBreak));
        }
        for grandchild in child.children {
            place(kind, grandchild, out, run);
        }
    } else {
        debug!(node = %child.node_type(), parent = %kind.node_type(), "dropped misplaced node");
    }
}

fn flush_run(out: &mut Vec<SerializedNode>, run: &mut Vec<SerializedNode>) {
    if run.is_empty() {
        return;
    }
    let mut children = std::mem::take(run);
    trim_edges(&mut children);
    if !children.is_empty() {
        out.push(SerializedNode::paragraph(children));
    }
}

/// Strip layout whitespace at the start and end of a text block
fn trim_edges(children: &mut Vec<SerializedNode>) {
    if let Some(NodeKind::Text { text, .. }) = children.first_mut().map(|n| &mut n.kind) {
        *text = text.trim_start().to_string();
    }
    if let Some(NodeKind::Text { text, .. }) = children.last_mut().map(|n| &mut n.kind) {
        *text = text.trim_end().to_string();
    }
    children.retain(|child| !matches!(&child.kind, NodeKind::Text { text, .. } if text.is_empty()));
}

impl Editor {
    /// Paste HTML after the caret's top-level block, or at the end of the
    /// document. Returns the inserted blocks.
    pub fn paste_html(&mut self, html: &str, rules: &HtmlRules) -> Result<Vec<NodeKey>> {
        let blocks = import_html(html, rules);
        self.update(|ed| {
            let root = ed.root();
            let mut index = ed
                .caret()
                .and_then(|caret| ed.top_level_block(caret.key))
                .and_then(|block| ed.index_in_parent(block))
                .map_or_else(|| ed.children(root).map_or(0, |c| c.len()), |idx| idx + 1);
            let mut inserted = Vec::with_capacity(blocks.len());
            for block in &blocks {
                inserted.push(ed.insert_tree(root, index, block)?);
                index += 1;
            }
            if let Some(last) = inserted.last() {
                ed.select_end(*last)?;
            }
            Ok(inserted)
        })
    }

    /// Render the whole document as HTML
    pub fn export_html(&self) -> String {
        export_html(&self.content_blocks())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import(html: &str) -> Vec<SerializedNode> {
        import_html(html, &HtmlRules::default())
    }

    #[test]
    fn github_code_table_becomes_code() {
        let html = r#"<table class="highlight tab-size js-file-line-container" data-tagsearch-lang="Python">
<tbody>
<tr><td id="L1" class="blob-num js-line-number" data-line-number="1"></td>
<td id="LC1" class="blob-code blob-code-inner js-file-line"><span class="pl-k">def</span> f():</td></tr>
<tr><td id="L2" class="blob-num js-line-number" data-line-number="2"></td>
<td id="LC2" class="blob-code blob-code-inner js-file-line">    return  1</td></tr>
</tbody></table>"#;
        let blocks = import(html);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, NodeKind::code(Some("python")));
        assert_eq!(blocks[0].text_content(), "def f():\n    return  1");
    }

    #[test]
    fn ordinary_table_stays_a_table() {
        let blocks = import("<table><tr><th>a</th><td>b</td></tr></table>");
        assert_eq!(blocks[0].kind, NodeKind::Table);
        let row = &blocks[0].children[0];
        assert_eq!(row.children[0].kind, NodeKind::table_cell(true));
        assert_eq!(row.children[0].children[0].kind, NodeKind::Paragraph);
        assert_eq!(row.text_content(), "ab");
    }

    #[test]
    fn pre_keeps_lines() {
        let blocks = import("<pre data-language=\"rust\">fn main() {\n  go();\n}</pre>");
        assert_eq!(blocks[0].kind, NodeKind::code(Some("rust")));
        assert_eq!(blocks[0].text_content(), "fn main() {\n  go();\n}");
    }

    #[test]
    fn monospace_divs_become_code_lines() {
        let blocks = import(
            "<div style=\"font-family: Menlo, monospace\"><div>a = 1</div><div>b = 2</div></div>",
        );
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, NodeKind::code(None));
        assert_eq!(blocks[0].text_content(), "a = 1\nb = 2");
    }

    #[test]
    fn multi_line_code_element_is_a_block() {
        let blocks = import("<code>line 1\nline 2</code>");
        assert_eq!(blocks[0].kind, NodeKind::code(None));
        let inline = import("<p>use <code>x</code></p>");
        assert_eq!(
            inline[0].children[1].kind,
            NodeKind::formatted_text("x", TextFormat::CODE)
        );
    }

    #[test]
    fn stray_inline_content_is_wrapped() {
        let blocks = import("hello <b>world</b><h2>Title</h2>tail");
        let kinds: Vec<_> = blocks.iter().map(|b| b.node_type().as_str()).collect();
        assert_eq!(kinds, ["paragraph", "heading", "paragraph"]);
        assert_eq!(
            blocks[0].children[1].kind,
            NodeKind::formatted_text("world", TextFormat::BOLD)
        );
    }

    #[test]
    fn task_list_items_keep_checkbox_state() {
        let blocks = import(concat!(
            r#"<ul><li class="task-list-item"><input type="checkbox" checked disabled> done</li>"#,
            r#"<li class="task-list-item"><input type="checkbox" disabled> todo</li>"#,
            r#"<li aria-checked="true">aria</li><li>plain</li></ul>"#,
        ));
        let kinds: Vec<_> = blocks[0].children.iter().map(|item| item.kind.clone()).collect();
        assert_eq!(
            kinds,
            [
                NodeKind::check_item(true),
                NodeKind::check_item(false),
                NodeKind::check_item(true),
                NodeKind::list_item(),
            ]
        );
        assert_eq!(blocks[0].children[0].text_content(), "done");
    }

    #[test]
    fn web_image_sources_need_no_lookup() {
        let blocks = import(r#"<p><img src="https://example.com/cat.png" alt="cat"></p>"#);
        assert_eq!(
            blocks[0].children[0].kind,
            NodeKind::image(
                crate::node::ImageSource::Url("https://example.com/cat.png".into()),
                "cat"
            )
        );
    }

    #[test]
    fn scripts_are_dropped() {
        let blocks = import("<p>a</p><script>alert(1)</script><style>p{}</style>");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text_content(), "a");
    }

    #[test]
    fn paste_goes_after_caret_block() {
        let mut ed = Editor::new();
        let t = ed.markdown_transformers();
        ed.import_markdown("first\n\nlast", &t).unwrap();
        let first = ed.children(ed.root()).unwrap()[0];
        ed.select_end(first).unwrap();
        ed.paste_html("<p>middle</p>", &HtmlRules::default()).unwrap();
        assert_eq!(ed.export_markdown(&t), "first\n\nmiddle\n\nlast");
    }
}

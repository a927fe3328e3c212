//! End-to-end editing: Markdown and HTML conversion, typing shortcuts,
//! the code gutter and transaction rollback.

use folio_core::{
    Caret, Editor, EditorError, HtmlRules, MarkdownShortcuts, NodeKind, NodeType,
    SerializedNode,
};

fn typing(text: &str) -> Editor {
    let mut ed = Editor::new();
    let root = ed.root();
    ed.set_caret(Some(Caret::new(root, 0)));
    MarkdownShortcuts::default().type_text(&mut ed, text).unwrap();
    ed
}

fn only_code_block(ed: &Editor) -> folio_core::NodeKey {
    let code = ed.nodes_of_type(NodeType::Code);
    assert_eq!(code.len(), 1);
    code[0]
}

#[test]
fn gutter_counts_code_lines() {
    let mut ed = Editor::new();
    let t = ed.markdown_transformers();
    ed.import_markdown("```\na\nb\nc\n```", &t).unwrap();
    let code = only_code_block(&ed);
    assert_eq!(ed.gutter(code), Some("1\n2\n3"));

    ed.update(|ed| ed.clear_children(code)).unwrap();
    assert_eq!(ed.gutter(code), Some("1"));
}

#[test]
fn fenced_code_keeps_language_and_text() {
    let mut ed = Editor::new();
    let t = ed.markdown_transformers();
    ed.import_markdown("```python\nprint(1)\nprint(2)\n```", &t)
        .unwrap();
    let code = only_code_block(&ed);
    assert_eq!(
        ed.node(code).unwrap().kind(),
        &NodeKind::code(Some("python"))
    );
    assert_eq!(ed.text_content(code), "print(1)\nprint(2)");
    assert_eq!(ed.export_markdown(&t), "```python\nprint(1)\nprint(2)\n```");
}

#[test]
fn markdown_round_trips() {
    let source = "# Notes\n\nSome **bold** and *soft* text with `code` and [a link](https://example.com).\n\n> quoted\n\n- one\n- two\n\n1. first\n2. second\n\n$$e^{i\\pi} + 1 = 0$$\n\nInline $x^2$ math and ~~gone~~.";
    let mut ed = Editor::new();
    let t = ed.markdown_transformers();
    ed.import_markdown(source, &t).unwrap();
    assert_eq!(ed.export_markdown(&t), source);
}

#[test]
fn rich_document_survives_markdown_round_trip() {
    let source = concat!(
        "# Guide\n\n",
        "See ![cat](obj-1) and ![web](https://example.com/a.png) or [the **docs**](https://x.org) ",
        "with $a + b$ inline, at https://example.com/start or ann@example.org.\n\n",
        "| name | cost |\n| --- | --- |\n| tea | $5 |\n| *cake* | 2\\*3 |\n\n",
        "- [x] shipped\n- [ ] write notes\n\n",
        "$$\\int_0^1 x\\,dx$$\n\n",
        "```rust\nfn main() {}\n```",
    );
    let mut first = Editor::new();
    let t = first.markdown_transformers();
    first.import_markdown(source, &t).unwrap();
    for node_type in [
        NodeType::Image,
        NodeType::Table,
        NodeType::Link,
        NodeType::Equation,
        NodeType::Code,
    ] {
        assert!(!first.nodes_of_type(node_type).is_empty(), "{node_type}");
    }
    assert_eq!(first.nodes_of_type(NodeType::Link).len(), 3);

    let exported = first.export_markdown(&t);
    let mut second = Editor::new();
    second.import_markdown(&exported, &t).unwrap();

    assert_eq!(second.snapshot(), first.snapshot());
    assert_eq!(second.export_markdown(&t), exported);
    assert_eq!(exported, source);
}

#[test]
fn github_code_table_pastes_as_code() {
    let html = concat!(
        r#"<table class="highlight js-file-line-container" data-tagsearch-lang="Rust"><tbody>"#,
        r#"<tr><td class="blob-num js-line-number" data-line-number="1"></td>"#,
        r#"<td class="blob-code blob-code-inner js-file-line">fn main() {</td></tr>"#,
        r#"<tr><td class="blob-num js-line-number" data-line-number="2"></td>"#,
        r#"<td class="blob-code blob-code-inner js-file-line">}</td></tr>"#,
        "</tbody></table>"
    );
    let mut ed = Editor::new();
    ed.paste_html(html, &HtmlRules::default()).unwrap();

    let code = only_code_block(&ed);
    assert_eq!(ed.node(code).unwrap().kind(), &NodeKind::code(Some("rust")));
    assert_eq!(ed.text_content(code), "fn main() {\n}");
    assert_eq!(ed.gutter(code), Some("1\n2"));
}

#[test]
fn code_block_survives_html_round_trip() {
    let block = SerializedNode::code(Some("python"), "def f():\n    return 1");
    let mut ed = Editor::new();
    ed.update(|ed| {
        let root = ed.root();
        ed.insert_tree(root, 0, &block).map(|_| ())
    })
    .unwrap();

    let html = ed.export_html();
    let mut copy = Editor::new();
    copy.paste_html(&html, &HtmlRules::default()).unwrap();

    let code = only_code_block(&copy);
    assert_eq!(
        copy.node(code).unwrap().kind(),
        &NodeKind::code(Some("python"))
    );
    assert_eq!(copy.text_content(code), "def f():\n    return 1");
}

#[test]
fn typing_inline_equation() {
    let ed = typing("so $x^2$");
    let blocks = ed.snapshot().blocks().to_vec();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].children[0].kind, NodeKind::text("so "));
    assert_eq!(blocks[0].children[1].kind, NodeKind::equation("x^2", true));
}

#[test]
fn typing_block_equation_marker() {
    let ed = typing("$$ ");
    let blocks = ed.content_blocks();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].kind, NodeKind::equation("", false));
    // The caret can still leave the equation
    assert_eq!(ed.snapshot().blocks().len(), 2);
}

#[test]
fn typed_document_exports_as_markdown() {
    let ed = typing("## Plan");
    let t = ed.markdown_transformers();
    assert_eq!(ed.export_markdown(&t), "## Plan");
}

#[test]
fn failed_update_rolls_back() {
    let mut ed = Editor::new();
    let t = ed.markdown_transformers();
    ed.import_markdown("keep me", &t).unwrap();
    let seq = ed.seq();
    let before = ed.snapshot();

    let result: Result<(), EditorError> = ed.update(|ed| {
        let root = ed.root();
        let p = ed.create(NodeKind::paragraph())?;
        ed.append(root, p)?;
        Err(EditorError::InvalidStructure("abort".into()))
    });

    assert!(result.is_err());
    assert_eq!(ed.seq(), seq);
    assert_eq!(ed.snapshot(), before);
}

#[test]
fn nested_transaction_is_rejected() {
    let mut ed = Editor::new();
    ed.begin().unwrap();
    assert!(matches!(ed.begin(), Err(EditorError::ConcurrentTransaction)));
    ed.rollback();
    assert!(ed.begin().is_ok());
}

//! Small owned DOM built from html5ever's parse tree.

use html5ever::tendril::TendrilSink;
use html5ever::{parse_fragment, LocalName, Namespace, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

#[derive(Debug, Clone, PartialEq)]
pub enum DomNode {
    Element(DomElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DomElement {
    /// Lowercase tag name
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<DomNode>,
    /// Whether anything other than whitespace follows this element among
    /// its parent's children
    pub has_next_sibling: bool,
}

impl DomElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            children: Vec::new(),
            has_next_sibling: false,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class))
    }

    /// Value of one inline style property, lowercased name lookup
    pub fn style(&self, property: &str) -> Option<&str> {
        self.attr("style")?.split(';').find_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case(property)
                .then(|| value.trim())
        })
    }

    /// Concatenated text of all descendants
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        push_text(&self.children, &mut out);
        out
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &DomElement> {
        self.children.iter().filter_map(|child| match child {
            DomNode::Element(el) => Some(el),
            DomNode::Text(_) => None,
        })
    }
}

fn push_text(nodes: &[DomNode], out: &mut String) {
    for node in nodes {
        match node {
            DomNode::Text(text) => out.push_str(text),
            DomNode::Element(el) => push_text(&el.children, out),
        }
    }
}

/// Parse an HTML fragment as if it were the content of `<body>`
pub fn parse_html(html: &str) -> Vec<DomNode> {
    let context = QualName::new(None, Namespace::from(XHTML_NS), LocalName::from("body"));
    let dom = parse_fragment(RcDom::default(), ParseOpts::default(), context, Vec::new()).one(html);

    // Fragment content lands under a synthetic <html> element
    let document = dom.document.children.borrow();
    let mut out = Vec::new();
    for child in document.iter() {
        match &child.data {
            NodeData::Element { name, .. } if &*name.local == "html" => {
                out.extend(convert_children(child));
            }
            _ => out.extend(convert(child)),
        }
    }
    out
}

fn convert_children(handle: &Handle) -> Vec<DomNode> {
    let mut nodes: Vec<DomNode> = handle
        .children
        .borrow()
        .iter()
        .filter_map(convert)
        .collect();

    let mut following = false;
    for node in nodes.iter_mut().rev() {
        match node {
            DomNode::Element(el) => {
                el.has_next_sibling = following;
                following = true;
            }
            DomNode::Text(text) => following |= !text.trim().is_empty(),
        }
    }
    nodes
}

fn convert(handle: &Handle) -> Option<DomNode> {
    match &handle.data {
        NodeData::Text { contents } => Some(DomNode::Text(contents.borrow().to_string())),
        NodeData::Element {
            name,
            attrs,
            template_contents,
            ..
        } => {
            let mut element = DomElement::new(&name.local);
            element.attrs = attrs
                .borrow()
                .iter()
                .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                .collect();
            element.children = match template_contents.borrow().as_ref() {
                Some(contents) => convert_children(contents),
                None => convert_children(handle),
            };
            Some(DomNode::Element(element))
        }
        _ => None,
    }
}

//! DOM conversion rules.
//!
//! Every element is offered to the rules registered for its tag. Candidates
//! whose `detect` predicate holds are tried in order of `priority`, then
//! [`Specificity`], then registration order; the first conversion that
//! returns `Some` decides. Elements nobody converts are transparent: their
//! children are imported into the enclosing node.

use super::dom::DomElement;
use crate::config::HtmlConfig;
use crate::node::{ImageSource, NodeKind, TextFormat};
use crate::serialized::SerializedNode;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::HashSet;

/// `ancestors` runs from the outermost element to the parent
pub type DetectFn = fn(&DomElement, &[&DomElement]) -> bool;
pub type ConvertFn = fn(&DomElement, &[&DomElement]) -> Option<ConversionOutput>;
/// Post-processes the nodes built from an element's children
pub type AfterFn = fn(&DomElement, &[&DomElement], Vec<SerializedNode>) -> Vec<SerializedNode>;

/// Tie-breaker between rules of equal priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Specificity {
    Generic,
    /// Markup of a specific foreign source, such as GitHub's code tables
    ForeignTable,
}

#[derive(Clone, Default)]
pub struct ConversionOutput {
    /// `None` leaves the element transparent
    pub node: Option<SerializedNode>,
    /// Keep whitespace and newlines in descendant text
    pub preformatted: bool,
    /// Added to the format of descendant text
    pub format: TextFormat,
    pub skip_children: bool,
    pub after: Option<AfterFn>,
}

impl std::fmt::Debug for ConversionOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionOutput")
            .field("node", &self.node)
            .field("preformatted", &self.preformatted)
            .field("format", &self.format)
            .field("skip_children", &self.skip_children)
            .field("after", &self.after.is_some())
            .finish()
    }
}

impl ConversionOutput {
    pub fn node(kind: NodeKind) -> Self {
        Self {
            node: Some(SerializedNode::new(kind)),
            ..Self::default()
        }
    }

    pub fn transparent() -> Self {
        Self::default()
    }

    pub fn format(format: TextFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    fn preformatted(mut self) -> Self {
        self.preformatted = true;
        self
    }

    fn leaf(mut self) -> Self {
        self.skip_children = true;
        self
    }
}

#[derive(Clone)]
pub struct ConversionRule {
    pub tag: &'static str,
    pub name: &'static str,
    pub priority: u8,
    pub specificity: Specificity,
    pub detect: DetectFn,
    pub convert: ConvertFn,
}

impl std::fmt::Debug for ConversionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}<{}>@{}", self.name, self.tag, self.priority)
    }
}

fn always(_: &DomElement, _: &[&DomElement]) -> bool {
    true
}

fn rule(tag: &'static str, name: &'static str, priority: u8, convert: ConvertFn) -> ConversionRule {
    ConversionRule {
        tag,
        name,
        priority,
        specificity: Specificity::Generic,
        detect: always,
        convert,
    }
}

/// The registered rules plus the tags dropped outright
#[derive(Debug, Clone)]
pub struct HtmlRules {
    rules: Vec<ConversionRule>,
    drop_tags: HashSet<String>,
}

impl Default for HtmlRules {
    fn default() -> Self {
        Self::with_config(&HtmlConfig::default())
    }
}

impl HtmlRules {
    /// The standard rules
    pub fn with_config(config: &HtmlConfig) -> Self {
        let mut rules = Vec::new();
        rules.extend(github_rules());
        rules.extend(code_rules());
        rules.extend(block_rules());
        rules.extend(inline_rules());
        Self {
            rules,
            drop_tags: config
                .drop_tags
                .iter()
                .map(|tag| tag.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn push(&mut self, rule: ConversionRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[ConversionRule] {
        &self.rules
    }

    pub fn is_dropped(&self, tag: &str) -> bool {
        self.drop_tags.contains(tag)
    }

    /// Rules that apply to `element`, best first
    pub fn candidates(&self, element: &DomElement, ancestors: &[&DomElement]) -> Vec<&ConversionRule> {
        let mut found: Vec<&ConversionRule> = self
            .rules
            .iter()
            .filter(|rule| rule.tag == element.tag && (rule.detect)(element, ancestors))
            .collect();
        // Stable: registration order breaks the remaining ties
        found.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.specificity.cmp(&a.specificity))
        });
        found
    }

    pub fn convert(&self, element: &DomElement, ancestors: &[&DomElement]) -> Option<ConversionOutput> {
        self.candidates(element, ancestors)
            .into_iter()
            .find_map(|rule| (rule.convert)(element, ancestors))
    }
}

// ---------------------------------------------------------------------------
// Code
// ---------------------------------------------------------------------------

fn is_github_code_table(table: &DomElement) -> bool {
    table.has_class("js-file-line-container")
}

fn in_github_code_table(ancestors: &[&DomElement]) -> bool {
    ancestors
        .iter()
        .rev()
        .find(|el| el.tag == "table")
        .is_some_and(|table| is_github_code_table(table))
}

fn github_rules() -> Vec<ConversionRule> {
    vec![
        ConversionRule {
            tag: "table",
            name: "github-code-table",
            priority: 4,
            specificity: Specificity::ForeignTable,
            detect: |el, _| is_github_code_table(el),
            convert: |el, _| {
                let language = el.attr("data-tagsearch-lang").map(str::to_lowercase);
                Some(ConversionOutput::node(NodeKind::code(language.as_deref())).preformatted())
            },
        },
        ConversionRule {
            tag: "td",
            name: "github-code-line",
            priority: 4,
            specificity: Specificity::ForeignTable,
            detect: |el, _| el.has_class("js-file-line"),
            convert: |_, _| {
                Some(ConversionOutput {
                    after: Some(|_, ancestors, mut children| {
                        if ancestors.last().is_some_and(|row| row.has_next_sibling) {
                            children.push(SerializedNode::new(NodeKind::LineBreak));
                        }
                        children
                    }),
                    ..ConversionOutput::default()
                })
            },
        },
        ConversionRule {
            tag: "td",
            name: "github-code-noop",
            priority: 4,
            specificity: Specificity::ForeignTable,
            detect: |_, ancestors| in_github_code_table(ancestors),
            convert: |_, _| Some(ConversionOutput::transparent()),
        },
        ConversionRule {
            tag: "tr",
            name: "github-code-row",
            priority: 4,
            specificity: Specificity::ForeignTable,
            detect: |_, ancestors| in_github_code_table(ancestors),
            convert: |_, _| Some(ConversionOutput::transparent()),
        },
    ]
}

/// Language from `data-language`, `data-highlight-language` or a
/// `language-*` class
fn code_language(el: &DomElement) -> Option<String> {
    el.attr("data-language")
        .or_else(|| el.attr("data-highlight-language"))
        .map(str::to_string)
        .or_else(|| {
            el.attr("class")?
                .split_ascii_whitespace()
                .find_map(|class| class.strip_prefix("language-"))
                .map(str::to_string)
        })
}

fn convert_code_block(el: &DomElement, _: &[&DomElement]) -> Option<ConversionOutput> {
    let language = code_language(el);
    Some(ConversionOutput::node(NodeKind::code(language.as_deref())).preformatted())
}

fn is_monospace(el: &DomElement) -> bool {
    el.style("font-family")
        .is_some_and(|family| family.contains("monospace"))
}

fn code_rules() -> Vec<ConversionRule> {
    vec![
        ConversionRule {
            detect: |el, _| el.text_content().contains('\n'),
            ..rule("code", "multi-line-code", 1, convert_code_block)
        },
        rule("div", "div", 1, |el, _| {
            let mut output = if is_monospace(el) {
                ConversionOutput::node(NodeKind::code(code_language(el).as_deref())).preformatted()
            } else {
                ConversionOutput::transparent()
            };
            output.after = Some(|el, _, mut children| {
                if el.has_next_sibling {
                    children.push(SerializedNode::new(NodeKind::LineBreak));
                }
                children
            });
            Some(output)
        }),
        rule("pre", "pre", 0, convert_code_block),
    ]
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

fn heading_rule(tag: &'static str) -> ConversionRule {
    rule(tag, "heading", 0, |el, _| {
        let level = el.tag[1..].parse().unwrap_or(1);
        Some(ConversionOutput::node(NodeKind::heading(level)))
    })
}

/// Checklist state of an `li`: `aria-checked`, or the checkbox input of a
/// GitHub task list item
fn list_item_checked(el: &DomElement) -> Option<bool> {
    if let Some(value) = el.attr("aria-checked") {
        return Some(value.trim().eq_ignore_ascii_case("true"));
    }
    if el.has_class("task-list-item") {
        let checked = el
            .child_elements()
            .any(|child| child.tag == "input" && child.attr("checked").is_some());
        return Some(checked);
    }
    None
}

fn block_rules() -> Vec<ConversionRule> {
    let mut rules = vec![
        rule("p", "paragraph", 0, |_, _| {
            Some(ConversionOutput::node(NodeKind::Paragraph))
        }),
        rule("blockquote", "quote", 0, |_, _| {
            Some(ConversionOutput::node(NodeKind::Quote))
        }),
        rule("ul", "unordered-list", 0, |_, _| {
            Some(ConversionOutput::node(NodeKind::list(false)))
        }),
        rule("ol", "ordered-list", 0, |el, _| {
            let start = el.attr("start").and_then(|s| s.trim().parse().ok()).unwrap_or(1);
            Some(ConversionOutput::node(NodeKind::List {
                ordered: true,
                start,
            }))
        }),
        rule("li", "list-item", 0, |el, _| {
            Some(ConversionOutput::node(NodeKind::ListItem {
                checked: list_item_checked(el),
            }))
        }),
        rule("table", "table", 0, |_, _| {
            Some(ConversionOutput::node(NodeKind::Table))
        }),
        rule("tr", "table-row", 0, |_, _| {
            Some(ConversionOutput::node(NodeKind::TableRow))
        }),
        rule("td", "table-cell", 0, |_, _| {
            Some(ConversionOutput::node(NodeKind::table_cell(false)))
        }),
        rule("th", "table-header", 0, |_, _| {
            Some(ConversionOutput::node(NodeKind::table_cell(true)))
        }),
        // Equations exported by this editor carry their source in base64
        ConversionRule {
            detect: |el, _| el.attr("data-lexical-equation").is_some(),
            ..rule("div", "block-equation", 2, convert_equation)
        },
    ];
    rules.extend(["h1", "h2", "h3", "h4", "h5", "h6"].map(heading_rule));
    rules
}

fn convert_equation(el: &DomElement, _: &[&DomElement]) -> Option<ConversionOutput> {
    let encoded = el.attr("data-lexical-equation")?;
    let bytes = STANDARD.decode(encoded.trim()).ok()?;
    let equation = String::from_utf8(bytes).ok()?;
    let inline = el.attr("data-lexical-inline") == Some("true");
    Some(ConversionOutput::node(NodeKind::equation(equation, inline)).leaf())
}

// ---------------------------------------------------------------------------
// Inline
// ---------------------------------------------------------------------------

/// Bold from a `font-weight` value; `None` when the style says nothing
fn weight_is_bold(value: &str) -> Option<bool> {
    match value.trim() {
        "bold" | "bolder" => Some(true),
        "normal" | "lighter" => Some(false),
        number => number.parse::<u16>().ok().map(|w| w >= 600),
    }
}

/// Formats declared by inline styles
fn style_format(el: &DomElement) -> TextFormat {
    let mut format = TextFormat::empty();
    if el.style("font-weight").and_then(weight_is_bold) == Some(true) {
        format |= TextFormat::BOLD;
    }
    if el.style("font-style").is_some_and(|style| style.trim() == "italic") {
        format |= TextFormat::ITALIC;
    }
    if el
        .style("text-decoration")
        .is_some_and(|decoration| decoration.contains("line-through"))
    {
        format |= TextFormat::STRIKETHROUGH;
    }
    format
}

fn inline_rules() -> Vec<ConversionRule> {
    vec![
        rule("br", "line-break", 0, |_, _| {
            Some(ConversionOutput::node(NodeKind::LineBreak).leaf())
        }),
        rule("a", "link", 0, |el, _| {
            let href = el.attr("href")?.trim();
            (!href.is_empty()).then(|| ConversionOutput::node(NodeKind::link(href)))
        }),
        rule("img", "image", 0, |el, _| {
            let src = ImageSource::parse(el.attr("src").unwrap_or_default().trim());
            let alt = el.attr("alt").unwrap_or_default();
            Some(ConversionOutput::node(NodeKind::image(src, alt)).leaf())
        }),
        ConversionRule {
            detect: |el, _| el.attr("data-lexical-equation").is_some(),
            ..rule("span", "inline-equation", 1, convert_equation)
        },
        rule("b", "bold", 0, |el, _| {
            // Google Docs wraps whole documents in <b style="font-weight:normal">
            let bold = el.style("font-weight").and_then(weight_is_bold).unwrap_or(true);
            Some(ConversionOutput::format(if bold {
                TextFormat::BOLD
            } else {
                TextFormat::empty()
            }))
        }),
        rule("strong", "bold", 0, |_, _| {
            Some(ConversionOutput::format(TextFormat::BOLD))
        }),
        rule("em", "italic", 0, |_, _| {
            Some(ConversionOutput::format(TextFormat::ITALIC))
        }),
        rule("i", "italic", 0, |_, _| {
            Some(ConversionOutput::format(TextFormat::ITALIC))
        }),
        rule("s", "strikethrough", 0, |_, _| {
            Some(ConversionOutput::format(TextFormat::STRIKETHROUGH))
        }),
        rule("del", "strikethrough", 0, |_, _| {
            Some(ConversionOutput::format(TextFormat::STRIKETHROUGH))
        }),
        rule("code", "inline-code", 0, |_, _| {
            Some(ConversionOutput::format(TextFormat::CODE))
        }),
        rule("span", "styled-span", 0, |el, _| {
            Some(ConversionOutput::format(style_format(el)))
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::dom::DomNode;

    fn element(tag: &str, attrs: &[(&str, &str)]) -> DomElement {
        let mut el = DomElement::new(tag);
        el.attrs = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        el
    }

    #[test]
    fn github_rules_outrank_generic_ones() {
        let rules = HtmlRules::default();
        let table = element("table", &[("class", "highlight js-file-line-container")]);
        let names: Vec<_> = rules
            .candidates(&table, &[])
            .iter()
            .map(|rule| rule.name)
            .collect();
        assert_eq!(names, ["github-code-table", "table"]);

        let td = element("td", &[("class", "blob-code js-file-line")]);
        let names: Vec<_> = rules
            .candidates(&td, &[&table])
            .iter()
            .map(|rule| rule.name)
            .collect();
        assert_eq!(names, ["github-code-line", "github-code-noop", "table-cell"]);
    }

    #[test]
    fn single_line_code_is_inline_format() {
        let rules = HtmlRules::default();
        let mut code = element("code", &[]);
        code.children.push(DomNode::Text("x".into()));
        let output = rules.convert(&code, &[]).unwrap();
        assert!(output.node.is_none());
        assert_eq!(output.format, TextFormat::CODE);
    }

    #[test]
    fn normal_weight_b_is_not_bold() {
        let rules = HtmlRules::default();
        let b = element("b", &[("style", "font-weight:normal;")]);
        assert_eq!(rules.convert(&b, &[]).unwrap().format, TextFormat::empty());
        let span = element("span", &[("style", "font-weight: 700; font-style: italic")]);
        assert_eq!(
            rules.convert(&span, &[]).unwrap().format,
            TextFormat::BOLD | TextFormat::ITALIC
        );
    }

    #[test]
    fn broken_equation_falls_through() {
        let rules = HtmlRules::default();
        let span = element("span", &[("data-lexical-equation", "%%%")]);
        let output = rules.convert(&span, &[]).unwrap();
        assert!(output.node.is_none());
    }
}

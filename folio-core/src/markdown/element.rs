//! Block rules: each one owns a whole-line (or multi-line) syntax.

use super::Transformers;
use crate::node::NodeKind;
use crate::serialized::SerializedNode;
use once_cell::sync::Lazy;
use regex::Regex;

/// A block-level Markdown rule
pub trait ElementTransformer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Build a block from the lines at the start of `lines`. Returns the
    /// block and the number of lines consumed.
    fn import(&self, lines: &[&str], transformers: &Transformers) -> Option<(SerializedNode, usize)>;

    /// Typing shortcut. `prefix` is the text before the caret at the start
    /// of a top-level paragraph, ending with the whitespace just typed. On a
    /// match, returns the block that replaces the paragraph; the rest of the
    /// paragraph's content moves into its first text container.
    fn shortcut(&self, prefix: &str) -> Option<SerializedNode>;

    /// Render a block, or `None` when the node is not handled by this rule
    fn export(&self, node: &SerializedNode, transformers: &Transformers) -> Option<String>;
}

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s").expect("valid heading regex"));
static QUOTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^>\s?").expect("valid quote regex"));
static UNORDERED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)[-*+]\s").expect("valid list regex"));
static CHECK_LIST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)(?:[-*+]\s)?\s?\[(\s|x|X)?\]\s").expect("valid checklist regex")
});
static ORDERED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)(\d{1,9})\.\s").expect("valid list regex"));
static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```([\w+#.-]*)\s*$").expect("valid fence regex"));
static FENCE_SHORTCUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```([\w+#.-]{1,20})?\s$").expect("valid fence regex"));
static GENERIC_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```(\w{1,10})?\s*$").expect("valid fence regex"));
static GENERIC_FENCE_SHORTCUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```(\w{1,10})?\s$").expect("valid fence regex"));
static BLOCK_EQUATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\$(.*)\$\$\s*$").expect("valid equation regex"));
static TABLE_ROW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\|(.*)\|\s*$").expect("valid table regex"));
static TABLE_DIVIDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\|(\s*:?-+:?\s*\|)+\s*$").expect("valid table regex"));

/// Lines of an inline export, each prefixed
fn prefix_lines(text: &str, first: &str, rest: &str) -> String {
    text.split('\n')
        .enumerate()
        .map(|(idx, line)| {
            let prefix = if idx == 0 { first } else { rest };
            format!("{prefix}{line}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inline nodes for several source lines joined by line breaks
fn import_lines(lines: &[&str], transformers: &Transformers) -> Vec<SerializedNode> {
    let mut children = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if idx > 0 {
            children.push(SerializedNode::new(NodeKind::LineBreak));
        }
        children.extend(transformers.import_inline(line));
    }
    children
}

#[derive(Debug, Default)]
pub struct HeadingTransformer;

impl ElementTransformer for HeadingTransformer {
    fn name(&self) -> &'static str {
        "heading"
    }

    fn import(&self, lines: &[&str], transformers: &Transformers) -> Option<(SerializedNode, usize)> {
        let line = lines.first()?;
        let caps = HEADING_RE.captures(line)?;
        let level = caps.get(1)?.as_str().len() as u8;
        let rest = &line[caps.get(0)?.end()..];
        Some((
            SerializedNode::with_children(NodeKind::heading(level), transformers.import_inline(rest)),
            1,
        ))
    }

    fn shortcut(&self, prefix: &str) -> Option<SerializedNode> {
        let caps = HEADING_RE.captures(prefix)?;
        if caps.get(0)?.end() != prefix.len() {
            return None;
        }
        let level = caps.get(1)?.as_str().len() as u8;
        Some(SerializedNode::new(NodeKind::heading(level)))
    }

    fn export(&self, node: &SerializedNode, transformers: &Transformers) -> Option<String> {
        let NodeKind::Heading { level } = node.kind else {
            return None;
        };
        Some(format!(
            "{} {}",
            "#".repeat(level as usize),
            transformers.export_inline(&node.children)
        ))
    }
}

#[derive(Debug, Default)]
pub struct QuoteTransformer;

impl ElementTransformer for QuoteTransformer {
    fn name(&self) -> &'static str {
        "quote"
    }

    fn import(&self, lines: &[&str], transformers: &Transformers) -> Option<(SerializedNode, usize)> {
        let body: Vec<&str> = lines
            .iter()
            .map_while(|line| QUOTE_RE.find(line).map(|m| &line[m.end()..]))
            .collect();
        if body.is_empty() {
            return None;
        }
        let consumed = body.len();
        Some((
            SerializedNode::with_children(NodeKind::Quote, import_lines(&body, transformers)),
            consumed,
        ))
    }

    fn shortcut(&self, prefix: &str) -> Option<SerializedNode> {
        (prefix.len() == 2 && prefix.starts_with('>') && prefix.ends_with(char::is_whitespace))
            .then(|| SerializedNode::new(NodeKind::Quote))
    }

    fn export(&self, node: &SerializedNode, transformers: &Transformers) -> Option<String> {
        if node.kind != NodeKind::Quote {
            return None;
        }
        Some(prefix_lines(
            &transformers.export_inline(&node.children),
            "> ",
            "> ",
        ))
    }
}

/// Bullet or numbered list; nesting is flattened on import
#[derive(Debug)]
pub struct ListTransformer {
    ordered: bool,
}

impl ListTransformer {
    pub fn unordered() -> Self {
        Self { ordered: false }
    }

    pub fn ordered() -> Self {
        Self { ordered: true }
    }

    fn regex(&self) -> &'static Regex {
        if self.ordered {
            &ORDERED_RE
        } else {
            &UNORDERED_RE
        }
    }
}

impl ElementTransformer for ListTransformer {
    fn name(&self) -> &'static str {
        if self.ordered {
            "ordered-list"
        } else {
            "unordered-list"
        }
    }

    fn import(&self, lines: &[&str], transformers: &Transformers) -> Option<(SerializedNode, usize)> {
        let mut items = Vec::new();
        let mut start = 1;
        for line in lines {
            let Some(caps) = self.regex().captures(line) else {
                break;
            };
            if self.ordered && items.is_empty() {
                start = caps
                    .get(2)
                    .and_then(|n| n.as_str().parse().ok())
                    .unwrap_or(1);
            }
            let rest = caps.get(0).map_or("", |m| &line[m.end()..]);
            items.push(SerializedNode::with_children(
                NodeKind::list_item(),
                transformers.import_inline(rest),
            ));
        }
        if items.is_empty() {
            return None;
        }
        let consumed = items.len();
        Some((
            SerializedNode::with_children(
                NodeKind::List {
                    ordered: self.ordered,
                    start,
                },
                items,
            ),
            consumed,
        ))
    }

    fn shortcut(&self, prefix: &str) -> Option<SerializedNode> {
        let caps = self.regex().captures(prefix)?;
        if caps.get(0)?.end() != prefix.len() {
            return None;
        }
        let start = if self.ordered {
            caps.get(2)?.as_str().parse().ok()?
        } else {
            1
        };
        Some(SerializedNode::with_children(
            NodeKind::List {
                ordered: self.ordered,
                start,
            },
            vec![SerializedNode::new(NodeKind::list_item())],
        ))
    }

    fn export(&self, node: &SerializedNode, transformers: &Transformers) -> Option<String> {
        let NodeKind::List { ordered, start } = node.kind else {
            return None;
        };
        if ordered != self.ordered || is_check_list(node) {
            return None;
        }
        let lines: Vec<String> = node
            .children
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                let marker = if ordered {
                    format!("{}. ", start as usize + idx)
                } else {
                    "- ".to_string()
                };
                let indent = " ".repeat(marker.len());
                prefix_lines(&transformers.export_inline(&item.children), &marker, &indent)
            })
            .collect();
        Some(lines.join("\n"))
    }
}

fn is_check_list(node: &SerializedNode) -> bool {
    node.children
        .iter()
        .any(|item| matches!(item.kind, NodeKind::ListItem { checked: Some(_) }))
}

/// Checklist: `- [ ] todo`, `- [x] done`. The bullet is optional on import
/// and when typing.
#[derive(Debug, Default)]
pub struct CheckListTransformer;

fn checked_mark(caps: &regex::Captures<'_>) -> bool {
    caps.get(2)
        .is_some_and(|mark| mark.as_str().eq_ignore_ascii_case("x"))
}

impl ElementTransformer for CheckListTransformer {
    fn name(&self) -> &'static str {
        "check-list"
    }

    fn import(&self, lines: &[&str], transformers: &Transformers) -> Option<(SerializedNode, usize)> {
        let mut items = Vec::new();
        for line in lines {
            let Some(caps) = CHECK_LIST_RE.captures(line) else {
                break;
            };
            let rest = caps.get(0).map_or("", |m| &line[m.end()..]);
            items.push(SerializedNode::with_children(
                NodeKind::check_item(checked_mark(&caps)),
                transformers.import_inline(rest),
            ));
        }
        if items.is_empty() {
            return None;
        }
        let consumed = items.len();
        Some((
            SerializedNode::with_children(NodeKind::list(false), items),
            consumed,
        ))
    }

    fn shortcut(&self, prefix: &str) -> Option<SerializedNode> {
        let caps = CHECK_LIST_RE.captures(prefix)?;
        if caps.get(0)?.end() != prefix.len() {
            return None;
        }
        Some(SerializedNode::with_children(
            NodeKind::list(false),
            vec![SerializedNode::new(NodeKind::check_item(checked_mark(&caps)))],
        ))
    }

    fn export(&self, node: &SerializedNode, transformers: &Transformers) -> Option<String> {
        if !matches!(node.kind, NodeKind::List { .. }) || !is_check_list(node) {
            return None;
        }
        let lines: Vec<String> = node
            .children
            .iter()
            .map(|item| {
                let marker = match item.kind {
                    NodeKind::ListItem {
                        checked: Some(true),
                    } => "- [x] ",
                    _ => "- [ ] ",
                };
                prefix_lines(&transformers.export_inline(&item.children), marker, "      ")
            })
            .collect();
        Some(lines.join("\n"))
    }
}

/// Fenced code block. Languages may contain `+#.-` (`c++`, `objective-c`)
/// and are trimmed; an empty block exports without a blank body line.
#[derive(Debug, Default)]
pub struct CodeFenceTransformer;

/// Collect the body of a fence opened by `lines[0]`. An unclosed fence runs
/// to the end of input.
fn fence_body<'a>(lines: &[&'a str]) -> (Vec<&'a str>, usize) {
    let mut body = Vec::new();
    for (idx, line) in lines.iter().enumerate().skip(1) {
        if line.trim_end() == "```" {
            return (body, idx + 1);
        }
        body.push(*line);
    }
    (body, lines.len())
}

fn code_export(node: &SerializedNode) -> Option<(String, String)> {
    let NodeKind::Code { language } = &node.kind else {
        return None;
    };
    Some((language.clone().unwrap_or_default(), node.text_content()))
}

impl ElementTransformer for CodeFenceTransformer {
    fn name(&self) -> &'static str {
        "code"
    }

    fn import(&self, lines: &[&str], _: &Transformers) -> Option<(SerializedNode, usize)> {
        let caps = FENCE_RE.captures(lines.first()?)?;
        let language = caps.get(1).map(|m| m.as_str());
        let (body, consumed) = fence_body(lines);
        Some((SerializedNode::code(language, &body.join("\n")), consumed))
    }

    fn shortcut(&self, prefix: &str) -> Option<SerializedNode> {
        let caps = FENCE_SHORTCUT_RE.captures(prefix)?;
        Some(SerializedNode::new(NodeKind::code(
            caps.get(1).map(|m| m.as_str()),
        )))
    }

    fn export(&self, node: &SerializedNode, _: &Transformers) -> Option<String> {
        let (language, text) = code_export(node)?;
        if text.is_empty() {
            Some(format!("```{language}\n```"))
        } else {
            Some(format!("```{language}\n{text}\n```"))
        }
    }
}

/// Plain fenced code: word-only language tags of up to ten characters, and
/// an empty body line for empty blocks. Listed after
/// [`CodeFenceTransformer`], so it only sees what that rule declines.
#[derive(Debug, Default)]
pub struct GenericCodeFenceTransformer;

impl ElementTransformer for GenericCodeFenceTransformer {
    fn name(&self) -> &'static str {
        "generic-code"
    }

    fn import(&self, lines: &[&str], _: &Transformers) -> Option<(SerializedNode, usize)> {
        let caps = GENERIC_FENCE_RE.captures(lines.first()?)?;
        let language = caps.get(1).map(|m| m.as_str());
        let (body, consumed) = fence_body(lines);
        Some((SerializedNode::code(language, &body.join("\n")), consumed))
    }

    fn shortcut(&self, prefix: &str) -> Option<SerializedNode> {
        let caps = GENERIC_FENCE_SHORTCUT_RE.captures(prefix)?;
        Some(SerializedNode::new(NodeKind::code(
            caps.get(1).map(|m| m.as_str()),
        )))
    }

    fn export(&self, node: &SerializedNode, _: &Transformers) -> Option<String> {
        let (language, text) = code_export(node)?;
        Some(format!("```{language}\n{text}\n```"))
    }
}

/// Display math delimited by `$$`
#[derive(Debug, Default)]
pub struct BlockEquationTransformer;

impl ElementTransformer for BlockEquationTransformer {
    fn name(&self) -> &'static str {
        "block-equation"
    }

    fn import(&self, lines: &[&str], _: &Transformers) -> Option<(SerializedNode, usize)> {
        let first = lines.first()?;
        if let Some(caps) = BLOCK_EQUATION_RE.captures(first) {
            let equation = caps.get(1).map_or("", |m| m.as_str());
            if !equation.contains("$$") {
                return Some((SerializedNode::new(NodeKind::equation(equation, false)), 1));
            }
        }
        // Multi-line form: an opening line of just `$$`, closed by a line
        // ending in `$$`. Without a close the lines stay paragraphs.
        if first.trim_end() != "$$" {
            return None;
        }
        let mut body = Vec::new();
        for (idx, line) in lines.iter().enumerate().skip(1) {
            if let Some(last) = line.trim_end().strip_suffix("$$") {
                body.push(last);
                let equation = body.join("\n");
                return Some((
                    SerializedNode::new(NodeKind::equation(equation.trim_matches('\n'), false)),
                    idx + 1,
                ));
            }
            body.push(*line);
        }
        None
    }

    fn shortcut(&self, prefix: &str) -> Option<SerializedNode> {
        (prefix.len() == 3 && prefix.starts_with("$$") && prefix.ends_with(char::is_whitespace))
            .then(|| SerializedNode::new(NodeKind::equation("", false)))
    }

    fn export(&self, node: &SerializedNode, _: &Transformers) -> Option<String> {
        match &node.kind {
            NodeKind::Equation {
                equation,
                inline: false,
            } => Some(format!("$${equation}$$")),
            _ => None,
        }
    }
}

/// Pipe tables. A divider row after the first row marks it as a header.
#[derive(Debug, Default)]
pub struct TableTransformer;

fn split_cells(line: &str) -> Vec<&str> {
    let inner = TABLE_ROW_RE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map_or("", |m| m.as_str());
    inner.split('|').map(str::trim).collect()
}

impl ElementTransformer for TableTransformer {
    fn name(&self) -> &'static str {
        "table"
    }

    fn import(&self, lines: &[&str], transformers: &Transformers) -> Option<(SerializedNode, usize)> {
        let rows: Vec<&str> = lines
            .iter()
            .take_while(|line| TABLE_ROW_RE.is_match(line))
            .copied()
            .collect();
        if rows.is_empty() {
            return None;
        }
        let has_header = rows.len() > 1 && TABLE_DIVIDER_RE.is_match(rows[1]);

        let mut table_rows = Vec::new();
        for (idx, row) in rows.iter().enumerate() {
            if has_header && idx == 1 {
                continue;
            }
            let header = has_header && idx == 0;
            let cells = split_cells(row)
                .into_iter()
                .map(|cell| {
                    SerializedNode::with_children(
                        NodeKind::table_cell(header),
                        vec![SerializedNode::paragraph(transformers.import_inline(cell))],
                    )
                })
                .collect();
            table_rows.push(SerializedNode::with_children(NodeKind::TableRow, cells));
        }
        Some((
            SerializedNode::with_children(NodeKind::Table, table_rows),
            rows.len(),
        ))
    }

    fn shortcut(&self, _prefix: &str) -> Option<SerializedNode> {
        None
    }

    fn export(&self, node: &SerializedNode, transformers: &Transformers) -> Option<String> {
        if node.kind != NodeKind::Table {
            return None;
        }
        let mut lines = Vec::new();
        for (idx, row) in node.children.iter().enumerate() {
            let cells: Vec<String> = row
                .children
                .iter()
                .map(|cell| {
                    cell.children
                        .iter()
                        .map(|block| transformers.export_inline(&block.children))
                        .collect::<Vec<_>>()
                        .join(" ")
                        .replace('\n', " ")
                })
                .collect();
            lines.push(format!("| {} |", cells.join(" | ")));

            let is_header = row
                .children
                .iter()
                .any(|cell| matches!(cell.kind, NodeKind::TableCell { header: true }));
            if idx == 0 && is_header {
                let divider = vec!["---"; cells.len()];
                lines.push(format!("| {} |", divider.join(" | ")));
            }
        }
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_import_consumes_until_close() {
        let t = Transformers::default();
        let lines = ["```python", "print(1)", "```", "after"];
        let (node, consumed) = CodeFenceTransformer.import(&lines, &t).unwrap();
        assert_eq!(consumed, 3);
        assert_eq!(node.kind, NodeKind::code(Some("python")));
        assert_eq!(node.text_content(), "print(1)");
    }

    #[test]
    fn unclosed_fence_runs_to_end() {
        let t = Transformers::default();
        let lines = ["```", "a", "", "b"];
        let (node, consumed) = CodeFenceTransformer.import(&lines, &t).unwrap();
        assert_eq!(consumed, 4);
        assert_eq!(node.text_content(), "a\n\nb");
    }

    #[test]
    fn custom_fence_accepts_symbolic_languages() {
        assert_eq!(
            CodeFenceTransformer.shortcut("```c++ "),
            Some(SerializedNode::new(NodeKind::code(Some("c++"))))
        );
        assert_eq!(GenericCodeFenceTransformer.shortcut("```c++ "), None);
    }

    #[test]
    fn empty_code_exports_differ_between_fence_rules() {
        let t = Transformers::default();
        let empty = SerializedNode::new(NodeKind::code(Some("rust")));
        assert_eq!(
            CodeFenceTransformer.export(&empty, &t).as_deref(),
            Some("```rust\n```")
        );
        assert_eq!(
            GenericCodeFenceTransformer.export(&empty, &t).as_deref(),
            Some("```rust\n\n```")
        );
    }

    #[test]
    fn multi_line_block_equation() {
        let t = Transformers::default();
        let lines = ["$$", "a = b", "c = d$$", "tail"];
        let (node, consumed) = BlockEquationTransformer.import(&lines, &t).unwrap();
        assert_eq!(consumed, 3);
        assert_eq!(node.kind, NodeKind::equation("a = b\nc = d", false));
    }

    #[test]
    fn table_with_header() {
        let t = Transformers::default();
        let lines = ["| a | b |", "| --- | --- |", "| 1 | 2 |"];
        let (node, consumed) = TableTransformer.import(&lines, &t).unwrap();
        assert_eq!(consumed, 3);
        assert_eq!(node.children.len(), 2);
        assert_eq!(
            node.children[0].children[0].kind,
            NodeKind::table_cell(true)
        );
        assert_eq!(
            TableTransformer.export(&node, &t).unwrap(),
            lines.join("\n")
        );
    }

    #[test]
    fn ordered_list_keeps_start() {
        let t = Transformers::default();
        let lines = ["3. c", "4. d"];
        let (node, _) = ListTransformer::ordered().import(&lines, &t).unwrap();
        assert_eq!(
            node.kind,
            NodeKind::List {
                ordered: true,
                start: 3
            }
        );
        assert_eq!(
            ListTransformer::ordered().export(&node, &t).unwrap(),
            "3. c\n4. d"
        );
        assert!(ListTransformer::unordered().export(&node, &t).is_none());
    }

    #[test]
    fn check_list_import_and_export() {
        let t = Transformers::default();
        let lines = ["- [ ] milk", "- [x] eggs", "* [X] jam", "- plain"];
        let (node, consumed) = CheckListTransformer.import(&lines, &t).unwrap();
        assert_eq!(consumed, 3);
        let checked: Vec<_> = node
            .children
            .iter()
            .map(|item| item.kind.clone())
            .collect();
        assert_eq!(
            checked,
            [
                NodeKind::check_item(false),
                NodeKind::check_item(true),
                NodeKind::check_item(true)
            ]
        );
        assert_eq!(
            CheckListTransformer.export(&node, &t).unwrap(),
            "- [ ] milk\n- [x] eggs\n- [x] jam"
        );
        assert!(ListTransformer::unordered().export(&node, &t).is_none());
    }

    #[test]
    fn check_list_shortcut() {
        assert_eq!(
            CheckListTransformer.shortcut("[x] "),
            Some(SerializedNode::with_children(
                NodeKind::list(false),
                vec![SerializedNode::new(NodeKind::check_item(true))],
            ))
        );
        assert!(CheckListTransformer.shortcut("[ ] ").is_some());
        assert!(CheckListTransformer.shortcut("[ ]").is_none());
        assert!(CheckListTransformer.shortcut("[y] ").is_none());
    }

    #[test]
    fn heading_shortcut_requires_full_prefix() {
        assert!(HeadingTransformer.shortcut("## ").is_some());
        assert!(HeadingTransformer.shortcut("##").is_none());
        assert!(HeadingTransformer.shortcut("## x ").is_none());
    }
}

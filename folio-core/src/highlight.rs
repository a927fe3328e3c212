//! Code syntax highlighting using syntect.
//!
//! [`CodeHighlighter`] is a node transform: whenever a code node is touched
//! by a transaction it re-lays the node's children as one line per run of
//! text runs separated by line-break nodes, each run tagged with a token
//! class. The rewrite is skipped when the children already match, which
//! keeps the transform idempotent.

use crate::config::HighlightConfig;
use crate::editor::Editor;
use crate::error::Result;
use crate::mutation::NodeTransform;
use crate::node::{NodeKey, NodeKind, NodeType, TextFormat};
use crate::selection::{char_len, Caret};
use std::sync::OnceLock;
use syntect::easy::ScopeRangeIterator;
use syntect::parsing::{ParseState, ScopeStack, SyntaxReference, SyntaxSet};
use tracing::warn;

static SYNTAX_SET: OnceLock<SyntaxSet> = OnceLock::new();

fn syntax_set() -> &'static SyntaxSet {
    SYNTAX_SET.get_or_init(SyntaxSet::load_defaults_nonewlines)
}

fn find_syntax<'a>(ss: &'a SyntaxSet, lang: &str) -> &'a SyntaxReference {
    ss.find_syntax_by_token(lang)
        .or_else(|| ss.find_syntax_by_extension(lang))
        .unwrap_or_else(|| ss.find_syntax_plain_text())
}

/// A run of code text sharing one token class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub class: Option<String>,
}

/// Split `code` into lines of tokens. Unknown languages and parser failures
/// produce unclassified tokens.
pub fn tokenize(code: &str, language: Option<&str>) -> Vec<Vec<Token>> {
    let ss = syntax_set();
    let syntax = match language {
        Some(lang) => find_syntax(ss, lang),
        None => ss.find_syntax_plain_text(),
    };
    let mut state = ParseState::new(syntax);
    let mut stack = ScopeStack::new();

    let mut lines = Vec::new();
    for line in code.split('\n') {
        match tokenize_line(line, &mut state, &mut stack, ss) {
            Ok(tokens) => lines.push(tokens),
            Err(err) => {
                warn!("Highlighting {:?} failed: {err}", language);
                return plain_lines(code);
            }
        }
    }
    lines
}

fn plain_lines(code: &str) -> Vec<Vec<Token>> {
    code.split('\n')
        .map(|line| {
            if line.is_empty() {
                Vec::new()
            } else {
                vec![Token {
                    text: line.to_string(),
                    class: None,
                }]
            }
        })
        .collect()
}

fn tokenize_line(
    line: &str,
    state: &mut ParseState,
    stack: &mut ScopeStack,
    ss: &SyntaxSet,
) -> std::result::Result<Vec<Token>, String> {
    let ops = state.parse_line(line, ss).map_err(|e| e.to_string())?;
    let mut tokens: Vec<Token> = Vec::new();
    for (range, op) in ScopeRangeIterator::new(&ops, line) {
        stack.apply(op).map_err(|e| e.to_string())?;
        if range.is_empty() {
            continue;
        }
        let class = classify(stack);
        let text = &line[range];
        match tokens.last_mut() {
            Some(last) if last.class == class => last.text.push_str(text),
            _ => tokens.push(Token {
                text: text.to_string(),
                class,
            }),
        }
    }
    Ok(tokens)
}

/// Token class of the innermost meaningful scope (`keyword`, `string`,
/// `comment`, `number`, `function`, ...)
fn classify(stack: &ScopeStack) -> Option<String> {
    for scope in stack.as_slice().iter().rev() {
        let name = scope.build_string();
        let first = name.split('.').next().unwrap_or_default();
        match first {
            "" | "source" | "text" | "meta" => continue,
            "constant" if name.starts_with("constant.numeric") => return Some("number".into()),
            "entity" if name.starts_with("entity.name.function") => {
                return Some("function".into())
            }
            other => return Some(other.to_string()),
        }
    }
    None
}

/// Node transform keeping code children split into highlighted lines
#[derive(Debug, Clone, Default)]
pub struct CodeHighlighter {
    config: HighlightConfig,
}

impl CodeHighlighter {
    pub fn new(config: HighlightConfig) -> Self {
        Self { config }
    }

    /// Desired children for a code node holding `code`
    pub fn layout(&self, code: &str, language: Option<&str>) -> Vec<NodeKind> {
        let lines = if self.config.enabled {
            tokenize(code, language)
        } else {
            plain_lines(code)
        };
        let mut children = Vec::new();
        for (idx, tokens) in lines.into_iter().enumerate() {
            if idx > 0 {
                children.push(NodeKind::LineBreak);
            }
            for token in tokens {
                children.push(NodeKind::Text {
                    text: token.text,
                    format: TextFormat::empty(),
                    highlight: token.class,
                });
            }
        }
        children
    }
}

impl NodeTransform for CodeHighlighter {
    fn node_type(&self) -> NodeType {
        NodeType::Code
    }

    fn transform(&mut self, editor: &mut Editor, key: NodeKey) -> Result<()> {
        let node = editor.node(key)?;
        let language = match node.kind() {
            NodeKind::Code { language } => language.clone(),
            _ => return Ok(()),
        };
        let current: Vec<NodeKind> = node
            .children()
            .iter()
            .filter_map(|child| editor.get(*child))
            .map(|child| child.kind().clone())
            .collect();
        let code = editor.text_content(key);
        let desired = self.layout(&code, language.as_deref());
        if desired == current {
            return Ok(());
        }

        let caret_offset = caret_offset_in_code(editor, key);
        editor.clear_children(key)?;
        for kind in desired {
            let child = editor.create(kind)?;
            editor.append(key, child)?;
        }
        if let Some(offset) = caret_offset {
            place_caret_in_code(editor, key, offset);
        }
        Ok(())
    }
}

fn child_len(kind: &NodeKind) -> usize {
    match kind {
        NodeKind::Text { text, .. } => char_len(text),
        NodeKind::LineBreak => 1,
        _ => 0,
    }
}

/// Character offset of the caret within the code node's text, if the caret
/// is inside it
fn caret_offset_in_code(editor: &Editor, code: NodeKey) -> Option<usize> {
    let caret = editor.caret()?;
    let children = editor.children(code).ok()?;
    let lengths = children
        .iter()
        .map(|child| editor.get(*child).map_or(0, |n| child_len(n.kind())));

    if caret.key == code {
        return Some(lengths.take(caret.offset).sum());
    }
    let index = children.iter().position(|child| *child == caret.key)?;
    Some(lengths.take(index).sum::<usize>() + caret.offset)
}

fn place_caret_in_code(editor: &mut Editor, code: NodeKey, offset: usize) {
    let Ok(children) = editor.children(code) else {
        return;
    };
    let mut remaining = offset;
    let mut target = Caret::new(code, children.len());
    for (index, child) in children.iter().enumerate() {
        let Some(node) = editor.get(*child) else {
            continue;
        };
        match node.kind() {
            NodeKind::Text { text, .. } => {
                let len = char_len(text);
                if remaining <= len {
                    target = Caret::new(*child, remaining);
                    break;
                }
                remaining -= len;
            }
            NodeKind::LineBreak => {
                if remaining == 0 {
                    target = Caret::new(code, index);
                    break;
                }
                remaining -= 1;
            }
            _ => {}
        }
    }
    editor.set_caret(Some(target));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_tokens_are_classified() {
        let lines = tokenize("def f():\n    return 1", Some("python"));
        assert_eq!(lines.len(), 2);
        let rebuilt: Vec<String> = lines
            .iter()
            .map(|tokens| tokens.iter().map(|t| t.text.as_str()).collect())
            .collect();
        assert_eq!(rebuilt, vec!["def f():", "    return 1"]);
        assert!(lines[0]
            .iter()
            .any(|t| t.text == "def" && t.class.as_deref() == Some("storage")
                || t.text == "def" && t.class.as_deref() == Some("keyword")));
    }

    #[test]
    fn unknown_language_is_plain() {
        let lines = tokenize("a b c", Some("no-such-language"));
        assert_eq!(
            lines,
            vec![vec![Token {
                text: "a b c".into(),
                class: None
            }]]
        );
    }

    #[test]
    fn layout_splits_lines() {
        let highlighter = CodeHighlighter::new(HighlightConfig { enabled: false });
        let children = highlighter.layout("a\n\nb", None);
        assert_eq!(
            children,
            vec![
                NodeKind::text("a"),
                NodeKind::LineBreak,
                NodeKind::LineBreak,
                NodeKind::text("b"),
            ]
        );
        assert!(highlighter.layout("", None).is_empty());
    }

    #[test]
    fn caret_survives_relayout() {
        let mut ed = Editor::new();
        let code = ed
            .update(|ed| {
                let code = ed.create(NodeKind::code(None))?;
                let root = ed.root();
                ed.append(root, code)?;
                Ok(code)
            })
            .unwrap();
        ed.set_caret(Some(Caret::new(code, 0)));
        for ch in ["a", "b", "\n", "c"] {
            ed.update(|ed| ed.insert_text(ch).map(|_| ())).unwrap();
        }
        assert_eq!(ed.text_content(code), "ab\nc");
        let caret = ed.caret().unwrap();
        let last = *ed.children(code).unwrap().last().unwrap();
        assert_eq!(caret, Caret::new(last, 1));
    }
}

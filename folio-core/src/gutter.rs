//! Line-number gutter for code blocks.

use crate::editor::Editor;
use crate::mutation::{Decoration, DeferredWrites, MutationKind, MutationListener, NodeMutation};
use crate::node::{NodeKey, NodeKind};

/// Build the gutter text for a sequence of code children: one number per
/// visual line, joined by newlines.
pub fn gutter_text<'a>(children: impl IntoIterator<Item = &'a NodeKind>) -> String {
    let mut count = 1;
    let mut gutter = String::from("1");
    for child in children {
        let breaks = match child {
            NodeKind::LineBreak => 1,
            NodeKind::Text { text, .. } => text.matches('\n').count(),
            _ => 0,
        };
        for _ in 0..breaks {
            count += 1;
            gutter.push('\n');
            gutter.push_str(&count.to_string());
        }
    }
    gutter
}

/// Number of visual lines described by a gutter string
pub fn line_count(gutter: &str) -> usize {
    gutter.lines().count()
}

/// Keeps [`Decoration::Gutter`] current for every code node touched by a
/// commit.
#[derive(Debug, Default)]
pub struct CodeGutterListener;

impl CodeGutterListener {
    fn refresh(&self, key: NodeKey, editor: &Editor, writes: &mut DeferredWrites) {
        // Detached between commit and dispatch: nothing to draw
        let Some(node) = editor.get(key) else {
            return;
        };
        let child_count = node.children().len();
        if let Some(Decoration::Gutter {
            child_count: cached,
            ..
        }) = editor.decoration(key)
        {
            if *cached == child_count {
                return;
            }
        }
        let text = gutter_text(
            node.children()
                .iter()
                .filter_map(|child| editor.get(*child))
                .map(|child| child.kind()),
        );
        writes.push(key, Decoration::Gutter { child_count, text });
    }
}

impl MutationListener for CodeGutterListener {
    fn on_mutations(
        &mut self,
        mutations: &[NodeMutation],
        editor: &Editor,
        writes: &mut DeferredWrites,
    ) {
        for mutation in mutations {
            if mutation.kind == MutationKind::Destroyed {
                continue;
            }
            self.refresh(mutation.key, editor, writes);
        }
    }
}

//! # Editor
//!
//! One editing session over one document. The editor owns the node arena,
//! the transaction state machine and the notification channels.
//!
//! ## Lifecycle of a transaction
//!
//! ```text
//! Idle ──begin──▶ Updating ──commit──▶ Dispatching ──▶ Idle
//!                    │   transforms, GC      │ listeners, broadcast
//!                    └──rollback──▶ Idle     └─▶ decoration writes
//! ```
//!
//! Mutations are only accepted while `Updating`. Opening a second scope in
//! any phase other than `Idle` fails with
//! [`EditorError::ConcurrentTransaction`].

use crate::autolink::AutoLinker;
use crate::config::Config;
use crate::error::{EditorError, Result};
use crate::gutter::CodeGutterListener;
use crate::highlight::CodeHighlighter;
use crate::mutation::{
    Decoration, DeferredWrites, ListenerId, MutationBatch, MutationKind, MutationListener,
    NodeMutation, NodeTransform, RegisteredListener,
};
use crate::node::{ImageSource, Node, NodeKey, NodeKind, NodeType, TextFormat};
use crate::resources::ImageBindings;
use crate::selection::Caret;
use crate::serialized::{SerializedEditorState, SerializedNode};
use crate::trailing::TrailingParagraph;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Upper bound on transform passes per commit
const MAX_TRANSFORM_PASSES: usize = 16;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Updating,
    Dispatching,
}

struct OpenTransaction {
    /// Value of every touched node before its first write; `None` for
    /// nodes created in this transaction
    undo: HashMap<NodeKey, Option<Node>>,
    caret: Option<Caret>,
    dirty: BTreeSet<NodeKey>,
    /// Image bindings to drop once the transaction commits
    forget: Vec<NodeKey>,
}

impl OpenTransaction {
    fn created(&self, key: &NodeKey) -> bool {
        matches!(self.undo.get(key), Some(None))
    }
}

/// A document editing session
pub struct Editor {
    pub(crate) nodes: HashMap<NodeKey, Node>,
    root: NodeKey,
    phase: Phase,
    open: Option<OpenTransaction>,
    seq: u64,
    listeners: Vec<RegisteredListener>,
    next_listener: usize,
    transforms: Vec<Box<dyn NodeTransform>>,
    decorations: HashMap<NodeKey, Decoration>,
    pub(crate) images: ImageBindings,
    pub(crate) caret: Option<Caret>,
    events: broadcast::Sender<Arc<MutationBatch>>,
    config: Config,
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("root", &self.root)
            .field("nodes", &self.nodes.len())
            .field("phase", &self.phase)
            .field("seq", &self.seq)
            .finish()
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

impl Editor {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create an empty editor with the code highlighter transform and the
    /// gutter listener installed, plus the autolink and trailing paragraph
    /// transforms unless the config turns them off.
    pub fn with_config(config: Config) -> Self {
        let root = Node::new(NodeKind::Root);
        let root_key = root.key;
        let mut nodes = HashMap::new();
        nodes.insert(root_key, root);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let mut editor = Self {
            nodes,
            root: root_key,
            phase: Phase::Idle,
            open: None,
            seq: 0,
            listeners: Vec::new(),
            next_listener: 0,
            transforms: Vec::new(),
            decorations: HashMap::new(),
            images: ImageBindings::default(),
            caret: None,
            events,
            config,
        };
        editor.register_transform(Box::new(CodeHighlighter::new(
            editor.config.highlight.clone(),
        )));
        if editor.config.editor.autolink {
            editor.register_transform(Box::new(AutoLinker));
        }
        if editor.config.editor.trailing_paragraph {
            editor.register_transform(Box::new(TrailingParagraph));
        }
        editor.register_mutation_listener(NodeType::Code, Box::new(CodeGutterListener));
        editor
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Sequence number of the last committed batch (0 before any commit)
    pub fn seq(&self) -> u64 {
        self.seq
    }

    // ---------------------------------------------------------------------
    // Subscriptions
    // ---------------------------------------------------------------------

    /// Receive every committed batch, in commit order
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<MutationBatch>> {
        self.events.subscribe()
    }

    pub fn register_mutation_listener(
        &mut self,
        node_type: NodeType,
        listener: Box<dyn MutationListener>,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push(RegisteredListener {
            id,
            node_type,
            listener,
        });
        id
    }

    pub fn unregister_mutation_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|reg| reg.id != id);
        self.listeners.len() != before
    }

    pub fn register_transform(&mut self, transform: Box<dyn NodeTransform>) {
        self.transforms.push(transform);
    }

    // ---------------------------------------------------------------------
    // Transactions
    // ---------------------------------------------------------------------

    /// Open an update scope
    pub fn begin(&mut self) -> Result<()> {
        if self.phase != Phase::Idle {
            return Err(EditorError::ConcurrentTransaction);
        }
        self.open = Some(OpenTransaction {
            undo: HashMap::new(),
            caret: self.caret,
            dirty: BTreeSet::new(),
            forget: Vec::new(),
        });
        self.phase = Phase::Updating;
        Ok(())
    }

    /// Discard every change made since [`begin`](Self::begin)
    pub fn rollback(&mut self) {
        if let Some(open) = self.open.take() {
            for (key, original) in open.undo {
                match original {
                    Some(node) => {
                        self.nodes.insert(key, node);
                    }
                    None => {
                        self.nodes.remove(&key);
                    }
                }
            }
            self.caret = open.caret;
        }
        self.phase = Phase::Idle;
    }

    /// Close the update scope: run node transforms, collect detached nodes,
    /// then notify listeners and subscribers with one batch.
    ///
    /// Returns `None` when the transaction changed nothing.
    pub fn commit(&mut self) -> Result<Option<Arc<MutationBatch>>> {
        if self.phase != Phase::Updating {
            return Err(EditorError::NoTransaction);
        }
        if let Err(err) = self.run_transforms() {
            self.rollback();
            return Err(err);
        }
        let Some(open) = self.open.take() else {
            self.phase = Phase::Idle;
            return Err(EditorError::NoTransaction);
        };

        let mut mutations: BTreeMap<NodeKey, NodeMutation> = BTreeMap::new();

        let reachable = self.reachable();
        let detached: Vec<NodeKey> = self
            .nodes
            .keys()
            .filter(|key| !reachable.contains(key))
            .copied()
            .collect();
        for key in detached {
            let Some(removed) = self.nodes.remove(&key) else {
                continue;
            };
            self.decorations.remove(&key);
            self.images.forget(key);
            if !open.created(&key) {
                mutations.insert(
                    key,
                    NodeMutation {
                        key,
                        node_type: removed.node_type(),
                        kind: MutationKind::Destroyed,
                    },
                );
            }
        }
        for key in &open.forget {
            self.images.forget(*key);
        }

        for key in &open.dirty {
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            let kind = if open.created(key) {
                MutationKind::Created
            } else {
                MutationKind::Updated
            };
            mutations.insert(
                *key,
                NodeMutation {
                    key: *key,
                    node_type: node.node_type(),
                    kind,
                },
            );
        }

        if let Some(caret) = self.caret {
            if !self.nodes.contains_key(&caret.key) {
                self.caret = None;
            }
        }

        if mutations.is_empty() {
            self.phase = Phase::Idle;
            return Ok(None);
        }

        self.seq += 1;
        let batch = Arc::new(MutationBatch {
            seq: self.seq,
            mutations: mutations.into_values().collect(),
        });
        debug!(
            seq = batch.seq,
            mutations = batch.mutations.len(),
            "committed transaction"
        );
        self.dispatch(&batch);
        Ok(Some(batch))
    }

    /// Run `f` inside a transaction. An error from `f` (or from commit)
    /// rolls back every change made inside the scope.
    pub fn update<T>(&mut self, f: impl FnOnce(&mut Editor) -> Result<T>) -> Result<T> {
        self.begin()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                self.rollback();
                Err(err)
            }
        }
    }

    fn dispatch(&mut self, batch: &Arc<MutationBatch>) {
        self.phase = Phase::Dispatching;

        let mut listeners = std::mem::take(&mut self.listeners);
        let mut writes = DeferredWrites::default();
        for reg in listeners.iter_mut() {
            let relevant: Vec<NodeMutation> = batch.of_type(reg.node_type).copied().collect();
            if relevant.is_empty() {
                continue;
            }
            reg.listener.on_mutations(&relevant, self, &mut writes);
        }
        self.listeners = listeners;

        // No receivers is not an error
        let _ = self.events.send(Arc::clone(batch));

        self.phase = Phase::Idle;
        for (key, decoration) in writes.into_inner() {
            if self.nodes.contains_key(&key) {
                self.decorations.insert(key, decoration);
            }
        }
    }

    fn run_transforms(&mut self) -> Result<()> {
        if self.transforms.is_empty() {
            return Ok(());
        }
        let mut transforms = std::mem::take(&mut self.transforms);
        let result = self.run_transform_passes(&mut transforms);
        self.transforms = transforms;
        result
    }

    fn run_transform_passes(&mut self, transforms: &mut [Box<dyn NodeTransform>]) -> Result<()> {
        for _ in 0..MAX_TRANSFORM_PASSES {
            let dirty: Vec<NodeKey> = match &self.open {
                Some(open) => open.dirty.iter().copied().collect(),
                None => return Ok(()),
            };
            for key in &dirty {
                let Some(node_type) = self.nodes.get(key).map(Node::node_type) else {
                    continue;
                };
                if !self.is_attached(*key) {
                    continue;
                }
                for transform in transforms.iter_mut() {
                    if transform.node_type() == node_type {
                        transform.transform(self, *key)?;
                    }
                }
            }
            let grown = self.open.as_ref().map_or(0, |open| open.dirty.len());
            if grown == dirty.len() {
                return Ok(());
            }
        }
        warn!("node transforms did not settle after {MAX_TRANSFORM_PASSES} passes");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.phase == Phase::Updating {
            Ok(())
        } else {
            Err(EditorError::NoTransaction)
        }
    }

    /// Mark `key` and all its ancestors as changed in the open transaction
    fn mark_dirty(&mut self, key: NodeKey) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        let mut current = Some(key);
        while let Some(k) = current {
            open.dirty.insert(k);
            current = self.nodes.get(&k).and_then(|n| n.parent);
        }
    }

    fn reachable(&self) -> HashSet<NodeKey> {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(key) = stack.pop() {
            if !seen.insert(key) {
                continue;
            }
            if let Some(node) = self.nodes.get(&key) {
                stack.extend(node.children.iter().copied());
            }
        }
        seen
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub fn get(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(&key)
    }

    pub fn node(&self, key: NodeKey) -> Result<&Node> {
        self.nodes.get(&key).ok_or(EditorError::NodeNotFound(key))
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    /// Number of nodes in the arena, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes
            .get(&self.root)
            .map_or(true, |root| root.children.is_empty())
    }

    pub fn children(&self, key: NodeKey) -> Result<&[NodeKey]> {
        Ok(&self.node(key)?.children)
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes.get(&key).and_then(|n| n.parent)
    }

    pub fn index_in_parent(&self, key: NodeKey) -> Option<usize> {
        let parent = self.parent(key)?;
        self.nodes
            .get(&parent)?
            .children
            .iter()
            .position(|child| *child == key)
    }

    /// Whether `key` is connected to the root
    pub fn is_attached(&self, key: NodeKey) -> bool {
        let mut current = key;
        loop {
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    fn is_ancestor(&self, ancestor: NodeKey, key: NodeKey) -> bool {
        let mut current = self.parent(key);
        while let Some(k) = current {
            if k == ancestor {
                return true;
            }
            current = self.parent(k);
        }
        false
    }

    /// The block directly under the root that contains `key`
    pub fn top_level_block(&self, key: NodeKey) -> Option<NodeKey> {
        let mut current = key;
        loop {
            let parent = self.parent(current)?;
            if parent == self.root {
                return Some(current);
            }
            current = parent;
        }
    }

    pub fn text_content(&self, key: NodeKey) -> String {
        let mut out = String::new();
        self.push_text(key, &mut out);
        out
    }

    fn push_text(&self, key: NodeKey, out: &mut String) {
        if let Some(node) = self.nodes.get(&key) {
            out.push_str(node.kind.own_text());
            for child in &node.children {
                self.push_text(*child, out);
            }
        }
    }

    pub fn decoration(&self, key: NodeKey) -> Option<&Decoration> {
        self.decorations.get(&key)
    }

    /// Rendered line numbers of a code node, once computed
    pub fn gutter(&self, key: NodeKey) -> Option<&str> {
        match self.decorations.get(&key) {
            Some(Decoration::Gutter { text, .. }) => Some(text),
            _ => None,
        }
    }

    /// All attached nodes of a type, in document order
    pub fn nodes_of_type(&self, node_type: NodeType) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(key) = stack.pop() {
            if let Some(node) = self.nodes.get(&key) {
                if node.node_type() == node_type {
                    out.push(key);
                }
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    pub fn serialize_node(&self, key: NodeKey) -> Result<SerializedNode> {
        let node = self.node(key)?;
        let children = node
            .children
            .iter()
            .map(|child| self.serialize_node(*child))
            .collect::<Result<Vec<_>>>()?;
        Ok(SerializedNode::with_children(node.kind.clone(), children))
    }

    /// Key-free copy of the whole document
    pub fn snapshot(&self) -> SerializedEditorState {
        let root = self
            .serialize_node(self.root)
            .unwrap_or_else(|_| SerializedNode::new(NodeKind::Root));
        SerializedEditorState { root }
    }

    pub fn to_json(&self) -> Result<String> {
        self.snapshot().to_json()
    }

    // ---------------------------------------------------------------------
    // Mutations (require an open transaction)
    // ---------------------------------------------------------------------

    /// Mutable access to a node, recording its current value for rollback
    fn node_mut(&mut self, key: NodeKey) -> Result<&mut Node> {
        let node = self
            .nodes
            .get_mut(&key)
            .ok_or(EditorError::NodeNotFound(key))?;
        if let Some(open) = self.open.as_mut() {
            open.undo.entry(key).or_insert_with(|| Some(node.clone()));
        }
        Ok(node)
    }

    /// Construct a detached node. It must be attached before commit or it is
    /// collected.
    pub fn create(&mut self, kind: NodeKind) -> Result<NodeKey> {
        self.ensure_open()?;
        if kind == NodeKind::Root {
            return Err(EditorError::InvalidStructure(
                "an editor has exactly one root".into(),
            ));
        }
        let node = Node::new(kind);
        let key = node.key;
        self.nodes.insert(key, node);
        if let Some(open) = self.open.as_mut() {
            open.undo.insert(key, None);
        }
        self.mark_dirty(key);
        Ok(key)
    }

    /// Materialize a serialized subtree as detached nodes
    pub fn create_tree(&mut self, tree: &SerializedNode) -> Result<NodeKey> {
        self.ensure_open()?;
        tree.validate().map_err(EditorError::MalformedNode)?;
        self.build_tree(tree)
    }

    fn build_tree(&mut self, tree: &SerializedNode) -> Result<NodeKey> {
        let key = self.create(tree.kind.clone())?;
        for child in &tree.children {
            let child_key = self.build_tree(child)?;
            self.append(key, child_key)?;
        }
        Ok(key)
    }

    /// Attach a detached node under `parent` at `index` (clamped to the
    /// child count).
    pub fn insert(&mut self, parent: NodeKey, index: usize, child: NodeKey) -> Result<()> {
        self.ensure_open()?;
        self.check_attachable(parent, child)?;
        let parent_node = self.node_mut(parent)?;
        let index = index.min(parent_node.children.len());
        parent_node.children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        self.mark_dirty(child);
        Ok(())
    }

    pub fn append(&mut self, parent: NodeKey, child: NodeKey) -> Result<()> {
        self.insert(parent, usize::MAX, child)
    }

    pub fn insert_tree(
        &mut self,
        parent: NodeKey,
        index: usize,
        tree: &SerializedNode,
    ) -> Result<NodeKey> {
        let key = self.create_tree(tree)?;
        self.insert(parent, index, key)?;
        Ok(key)
    }

    fn check_attachable(&self, parent: NodeKey, child: NodeKey) -> Result<()> {
        if child == self.root {
            return Err(EditorError::InvalidStructure(
                "the root cannot be attached".into(),
            ));
        }
        let child_node = self.node(child)?;
        if child_node.parent.is_some() {
            return Err(EditorError::InvalidStructure(format!(
                "node {child} is already attached"
            )));
        }
        let parent_node = self.node(parent)?;
        if !parent_node.kind.accepts(&child_node.kind) {
            return Err(EditorError::InvalidStructure(format!(
                "{} node cannot contain a {} node",
                parent_node.node_type(),
                child_node.node_type()
            )));
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(EditorError::InvalidStructure(format!(
                "attaching {child} under {parent} would create a cycle"
            )));
        }
        Ok(())
    }

    /// Detach `key` (and its subtree) from its parent. Detached nodes are
    /// collected at commit unless re-attached.
    pub fn remove(&mut self, key: NodeKey) -> Result<()> {
        self.ensure_open()?;
        if key == self.root {
            return Err(EditorError::InvalidStructure(
                "the root cannot be removed".into(),
            ));
        }
        let Some(parent) = self.node(key)?.parent else {
            return Ok(());
        };
        self.node_mut(parent)?.children.retain(|child| *child != key);
        self.node_mut(key)?.parent = None;
        self.mark_dirty(parent);
        self.mark_dirty(key);
        Ok(())
    }

    /// Put detached `new` in the position of `old`, detaching `old`
    pub fn replace(&mut self, old: NodeKey, new: NodeKey) -> Result<()> {
        self.ensure_open()?;
        let parent = self.node(old)?.parent.ok_or_else(|| {
            EditorError::InvalidStructure(format!("node {old} is not attached"))
        })?;
        let index = self.index_in_parent(old).unwrap_or(0);
        self.remove(old)?;
        if let Err(err) = self.insert(parent, index, new) {
            self.insert(parent, index, old)?;
            return Err(err);
        }
        Ok(())
    }

    /// Detach every child of `key`
    pub fn clear_children(&mut self, key: NodeKey) -> Result<()> {
        let children = self.children(key)?.to_vec();
        for child in children {
            self.remove(child)?;
        }
        Ok(())
    }

    /// Replace the whole document with `blocks`. The blocks are validated
    /// before anything is touched.
    pub fn replace_content(&mut self, blocks: &[SerializedNode]) -> Result<()> {
        self.ensure_open()?;
        for block in blocks {
            if !NodeKind::Root.accepts(&block.kind) {
                return Err(EditorError::MalformedNode(format!(
                    "{} node cannot be placed at the top level",
                    block.node_type()
                )));
            }
            block.validate().map_err(EditorError::MalformedNode)?;
        }
        let root = self.root;
        self.clear_children(root)?;
        for block in blocks {
            self.insert_tree(root, usize::MAX, block)?;
        }
        Ok(())
    }

    fn with_kind_mut(
        &mut self,
        key: NodeKey,
        expected: NodeType,
        f: impl FnOnce(&mut NodeKind),
    ) -> Result<()> {
        self.ensure_open()?;
        let node = self.node_mut(key)?;
        if node.node_type() != expected {
            return Err(EditorError::InvalidStructure(format!(
                "expected {expected} node, {key} is a {}",
                node.node_type()
            )));
        }
        f(&mut node.kind);
        self.mark_dirty(key);
        Ok(())
    }

    pub fn set_text(&mut self, key: NodeKey, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        self.with_kind_mut(key, NodeType::Text, |kind| {
            if let NodeKind::Text { text, .. } = kind {
                *text = value;
            }
        })
    }

    pub fn set_text_format(&mut self, key: NodeKey, value: TextFormat) -> Result<()> {
        self.with_kind_mut(key, NodeType::Text, |kind| {
            if let NodeKind::Text { format, .. } = kind {
                *format = value;
            }
        })
    }

    /// Change an equation's source. The inline/block mode is fixed at
    /// creation; switching it means replacing the node.
    pub fn set_equation(&mut self, key: NodeKey, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        self.with_kind_mut(key, NodeType::Equation, |kind| {
            if let NodeKind::Equation { equation, .. } = kind {
                *equation = value;
            }
        })
    }

    pub fn set_code_language(&mut self, key: NodeKey, value: Option<&str>) -> Result<()> {
        let value = crate::node::normalize_language(value);
        self.with_kind_mut(key, NodeType::Code, |kind| {
            if let NodeKind::Code { language } = kind {
                *language = value;
            }
        })
    }

    pub fn set_image_source(&mut self, key: NodeKey, value: ImageSource) -> Result<()> {
        self.with_kind_mut(key, NodeType::Image, |kind| {
            if let NodeKind::Image { src, .. } = kind {
                *src = value;
            }
        })?;
        // Any pending resolution was for the old source
        if let Some(open) = self.open.as_mut() {
            open.forget.push(key);
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Whole-document load/store
    // ---------------------------------------------------------------------

    /// Replace the document with a persisted state (all-or-nothing)
    pub fn set_state(&mut self, state: &SerializedEditorState) -> Result<()> {
        state.validate()?;
        self.update(|ed| ed.replace_content(state.blocks()))
    }

    pub fn load_json(&mut self, json: &str) -> Result<()> {
        let state = SerializedEditorState::from_json(json)?;
        self.set_state(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::MutationKind;

    fn paragraph_with(ed: &mut Editor, text: &str) -> (NodeKey, NodeKey) {
        ed.update(|ed| {
            let p = ed.create(NodeKind::paragraph())?;
            let t = ed.create(NodeKind::text(text))?;
            ed.append(p, t)?;
            let root = ed.root();
            ed.append(root, p)?;
            Ok((p, t))
        })
        .unwrap()
    }

    #[test]
    fn mutation_outside_transaction_is_rejected() {
        let mut ed = Editor::new();
        let err = ed.create(NodeKind::paragraph()).unwrap_err();
        assert!(matches!(err, EditorError::NoTransaction));
    }

    #[test]
    fn nested_transaction_is_rejected() {
        let mut ed = Editor::new();
        let result = ed.update(|ed| ed.update(|_| Ok(())));
        assert!(matches!(result, Err(EditorError::ConcurrentTransaction)));
        assert_eq!(ed.phase(), Phase::Idle);

        ed.begin().unwrap();
        assert!(matches!(ed.begin(), Err(EditorError::ConcurrentTransaction)));
        ed.rollback();
    }

    #[test]
    fn commit_reports_created_nodes() {
        let mut ed = Editor::new();
        let mut rx = ed.subscribe();
        let (p, t) = paragraph_with(&mut ed, "hello");

        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.seq, 1);
        assert_eq!(batch.get(p), Some(MutationKind::Created));
        assert_eq!(batch.get(t), Some(MutationKind::Created));
        assert_eq!(batch.get(ed.root()), Some(MutationKind::Updated));
        assert_eq!(ed.text_content(ed.root()), "hello");
    }

    #[test]
    fn failed_update_rolls_back() {
        let mut ed = Editor::new();
        let (p, _) = paragraph_with(&mut ed, "keep");
        let before = ed.snapshot();

        let result: Result<()> = ed.update(|ed| {
            ed.remove(p)?;
            let code = ed.create(NodeKind::code(Some("rust")))?;
            let root = ed.root();
            ed.append(root, code)?;
            Err(EditorError::InvalidStructure("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(ed.snapshot(), before);
        assert_eq!(ed.seq(), 1);
        assert!(ed.is_attached(p));
    }

    #[test]
    fn rollback_restores_only_touched_nodes() {
        let mut ed = Editor::new();
        let (p, t) = paragraph_with(&mut ed, "first");
        let (q, u) = paragraph_with(&mut ed, "second");
        let before = ed.snapshot();

        ed.begin().unwrap();
        ed.set_text(t, "changed").unwrap();
        ed.remove(q).unwrap();
        let extra = ed.create(NodeKind::text("extra")).unwrap();
        ed.append(p, extra).unwrap();
        ed.rollback();

        assert_eq!(ed.snapshot(), before);
        assert!(!ed.contains(extra));
        assert_eq!(ed.node(t).unwrap().text(), Some("first"));
        assert_eq!(ed.parent(q), Some(ed.root()));
        assert_eq!(ed.parent(u), Some(q));
        assert_eq!(ed.children(p).unwrap(), &[t]);
        assert_eq!(ed.phase(), Phase::Idle);
    }

    #[test]
    fn removed_nodes_are_collected_at_commit() {
        let mut ed = Editor::new();
        let (p, t) = paragraph_with(&mut ed, "bye");
        ed.update(|ed| ed.remove(p)).unwrap();
        assert!(!ed.contains(p));
        assert!(!ed.contains(t));
        assert_eq!(ed.len(), 1);
    }

    #[test]
    fn destroyed_mutations_are_published() {
        let mut ed = Editor::new();
        let (p, t) = paragraph_with(&mut ed, "bye");
        let mut rx = ed.subscribe();
        ed.update(|ed| ed.remove(p)).unwrap();
        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.get(p), Some(MutationKind::Destroyed));
        assert_eq!(batch.get(t), Some(MutationKind::Destroyed));
    }

    #[test]
    fn insert_validates_structure() {
        let mut ed = Editor::new();
        let result = ed.update(|ed| {
            let t = ed.create(NodeKind::text("loose"))?;
            let root = ed.root();
            ed.append(root, t)
        });
        assert!(matches!(result, Err(EditorError::InvalidStructure(_))));
        assert!(ed.is_empty());
    }

    #[test]
    fn replace_preserves_position() {
        let mut ed = Editor::new();
        let (first, _) = paragraph_with(&mut ed, "one");
        let (second, _) = paragraph_with(&mut ed, "two");
        let code = ed
            .update(|ed| {
                let code = ed.create(NodeKind::code(None))?;
                ed.replace(first, code)?;
                Ok(code)
            })
            .unwrap();
        assert_eq!(ed.children(ed.root()).unwrap(), &[code, second]);
        assert!(!ed.contains(first));
    }

    #[test]
    fn moving_within_one_transaction_keeps_node() {
        let mut ed = Editor::new();
        let (first, t) = paragraph_with(&mut ed, "one");
        let (second, _) = paragraph_with(&mut ed, "two");
        ed.update(|ed| {
            ed.remove(t)?;
            ed.append(second, t)
        })
        .unwrap();
        assert!(ed.contains(t));
        assert_eq!(ed.parent(t), Some(second));
        assert!(ed.children(first).unwrap().is_empty());
    }

    #[test]
    fn cycles_are_rejected() {
        let mut ed = Editor::new();
        let result = ed.update(|ed| {
            let table = ed.create(NodeKind::table())?;
            let row = ed.create(NodeKind::table_row())?;
            ed.append(table, row)?;
            ed.remove(table)?;
            ed.insert(row, 0, table)
        });
        assert!(matches!(result, Err(EditorError::InvalidStructure(_))));
    }

    #[test]
    fn empty_transaction_publishes_nothing() {
        let mut ed = Editor::new();
        let mut rx = ed.subscribe();
        ed.update(|_| Ok(())).unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(ed.seq(), 0);
    }

    #[test]
    fn load_json_is_all_or_nothing() {
        let mut ed = Editor::new();
        paragraph_with(&mut ed, "original");
        let before = ed.snapshot();

        let bad = r#"{"root": {"type": "root", "children": [
            {"type": "paragraph", "children": [{"type": "text", "text": "fine"}]},
            {"type": "equation"}
        ]}}"#;
        assert!(matches!(
            ed.load_json(bad),
            Err(EditorError::MalformedNode(_))
        ));
        assert_eq!(ed.snapshot(), before);

        let good = r#"{"root": {"type": "root", "children": [
            {"type": "equation", "equation": "e=mc^2"}
        ]}}"#;
        ed.load_json(good).unwrap();
        assert_eq!(ed.content_blocks().len(), 1);
        assert_eq!(ed.snapshot().blocks()[1].kind, NodeKind::Paragraph);
    }
}

//! Mutation notifications.
//!
//! Every committed transaction produces one [`MutationBatch`]. Batches are
//! delivered in commit order to registered [`MutationListener`]s and to
//! broadcast subscribers. Listeners may only produce presentational
//! [`Decoration`]s; those are queued in [`DeferredWrites`] and applied once
//! dispatch has finished, so they never re-enter the transaction machinery.

use crate::editor::Editor;
use crate::node::{NodeKey, NodeType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Created,
    Updated,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMutation {
    pub key: NodeKey,
    pub node_type: NodeType,
    pub kind: MutationKind,
}

/// The changes made by one committed transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationBatch {
    /// Commit sequence number, strictly increasing per editor
    pub seq: u64,
    /// One entry per touched node, ordered by key
    pub mutations: Vec<NodeMutation>,
}

impl MutationBatch {
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn of_type(&self, node_type: NodeType) -> impl Iterator<Item = &NodeMutation> {
        self.mutations
            .iter()
            .filter(move |m| m.node_type == node_type)
    }

    pub fn get(&self, key: NodeKey) -> Option<MutationKind> {
        self.mutations.iter().find(|m| m.key == key).map(|m| m.kind)
    }
}

/// Presentational state attached to a node outside the document model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoration {
    /// Line numbers of a code block, cached by the child count they were
    /// computed from
    Gutter { child_count: usize, text: String },
}

/// Decoration writes collected during dispatch
#[derive(Debug, Default)]
pub struct DeferredWrites {
    writes: Vec<(NodeKey, Decoration)>,
}

impl DeferredWrites {
    pub fn push(&mut self, key: NodeKey, decoration: Decoration) {
        self.writes.push((key, decoration));
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub(crate) fn into_inner(self) -> Vec<(NodeKey, Decoration)> {
        self.writes
    }
}

/// Observer of committed mutations for one node type
pub trait MutationListener: Send {
    /// Called once per committed batch that touched at least one node of the
    /// registered type. `editor` is read-only; the editor is in its dispatch
    /// phase and rejects new transactions.
    fn on_mutations(
        &mut self,
        mutations: &[NodeMutation],
        editor: &Editor,
        writes: &mut DeferredWrites,
    );
}

/// Handle returned by listener registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) usize);

pub(crate) struct RegisteredListener {
    pub id: ListenerId,
    pub node_type: NodeType,
    pub listener: Box<dyn MutationListener>,
}

/// Transform run on dirty nodes of one type while a transaction commits.
/// Transforms mutate the tree; their changes are part of the same batch.
pub trait NodeTransform: Send {
    fn node_type(&self) -> NodeType;

    fn transform(&mut self, editor: &mut Editor, key: NodeKey) -> crate::Result<()>;
}

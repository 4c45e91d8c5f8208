//! Mutation records - Structural changes delivered on a later turn.
//!
//! The document queues one [`MutationRecord`] per structural change and
//! hands them to observers as a single [`MutationBatch`] when the host
//! drives a turn (`Document::deliver_mutations`). Delivery is never nested
//! inside the call that changed the tree.

use std::rc::Rc;

use crate::types::{NodeId, Unsubscribe};

/// One structural change under `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

impl MutationRecord {
    pub fn added(target: NodeId, nodes: Vec<NodeId>) -> Self {
        Self {
            target,
            added: nodes,
            removed: Vec::new(),
        }
    }

    pub fn removed(target: NodeId, nodes: Vec<NodeId>) -> Self {
        Self {
            target,
            added: Vec::new(),
            removed: nodes,
        }
    }
}

/// Every record queued since the previous delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationBatch {
    records: Vec<MutationRecord>,
}

impl MutationBatch {
    pub fn new(records: Vec<MutationRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[MutationRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True if any record added at least one node.
    pub fn has_added_nodes(&self) -> bool {
        self.records.iter().any(|record| !record.added.is_empty())
    }

    /// All added nodes, in record order.
    pub fn added_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.records.iter().flat_map(|record| record.added.iter().copied())
    }
}

/// Callback invoked with each delivered batch.
pub type MutationCallback = Rc<dyn Fn(&MutationBatch)>;

/// A source of deferred, coalesced structural-change batches.
pub trait TreeMutationSource {
    /// Start receiving batches. The returned function stops delivery.
    fn observe(&self, callback: MutationCallback) -> Unsubscribe;
}

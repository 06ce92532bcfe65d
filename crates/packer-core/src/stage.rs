use crate::node::NodeId;
use rustc_hash::FxHashSet;

/// Insertion-ordered set of nodes slated for the current pass's outputs.
#[derive(Debug, Default, Clone)]
pub struct Stage {
    order: Vec<NodeId>,
    members: FxHashSet<NodeId>,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the node was already staged.
    pub fn add(&mut self, id: NodeId) -> bool {
        if self.members.insert(id) {
            self.order.push(id);
            true
        } else {
            false
        }
    }

    pub fn remove(&mut self, id: NodeId) -> bool {
        if self.members.remove(&id) {
            self.order.retain(|n| *n != id);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.members.contains(&id)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order.iter().copied()
    }

    /// Snapshot for callers that mutate the stage while walking it.
    pub fn to_vec(&self) -> Vec<NodeId> {
        self.order.clone()
    }
}

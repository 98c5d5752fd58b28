//! Match state
//!
//! The live bookkeeping of one match attempt: the BFS frontier, the
//! node↔descriptor assignments, and the per-descriptor occurrence ledger
//! (the attempt-local replacement for a mutable `repeat_curr` on the
//! descriptor itself). The whole structure is index-based and compact, so
//! cloning it for a backtrack snapshot is cheap.

use std::collections::VecDeque;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::graph::NodeId;
use crate::pattern::{DescIdx, FusionPattern};

/// Mutable state of one match attempt
#[derive(Debug, Clone)]
pub struct MatchState {
    /// Pending (node, descriptor) pairs awaiting expansion
    pub(crate) queue: VecDeque<(NodeId, DescIdx)>,
    /// node → descriptor, in commit order (order feeds determinism)
    matched: IndexMap<NodeId, DescIdx>,
    /// descriptor → matched nodes
    per_desc: Vec<SmallVec<[NodeId; 2]>>,
    /// Occurrence count per descriptor
    ledger: Vec<u32>,
}

impl MatchState {
    /// Fresh state for a pattern with `desc_count` descriptors
    pub fn new(desc_count: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            matched: IndexMap::new(),
            per_desc: vec![SmallVec::new(); desc_count],
            ledger: vec![0; desc_count],
        }
    }

    /// Commit `node` to `desc`: record the assignment, bump the ledger,
    /// and enqueue the node for expansion unless `boundary` is set
    /// (boundary consumers are matched but never expanded).
    pub fn commit(&mut self, node: NodeId, desc: DescIdx, boundary: bool) {
        debug_assert!(!self.matched.contains_key(&node));
        self.matched.insert(node, desc);
        self.per_desc[desc].push(node);
        self.ledger[desc] += 1;
        if !boundary {
            self.queue.push_back((node, desc));
        }
    }

    /// Whether `node` is already part of this match
    #[inline]
    pub fn is_matched(&self, node: NodeId) -> bool {
        self.matched.contains_key(&node)
    }

    /// Descriptor `node` was matched to, if any
    pub fn desc_of(&self, node: NodeId) -> Option<DescIdx> {
        self.matched.get(&node).copied()
    }

    /// Occurrence count of a descriptor
    #[inline]
    pub fn count(&self, desc: DescIdx) -> u32 {
        self.ledger[desc]
    }

    /// The full occurrence ledger
    #[inline]
    pub fn ledger(&self) -> &[u32] {
        &self.ledger
    }

    /// Nodes matched to a descriptor
    pub fn nodes_of(&self, desc: DescIdx) -> &[NodeId] {
        &self.per_desc[desc]
    }

    /// All (node, descriptor) assignments in commit order
    pub fn assignments(&self) -> impl Iterator<Item = (NodeId, DescIdx)> + '_ {
        self.matched.iter().map(|(&n, &d)| (n, d))
    }

    /// Total matched nodes, boundary consumers included
    #[inline]
    pub fn matched_len(&self) -> usize {
        self.matched.len()
    }

    /// Fusable members: matched nodes excluding boundary (`Output`)
    /// descriptors, in commit order
    pub fn members(&self, pattern: &FusionPattern) -> Vec<NodeId> {
        self.matched
            .iter()
            .filter(|(_, &d)| !pattern.descriptor(d).constraint.is_output())
            .map(|(&n, _)| n)
            .collect()
    }

    /// Number of fusable members
    pub fn member_len(&self, pattern: &FusionPattern) -> usize {
        self.matched
            .values()
            .filter(|&&d| !pattern.descriptor(d).constraint.is_output())
            .count()
    }
}

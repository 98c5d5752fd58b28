//! Fusion pattern model
//!
//! A [`FusionPattern`] is the immutable template the match engine expands:
//! a list of [`OpDescriptor`]s, a designated head subset, and
//! descriptor→descriptor successor edges. Patterns come from an external
//! catalog and are never mutated during matching, so shared references are
//! safe across threads.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::error::{FusionError, FusionResult};
use crate::graph::{NodeId, OperationGraph};

use super::descriptor::OpDescriptor;

/// Index of a descriptor inside its pattern
pub type DescIdx = usize;

/// Cheap structural pre-filter run on a candidate head node
pub type HeadFilter = Box<dyn Fn(&OperationGraph, NodeId) -> bool + Send + Sync>;

/// Attribute-consistency predicate run on the full matched set
pub type AttrChecker = Box<dyn Fn(&OperationGraph, &[NodeId]) -> bool + Send + Sync>;

/// Immutable description of a fusable subgraph template
pub struct FusionPattern {
    name: String,
    descriptors: Vec<OpDescriptor>,
    heads: Vec<DescIdx>,
    succ: Vec<SmallVec<[DescIdx; 2]>>,
    pred: Vec<SmallVec<[DescIdx; 2]>>,
    /// Type tags allowed to satisfy either branch arity
    multi_branch_compatible: FxHashSet<String>,
    head_filter: Option<HeadFilter>,
    attr_checker: Option<AttrChecker>,
}

impl std::fmt::Debug for FusionPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionPattern")
            .field("name", &self.name)
            .field("descriptors", &self.descriptors)
            .field("heads", &self.heads)
            .field("succ", &self.succ)
            .finish_non_exhaustive()
    }
}

impl FusionPattern {
    /// Start building a pattern with the given name
    pub fn builder(name: impl Into<String>) -> PatternBuilder {
        PatternBuilder {
            name: name.into(),
            descriptors: Vec::new(),
            heads: Vec::new(),
            edges: Vec::new(),
            multi_branch_compatible: FxHashSet::default(),
            head_filter: None,
            attr_checker: None,
        }
    }

    /// Pattern name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All descriptors, in declared order
    pub fn descriptors(&self) -> &[OpDescriptor] {
        &self.descriptors
    }

    /// Descriptor by index
    #[inline]
    pub fn descriptor(&self, idx: DescIdx) -> &OpDescriptor {
        &self.descriptors[idx]
    }

    /// Head descriptor indices, in declared order
    pub fn heads(&self) -> &[DescIdx] {
        &self.heads
    }

    /// Whether nodes of this type may satisfy either branch arity
    pub fn is_multi_branch_compatible(&self, type_tag: &str) -> bool {
        self.multi_branch_compatible.contains(type_tag)
    }

    /// Run the external head pre-filter, if any
    pub fn head_admits(&self, graph: &OperationGraph, node: NodeId) -> bool {
        self.head_filter.as_ref().map_or(true, |f| f(graph, node))
    }

    /// Run the external attribute-consistency checker, if any
    pub fn attrs_consistent(&self, graph: &OperationGraph, members: &[NodeId]) -> bool {
        self.attr_checker
            .as_ref()
            .map_or(true, |f| f(graph, members))
    }

    /// Whether `desc` has any outgoing pattern edge (unfiltered)
    pub fn has_pattern_successors(&self, desc: DescIdx) -> bool {
        !self.succ[desc].is_empty()
    }

    /// Whether `desc` has any incoming pattern edge (unfiltered)
    pub fn has_pattern_predecessors(&self, desc: DescIdx) -> bool {
        !self.pred[desc].is_empty()
    }

    /// Candidate successor descriptors of `desc`, given the attempt's
    /// occurrence ledger
    ///
    /// Filters out descriptors whose occurrence count has reached
    /// `repeat_max`. Optional descriptors (`repeat_min == 0`) are
    /// transparent: their own successors are exposed transitively, so an
    /// absent optional node does not break matching.
    pub fn successors(&self, desc: DescIdx, ledger: &[u32]) -> SmallVec<[DescIdx; 4]> {
        self.neighbors(desc, ledger, &self.succ)
    }

    /// Candidate predecessor descriptors of `desc`; mirror of
    /// [`FusionPattern::successors`] for fan-in expansion
    pub fn predecessors(&self, desc: DescIdx, ledger: &[u32]) -> SmallVec<[DescIdx; 4]> {
        self.neighbors(desc, ledger, &self.pred)
    }

    fn neighbors(
        &self,
        desc: DescIdx,
        ledger: &[u32],
        edges: &[SmallVec<[DescIdx; 2]>],
    ) -> SmallVec<[DescIdx; 4]> {
        let mut out = SmallVec::new();
        // Self-edges are legal (chain patterns), so the start descriptor
        // is not pre-marked.
        let mut seen = vec![false; self.descriptors.len()];
        let mut stack: SmallVec<[DescIdx; 4]> = SmallVec::from_slice(&edges[desc]);

        while let Some(n) = stack.pop() {
            if seen[n] {
                continue;
            }
            seen[n] = true;
            if ledger[n] < self.descriptors[n].repeat_max {
                out.push(n);
            }
            if self.descriptors[n].is_optional() {
                stack.extend(edges[n].iter().copied());
            }
        }
        // Stack order is not declaration order; keep it stable for
        // deterministic descriptor preference.
        out.sort_unstable();
        out
    }
}

/// Builder for [`FusionPattern`]
pub struct PatternBuilder {
    name: String,
    descriptors: Vec<OpDescriptor>,
    heads: Vec<DescIdx>,
    edges: Vec<(DescIdx, DescIdx)>,
    multi_branch_compatible: FxHashSet<String>,
    head_filter: Option<HeadFilter>,
    attr_checker: Option<AttrChecker>,
}

impl PatternBuilder {
    /// Add a descriptor, returning its index
    pub fn descriptor(&mut self, desc: OpDescriptor) -> DescIdx {
        self.descriptors.push(desc);
        self.descriptors.len() - 1
    }

    /// Add a descriptor and mark it as a head
    pub fn head(&mut self, desc: OpDescriptor) -> DescIdx {
        let idx = self.descriptor(desc);
        self.heads.push(idx);
        idx
    }

    /// Add a pattern edge `from → to`
    pub fn edge(&mut self, from: DescIdx, to: DescIdx) -> &mut Self {
        self.edges.push((from, to));
        self
    }

    /// Whitelist a type tag as multi-branch head-compatible
    pub fn multi_branch_compatible(&mut self, type_tag: impl Into<String>) -> &mut Self {
        self.multi_branch_compatible.insert(type_tag.into());
        self
    }

    /// Install the external head pre-filter
    pub fn head_filter(
        &mut self,
        f: impl Fn(&OperationGraph, NodeId) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        self.head_filter = Some(Box::new(f));
        self
    }

    /// Install the external attribute-consistency checker
    pub fn attr_checker(
        &mut self,
        f: impl Fn(&OperationGraph, &[NodeId]) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        self.attr_checker = Some(Box::new(f));
        self
    }

    /// Validate and freeze the pattern
    pub fn build(self) -> FusionResult<FusionPattern> {
        let len = self.descriptors.len();
        let mut succ = vec![SmallVec::new(); len];
        let mut pred = vec![SmallVec::new(); len];

        for &(from, to) in &self.edges {
            for idx in [from, to] {
                if idx >= len {
                    return Err(FusionError::DescriptorOutOfRange {
                        pattern: self.name,
                        index: idx,
                        len,
                    });
                }
            }
            succ[from].push(to);
            pred[to].push(from);
        }
        for &h in &self.heads {
            if h >= len {
                return Err(FusionError::DescriptorOutOfRange {
                    pattern: self.name,
                    index: h,
                    len,
                });
            }
        }

        Ok(FusionPattern {
            name: self.name,
            descriptors: self.descriptors,
            heads: self.heads,
            succ,
            pred,
            multi_branch_compatible: self.multi_branch_compatible,
            head_filter: self.head_filter,
            attr_checker: self.attr_checker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Head{Conv} → Mid{Relu, optional} → Tail{Concat}, plus Head → Tail
    fn head_mid_tail() -> FusionPattern {
        let mut b = FusionPattern::builder("head-mid-tail");
        let head = b.head(OpDescriptor::concrete("Head", ["Conv"]).repeat(1, 2));
        let mid = b.descriptor(OpDescriptor::concrete("Mid", ["Relu"]).repeat(0, 2));
        let tail = b.descriptor(OpDescriptor::concrete("Tail", ["Concat"]).multi_branch());
        b.edge(head, mid);
        b.edge(mid, tail);
        b.edge(head, tail);
        b.build().unwrap()
    }

    #[test]
    fn test_successors_filter_by_ledger() {
        let p = head_mid_tail();
        // Nothing matched yet: Mid and Tail both reachable from Head.
        assert_eq!(p.successors(0, &[0, 0, 0]).as_slice(), &[1, 2]);
        // Tail exhausted: only Mid remains.
        assert_eq!(p.successors(0, &[0, 0, 1]).as_slice(), &[1]);
    }

    #[test]
    fn test_optional_descriptor_is_transparent() {
        let mut b = FusionPattern::builder("chain");
        let head = b.head(OpDescriptor::concrete("Head", ["A"]));
        let mid = b.descriptor(OpDescriptor::concrete("Mid", ["B"]).repeat(0, 1));
        let tail = b.descriptor(OpDescriptor::concrete("Tail", ["C"]));
        b.edge(head, mid);
        b.edge(mid, tail);
        let p = b.build().unwrap();

        // No direct Head → Tail edge, but Tail is exposed through the
        // optional Mid.
        assert_eq!(p.successors(0, &[0, 0, 0]).as_slice(), &[1, 2]);
        // Transparency works backwards too.
        assert_eq!(p.predecessors(2, &[0, 0, 0]).as_slice(), &[0, 1]);
    }

    #[test]
    fn test_required_descriptor_is_opaque() {
        let mut b = FusionPattern::builder("chain");
        let head = b.head(OpDescriptor::concrete("Head", ["A"]));
        let mid = b.descriptor(OpDescriptor::concrete("Mid", ["B"]));
        let tail = b.descriptor(OpDescriptor::concrete("Tail", ["C"]));
        b.edge(head, mid);
        b.edge(mid, tail);
        let p = b.build().unwrap();

        assert_eq!(p.successors(0, &[0, 0, 0]).as_slice(), &[1]);
    }

    #[test]
    fn test_bad_edge_rejected() {
        let mut b = FusionPattern::builder("broken");
        let head = b.head(OpDescriptor::concrete("Head", ["A"]));
        b.edge(head, 7);
        assert!(matches!(
            b.build(),
            Err(FusionError::DescriptorOutOfRange { .. })
        ));
    }

    #[test]
    fn test_checkers_default_to_accept() {
        let p = head_mid_tail();
        let g = crate::graph::GraphBuilder::new().build();
        assert!(p.attrs_consistent(&g, &[]));
    }
}

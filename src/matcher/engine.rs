//! Match engine
//!
//! Expands one pattern from one candidate head node, breadth-first, with
//! save/restore backtracking on temporary cycles. A temporary cycle is a
//! conservative signal from the reachability index that committing a
//! candidate might trap an external path inside the fusion group; the
//! engine snapshots, blacklists the offender, and retries. The exact
//! verdict belongs to the runner's authoritative check at commit time.

use rustc_hash::FxHashSet;
use tracing::{trace, warn};

use crate::error::FusionResult;
use crate::graph::{NodeId, OperationGraph};
use crate::pattern::{DescIdx, FusionPattern};
use crate::reach::ReachabilityIndex;

use super::state::MatchState;

/// Ceiling on backtrack restorations per attempt; exceeding it abandons
/// the attempt with a warning, never the sweep
pub const DEFAULT_MAX_BACKTRACK_STEPS: usize = 10_000;

/// Where the engine currently is in its Idle → Expanding →
/// {Evaluating, Backtracking} → Done cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, search not started
    Idle,
    /// Draining the BFS queue
    Expanding,
    /// Checking pattern satisfaction
    Evaluating,
    /// Restoring a snapshot
    Backtracking,
    /// Search finished
    Done,
}

/// One (pattern, head node) match attempt
pub struct MatchAttempt<'a> {
    graph: &'a OperationGraph,
    pattern: &'a FusionPattern,
    reach: &'a ReachabilityIndex,
    head: NodeId,
    state: MatchState,
    /// Saved states plus the candidate whose commit was deferred
    snapshots: Vec<(MatchState, NodeId)>,
    /// Nodes excluded from this attempt, never un-blacklisted
    blacklist: FxHashSet<NodeId>,
    /// Satisfied results in discovery order: (members, total, state)
    results: Vec<(usize, usize, MatchState)>,
    seen_member_sets: FxHashSet<Vec<NodeId>>,
    backtracks: usize,
    max_backtrack_steps: usize,
    phase: Phase,
    cursor: usize,
}

impl<'a> MatchAttempt<'a> {
    /// Start an attempt, or `None` if the head id is unknown to the graph
    /// or no head descriptor accepts the node.
    ///
    /// Head selection honors declared order with concrete-type descriptors
    /// preferred over wildcards.
    pub fn new(
        graph: &'a OperationGraph,
        pattern: &'a FusionPattern,
        reach: &'a ReachabilityIndex,
        head: NodeId,
        max_backtrack_steps: usize,
    ) -> Option<Self> {
        let tag = &graph.get_node(head)?.type_tag;
        let head_desc = Self::select_head(pattern, tag)?;

        let mut state = MatchState::new(pattern.descriptors().len());
        let boundary = pattern.descriptor(head_desc).constraint.is_output();
        state.commit(head, head_desc, boundary);

        Some(Self {
            graph,
            pattern,
            reach,
            head,
            state,
            snapshots: Vec::new(),
            blacklist: FxHashSet::default(),
            results: Vec::new(),
            seen_member_sets: FxHashSet::default(),
            backtracks: 0,
            max_backtrack_steps,
            phase: Phase::Idle,
            cursor: 0,
        })
    }

    fn select_head(pattern: &FusionPattern, tag: &str) -> Option<DescIdx> {
        for priority in 0..=2 {
            for &h in pattern.heads() {
                let c = &pattern.descriptor(h).constraint;
                if c.priority() == priority && c.accepts(tag) {
                    return Some(h);
                }
            }
        }
        None
    }

    /// Current phase of the attempt's state machine
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Next satisfied match, best first
    ///
    /// The first call drains the whole search (expansion, evaluation, and
    /// every backtrack restart); later calls hand out successively smaller
    /// results so the runner can retry after an authoritative-check or
    /// device-policy rejection.
    pub fn next_candidate(&mut self) -> FusionResult<Option<MatchState>> {
        if self.phase != Phase::Done {
            self.search()?;
            // Best first: most fused members, then most matched nodes.
            // Stable sort keeps discovery order among equals, which keeps
            // sweeps deterministic.
            self.results.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
        }
        if self.cursor < self.results.len() {
            let state = self.results[self.cursor].2.clone();
            self.cursor += 1;
            Ok(Some(state))
        } else {
            Ok(None)
        }
    }

    fn search(&mut self) -> FusionResult<()> {
        loop {
            self.phase = Phase::Expanding;
            while let Some((node, desc)) = self.state.queue.pop_front() {
                self.expand(node, desc)?;
            }

            self.phase = Phase::Evaluating;
            self.evaluate();

            match self.snapshots.pop() {
                Some((snapshot, offender)) => {
                    self.backtracks += 1;
                    if self.backtracks > self.max_backtrack_steps {
                        warn!(
                            pattern = self.pattern.name(),
                            head = self.head.0,
                            steps = self.backtracks,
                            "backtracking ceiling reached, abandoning attempt"
                        );
                        break;
                    }
                    self.phase = Phase::Backtracking;
                    trace!(offender = offender.0, "restoring snapshot without offender");
                    self.state = snapshot;
                }
                None => break,
            }
        }
        self.phase = Phase::Done;
        Ok(())
    }

    /// Expand one matched (node, descriptor) pair against the graph
    fn expand(&mut self, node: NodeId, desc: DescIdx) -> FusionResult<()> {
        let graph = self.graph;

        for &succ in graph.successors(node) {
            let candidates = self.pattern.successors(desc, self.state.ledger());
            self.consider(node, succ, &candidates)?;
        }
        for &pred in graph.predecessors(node) {
            let candidates = self.pattern.predecessors(desc, self.state.ledger());
            self.consider(node, pred, &candidates)?;
        }
        Ok(())
    }

    /// Try to bind `cand` to one of `cand_descs`
    fn consider(
        &mut self,
        anchor: NodeId,
        cand: NodeId,
        cand_descs: &[DescIdx],
    ) -> FusionResult<()> {
        if self.state.is_matched(cand)
            || self.blacklist.contains(&cand)
            || self.graph.node(cand).is_fused()
        {
            return Ok(());
        }

        let Some(desc) = self.choose_descriptor(cand, cand_descs) else {
            return Ok(());
        };
        let boundary = self.pattern.descriptor(desc).constraint.is_output();

        if !boundary && self.creates_temporary_cycle(anchor, cand)? {
            trace!(
                pattern = self.pattern.name(),
                candidate = cand.0,
                "temporary cycle, deferring candidate"
            );
            self.snapshots.push((self.state.clone(), cand));
            self.blacklist.insert(cand);
            return Ok(());
        }

        self.state.commit(cand, desc, boundary);
        Ok(())
    }

    /// Pick the descriptor for a candidate node: concrete types first,
    /// then `Any`, then `Output`, each in declared order
    fn choose_descriptor(&self, cand: NodeId, cand_descs: &[DescIdx]) -> Option<DescIdx> {
        let node = self.graph.node(cand);
        for priority in 0..=2 {
            for &d in cand_descs {
                let desc = self.pattern.descriptor(d);
                if desc.constraint.priority() != priority || !desc.constraint.accepts(&node.type_tag)
                {
                    continue;
                }
                if !desc.constraint.is_output() {
                    let arity_ok = desc.branch.admits(node.out_degree())
                        || self.pattern.is_multi_branch_compatible(&node.type_tag);
                    if !arity_ok || !desc.shape.admits(node.shape_class) {
                        continue;
                    }
                }
                return Some(d);
            }
        }
        None
    }

    /// Conservative cycle test for a candidate commit
    ///
    /// An unmatched consumer of the candidate that can reach an
    /// already-matched member, or an unmatched producer of the candidate
    /// that a member can reach, marks a path that could leave the fusion
    /// group and return. Paths running entirely through matched nodes are
    /// exempt; the authoritative contraction check at commit time has the
    /// final word either way.
    fn creates_temporary_cycle(&self, anchor: NodeId, cand: NodeId) -> FusionResult<bool> {
        for (member, desc) in self.state.assignments() {
            if member == anchor || self.pattern.descriptor(desc).constraint.is_output() {
                continue;
            }
            for &u in self.graph.successors(cand) {
                if !self.state.is_matched(u) && self.reach.is_connected(u, member)? {
                    return Ok(true);
                }
            }
            for &u in self.graph.predecessors(cand) {
                if !self.state.is_matched(u) && self.reach.is_connected(member, u)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Check pattern satisfaction of the current state and record it as a
    /// result if it holds
    fn evaluate(&mut self) {
        if !self.repeats_satisfied() || !self.agreement_satisfied() {
            return;
        }

        let members = self.state.members(self.pattern);
        if members.is_empty() || !self.pattern.attrs_consistent(self.graph, &members) {
            return;
        }

        let mut key = members.clone();
        key.sort_unstable();
        if self.seen_member_sets.insert(key) {
            self.results
                .push((members.len(), self.state.matched_len(), self.state.clone()));
        }
    }

    /// Every plain descriptor at its minimum; every alternation group with
    /// at least one satisfied member
    fn repeats_satisfied(&self) -> bool {
        let mut groups: Vec<(u32, bool)> = Vec::new();
        for (d, desc) in self.pattern.descriptors().iter().enumerate() {
            let cnt = self.state.count(d);
            match desc.group_id {
                None => {
                    if cnt < desc.repeat_min {
                        return false;
                    }
                }
                Some(g) => {
                    let sat = cnt >= desc.repeat_min;
                    match groups.iter_mut().find(|(id, _)| *id == g) {
                        Some(entry) => entry.1 |= sat,
                        None => groups.push((g, sat)),
                    }
                }
            }
        }
        groups.iter().all(|&(_, sat)| sat)
    }

    /// Input/output edge agreement: where a descriptor declares pattern
    /// edges on a side and does not opt out, every graph edge of its
    /// matched node on that side must land on a matched node
    fn agreement_satisfied(&self) -> bool {
        for (node, d) in self.state.assignments() {
            let desc = self.pattern.descriptor(d);
            if desc.constraint.is_output() {
                continue;
            }
            if !desc.ignore_output_agreement && self.pattern.has_pattern_successors(d) {
                if self
                    .graph
                    .successors(node)
                    .iter()
                    .any(|&s| !self.state.is_matched(s))
                {
                    return false;
                }
            }
            if !desc.ignore_input_agreement && self.pattern.has_pattern_predecessors(d) {
                if self
                    .graph
                    .predecessors(node)
                    .iter()
                    .any(|&p| !self.state.is_matched(p))
                {
                    return false;
                }
            }
        }
        true
    }
}

//! Fusion runner
//!
//! Drives one sweep: every node in stable order is tried as a head
//! candidate against every catalog pattern, the match engine produces
//! candidates, and this module performs the authoritative cycle check,
//! commits fusion groups, and keeps the reachability index current.
//!
//! Every failure is local to one (pattern, head node) attempt; a sweep
//! always runs to completion over the whole graph.

use tracing::{debug, warn};

use crate::error::FusionResult;
use crate::graph::{NodeId, OperationGraph, OperationNode, ScopeId};
use crate::matcher::{MatchAttempt, DEFAULT_MAX_BACKTRACK_STEPS};
use crate::pattern::FusionPattern;
use crate::reach::ReachabilityIndex;

/// One committed fusion group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusionGroup {
    /// Name of the pattern that produced the group
    pub pattern: String,
    /// Scope id written onto every member node
    pub scope: ScopeId,
    /// Member node ids, in match commit order
    pub members: Vec<NodeId>,
}

/// Externally-owned monotonic scope-id source
pub trait ScopeIdAllocator {
    /// Hand out the next scope id; must never repeat within a process
    fn next_scope(&mut self) -> ScopeId;
}

/// Default counter-backed allocator
#[derive(Debug, Default)]
pub struct CounterAllocator {
    next: u64,
}

impl CounterAllocator {
    /// Allocator starting at scope id 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator starting at the given id
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }
}

impl ScopeIdAllocator for CounterAllocator {
    fn next_scope(&mut self) -> ScopeId {
        let id = ScopeId(self.next);
        self.next += 1;
        id
    }
}

/// Head-node exclusion predicate (e.g. boundary ops)
pub type IgnorePredicate = Box<dyn Fn(&OperationNode) -> bool + Send + Sync>;

/// Device/capability veto over a whole candidate member set
pub type DevicePolicy = Box<dyn Fn(&OperationGraph, &[NodeId]) -> bool + Send + Sync>;

/// Sweep configuration
pub struct SweepOptions {
    /// Per-attempt backtracking ceiling
    pub max_backtrack_steps: usize,
    /// Nodes skipped as head candidates
    pub ignore: Option<IgnorePredicate>,
    /// External veto run after the authoritative cycle check
    pub device_policy: Option<DevicePolicy>,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            max_backtrack_steps: DEFAULT_MAX_BACKTRACK_STEPS,
            ignore: None,
            device_policy: None,
        }
    }
}

impl SweepOptions {
    /// Override the backtracking ceiling
    pub fn max_backtrack_steps(mut self, steps: usize) -> Self {
        self.max_backtrack_steps = steps;
        self
    }

    /// Install a head-node ignore predicate
    pub fn ignore(mut self, f: impl Fn(&OperationNode) -> bool + Send + Sync + 'static) -> Self {
        self.ignore = Some(Box::new(f));
        self
    }

    /// Install a device/capability policy
    pub fn device_policy(
        mut self,
        f: impl Fn(&OperationGraph, &[NodeId]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.device_policy = Some(Box::new(f));
        self
    }
}

/// Sweep driver over one pattern catalog
pub struct FusionRunner<'c> {
    catalog: &'c [FusionPattern],
    options: SweepOptions,
}

impl<'c> FusionRunner<'c> {
    /// Runner with default options
    pub fn new(catalog: &'c [FusionPattern]) -> Self {
        Self {
            catalog,
            options: SweepOptions::default(),
        }
    }

    /// Runner with explicit options
    pub fn with_options(catalog: &'c [FusionPattern], options: SweepOptions) -> Self {
        Self { catalog, options }
    }

    /// Run one fusion sweep
    ///
    /// Visits every node at most once as a head candidate, in creation
    /// order. Nodes consumed as non-head members of an earlier group lose
    /// head eligibility. Returns the committed groups; member scope ids
    /// are written onto the graph in place.
    pub fn sweep(
        &self,
        graph: &mut OperationGraph,
        alloc: &mut dyn ScopeIdAllocator,
    ) -> FusionResult<Vec<FusionGroup>> {
        graph.validate_edges()?;
        let mut reach = ReachabilityIndex::build(graph)?;
        let mut groups = Vec::new();

        let heads: Vec<NodeId> = graph.node_ids().collect();
        for head in heads {
            if graph.node(head).is_fused() {
                continue;
            }
            if let Some(ignore) = &self.options.ignore {
                if ignore(graph.node(head)) {
                    continue;
                }
            }

            for pattern in self.catalog {
                let Some(members) = self.try_pattern(&*graph, &reach, pattern, head) else {
                    continue;
                };

                let scope = alloc.next_scope();
                graph.tag_scope(&members, scope);
                if let Err(err) = reach.update(&members) {
                    // Members came from the same index; only reachable on
                    // a stale table, which is a caller bug.
                    warn!(%err, "reachability update failed after commit");
                }
                debug!(
                    pattern = pattern.name(),
                    scope = scope.0,
                    members = members.len(),
                    "committed fusion group"
                );
                groups.push(FusionGroup {
                    pattern: pattern.name().to_string(),
                    scope,
                    members,
                });
                break; // head consumed; move to the next head node
            }
        }

        Ok(groups)
    }

    /// Match one pattern from one head and pick the first candidate that
    /// survives the authoritative cycle check and the device policy
    fn try_pattern(
        &self,
        graph: &OperationGraph,
        reach: &ReachabilityIndex,
        pattern: &FusionPattern,
        head: NodeId,
    ) -> Option<Vec<NodeId>> {
        if !pattern.head_admits(graph, head) {
            return None;
        }
        let mut attempt =
            MatchAttempt::new(graph, pattern, reach, head, self.options.max_backtrack_steps)?;

        loop {
            let state = match attempt.next_candidate() {
                Ok(Some(state)) => state,
                Ok(None) => return None,
                Err(err) => {
                    warn!(
                        %err,
                        pattern = pattern.name(),
                        head = head.0,
                        "structural error, abandoning attempt"
                    );
                    return None;
                }
            };

            let members = state.members(pattern);
            match reach.contraction_is_acyclic(&members) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        pattern = pattern.name(),
                        head = head.0,
                        "authoritative cycle check rejected candidate"
                    );
                    continue; // next backtrack candidate
                }
                Err(err) => {
                    warn!(
                        %err,
                        pattern = pattern.name(),
                        head = head.0,
                        "structural error in cycle check, abandoning attempt"
                    );
                    return None;
                }
            }

            if let Some(policy) = &self.options.device_policy {
                if !policy(graph, &members) {
                    debug!(
                        pattern = pattern.name(),
                        head = head.0,
                        "device policy vetoed candidate"
                    );
                    continue;
                }
            }

            return Some(members);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::pattern::OpDescriptor;

    /// Head{Conv} ×2 → Mid{Relu, optional} → Tail{Concat}, Head → Tail
    fn fan_in_pattern() -> FusionPattern {
        let mut b = FusionPattern::builder("conv-concat");
        let head = b.head(OpDescriptor::concrete("Head", ["Conv"]).repeat(2, 2));
        let mid = b.descriptor(OpDescriptor::concrete("Mid", ["Relu"]).repeat(0, 2));
        let tail = b.descriptor(OpDescriptor::concrete("Tail", ["Concat"]).multi_branch());
        b.edge(head, mid);
        b.edge(mid, tail);
        b.edge(head, tail);
        b.multi_branch_compatible("Concat");
        b.build().unwrap()
    }

    fn fan_in_graph() -> OperationGraph {
        let mut gb = GraphBuilder::new();
        let conv1 = gb.add_node("Conv");
        let conv2 = gb.add_node("Conv");
        let concat = gb.add_node("Concat");
        gb.add_edge(conv1, concat);
        gb.add_edge(conv2, concat);
        gb.build()
    }

    #[test]
    fn test_sweep_commits_fan_in_group() {
        let catalog = vec![fan_in_pattern()];
        let runner = FusionRunner::new(&catalog);
        let mut graph = fan_in_graph();
        let mut alloc = CounterAllocator::new();

        let groups = runner.sweep(&mut graph, &mut alloc).unwrap();
        assert_eq!(groups.len(), 1);
        let mut members = groups[0].members.clone();
        members.sort_unstable();
        assert_eq!(members, vec![NodeId(0), NodeId(1), NodeId(2)]);
        assert_eq!(groups[0].scope, ScopeId(0));
        for &m in &groups[0].members {
            assert_eq!(graph.scope_of(m), Some(ScopeId(0)));
        }
    }

    #[test]
    fn test_noop_on_non_matching_graph() {
        let catalog = vec![fan_in_pattern()];
        let runner = FusionRunner::new(&catalog);

        let mut gb = GraphBuilder::new();
        let a = gb.add_node("MatMul");
        let b = gb.add_node("Softmax");
        gb.add_edge(a, b);
        let mut graph = gb.build();
        let mut alloc = CounterAllocator::new();

        let groups = runner.sweep(&mut graph, &mut alloc).unwrap();
        assert!(groups.is_empty());
        assert!(graph.nodes().all(|n| n.scope_id.is_none()));
    }

    #[test]
    fn test_consumed_member_loses_head_eligibility() {
        // Two disjoint fan-ins: conv2 is consumed by the first group and
        // must not head a second one; the second region forms its own.
        let catalog = vec![fan_in_pattern()];
        let runner = FusionRunner::new(&catalog);

        let mut gb = GraphBuilder::new();
        let conv1 = gb.add_node("Conv");
        let conv2 = gb.add_node("Conv");
        let concat1 = gb.add_node("Concat");
        let conv3 = gb.add_node("Conv");
        let conv4 = gb.add_node("Conv");
        let concat2 = gb.add_node("Concat");
        gb.add_edge(conv1, concat1);
        gb.add_edge(conv2, concat1);
        gb.add_edge(conv3, concat2);
        gb.add_edge(conv4, concat2);
        let mut graph = gb.build();
        let mut alloc = CounterAllocator::new();

        let groups = runner.sweep(&mut graph, &mut alloc).unwrap();
        assert_eq!(groups.len(), 2);

        // Node exclusivity: no node in two groups.
        let mut all: Vec<NodeId> = groups.iter().flat_map(|g| g.members.clone()).collect();
        let before = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), before);
        assert!(!groups[1].members.contains(&conv2));
        let _ = (conv1, conv3, conv4);
    }

    #[test]
    fn test_determinism_across_sweeps() {
        let catalog = vec![fan_in_pattern()];
        let runner = FusionRunner::new(&catalog);

        let run = || {
            let mut graph = fan_in_graph();
            let mut alloc = CounterAllocator::new();
            runner.sweep(&mut graph, &mut alloc).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_ignore_predicate_skips_heads() {
        let catalog = vec![fan_in_pattern()];
        let options = SweepOptions::default().ignore(|n| n.type_tag == "Conv");
        let runner = FusionRunner::with_options(&catalog, options);

        let mut graph = fan_in_graph();
        let mut alloc = CounterAllocator::new();
        let groups = runner.sweep(&mut graph, &mut alloc).unwrap();
        // Only Conv nodes can head this pattern, and all of them are
        // excluded, so nothing fuses.
        assert!(groups.is_empty());
        assert!(graph.nodes().all(|n| n.scope_id.is_none()));
    }

    #[test]
    fn test_device_policy_veto() {
        let catalog = vec![fan_in_pattern()];
        let options = SweepOptions::default().device_policy(|_, _| false);
        let runner = FusionRunner::with_options(&catalog, options);

        let mut graph = fan_in_graph();
        let mut alloc = CounterAllocator::new();
        let groups = runner.sweep(&mut graph, &mut alloc).unwrap();
        assert!(groups.is_empty());
        assert!(graph.nodes().all(|n| n.scope_id.is_none()));
    }

    #[test]
    fn test_scope_ids_monotonic() {
        let mut alloc = CounterAllocator::starting_at(10);
        assert_eq!(alloc.next_scope(), ScopeId(10));
        assert_eq!(alloc.next_scope(), ScopeId(11));
    }
}

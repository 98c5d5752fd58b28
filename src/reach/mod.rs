//! Reachability index
//!
//! Answers "can node `a` reach node `b`" in O(1) over a preallocated bitset
//! table: one row per node, bit *i* set in row *j* iff *i* reaches *j*.
//! Built once per sweep in topological order and updated incrementally
//! after every committed fusion group; rows are monotone, a set bit is
//! never cleared.
//!
//! The table is sized at build time. Querying ids for nodes added
//! afterwards is a design error and reported as
//! [`FusionError::NodeOutOfRange`].

use bitvec::prelude::*;

use crate::error::{FusionError, FusionResult};
use crate::graph::{NodeId, OperationGraph};

/// Bitset-backed ancestor index over one operation graph
#[derive(Debug, Clone)]
pub struct ReachabilityIndex {
    /// rows[j] holds the ancestor set of node j (plus j itself)
    rows: Vec<BitVec>,
}

/// OR `src` into `dst` word-by-word; rows always share one length
fn or_into(dst: &mut BitVec, src: &BitVec) {
    debug_assert_eq!(dst.len(), src.len());
    for (dw, sw) in dst.as_raw_mut_slice().iter_mut().zip(src.as_raw_slice()) {
        *dw |= *sw;
    }
}

/// True iff the two rows share any set bit
fn intersects(a: &BitVec, b: &BitVec) -> bool {
    a.as_raw_slice()
        .iter()
        .zip(b.as_raw_slice())
        .any(|(x, y)| x & y != 0)
}

impl ReachabilityIndex {
    /// Build the index for `graph`
    ///
    /// Processes nodes in topological order; each row is the OR of all
    /// predecessor rows plus the node's own bit. Fails only if the graph
    /// violates its acyclicity precondition.
    pub fn build(graph: &OperationGraph) -> FusionResult<Self> {
        let n = graph.node_count();
        let mut rows = vec![bitvec![0; n]; n];

        for id in graph.topo_order()? {
            // Own bit first so self-reachability holds, then fold in
            // every predecessor's ancestor set.
            rows[id.index()].set(id.index(), true);
            for &pred in graph.predecessors(id) {
                let pred_row = rows[pred.index()].clone();
                or_into(&mut rows[id.index()], &pred_row);
            }
        }

        Ok(Self { rows })
    }

    /// Number of nodes the table was built for
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn check(&self, node: NodeId) -> FusionResult<usize> {
        let idx = node.index();
        if idx >= self.rows.len() {
            return Err(FusionError::NodeOutOfRange {
                node,
                table_len: self.rows.len(),
            });
        }
        Ok(idx)
    }

    /// True iff `a` can reach `b` (including `a == b`)
    pub fn is_connected(&self, a: NodeId, b: NodeId) -> FusionResult<bool> {
        let (a, b) = (self.check(a)?, self.check(b)?);
        Ok(self.rows[b][a])
    }

    /// Fold a committed fusion group into the index
    ///
    /// Models contracting `members` into one atomic node: the union of the
    /// members' ancestor rows is ORed into every row that already sees any
    /// member, so later queries treat the whole group as upstream of
    /// everything any member was upstream of.
    pub fn update(&mut self, members: &[NodeId]) -> FusionResult<()> {
        if members.is_empty() {
            return Ok(());
        }

        let n = self.rows.len();
        let mut union = bitvec![0; n];
        let mut member_mask = bitvec![0; n];
        for &m in members {
            let idx = self.check(m)?;
            or_into(&mut union, &self.rows[idx]);
            member_mask.set(idx, true);
        }

        for row in &mut self.rows {
            if intersects(row, &member_mask) {
                or_into(row, &union);
            }
        }
        Ok(())
    }

    /// Authoritative cycle check for a candidate fusion group
    ///
    /// Contracting `members` keeps the graph acyclic iff no external node
    /// is both reachable from a member and able to reach a member: such a
    /// node sits on a path that leaves the group and returns.
    pub fn contraction_is_acyclic(&self, members: &[NodeId]) -> FusionResult<bool> {
        let n = self.rows.len();
        let mut union = bitvec![0; n];
        let mut member_mask = bitvec![0; n];
        for &m in members {
            let idx = self.check(m)?;
            or_into(&mut union, &self.rows[idx]);
            member_mask.set(idx, true);
        }

        for x in 0..n {
            if member_mask[x] {
                continue;
            }
            // union[x]: x reaches some member; rows[x] ∩ members: some
            // member reaches x.
            if union[x] && intersects(&self.rows[x], &member_mask) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;

    fn chain(n: usize) -> OperationGraph {
        let mut b = GraphBuilder::new();
        let ids: Vec<_> = (0..n).map(|_| b.add_node("Op")).collect();
        for w in ids.windows(2) {
            b.add_edge(w[0], w[1]);
        }
        b.build()
    }

    #[test]
    fn test_build_chain() {
        let g = chain(4);
        let idx = ReachabilityIndex::build(&g).unwrap();
        assert!(idx.is_connected(NodeId(0), NodeId(3)).unwrap());
        assert!(idx.is_connected(NodeId(1), NodeId(2)).unwrap());
        assert!(!idx.is_connected(NodeId(3), NodeId(0)).unwrap());
        assert!(idx.is_connected(NodeId(2), NodeId(2)).unwrap()); // self
    }

    #[test]
    fn test_out_of_range_query() {
        let g = chain(2);
        let idx = ReachabilityIndex::build(&g).unwrap();
        let err = idx.is_connected(NodeId(0), NodeId(9)).unwrap_err();
        assert!(matches!(err, FusionError::NodeOutOfRange { .. }));
    }

    #[test]
    fn test_update_contracts_group() {
        // a → b → c, plus d with no edges. Fusing {a, b} must make
        // everything downstream of the group see a's ancestors.
        let mut b = GraphBuilder::new();
        let a = b.add_node("A");
        let n1 = b.add_node("B");
        let c = b.add_node("C");
        let _d = b.add_node("D");
        b.add_edge(a, n1);
        b.add_edge(n1, c);
        let g = b.build();

        let mut idx = ReachabilityIndex::build(&g).unwrap();
        idx.update(&[a, n1]).unwrap();

        // Group members now share reachability as one atomic node.
        assert!(idx.is_connected(n1, a).unwrap());
        assert!(idx.is_connected(a, c).unwrap());
        // Unrelated node untouched.
        assert!(!idx.is_connected(NodeId(3), c).unwrap());
    }

    #[test]
    fn test_monotonicity_under_updates() {
        let g = chain(5);
        let mut idx = ReachabilityIndex::build(&g).unwrap();
        let before: Vec<Vec<bool>> = (0..5)
            .map(|a| {
                (0..5)
                    .map(|b| idx.is_connected(NodeId(a), NodeId(b)).unwrap())
                    .collect()
            })
            .collect();

        idx.update(&[NodeId(1), NodeId(2)]).unwrap();
        idx.update(&[NodeId(3), NodeId(4)]).unwrap();

        for a in 0..5u32 {
            for b in 0..5u32 {
                if before[a as usize][b as usize] {
                    assert!(idx.is_connected(NodeId(a), NodeId(b)).unwrap());
                }
            }
        }
    }

    #[test]
    fn test_contraction_acyclic_ok() {
        // a → b → c: fusing {a, b} is fine.
        let g = chain(3);
        let idx = ReachabilityIndex::build(&g).unwrap();
        assert!(idx
            .contraction_is_acyclic(&[NodeId(0), NodeId(1)])
            .unwrap());
    }

    #[test]
    fn test_contraction_cycle_detected() {
        // a → x → c and a → c: fusing {a, c} traps x on a re-entrant path.
        let mut b = GraphBuilder::new();
        let a = b.add_node("A");
        let x = b.add_node("X");
        let c = b.add_node("C");
        b.add_edge(a, x);
        b.add_edge(x, c);
        b.add_edge(a, c);
        let g = b.build();

        let idx = ReachabilityIndex::build(&g).unwrap();
        assert!(!idx.contraction_is_acyclic(&[a, c]).unwrap());
        assert!(idx.contraction_is_acyclic(&[a, x]).unwrap());
    }
}

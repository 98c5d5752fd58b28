//! Operation graph arena
//!
//! The graph owns its nodes in a flat arena indexed by [`NodeId`]. It is
//! built once by the frontend, borrowed by the matcher for one sweep, and
//! only mutated through scope-id tagging. Iteration order is creation
//! order, which keeps sweeps deterministic.

mod builder;
mod node;

pub use builder::GraphBuilder;
pub use node::{AttrValue, EdgeList, NodeId, OperationNode, ScopeId, ShapeClass};

use std::collections::VecDeque;

use crate::error::{FusionError, FusionResult};

/// An acyclic operation graph
///
/// Acyclicity is a precondition guaranteed by the graph builder contract;
/// [`OperationGraph::topo_order`] reports a violation if it surfaces.
#[derive(Debug, Clone)]
pub struct OperationGraph {
    nodes: Vec<OperationNode>,
}

impl OperationGraph {
    /// Wrap an already-wired node arena
    pub(crate) fn from_nodes(nodes: Vec<OperationNode>) -> Self {
        Self { nodes }
    }

    // ========================================================================
    // Node accessors
    // ========================================================================

    /// Get a node by id
    ///
    /// # Panics
    /// Panics on an out-of-range id; ids handed out by [`GraphBuilder`]
    /// are always in range.
    #[inline]
    pub fn node(&self, id: NodeId) -> &OperationNode {
        &self.nodes[id.index()]
    }

    /// Get a node by id, if it exists
    pub fn get_node(&self, id: NodeId) -> Option<&OperationNode> {
        self.nodes.get(id.index())
    }

    /// Number of nodes in the graph
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate over all nodes in creation order
    pub fn nodes(&self) -> impl Iterator<Item = &OperationNode> {
        self.nodes.iter()
    }

    /// Iterate over all node ids in creation order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Consumers of `id`'s outputs, in edge order (with multiplicity)
    #[inline]
    pub fn successors(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).outputs
    }

    /// Producers of `id`'s inputs, in input order (with multiplicity)
    #[inline]
    pub fn predecessors(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).inputs
    }

    /// Outgoing edge count of `id`
    #[inline]
    pub fn out_degree(&self, id: NodeId) -> usize {
        self.node(id).out_degree()
    }

    /// Incoming edge count of `id`
    #[inline]
    pub fn in_degree(&self, id: NodeId) -> usize {
        self.node(id).in_degree()
    }

    /// Verify that every edge endpoint exists in the arena
    pub fn validate_edges(&self) -> FusionResult<()> {
        for node in &self.nodes {
            for &to in node.outputs.iter().chain(node.inputs.iter()) {
                if to.index() >= self.nodes.len() {
                    return Err(FusionError::DanglingEdge { from: node.id, to });
                }
            }
        }
        Ok(())
    }

    /// Topological order of all node ids (Kahn's algorithm)
    ///
    /// Ties are broken by creation order, so the result is deterministic.
    pub fn topo_order(&self) -> FusionResult<Vec<NodeId>> {
        let mut in_deg: Vec<usize> = self.nodes.iter().map(|n| n.in_degree()).collect();
        let mut queue: VecDeque<NodeId> = self
            .node_ids()
            .filter(|id| in_deg[id.index()] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            for &succ in self.successors(id) {
                in_deg[succ.index()] -= 1;
                if in_deg[succ.index()] == 0 {
                    queue.push_back(succ);
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(FusionError::CyclicGraph {
                ordered: order.len(),
                total: self.nodes.len(),
            });
        }
        Ok(order)
    }

    // ========================================================================
    // Scope tagging
    // ========================================================================

    /// Assign `scope` to every member node
    ///
    /// The single mutation this pass performs on the graph.
    pub fn tag_scope(&mut self, members: &[NodeId], scope: ScopeId) {
        for &id in members {
            self.nodes[id.index()].scope_id = Some(scope);
        }
    }

    /// Scope id of a node, if it has been fused
    pub fn scope_of(&self, id: NodeId) -> Option<ScopeId> {
        self.node(id).scope_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> OperationGraph {
        // a → b → d, a → c → d
        let mut b = GraphBuilder::new();
        let a = b.add_node("A");
        let n1 = b.add_node("B");
        let n2 = b.add_node("C");
        let d = b.add_node("D");
        b.add_edge(a, n1);
        b.add_edge(a, n2);
        b.add_edge(n1, d);
        b.add_edge(n2, d);
        b.build()
    }

    #[test]
    fn test_topo_order_diamond() {
        let g = diamond();
        let order = g.topo_order().unwrap();
        let pos = |id: NodeId| order.iter().position(|&x| x == id).unwrap();
        assert_eq!(order.len(), 4);
        assert!(pos(NodeId(0)) < pos(NodeId(1)));
        assert!(pos(NodeId(0)) < pos(NodeId(2)));
        assert!(pos(NodeId(1)) < pos(NodeId(3)));
        assert!(pos(NodeId(2)) < pos(NodeId(3)));
    }

    #[test]
    fn test_degrees() {
        let g = diamond();
        assert_eq!(g.out_degree(NodeId(0)), 2);
        assert_eq!(g.in_degree(NodeId(3)), 2);
        assert_eq!(g.in_degree(NodeId(0)), 0);
    }

    #[test]
    fn test_tag_scope() {
        let mut g = diamond();
        g.tag_scope(&[NodeId(0), NodeId(1)], ScopeId(3));
        assert_eq!(g.scope_of(NodeId(0)), Some(ScopeId(3)));
        assert_eq!(g.scope_of(NodeId(2)), None);
    }

    #[test]
    fn test_validate_edges_ok() {
        assert!(diamond().validate_edges().is_ok());
    }

    #[test]
    fn test_iteration_is_creation_order() {
        let g = diamond();
        let tags: Vec<_> = g.nodes().map(|n| n.type_tag.as_str()).collect();
        assert_eq!(tags, vec!["A", "B", "C", "D"]);
    }
}

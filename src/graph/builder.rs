//! Graph construction
//!
//! `GraphBuilder` is the hand-off point from a frontend representation:
//! nodes are appended in creation order (which doubles as the sweep's
//! stable iteration order) and edges are wired by id. The builder does not
//! verify acyclicity; that is part of the frontend contract.

use indexmap::IndexMap;

use super::node::{AttrValue, NodeId, OperationNode, ShapeClass};
use super::OperationGraph;

/// Incremental builder for [`OperationGraph`]
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<OperationNode>,
}

impl GraphBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node with the given type tag, returning its id
    pub fn add_node(&mut self, type_tag: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(OperationNode::new(id, type_tag));
        id
    }

    /// Append a node with attributes and a shape classification
    pub fn add_node_with(
        &mut self,
        type_tag: impl Into<String>,
        shape_class: ShapeClass,
        attrs: IndexMap<String, AttrValue>,
    ) -> NodeId {
        let id = self.add_node(type_tag);
        let node = &mut self.nodes[id.index()];
        node.shape_class = shape_class;
        node.attrs = attrs;
        id
    }

    /// Add a data edge `from → to`
    ///
    /// Duplicate edges are kept: a producer feeding the same consumer twice
    /// is two edges, and degree checks count them as such.
    ///
    /// # Panics
    /// Panics if either id was not returned by this builder. Edge wiring
    /// happens at construction time, before the matcher's attempt-local
    /// error policy applies.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        assert!(from.index() < self.nodes.len(), "unknown source node");
        assert!(to.index() < self.nodes.len(), "unknown target node");
        self.nodes[from.index()].outputs.push(to);
        self.nodes[to.index()].inputs.push(from);
    }

    /// Set the shape classification of an existing node
    pub fn set_shape_class(&mut self, node: NodeId, shape_class: ShapeClass) {
        self.nodes[node.index()].shape_class = shape_class;
    }

    /// Set an attribute on an existing node
    pub fn set_attr(&mut self, node: NodeId, key: impl Into<String>, value: AttrValue) {
        self.nodes[node.index()].attrs.insert(key.into(), value);
    }

    /// Finish construction
    pub fn build(self) -> OperationGraph {
        OperationGraph::from_nodes(self.nodes)
    }
}

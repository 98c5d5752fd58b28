//! Operation node types
//!
//! Nodes live in an arena owned by [`OperationGraph`](super::OperationGraph)
//! and are addressed by stable integer ids. Edges are stored as id lists on
//! both endpoints, so the matcher never chases pointers.

use indexmap::IndexMap;
use smallvec::SmallVec;

/// Stable index of a node inside its graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The arena slot this id refers to
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Scope id assigned to every member of a committed fusion group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u64);

/// Attribute value attached to an operation node
///
/// Read-only to the matcher; the scope id is the only field this pass
/// writes, and it has its own typed slot on the node.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Integer attribute
    Int(i64),
    /// String attribute (scheduling labels, layout tags, ...)
    Str(String),
    /// Boolean attribute
    Bool(bool),
    /// Integer-list attribute (shapes, strides, ...)
    IntList(Vec<i64>),
}

/// Whether a node's output shapes are fully known at compile time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShapeClass {
    /// All dimensions statically known
    #[default]
    Static,
    /// At least one dimension resolved at run time
    Dynamic,
}

/// Edge list type; most nodes have one or two data edges per side
pub type EdgeList = SmallVec<[NodeId; 2]>;

/// One operation in the graph
///
/// Created by the external graph builder and destroyed with the graph.
/// The matcher only reads nodes and writes the `scope_id` slot on commit.
#[derive(Debug, Clone)]
pub struct OperationNode {
    /// This node's arena id
    pub id: NodeId,
    /// Operation type tag (e.g. "Conv", "Concat")
    pub type_tag: String,
    /// Producers of this node's inputs, in input order (data edges only)
    pub inputs: EdgeList,
    /// Consumers of this node's outputs, in edge order (data edges only)
    pub outputs: EdgeList,
    /// Read-only attribute map
    pub attrs: IndexMap<String, AttrValue>,
    /// Static/dynamic shape classification
    pub shape_class: ShapeClass,
    /// Fusion scope id, set once when the node joins a committed group
    pub scope_id: Option<ScopeId>,
}

impl OperationNode {
    /// Create a bare node with the given id and type tag
    pub fn new(id: NodeId, type_tag: impl Into<String>) -> Self {
        Self {
            id,
            type_tag: type_tag.into(),
            inputs: SmallVec::new(),
            outputs: SmallVec::new(),
            attrs: IndexMap::new(),
            shape_class: ShapeClass::default(),
            scope_id: None,
        }
    }

    /// Number of incoming data edges (with multiplicity)
    #[inline]
    pub fn in_degree(&self) -> usize {
        self.inputs.len()
    }

    /// Number of outgoing data edges (with multiplicity)
    #[inline]
    pub fn out_degree(&self) -> usize {
        self.outputs.len()
    }

    /// Whether this node already belongs to a committed fusion group
    #[inline]
    pub fn is_fused(&self) -> bool {
        self.scope_id.is_some()
    }

    /// Look up an attribute
    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_degrees() {
        let mut node = OperationNode::new(NodeId(0), "Conv");
        assert_eq!(node.in_degree(), 0);
        node.inputs.push(NodeId(1));
        node.inputs.push(NodeId(1));
        assert_eq!(node.in_degree(), 2); // multi-edges count twice
    }

    #[test]
    fn test_scope_tagging() {
        let mut node = OperationNode::new(NodeId(0), "Relu");
        assert!(!node.is_fused());
        node.scope_id = Some(ScopeId(7));
        assert!(node.is_fused());
    }

    #[test]
    fn test_attrs() {
        let mut node = OperationNode::new(NodeId(0), "Conv");
        node.attrs
            .insert("unit".to_string(), AttrValue::Str("mac".to_string()));
        assert_eq!(node.attr("unit"), Some(&AttrValue::Str("mac".to_string())));
        assert!(node.attr("missing").is_none());
    }
}

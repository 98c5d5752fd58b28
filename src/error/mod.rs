//! Error types for the buffer-fusion pass
//!
//! All errors here are *attempt-local*: a failure aborts the current
//! (pattern, head node) match attempt, never the whole sweep. The runner
//! logs and moves on to the next candidate.

use thiserror::Error;

use crate::graph::NodeId;

/// Structural errors raised by the matcher and its reachability index
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FusionError {
    /// A node index fell outside the table the reachability index was built for.
    ///
    /// Querying nodes added after `ReachabilityIndex::build` is a design
    /// error in the caller, not a recoverable condition.
    #[error("node {node:?} out of range for reachability table of {table_len} nodes")]
    NodeOutOfRange {
        /// The offending node id
        node: NodeId,
        /// Size of the table at build time
        table_len: usize,
    },

    /// An edge referenced a node that does not exist in the graph
    #[error("dangling edge: node {from:?} references missing node {to:?}")]
    DanglingEdge {
        /// Source node of the edge
        from: NodeId,
        /// The missing endpoint
        to: NodeId,
    },

    /// A pattern referenced a descriptor index outside its own descriptor list
    #[error("pattern '{pattern}' references descriptor {index} of {len}")]
    DescriptorOutOfRange {
        /// Pattern name
        pattern: String,
        /// The out-of-range descriptor index
        index: usize,
        /// Number of descriptors in the pattern
        len: usize,
    },

    /// The graph handed to the sweep contained a cycle
    ///
    /// Acyclicity is a precondition of the graph-builder contract; this is
    /// only detected incidentally (topological sort cannot complete).
    #[error("operation graph is cyclic: topological order covers {ordered} of {total} nodes")]
    CyclicGraph {
        /// Nodes the topological sort managed to order
        ordered: usize,
        /// Total nodes in the graph
        total: usize,
    },
}

/// Result type alias for fusion operations
pub type FusionResult<T> = Result<T, FusionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FusionError::NodeOutOfRange {
            node: NodeId(42),
            table_len: 10,
        };
        assert!(err.to_string().contains("42"));
        assert!(err.to_string().contains("10"));
    }

    #[test]
    fn test_dangling_edge_display() {
        let err = FusionError::DanglingEdge {
            from: NodeId(1),
            to: NodeId(9),
        };
        assert!(err.to_string().contains("missing node"));
    }
}

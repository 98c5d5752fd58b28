//! # NPU Buffer Fusion
//!
//! Subgraph-pattern matcher that finds the largest legally-fusible node
//! sets in a directed operation graph, for fusion into single compiled
//! units on an NPU backend.
//!
//! The matcher expands declarative [`pattern::FusionPattern`]s
//! breadth-first from candidate head nodes, backtracks speculatively on
//! detected temporary cycles, and validates every candidate group with an
//! exact contraction check over a bitset [`reach::ReachabilityIndex`]
//! before committing it as a [`runner::FusionGroup`].
//!
//! ## Example
//!
//! ```
//! use npu_buffer_fusion::prelude::*;
//!
//! // Head{Conv} → Tail{Concat} fan-in pattern.
//! let mut b = FusionPattern::builder("conv-concat");
//! let head = b.head(OpDescriptor::concrete("Head", ["Conv"]).repeat(2, 2));
//! let tail = b.descriptor(OpDescriptor::concrete("Tail", ["Concat"]).multi_branch());
//! b.edge(head, tail);
//! b.multi_branch_compatible("Concat");
//! let catalog = vec![b.build().unwrap()];
//!
//! let mut gb = GraphBuilder::new();
//! let c1 = gb.add_node("Conv");
//! let c2 = gb.add_node("Conv");
//! let cat = gb.add_node("Concat");
//! gb.add_edge(c1, cat);
//! gb.add_edge(c2, cat);
//! let mut graph = gb.build();
//!
//! let runner = FusionRunner::new(&catalog);
//! let mut alloc = CounterAllocator::new();
//! let groups = runner.sweep(&mut graph, &mut alloc).unwrap();
//! assert_eq!(groups.len(), 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod graph;
pub mod matcher;
pub mod pattern;
pub mod reach;
pub mod runner;

/// Prelude module - import commonly used types with
/// `use npu_buffer_fusion::prelude::*`
pub mod prelude {
    pub use crate::error::{FusionError, FusionResult};
    pub use crate::graph::{
        AttrValue, GraphBuilder, NodeId, OperationGraph, OperationNode, ScopeId, ShapeClass,
    };
    pub use crate::matcher::{MatchAttempt, MatchState, DEFAULT_MAX_BACKTRACK_STEPS};
    pub use crate::pattern::{
        BranchArity, FusionPattern, OpDescriptor, ShapeSupport, TypeConstraint,
    };
    pub use crate::reach::ReachabilityIndex;
    pub use crate::runner::{
        CounterAllocator, FusionGroup, FusionRunner, ScopeIdAllocator, SweepOptions,
    };
}

pub use error::{FusionError, FusionResult};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

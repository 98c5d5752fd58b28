//! Declarative fusion patterns
//!
//! Patterns describe which subgraphs may be collapsed into one fusion
//! scope. The catalog itself is supplied externally; this module provides
//! the model the match engine consumes.

mod descriptor;
mod model;

pub use descriptor::{BranchArity, OpDescriptor, ShapeSupport, TypeConstraint};
pub use model::{AttrChecker, DescIdx, FusionPattern, HeadFilter, PatternBuilder};

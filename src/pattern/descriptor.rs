//! Pattern op-descriptors
//!
//! A descriptor is one slot of a fusion pattern: the set of operation
//! types it accepts, how many times it may occur, how many consumers its
//! matched node may have, and which shape classes it supports. Descriptors
//! are immutable; per-attempt occurrence counts live in the match state's
//! ledger, never on the descriptor.

use smallvec::SmallVec;

use crate::graph::ShapeClass;

/// Accepted-type constraint of a descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeConstraint {
    /// Accepts exactly the listed operation type tags
    Concrete(SmallVec<[String; 2]>),
    /// Wildcard: accepts any operation type
    Any,
    /// Graph-boundary consumer; matched for bookkeeping but never fused
    Output,
}

impl TypeConstraint {
    /// Whether this constraint accepts the given type tag
    pub fn accepts(&self, type_tag: &str) -> bool {
        match self {
            TypeConstraint::Concrete(tags) => tags.iter().any(|t| t == type_tag),
            TypeConstraint::Any | TypeConstraint::Output => true,
        }
    }

    /// Match priority: concrete beats `Any` beats `Output`
    pub fn priority(&self) -> u8 {
        match self {
            TypeConstraint::Concrete(_) => 0,
            TypeConstraint::Any => 1,
            TypeConstraint::Output => 2,
        }
    }

    /// Whether this is the boundary sentinel
    #[inline]
    pub fn is_output(&self) -> bool {
        matches!(self, TypeConstraint::Output)
    }
}

/// How many graph successors a matched node may have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchArity {
    /// At most one consumer
    #[default]
    Single,
    /// More than one consumer
    Multi,
}

impl BranchArity {
    /// Whether a node with `out_degree` consumers satisfies this arity
    pub fn admits(self, out_degree: usize) -> bool {
        match self {
            BranchArity::Single => out_degree <= 1,
            BranchArity::Multi => out_degree > 1,
        }
    }
}

/// Shape-support rule of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShapeSupport {
    /// Accepts static and dynamic nodes alike
    #[default]
    Any,
    /// Only statically-shaped nodes
    StaticOnly,
    /// Only dynamically-shaped nodes
    DynamicOnly,
}

impl ShapeSupport {
    /// Whether a node of the given shape class satisfies this rule
    pub fn admits(self, class: ShapeClass) -> bool {
        match self {
            ShapeSupport::Any => true,
            ShapeSupport::StaticOnly => class == ShapeClass::Static,
            ShapeSupport::DynamicOnly => class == ShapeClass::Dynamic,
        }
    }
}

/// One slot of a fusion pattern
#[derive(Debug, Clone)]
pub struct OpDescriptor {
    /// Descriptor name, for diagnostics
    pub name: String,
    /// Accepted-type constraint
    pub constraint: TypeConstraint,
    /// Minimum occurrences for the pattern to be satisfied
    pub repeat_min: u32,
    /// Maximum occurrences a match may contain
    pub repeat_max: u32,
    /// Consumer-count constraint on matched nodes
    pub branch: BranchArity,
    /// Alternation group: at least one member of a group must reach its
    /// minimum; unsatisfied members of the same group are tolerated
    pub group_id: Option<u32>,
    /// Skip the input-edge agreement check at evaluation time
    pub ignore_input_agreement: bool,
    /// Skip the output-edge agreement check at evaluation time
    pub ignore_output_agreement: bool,
    /// Shape-support rule
    pub shape: ShapeSupport,
}

impl OpDescriptor {
    /// Descriptor accepting the listed concrete type tags, occurring once
    pub fn concrete<I, S>(name: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_constraint(
            name,
            TypeConstraint::Concrete(tags.into_iter().map(Into::into).collect()),
        )
    }

    /// Wildcard descriptor
    pub fn any(name: impl Into<String>) -> Self {
        Self::with_constraint(name, TypeConstraint::Any)
    }

    /// Graph-boundary descriptor
    pub fn output(name: impl Into<String>) -> Self {
        Self::with_constraint(name, TypeConstraint::Output)
    }

    fn with_constraint(name: impl Into<String>, constraint: TypeConstraint) -> Self {
        Self {
            name: name.into(),
            constraint,
            repeat_min: 1,
            repeat_max: 1,
            branch: BranchArity::default(),
            group_id: None,
            ignore_input_agreement: false,
            ignore_output_agreement: false,
            shape: ShapeSupport::default(),
        }
    }

    /// Set occurrence bounds
    pub fn repeat(mut self, min: u32, max: u32) -> Self {
        debug_assert!(min <= max);
        self.repeat_min = min;
        self.repeat_max = max;
        self
    }

    /// Require more than one consumer on matched nodes
    pub fn multi_branch(mut self) -> Self {
        self.branch = BranchArity::Multi;
        self
    }

    /// Put this descriptor in an alternation group
    pub fn group(mut self, id: u32) -> Self {
        self.group_id = Some(id);
        self
    }

    /// Skip input-edge agreement for matched nodes
    pub fn ignore_inputs(mut self) -> Self {
        self.ignore_input_agreement = true;
        self
    }

    /// Skip output-edge agreement for matched nodes
    pub fn ignore_outputs(mut self) -> Self {
        self.ignore_output_agreement = true;
        self
    }

    /// Set the shape-support rule
    pub fn shape_support(mut self, shape: ShapeSupport) -> Self {
        self.shape = shape;
        self
    }

    /// Whether an absent occurrence still satisfies this descriptor
    #[inline]
    pub fn is_optional(&self) -> bool {
        self.repeat_min == 0
    }
}

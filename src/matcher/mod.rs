//! Breadth-first match engine with speculative backtracking
//!
//! One [`MatchAttempt`] covers one (pattern, head node) pair; the fusion
//! runner drives attempts across the whole graph.

mod engine;
mod state;

pub use engine::{MatchAttempt, Phase, DEFAULT_MAX_BACKTRACK_STEPS};
pub use state::MatchState;

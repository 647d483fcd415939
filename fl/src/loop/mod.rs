//! Loop execution module for FeatureLoop
//!
//! The Loop Engine runs feature iterations: context -> prompt -> agent ->
//! actions or phase transition -> repeat. Each iteration starts from a fresh
//! context; state persists in files, not memory.

mod engine;
mod machine;
mod outcome;

pub use engine::LoopEngine;
pub use machine::{PhaseEvent, PhaseMachine, Transition};
pub use outcome::{LoopError, LoopOutcome};

//! FeatureLoop - phased feature build loop around an external agent
//!
//! FeatureLoop drives an external reasoning agent through a specification's
//! features one iteration at a time. Each iteration plans, validates or
//! executes, and every iteration starts from a freshly built context.
//!
//! # Core Concepts
//!
//! - **Fresh Context Always**: Every agent call gets a context rebuilt from disk
//! - **State in Files**: The feature list, progress log and resume record persist, memory does not
//! - **Plan Before Write**: Only the Executing phase may touch the working tree
//! - **Bounded Everything**: Iterations, re-plans and concurrency all have limits
//!
//! # Modules
//!
//! - [`protocol`] - Structured agent responses and their recovery from free text
//! - [`tools`] - Parallel action executor and the built-in actions
//! - [`progress`] - Iteration context building
//! - [`r#loop`] - Phase state machine and loop engine
//! - [`state`] - Resumable session state
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod agent;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exit_codes;
pub mod progress;
pub mod prompts;
pub mod protocol;
pub mod state;
pub mod tools;

// Note: 'loop' is a reserved keyword, so we use r#loop
#[path = "loop/mod.rs"]
pub mod r#loop;

// Re-export commonly used types
pub use agent::{AgentClient, AgentError, CommandAgent, StdinUser, UserChannel};
pub use config::Config;
pub use domain::{Feature, FeatureList, Phase, Priority};
pub use progress::{CarryOver, ContextBuilder, ContextError, IterationContext};
pub use protocol::{Action, ActionParams, AgentResponse, ProtocolError, SubAction, parse_response};
pub use r#loop::{LoopEngine, LoopError, LoopOutcome, PhaseMachine};
pub use state::{ResumeState, ResumeStore};
pub use tools::{ActionResult, ParallelExecutor, ParallelResult, ToolContext, ToolProfile};

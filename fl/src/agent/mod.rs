//! Agent process boundary
//!
//! The agent is a black box: a prompt goes in, text that should contain a
//! structured response comes out.

mod client;
mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;
mod process;

pub use client::{AgentClient, UserChannel};
pub use error::AgentError;
pub use process::{CommandAgent, StdinUser};

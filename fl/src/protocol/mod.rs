//! Action protocol between the loop and the external agent
//!
//! The agent answers every prompt with a JSON object
//! `{thinking?, action, action_params?, message?, state?}`, either bare or
//! embedded in free text. This module owns the vocabulary and the decoding.

mod action;
mod error;
mod parse;

pub use action::{Action, ActionParams, AgentResponse, SubAction};
pub use error::ProtocolError;
pub use parse::{balanced_regions, decode_value, fenced_blocks, parse_response};

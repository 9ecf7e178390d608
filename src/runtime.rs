//! Runtime for driving chat sessions
//!
//! The controller owns the session, runs each turn as a background task and
//! reports results to subscribers over a broadcast channel.

mod executor;
pub mod traits;
mod turn;

#[cfg(test)]
pub mod testing;

pub use executor::ChatController;
pub use traits::*;

use crate::state_machine::{ConvState, TransitionError};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Events sent to subscribers
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A turn completed and its reply was applied to the session
    Reply(ChatReply),
    /// A turn gave up after reaching the retry ceiling
    Failed {
        character_name: String,
        message: String,
    },
    StateChange {
        state: ConvState,
    },
}

/// Payload of a completed turn
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    /// Formatted reply text
    pub reply: String,
    /// Whole transcript including this reply
    pub full_history: String,
    pub character_name: String,
    /// Label of the character's current topic, if any
    pub topic: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Errors returned by controller operations
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

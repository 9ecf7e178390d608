//! Events that drive the conversation

use crate::session::{SessionOpening, TurnOutcome};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Player events
    StartChat {
        opening: SessionOpening,
    },
    UserUtterance {
        text: String,
    },
    EndChat,

    // Turn task events, tagged with the generation that dispatched them
    ReplyReceived {
        generation: u64,
        outcome: TurnOutcome,
    },
    ReplyFailed {
        generation: u64,
        message: String,
    },
}

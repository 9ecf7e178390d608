//! Effects produced by state transitions

use crate::session::{SessionOpening, TurnOutcome};

/// Effects to be executed after a state transition, in order
#[derive(Debug, Clone)]
pub enum Effect {
    /// Cancel the in-flight turn task, if any
    AbortTurn,

    /// Write the bound character's memory back to the store
    PersistCharacter,

    /// Replace the session
    OpenSession { opening: SessionOpening },

    /// Append the player's line to history and log
    RecordUserTurn { text: String },

    /// Spawn the turn task for the current session
    RequestReply { generation: u64 },

    /// Fold a completed turn into the session
    ApplyReply { outcome: TurnOutcome },

    /// Broadcast the last applied reply
    NotifyReply,

    /// Broadcast a turn that gave up
    NotifyFailure { message: String },

    /// Broadcast the new state
    NotifyStateChange,

    /// Drop a reply that belongs to an older session
    DiscardStale { generation: u64 },

    /// Clear names, history, log and stop sequences
    ResetSession,
}

//! Conversation state types

use serde::{Deserialize, Serialize};

/// Where the conversation stands.
///
/// Every state carries the session generation. Opening or ending a session
/// bumps it, so a reply that arrives for an older generation is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConvState {
    /// No session open
    Idle { generation: u64 },
    /// Session open, ready for the player's next line
    Active { generation: u64 },
    /// A turn is in flight; further lines are rejected until it settles
    AwaitingReply { generation: u64 },
}

impl Default for ConvState {
    fn default() -> Self {
        ConvState::Idle { generation: 0 }
    }
}

impl ConvState {
    pub fn generation(&self) -> u64 {
        match self {
            ConvState::Idle { generation }
            | ConvState::Active { generation }
            | ConvState::AwaitingReply { generation } => *generation,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, ConvState::AwaitingReply { .. })
    }

    pub fn has_session(&self) -> bool {
        !matches!(self, ConvState::Idle { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConvState::Idle { .. } => "idle",
            ConvState::Active { .. } => "active",
            ConvState::AwaitingReply { .. } => "awaiting_reply",
        }
    }
}

//! Pure state transition function

use super::{ConvState, Effect, Event};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConvState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConvState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A reply is still being generated, wait for it before continuing")]
    AgentBusy,
    #[error("No chat session is open")]
    NoActiveSession,
}

/// Pure transition function.
///
/// Given the same inputs it always produces the same outputs; all I/O is
/// described by the returned effects.
pub fn transition(state: &ConvState, event: Event) -> Result<TransitionResult, TransitionError> {
    let generation = state.generation();

    match (state, event) {
        // Bound and resumed openings touch character memory, so they wait
        // for the in-flight turn.
        (ConvState::AwaitingReply { .. }, Event::StartChat { opening })
            if opening.requires_idle_session() =>
        {
            Err(TransitionError::AgentBusy)
        }

        // A fresh opening supersedes whatever is in flight
        (ConvState::AwaitingReply { .. }, Event::StartChat { opening }) => {
            Ok(TransitionResult::new(ConvState::Active {
                generation: generation + 1,
            })
            .with_effect(Effect::AbortTurn)
            .with_effects(open_session(opening)))
        }

        (ConvState::Idle { .. } | ConvState::Active { .. }, Event::StartChat { opening }) => {
            Ok(TransitionResult::new(ConvState::Active {
                generation: generation + 1,
            })
            .with_effects(open_session(opening)))
        }

        (ConvState::Active { generation }, Event::UserUtterance { text }) => Ok(
            TransitionResult::new(ConvState::AwaitingReply {
                generation: *generation,
            })
            .with_effect(Effect::RecordUserTurn { text })
            .with_effect(Effect::PersistCharacter)
            .with_effect(Effect::NotifyStateChange)
            .with_effect(Effect::RequestReply {
                generation: *generation,
            }),
        ),

        (ConvState::AwaitingReply { .. }, Event::UserUtterance { .. }) => {
            Err(TransitionError::AgentBusy)
        }

        (ConvState::Idle { .. }, Event::UserUtterance { .. }) => {
            Err(TransitionError::NoActiveSession)
        }

        (
            ConvState::AwaitingReply { generation },
            Event::ReplyReceived {
                generation: reply_generation,
                outcome,
            },
        ) if *generation == reply_generation => Ok(TransitionResult::new(ConvState::Active {
            generation: *generation,
        })
        .with_effect(Effect::ApplyReply { outcome })
        .with_effect(Effect::PersistCharacter)
        .with_effect(Effect::NotifyReply)
        .with_effect(Effect::NotifyStateChange)),

        (
            ConvState::AwaitingReply { generation },
            Event::ReplyFailed {
                generation: reply_generation,
                message,
            },
        ) if *generation == reply_generation => Ok(TransitionResult::new(ConvState::Active {
            generation: *generation,
        })
        .with_effect(Effect::NotifyFailure { message })
        .with_effect(Effect::NotifyStateChange)),

        // Anything else from a turn task belongs to an older session
        (
            _,
            Event::ReplyReceived {
                generation: stale, ..
            }
            | Event::ReplyFailed {
                generation: stale, ..
            },
        ) => Ok(TransitionResult::new(*state).with_effect(Effect::DiscardStale { generation: stale })),

        (ConvState::Idle { .. }, Event::EndChat) => Ok(TransitionResult::new(ConvState::Idle {
            generation: generation + 1,
        })
        .with_effect(Effect::ResetSession)),

        (ConvState::Active { .. }, Event::EndChat) => Ok(TransitionResult::new(ConvState::Idle {
            generation: generation + 1,
        })
        .with_effect(Effect::PersistCharacter)
        .with_effect(Effect::ResetSession)
        .with_effect(Effect::NotifyStateChange)),

        (ConvState::AwaitingReply { .. }, Event::EndChat) => {
            Ok(TransitionResult::new(ConvState::Idle {
                generation: generation + 1,
            })
            .with_effect(Effect::AbortTurn)
            .with_effect(Effect::PersistCharacter)
            .with_effect(Effect::ResetSession)
            .with_effect(Effect::NotifyStateChange))
        }
    }
}

/// Suspend the current character, then open and persist the new session
fn open_session(opening: crate::session::SessionOpening) -> [Effect; 4] {
    [
        Effect::PersistCharacter,
        Effect::OpenSession { opening },
        Effect::PersistCharacter,
        Effect::NotifyStateChange,
    ]
}

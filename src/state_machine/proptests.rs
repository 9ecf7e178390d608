//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::transition::*;
use super::*;
use crate::character::Character;
use crate::llm::Message;
use crate::message_log::MessageLog;
use crate::session::{SessionOpening, TurnOutcome};
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_state() -> impl Strategy<Value = ConvState> {
    prop_oneof![
        (0u64..20).prop_map(|generation| ConvState::Idle { generation }),
        (0u64..20).prop_map(|generation| ConvState::Active { generation }),
        (0u64..20).prop_map(|generation| ConvState::AwaitingReply { generation }),
    ]
}

fn arb_opening() -> impl Strategy<Value = SessionOpening> {
    prop_oneof![
        ("[A-Z][a-z]{0,6}", "[A-Z][a-z]{0,6}").prop_map(|(player, npc_name)| {
            SessionOpening::Fresh {
                player,
                npc_name,
                description: String::new(),
            }
        }),
        "[A-Z][a-z]{0,6}".prop_map(|player| SessionOpening::Bound {
            player,
            character: Box::new(Character::new("aria", "Aria")),
            description: String::new(),
        }),
        "[A-Z][a-z]{0,6}".prop_map(|player| SessionOpening::Resume {
            player,
            character: Box::new(Character::new("aria", "Aria")),
        }),
    ]
}

fn arb_outcome() -> impl Strategy<Value = TurnOutcome> {
    "[a-zA-Z .!?]{0,20}".prop_map(|text| TurnOutcome {
        log: MessageLog::new(),
        reply: Message::assistant(text),
        topic: None,
    })
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        arb_opening().prop_map(|opening| Event::StartChat { opening }),
        "[a-z ]{0,20}".prop_map(|text| Event::UserUtterance { text }),
        Just(Event::EndChat),
        (0u64..20, arb_outcome())
            .prop_map(|(generation, outcome)| Event::ReplyReceived { generation, outcome }),
        (0u64..20, "[a-z ]{1,20}")
            .prop_map(|(generation, message)| Event::ReplyFailed { generation, message }),
    ]
}

fn is_turn_result(event: &Event) -> bool {
    matches!(
        event,
        Event::ReplyReceived { .. } | Event::ReplyFailed { .. }
    )
}

fn event_generation(event: &Event) -> Option<u64> {
    match event {
        Event::ReplyReceived { generation, .. } | Event::ReplyFailed { generation, .. } => {
            Some(*generation)
        }
        _ => None,
    }
}

// ============================================================================
// Invariants
// ============================================================================

proptest! {
    #[test]
    fn generation_never_decreases(state in arb_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, event) {
            prop_assert!(result.new_state.generation() >= state.generation());
        }
    }

    #[test]
    fn busy_state_rejects_new_lines(generation in 0u64..20, text in "[a-z ]{0,20}") {
        let state = ConvState::AwaitingReply { generation };
        let result = transition(&state, Event::UserUtterance { text });
        prop_assert_eq!(result.unwrap_err(), TransitionError::AgentBusy);
    }

    #[test]
    fn stale_turn_results_never_change_state(state in arb_state(), event in arb_event()) {
        prop_assume!(is_turn_result(&event));
        let reply_generation = event_generation(&event).unwrap();
        prop_assume!(!state.is_busy() || reply_generation != state.generation());

        let result = transition(&state, event).unwrap();
        prop_assert_eq!(result.new_state, state);
        let only_discard = matches!(result.effects.as_slice(), [Effect::DiscardStale { .. }]);
        prop_assert!(only_discard);
    }

    #[test]
    fn settled_turn_always_releases_busy_flag(generation in 0u64..20, event in arb_event()) {
        prop_assume!(is_turn_result(&event));
        let event = match event {
            Event::ReplyReceived { outcome, .. } => Event::ReplyReceived { generation, outcome },
            Event::ReplyFailed { message, .. } => Event::ReplyFailed { generation, message },
            other => other,
        };
        let result = transition(&ConvState::AwaitingReply { generation }, event).unwrap();
        prop_assert_eq!(result.new_state, ConvState::Active { generation });
    }

    #[test]
    fn end_chat_always_lands_idle(state in arb_state()) {
        let result = transition(&state, Event::EndChat).unwrap();
        let is_idle = matches!(result.new_state, ConvState::Idle { .. });
        prop_assert!(is_idle);
        prop_assert!(result.new_state.generation() > state.generation());
        prop_assert!(result.effects.iter().any(|e| matches!(e, Effect::ResetSession)));
        prop_assert_eq!(
            result.effects.iter().any(|e| matches!(e, Effect::AbortTurn)),
            state.is_busy()
        );
    }

    #[test]
    fn requested_reply_matches_new_generation(state in arb_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, event) {
            for effect in &result.effects {
                if let Effect::RequestReply { generation } = effect {
                    prop_assert_eq!(*generation, result.new_state.generation());
                    prop_assert!(result.new_state.is_busy());
                }
            }
        }
    }

    #[test]
    fn opening_always_bumps_generation(state in arb_state(), opening in arb_opening()) {
        let waits = opening.requires_idle_session();
        match transition(&state, Event::StartChat { opening }) {
            Ok(result) => {
                prop_assert_eq!(result.new_state, ConvState::Active { generation: state.generation() + 1 });
            }
            Err(err) => {
                prop_assert!(state.is_busy() && waits);
                prop_assert_eq!(err, TransitionError::AgentBusy);
            }
        }
    }
}

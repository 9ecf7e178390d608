//! Chat controller: applies transitions and executes their effects

use super::turn::TurnPlan;
use super::{CharacterStore, ChatEvent, ChatReply, ControllerError};
use crate::config::ChatConfig;
use crate::llm::{check_connection, LlmError, LlmService};
use crate::message_log::MessageLog;
use crate::session::{Session, SessionOpening};
use crate::state_machine::{transition, ConvState, Effect, Event, TransitionError};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Drives one conversation at a time against a completion service.
///
/// Cheap to clone; clones share the same session.
pub struct ChatController<L: LlmService + 'static> {
    shared: Arc<Shared<L>>,
}

impl<L: LlmService + 'static> Clone for ChatController<L> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<L> {
    llm: L,
    store: Arc<dyn CharacterStore>,
    config: ChatConfig,
    core: Mutex<Core>,
    broadcast_tx: broadcast::Sender<ChatEvent>,
}

#[derive(Default)]
struct Core {
    state: ConvState,
    session: Session,
    turn_cancel: Option<CancellationToken>,
}

impl<L: LlmService + 'static> ChatController<L> {
    pub fn new(llm: L, store: Arc<dyn CharacterStore>, config: ChatConfig) -> Self {
        let (broadcast_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                llm,
                store,
                config,
                core: Mutex::new(Core::default()),
                broadcast_tx,
            }),
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.shared.config
    }

    /// Subscribe to replies, failures and state changes
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.shared.broadcast_tx.subscribe()
    }

    /// Open a session with an NPC that has no stored character.
    ///
    /// Supersedes any open session, aborting its in-flight turn.
    pub async fn start_new_chat(
        &self,
        player: &str,
        npc_name: &str,
        description: &str,
    ) -> Result<(), ControllerError> {
        self.shared
            .handle_event(Event::StartChat {
                opening: SessionOpening::Fresh {
                    player: player.to_string(),
                    npc_name: npc_name.to_string(),
                    description: description.to_string(),
                },
            })
            .await
    }

    /// Open a new session bound to a stored character, extending its log
    pub async fn start_new_chat_with(
        &self,
        player: &str,
        character_id: &str,
        description: &str,
    ) -> Result<(), ControllerError> {
        self.ensure_not_busy().await?;
        let character = self.shared.store.get(character_id).await?;
        self.shared
            .handle_event(Event::StartChat {
                opening: SessionOpening::Bound {
                    player: player.to_string(),
                    character: Box::new(character),
                    description: description.to_string(),
                },
            })
            .await
    }

    /// Resume a stored character's conversation where it left off
    pub async fn return_to_chat(
        &self,
        player: &str,
        character_id: &str,
    ) -> Result<(), ControllerError> {
        self.ensure_not_busy().await?;
        let character = self.shared.store.get(character_id).await?;
        self.shared
            .handle_event(Event::StartChat {
                opening: SessionOpening::Resume {
                    player: player.to_string(),
                    character: Box::new(character),
                },
            })
            .await
    }

    /// Send the player's line. The reply arrives as [`ChatEvent::Reply`].
    pub async fn request_chat_response(&self, utterance: &str) -> Result<(), ControllerError> {
        self.shared
            .handle_event(Event::UserUtterance {
                text: utterance.to_string(),
            })
            .await
    }

    pub async fn end_current_chat(&self) -> Result<(), ControllerError> {
        self.shared.handle_event(Event::EndChat).await
    }

    /// Run the connectivity self-check in the background
    pub fn spawn_connection_check(&self) -> JoinHandle<Result<u32, LlmError>> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { check_connection(&shared.llm, &shared.config.self_check_retry).await })
    }

    pub async fn state(&self) -> ConvState {
        self.shared.core.lock().await.state
    }

    pub async fn is_awaiting_reply(&self) -> bool {
        self.state().await.is_busy()
    }

    pub async fn message_log(&self) -> MessageLog {
        self.shared.core.lock().await.session.message_log.snapshot()
    }

    pub async fn response_history(&self) -> String {
        self.shared.core.lock().await.session.response_history.clone()
    }

    pub async fn stop_sequences(&self) -> Vec<String> {
        self.shared.core.lock().await.session.stop_sequences.clone()
    }

    pub async fn character_name(&self) -> String {
        self.shared.core.lock().await.session.character_name.clone()
    }

    pub async fn current_topic(&self) -> Option<String> {
        self.shared.core.lock().await.session.current_topic_label()
    }

    async fn ensure_not_busy(&self) -> Result<(), ControllerError> {
        if self.state().await.is_busy() {
            return Err(TransitionError::AgentBusy.into());
        }
        Ok(())
    }
}

impl<L: LlmService + 'static> Shared<L> {
    async fn handle_event(self: &Arc<Self>, event: Event) -> Result<(), ControllerError> {
        let mut core = self.core.lock().await;

        let result = transition(&core.state, event).inspect_err(|e| {
            tracing::debug!(state = core.state.name(), error = %e, "Event rejected");
        })?;

        if result.new_state != core.state {
            tracing::debug!(
                from = core.state.name(),
                to = result.new_state.name(),
                generation = result.new_state.generation(),
                "State transition"
            );
        }
        core.state = result.new_state;

        for effect in result.effects {
            self.execute_effect(&mut core, effect).await;
        }

        if !core.state.is_busy() {
            core.turn_cancel = None;
        }
        Ok(())
    }

    async fn execute_effect(self: &Arc<Self>, core: &mut Core, effect: Effect) {
        match effect {
            Effect::AbortTurn => {
                if let Some(token) = core.turn_cancel.take() {
                    tracing::info!(session_id = %core.session.id, "Aborting in-flight turn");
                    token.cancel();
                }
            }

            Effect::PersistCharacter => {
                let session_id = core.session.id;
                if let Some(character) = core.session.sync_character() {
                    if let Err(e) = self.store.save_memory(&character.id, &character.memory).await {
                        tracing::warn!(
                            session_id = %session_id,
                            character = %character.id,
                            error = %e,
                            "Failed to persist character memory"
                        );
                    }
                }
            }

            Effect::OpenSession { opening } => {
                core.session = Session::open(opening);
                tracing::info!(
                    session_id = %core.session.id,
                    generation = core.state.generation(),
                    player = %core.session.player_name,
                    character = %core.session.character_name,
                    bound = core.session.character.is_some(),
                    "Chat session opened"
                );
            }

            Effect::RecordUserTurn { text } => {
                core.session.record_user_turn(&text);
            }

            Effect::RequestReply { generation } => {
                let plan = TurnPlan::for_session(&core.session, &self.config);
                let token = CancellationToken::new();
                core.turn_cancel = Some(token.clone());
                tracing::debug!(
                    session_id = %core.session.id,
                    generation,
                    classified = matches!(plan.route, super::turn::Route::Classified { .. }),
                    "Dispatching turn"
                );
                self.spawn_turn(plan, generation, token);
            }

            Effect::ApplyReply { outcome } => {
                core.session.apply_reply(outcome);
            }

            Effect::NotifyReply => {
                let session = &core.session;
                let reply = ChatReply {
                    reply: session.last_reply.clone().unwrap_or_default(),
                    full_history: session.response_history.clone(),
                    character_name: session.character_name.clone(),
                    topic: session.current_topic_label(),
                    received_at: Utc::now(),
                };
                tracing::info!(
                    session_id = %session.id,
                    character = %reply.character_name,
                    topic = ?reply.topic,
                    "Reply received"
                );
                let _ = self.broadcast_tx.send(ChatEvent::Reply(reply));
            }

            Effect::NotifyFailure { message } => {
                tracing::error!(session_id = %core.session.id, error = %message, "Turn failed");
                let _ = self.broadcast_tx.send(ChatEvent::Failed {
                    character_name: core.session.character_name.clone(),
                    message,
                });
            }

            Effect::NotifyStateChange => {
                let _ = self
                    .broadcast_tx
                    .send(ChatEvent::StateChange { state: core.state });
            }

            Effect::DiscardStale { generation } => {
                tracing::info!(
                    stale_generation = generation,
                    current_generation = core.state.generation(),
                    "Discarding reply from an ended session"
                );
            }

            Effect::ResetSession => {
                if core.session.character.is_some() || !core.session.message_log.is_empty() {
                    tracing::info!(session_id = %core.session.id, "Chat session ended");
                }
                core.session.reset();
            }
        }
    }

    /// Run a turn in the background, racing the cancellation token
    fn spawn_turn(self: &Arc<Self>, plan: TurnPlan, generation: u64, cancel: CancellationToken) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    tracing::info!(generation, "Turn cancelled");
                    return;
                }

                result = plan.run(&shared.llm, &shared.config.retry) => result,
            };

            let event = match result {
                Ok(outcome) => Event::ReplyReceived {
                    generation,
                    outcome,
                },
                Err(e) => Event::ReplyFailed {
                    generation,
                    message: e.to_string(),
                },
            };

            if let Err(e) = shared.handle_event(event).await {
                tracing::error!(generation, error = %e, "Failed to apply turn result");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{Character, TopicForest, TopicId};
    use crate::llm::{Message, RetryPolicy, Role};
    use crate::runtime::testing::MockLlmService;
    use crate::runtime::{InMemoryCharacterStore, StoreError};
    use crate::session::TurnOutcome;
    use std::time::Duration;

    type TestController = ChatController<Arc<MockLlmService>>;

    fn fast_config() -> ChatConfig {
        ChatConfig {
            retry: RetryPolicy::fixed(Duration::ZERO),
            self_check_retry: RetryPolicy::fixed(Duration::ZERO),
            check_connection_on_start: false,
            ..ChatConfig::default()
        }
    }

    fn controller(
        llm: &Arc<MockLlmService>,
        store: &Arc<InMemoryCharacterStore>,
        config: ChatConfig,
    ) -> TestController {
        ChatController::new(Arc::clone(llm), store.clone(), config)
    }

    fn blacksmith() -> (Character, [TopicId; 3]) {
        let mut topics = TopicForest::new();
        let weather = topics.add_root("weather", "Complains about the rain.");
        let weapons = topics.add_root("weapons", "Shows off a blade.");
        let family = topics.add_root("family", "Goes quiet.");
        let character = Character::new("aria", "Aria")
            .with_description("A blacksmith.")
            .with_topics(topics);
        (character, [weather, weapons, family])
    }

    async fn next_event(rx: &mut broadcast::Receiver<ChatEvent>) -> ChatEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for chat event")
                .expect("event channel closed");
            if !matches!(event, ChatEvent::StateChange { .. }) {
                return event;
            }
        }
    }

    async fn next_reply(rx: &mut broadcast::Receiver<ChatEvent>) -> ChatReply {
        match next_event(rx).await {
            ChatEvent::Reply(reply) => reply,
            other => panic!("expected reply, got {other:?}"),
        }
    }

    fn assistant_turns(log: &MessageLog) -> usize {
        log.iter().filter(|m| m.role == Role::Assistant).count()
    }

    #[tokio::test]
    async fn direct_turn_appends_raw_reply_and_formatted_history() {
        let llm = Arc::new(MockLlmService::new("mock"));
        let store = Arc::new(InMemoryCharacterStore::new());
        let chat = controller(&llm, &store, fast_config());
        let mut rx = chat.subscribe();

        chat.start_new_chat("Alex", "Aria", "A forge.").await.unwrap();
        llm.queue_text("Aria: \"Welcome!\" she says");
        chat.request_chat_response("Hello").await.unwrap();

        let reply = next_reply(&mut rx).await;
        assert_eq!(reply.reply, "Welcome!");
        assert_eq!(reply.character_name, "Aria");
        assert_eq!(reply.topic, None);
        assert!(reply.full_history.ends_with("\n \nAlex: Hello\n \nAria: Welcome!"));

        let log = chat.message_log().await;
        assert_eq!(log.len(), 3);
        assert_eq!(log.as_slice()[1], Message::user("Alex: Hello"));
        assert_eq!(log.last(), Some(&Message::assistant("Aria: \"Welcome!\" she says")));
        assert!(!chat.is_awaiting_reply().await);

        let sent = llm.recorded_requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].messages.len(), 2);
        assert!((sent[0].sampling.temperature - 0.5).abs() < f32::EPSILON);
        assert!(sent[0].stop.is_empty());
    }

    #[tokio::test]
    async fn second_line_while_awaiting_reply_is_rejected() {
        let llm = Arc::new(MockLlmService::gated("mock"));
        let store = Arc::new(InMemoryCharacterStore::new());
        let chat = controller(&llm, &store, fast_config());
        let mut rx = chat.subscribe();

        chat.start_new_chat("Alex", "Aria", "").await.unwrap();
        llm.queue_text("One moment.");
        chat.request_chat_response("first").await.unwrap();
        assert!(chat.is_awaiting_reply().await);
        let before = chat.message_log().await;

        let err = chat.request_chat_response("second").await.unwrap_err();
        assert!(matches!(err, ControllerError::Transition(TransitionError::AgentBusy)));
        assert_eq!(chat.message_log().await, before);

        llm.release(1);
        next_reply(&mut rx).await;
        assert!(!chat.is_awaiting_reply().await);
        chat.request_chat_response("second").await.unwrap();
    }

    #[tokio::test]
    async fn start_then_end_clears_session() {
        let llm = Arc::new(MockLlmService::new("mock"));
        let store = Arc::new(InMemoryCharacterStore::new());
        let chat = controller(&llm, &store, fast_config());

        chat.start_new_chat("Alex", "Aria", "A forge.").await.unwrap();
        assert_eq!(chat.stop_sequences().await, vec!["Alex:", "Aria:"]);
        chat.end_current_chat().await.unwrap();

        assert!(chat.message_log().await.is_empty());
        assert_eq!(chat.response_history().await, "");
        assert!(chat.stop_sequences().await.is_empty());
        assert_eq!(chat.character_name().await, "");
        assert!(matches!(chat.state().await, ConvState::Idle { .. }));
    }

    #[tokio::test]
    async fn line_without_session_is_rejected() {
        let llm = Arc::new(MockLlmService::new("mock"));
        let store = Arc::new(InMemoryCharacterStore::new());
        let chat = controller(&llm, &store, fast_config());

        let err = chat.request_chat_response("anyone?").await.unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Transition(TransitionError::NoActiveSession)
        ));
        assert!(llm.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_then_success_appends_one_reply() {
        let llm = Arc::new(MockLlmService::new("mock"));
        let store = Arc::new(InMemoryCharacterStore::new());
        let chat = controller(&llm, &store, fast_config());
        let mut rx = chat.subscribe();

        chat.start_new_chat("Alex", "Aria", "").await.unwrap();
        llm.queue_error(LlmError::network("connection refused"));
        llm.queue_text("Fine, thanks.");
        chat.request_chat_response("How are you?").await.unwrap();

        let reply = next_reply(&mut rx).await;
        assert_eq!(reply.reply, "Fine, thanks.");
        assert_eq!(assistant_turns(&chat.message_log().await), 1);

        let sent = llm.recorded_requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
    }

    #[tokio::test]
    async fn classification_selects_topic_and_injects_reaction() {
        let llm = Arc::new(MockLlmService::new("mock"));
        let (character, ids) = blacksmith();
        let store = Arc::new(InMemoryCharacterStore::with_characters([character]));
        let config = ChatConfig {
            classify_topics: true,
            ..fast_config()
        };
        let chat = controller(&llm, &store, config);
        let mut rx = chat.subscribe();

        chat.start_new_chat_with("Alex", "aria", "A forge. ")
            .await
            .unwrap();
        llm.queue_text("weapons");
        llm.queue_text("Aria: Look at this edge. It");
        chat.request_chat_response("Got any swords?").await.unwrap();

        let reply = next_reply(&mut rx).await;
        assert_eq!(reply.reply, "Look at this edge.");
        assert_eq!(reply.topic.as_deref(), Some("weapons"));

        let sent = llm.recorded_requests();
        assert_eq!(sent.len(), 2);
        let classify = sent[0].messages.last().unwrap();
        assert!(classify.content.contains("1. weather\n2. weapons\n3. family\n"));
        let follow_up = sent[1].messages.last().unwrap();
        assert_eq!(follow_up.role, Role::User);
        assert!(follow_up.content.starts_with("Alex: Got any swords?"));
        assert!(follow_up.content.contains("<REACTION>: Shows off a blade."));

        let stored = store.get("aria").await.unwrap();
        assert_eq!(stored.memory.current_topic, Some(ids[1]));
        assert_eq!(stored.memory.message_log, chat.message_log().await);
        assert_eq!(stored.memory.chat_history_text, reply.full_history);
    }

    #[tokio::test]
    async fn classification_miss_keeps_current_topic() {
        let llm = Arc::new(MockLlmService::new("mock"));
        let (character, _) = blacksmith();
        let store = Arc::new(InMemoryCharacterStore::with_characters([character]));
        let config = ChatConfig {
            classify_topics: true,
            ..fast_config()
        };
        let chat = controller(&llm, &store, config);
        let mut rx = chat.subscribe();

        chat.start_new_chat_with("Alex", "aria", "").await.unwrap();
        llm.queue_text("fishing");
        llm.queue_text("Hm? Say again.");
        chat.request_chat_response("Caught anything?").await.unwrap();

        let reply = next_reply(&mut rx).await;
        assert_eq!(reply.topic, None);
        let sent = llm.recorded_requests();
        assert!(!sent[1].messages.last().unwrap().content.contains("<REACTION>"));
        assert_eq!(store.get("aria").await.unwrap().memory.current_topic, None);
    }

    #[tokio::test]
    async fn return_to_chat_restores_stored_conversation() {
        let llm = Arc::new(MockLlmService::new("mock"));
        let (character, _) = blacksmith();
        let store = Arc::new(InMemoryCharacterStore::with_characters([character]));
        let chat = controller(&llm, &store, fast_config());
        let mut rx = chat.subscribe();

        chat.start_new_chat_with("Alex", "aria", "").await.unwrap();
        llm.queue_text("Hello again.");
        chat.request_chat_response("Hi").await.unwrap();
        let reply = next_reply(&mut rx).await;
        let log = chat.message_log().await;
        chat.end_current_chat().await.unwrap();

        chat.return_to_chat("Alex", "aria").await.unwrap();

        assert_eq!(chat.message_log().await, log);
        assert_eq!(chat.response_history().await, reply.full_history);
        assert_eq!(chat.character_name().await, "Aria");
    }

    #[tokio::test]
    async fn bound_start_extends_existing_log() {
        let llm = Arc::new(MockLlmService::new("mock"));
        let (mut character, _) = blacksmith();
        character.memory.message_log =
            MessageLog::from(vec![Message::system("old"), Message::user("Alex: hi")]);
        character.memory.chat_history_text = "old transcript".into();
        let store = Arc::new(InMemoryCharacterStore::with_characters([character]));
        let chat = controller(&llm, &store, fast_config());

        chat.start_new_chat_with("Alex", "aria", "At dusk. ").await.unwrap();

        let log = chat.message_log().await;
        assert_eq!(log.len(), 3);
        assert_eq!(log.last().unwrap().role, Role::System);
        let stored = store.get("aria").await.unwrap();
        assert!(stored.memory.chat_history_text.starts_with("At dusk. The following"));
    }

    #[tokio::test]
    async fn unknown_character_is_reported() {
        let llm = Arc::new(MockLlmService::new("mock"));
        let store = Arc::new(InMemoryCharacterStore::new());
        let chat = controller(&llm, &store, fast_config());

        let err = chat.return_to_chat("Alex", "ghost").await.unwrap_err();
        assert!(matches!(err, ControllerError::Store(StoreError::NotFound(_))));
        assert!(!chat.state().await.has_session());
    }

    #[tokio::test]
    async fn bound_start_waits_for_in_flight_turn() {
        let llm = Arc::new(MockLlmService::gated("mock"));
        let (character, _) = blacksmith();
        let store = Arc::new(InMemoryCharacterStore::with_characters([character]));
        let chat = controller(&llm, &store, fast_config());

        chat.start_new_chat("Alex", "Bob", "").await.unwrap();
        chat.request_chat_response("Hey").await.unwrap();

        let err = chat.start_new_chat_with("Alex", "aria", "").await.unwrap_err();
        assert!(matches!(err, ControllerError::Transition(TransitionError::AgentBusy)));
        assert_eq!(chat.character_name().await, "Bob");
        llm.release(1);
    }

    #[tokio::test]
    async fn ceiling_failure_releases_busy_flag() {
        let llm = Arc::new(MockLlmService::new("mock"));
        let store = Arc::new(InMemoryCharacterStore::new());
        let config = ChatConfig {
            retry: RetryPolicy::fixed(Duration::ZERO).with_max_attempts(Some(2)),
            ..fast_config()
        };
        let chat = controller(&llm, &store, config);
        let mut rx = chat.subscribe();

        chat.start_new_chat("Alex", "Aria", "").await.unwrap();
        llm.queue_error(LlmError::server_error("down"));
        llm.queue_error(LlmError::server_error("still down"));
        chat.request_chat_response("Hello?").await.unwrap();

        match next_event(&mut rx).await {
            ChatEvent::Failed {
                character_name,
                message,
            } => {
                assert_eq!(character_name, "Aria");
                assert!(message.contains("still down"));
            }
            other => panic!("expected failure, got {other:?}"),
        }

        let log = chat.message_log().await;
        assert_eq!(log.len(), 2);
        assert_eq!(assistant_turns(&log), 0);
        assert!(matches!(chat.state().await, ConvState::Active { .. }));

        llm.queue_text("Oh, hello.");
        chat.request_chat_response("Hello?").await.unwrap();
        assert_eq!(next_reply(&mut rx).await.reply, "Oh, hello.");
    }

    #[tokio::test]
    async fn ending_mid_turn_drops_the_reply() {
        let llm = Arc::new(MockLlmService::gated("mock"));
        let store = Arc::new(InMemoryCharacterStore::new());
        let chat = controller(&llm, &store, fast_config());
        let mut rx = chat.subscribe();

        chat.start_new_chat("Alex", "Aria", "").await.unwrap();
        llm.queue_text("Too late.");
        chat.request_chat_response("Bye").await.unwrap();
        chat.end_current_chat().await.unwrap();
        llm.release(1);

        let late = tokio::time::timeout(Duration::from_millis(200), async {
            loop {
                if let Ok(ChatEvent::Reply(reply)) = rx.recv().await {
                    return reply;
                }
            }
        })
        .await;
        assert!(late.is_err());
        assert!(chat.message_log().await.is_empty());
        assert!(!chat.is_awaiting_reply().await);
    }

    #[tokio::test]
    async fn fresh_start_supersedes_in_flight_turn() {
        let llm = Arc::new(MockLlmService::gated("mock"));
        let store = Arc::new(InMemoryCharacterStore::new());
        let chat = controller(&llm, &store, fast_config());

        chat.start_new_chat("Alex", "Aria", "").await.unwrap();
        chat.request_chat_response("Wait").await.unwrap();
        chat.start_new_chat("Alex", "Bob", "").await.unwrap();

        assert!(!chat.is_awaiting_reply().await);
        assert_eq!(chat.character_name().await, "Bob");
        assert_eq!(chat.message_log().await.len(), 1);
    }

    #[tokio::test]
    async fn stale_reply_is_ignored() {
        let llm = Arc::new(MockLlmService::new("mock"));
        let store = Arc::new(InMemoryCharacterStore::new());
        let chat = controller(&llm, &store, fast_config());

        chat.start_new_chat("Alex", "Aria", "").await.unwrap();
        let before = chat.message_log().await;
        let stale = chat.state().await.generation() - 1;

        chat.shared
            .handle_event(Event::ReplyReceived {
                generation: stale,
                outcome: TurnOutcome {
                    log: MessageLog::new(),
                    reply: Message::assistant("From the past."),
                    topic: None,
                },
            })
            .await
            .unwrap();

        assert_eq!(chat.message_log().await, before);
    }

    #[tokio::test]
    async fn stop_sequences_sent_when_enabled() {
        let llm = Arc::new(MockLlmService::new("mock"));
        let store = Arc::new(InMemoryCharacterStore::new());
        let config = ChatConfig {
            send_stop_sequences: true,
            ..fast_config()
        };
        let chat = controller(&llm, &store, config);
        let mut rx = chat.subscribe();

        chat.start_new_chat("Alex", "Aria", "").await.unwrap();
        llm.queue_text("Sure.");
        chat.request_chat_response("Ready?").await.unwrap();
        next_reply(&mut rx).await;

        assert_eq!(llm.recorded_requests()[0].stop, vec!["Alex:", "Aria:"]);
    }

    #[tokio::test]
    async fn connection_check_retries_until_connected() {
        let llm = Arc::new(MockLlmService::new("mock"));
        let store = Arc::new(InMemoryCharacterStore::new());
        let chat = controller(&llm, &store, fast_config());

        llm.queue_error(LlmError::network("offline"));
        llm.queue_text("ok");

        let attempts = chat.spawn_connection_check().await.unwrap().unwrap();
        assert_eq!(attempts, 2);
        assert_eq!(llm.recorded_requests()[0].messages, vec![Message::user("test")]);
    }
}

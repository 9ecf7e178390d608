//! The active conversation session and its bookkeeping

use crate::character::{Character, TopicId};
use crate::format::format_reply;
use crate::llm::Message;
use crate::message_log::MessageLog;
use crate::system_prompt::{character_session, fresh_session, history_exchange, user_turn};
use uuid::Uuid;

/// How a session is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOpening {
    /// New conversation with a named NPC and no stored character
    Fresh {
        player: String,
        npc_name: String,
        description: String,
    },
    /// New conversation that extends a stored character's message log
    Bound {
        player: String,
        character: Box<Character>,
        description: String,
    },
    /// Continue a stored character's conversation where it left off
    Resume {
        player: String,
        character: Box<Character>,
    },
}

impl SessionOpening {
    /// Bound and resumed sessions touch character memory and must not race
    /// an in-flight turn.
    pub fn requires_idle_session(&self) -> bool {
        !matches!(self, SessionOpening::Fresh { .. })
    }
}

/// Result of a completed turn, applied to the session when it arrives
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Log the reply was generated from (may carry an injected reaction)
    pub log: MessageLog,
    /// Raw reply message
    pub reply: Message,
    /// Topic selected during classification
    pub topic: Option<TopicId>,
}

/// Conversation state owned by the controller
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub player_name: String,
    pub character_name: String,
    pub response_history: String,
    pub message_log: MessageLog,
    pub stop_sequences: Vec<String>,
    pub character: Option<Character>,
    pub last_reply: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            player_name: String::new(),
            character_name: String::new(),
            response_history: String::new(),
            message_log: MessageLog::new(),
            stop_sequences: Vec::new(),
            character: None,
            last_reply: None,
        }
    }
}

impl Session {
    pub fn open(opening: SessionOpening) -> Self {
        match opening {
            SessionOpening::Fresh {
                player,
                npc_name,
                description,
            } => {
                let prompt = fresh_session(&player, &npc_name, &description);
                let mut message_log = MessageLog::new();
                message_log.append(Message::system(prompt.system));
                Self::with_speakers(player, npc_name, prompt.history, message_log, None)
            }
            SessionOpening::Bound {
                player,
                character,
                description,
            } => {
                let prompt = character_session(&player, &character.name, &description);
                let mut message_log = character.memory.message_log.clone();
                message_log.append(Message::system(prompt.system));
                let npc = character.name.clone();
                Self::with_speakers(player, npc, prompt.history, message_log, Some(*character))
            }
            SessionOpening::Resume { player, character } => {
                let history = character.memory.chat_history_text.clone();
                let message_log = character.memory.message_log.clone();
                let npc = character.name.clone();
                Self::with_speakers(player, npc, history, message_log, Some(*character))
            }
        }
    }

    fn with_speakers(
        player: String,
        npc: String,
        response_history: String,
        message_log: MessageLog,
        character: Option<Character>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            stop_sequences: vec![format!("{player}:"), format!("{npc}:")],
            player_name: player,
            character_name: npc,
            response_history,
            message_log,
            character,
            last_reply: None,
        }
    }

    pub fn record_user_turn(&mut self, utterance: &str) {
        self.response_history
            .push_str(&history_exchange(&self.player_name, &self.character_name, utterance));
        self.message_log
            .append(Message::user(user_turn(&self.player_name, utterance)));
    }

    /// Adopt the turn's log, append the raw reply, and remember the cleaned
    /// line. Returns the formatted reply.
    pub fn apply_reply(&mut self, outcome: TurnOutcome) -> String {
        let formatted = format_reply(&outcome.reply.content, &self.character_name);
        self.message_log = outcome.log;
        self.message_log.append(outcome.reply);
        self.response_history.push_str(&formatted);

        if let (Some(topic), Some(character)) = (outcome.topic, self.character.as_mut()) {
            character.memory.current_topic = Some(topic);
        }

        self.last_reply = Some(formatted.clone());
        formatted
    }

    /// Copy transcript and log into the bound character's memory
    pub fn sync_character(&mut self) -> Option<&Character> {
        let character = self.character.as_mut()?;
        character.memory.chat_history_text.clone_from(&self.response_history);
        character.memory.message_log.clone_from(&self.message_log);
        Some(character)
    }

    /// Label of the bound character's current topic
    pub fn current_topic_label(&self) -> Option<String> {
        self.character
            .as_ref()
            .and_then(Character::current_topic)
            .map(|node| node.label.clone())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

//! NPC chat: conversations with game characters backed by a chat-completion
//! service.
//!
//! A [`ChatController`] owns the active session, sends each player line to the
//! completion service (optionally classifying it against the character's topic
//! forest first) and broadcasts formatted replies to subscribers.

pub mod character;
pub mod classifier;
pub mod config;
pub mod format;
pub mod llm;
pub mod message_log;
pub mod runtime;
pub mod session;
pub mod state_machine;
pub mod system_prompt;

pub use character::{Character, CharacterDefinition, ConversationMemory, TopicForest, TopicId};
pub use config::ChatConfig;
pub use message_log::MessageLog;
pub use runtime::{
    CharacterStore, ChatController, ChatEvent, ChatReply, ControllerError,
    InMemoryCharacterStore, StoreError,
};
pub use state_machine::{ConvState, TransitionError};

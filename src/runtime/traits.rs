//! Trait abstractions for runtime I/O
//!
//! Character storage sits behind a trait so the controller can be tested
//! against an in-memory store and embedded next to any game-side persistence.

use crate::character::{Character, CharacterDefinition, ConversationMemory, DefinitionError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from a character store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Character not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    InvalidDefinition(#[from] DefinitionError),
}

/// Storage for characters and their conversation memory
#[async_trait]
pub trait CharacterStore: Send + Sync {
    /// Get a character by id
    async fn get(&self, id: &str) -> Result<Character, StoreError>;

    /// Insert or replace a character
    async fn put(&self, character: Character) -> Result<(), StoreError>;

    /// Overwrite the conversation memory of an existing character
    async fn save_memory(&self, id: &str, memory: &ConversationMemory) -> Result<(), StoreError>;
}

/// Characters kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryCharacterStore {
    characters: RwLock<HashMap<String, Character>>,
}

impl InMemoryCharacterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_characters(characters: impl IntoIterator<Item = Character>) -> Self {
        let characters = characters
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        Self {
            characters: RwLock::new(characters),
        }
    }

    /// Load a character definition file and store it. Returns the character id.
    pub async fn load_definition(&self, path: &Path) -> Result<String, StoreError> {
        let character = CharacterDefinition::load(path)?.into_character();
        let id = character.id.clone();
        tracing::info!(id = %id, name = %character.name, topics = character.topics.len(), "Loaded character");
        self.put(character).await?;
        Ok(id)
    }
}

#[async_trait]
impl CharacterStore for InMemoryCharacterStore {
    async fn get(&self, id: &str) -> Result<Character, StoreError> {
        self.characters
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn put(&self, character: Character) -> Result<(), StoreError> {
        self.characters
            .write()
            .await
            .insert(character.id.clone(), character);
        Ok(())
    }

    async fn save_memory(&self, id: &str, memory: &ConversationMemory) -> Result<(), StoreError> {
        let mut characters = self.characters.write().await;
        let character = characters
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        character.memory.clone_from(memory);
        Ok(())
    }
}

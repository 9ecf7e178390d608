//! Characters, their topic forests and persisted conversation memory

use crate::message_log::MessageLog;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Index of a node inside a [`TopicForest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(usize);

impl TopicId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A topic the character can react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNode {
    pub label: String,
    pub reaction: String,
    pub is_root: bool,
    pub children: Vec<TopicId>,
}

impl TopicNode {
    /// Labels are matched by containment so small formatting noise in the
    /// classifier's answer still selects the topic.
    pub fn matches(&self, reply: &str) -> bool {
        reply.contains(self.label.as_str())
    }
}

/// Arena of topic nodes forming a forest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicForest {
    nodes: Vec<TopicNode>,
}

impl TopicForest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&mut self, label: impl Into<String>, reaction: impl Into<String>) -> TopicId {
        self.push(label.into(), reaction.into(), true)
    }

    /// Add a child under `parent`. Returns `None` if `parent` is unknown.
    pub fn add_child(
        &mut self,
        parent: TopicId,
        label: impl Into<String>,
        reaction: impl Into<String>,
    ) -> Option<TopicId> {
        if parent.0 >= self.nodes.len() {
            return None;
        }
        let id = self.push(label.into(), reaction.into(), false);
        self.nodes[parent.0].children.push(id);
        Some(id)
    }

    fn push(&mut self, label: String, reaction: String, is_root: bool) -> TopicId {
        let id = TopicId(self.nodes.len());
        self.nodes.push(TopicNode {
            label,
            reaction,
            is_root,
            children: Vec::new(),
        });
        id
    }

    pub fn get(&self, id: TopicId) -> Option<&TopicNode> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_root)
            .map(|(i, _)| TopicId(i))
    }

    /// Topics offered to the classifier: the roots while nothing is
    /// selected, otherwise the children of the current topic.
    pub fn candidates(&self, current: Option<TopicId>) -> Vec<TopicId> {
        match current {
            None => self.roots().collect(),
            Some(id) => self
                .get(id)
                .map(|node| node.children.clone())
                .unwrap_or_default(),
        }
    }

    /// First candidate, in order, whose label occurs in `reply`
    pub fn match_reply(&self, candidates: &[TopicId], reply: &str) -> Option<TopicId> {
        candidates
            .iter()
            .copied()
            .find(|id| self.get(*id).is_some_and(|node| node.matches(reply)))
    }

    pub fn from_definitions(definitions: &[TopicDefinition]) -> Self {
        let mut forest = Self::new();
        for def in definitions {
            let root = forest.add_root(&def.label, &def.reaction);
            forest.add_subtree(root, &def.children);
        }
        forest
    }

    fn add_subtree(&mut self, parent: TopicId, children: &[TopicDefinition]) {
        for def in children {
            if let Some(child) = self.add_child(parent, &def.label, &def.reaction) {
                self.add_subtree(child, &def.children);
            }
        }
    }
}

/// Nested topic definition as written in character assets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicDefinition {
    pub label: String,
    pub reaction: String,
    #[serde(default)]
    pub children: Vec<TopicDefinition>,
}

/// Conversation state a character keeps between chats
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationMemory {
    pub chat_history_text: String,
    pub message_log: MessageLog,
    pub current_topic: Option<TopicId>,
}

/// A character the player can talk to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub description: String,
    pub topics: TopicForest,
    pub memory: ConversationMemory,
}

impl Character {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            topics: TopicForest::new(),
            memory: ConversationMemory::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_topics(mut self, topics: TopicForest) -> Self {
        self.topics = topics;
        self
    }

    pub fn current_topic(&self) -> Option<&TopicNode> {
        self.memory.current_topic.and_then(|id| self.topics.get(id))
    }
}

/// Errors loading character assets
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("Failed to read character definition {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid character definition: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Character definition is missing a {0}")]
    MissingField(&'static str),
}

/// Character asset as stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub topics: Vec<TopicDefinition>,
}

impl CharacterDefinition {
    pub fn from_json(json: &str) -> Result<Self, DefinitionError> {
        let def: Self = serde_json::from_str(json)?;
        if def.id.trim().is_empty() {
            return Err(DefinitionError::MissingField("id"));
        }
        if def.name.trim().is_empty() {
            return Err(DefinitionError::MissingField("name"));
        }
        Ok(def)
    }

    pub fn load(path: &Path) -> Result<Self, DefinitionError> {
        let json = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Build a character with empty conversation memory
    pub fn into_character(self) -> Character {
        let topics = TopicForest::from_definitions(&self.topics);
        Character::new(self.id, self.name)
            .with_description(self.description)
            .with_topics(topics)
    }
}

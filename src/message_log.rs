//! Ordered prompt context for a conversation

use crate::llm::Message;
use serde::{Deserialize, Serialize};

/// Append-only sequence of chat turns sent as the prompt context.
///
/// Index 0 conventionally holds the system instruction. Turns are never
/// removed or reordered; the only in-place edits are substitutions of the
/// first or last element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Substitute the final turn, returning the one it replaced.
    /// Does nothing on an empty log.
    pub fn replace_last(&mut self, message: Message) -> Option<Message> {
        let last = self.messages.last_mut()?;
        Some(std::mem::replace(last, message))
    }

    /// Substitute the first turn, returning the one it replaced.
    /// Does nothing on an empty log.
    pub fn replace_first(&mut self, message: Message) -> Option<Message> {
        let first = self.messages.first_mut()?;
        Some(std::mem::replace(first, message))
    }

    /// Independent copy of the current contents
    pub fn snapshot(&self) -> MessageLog {
        self.clone()
    }

    pub fn first(&self) -> Option<&Message> {
        self.messages.first()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.messages.clone()
    }
}

impl From<Vec<Message>> for MessageLog {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

impl<'a> IntoIterator for &'a MessageLog {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

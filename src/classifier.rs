//! Topic classification and reaction injection
//!
//! A classified turn is a two-phase exchange: first ask the model which of
//! the candidate topics the player's last line is about, then request the
//! real reply with the matched topic's reaction attached to that line.

use crate::character::{TopicForest, TopicId};
use crate::format::format_reply;
use crate::llm::{
    complete_with_retry, LlmError, LlmRequest, LlmService, Message, RetryPolicy, Role,
    SamplingParams,
};
use crate::message_log::MessageLog;
use crate::system_prompt::{classification_prompt, with_reaction, TOPIC_ANALYSIS_INSTRUCTION};

/// Result of a classified turn
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedTurn {
    /// The real log, with the reaction attached to the last user turn on a match
    pub log: MessageLog,
    /// Raw reply from the follow-up completion
    pub reply: Message,
    /// Topic selected this turn; `None` on a miss
    pub topic: Option<TopicId>,
}

/// Drives the classification sub-protocol against a completion service
pub struct TopicClassifier<'a, L: ?Sized> {
    llm: &'a L,
    retry: RetryPolicy,
    npc_name: &'a str,
    reply_sampling: SamplingParams,
    stop: Vec<String>,
}

impl<'a, L: LlmService + ?Sized> TopicClassifier<'a, L> {
    pub fn new(llm: &'a L, retry: RetryPolicy, npc_name: &'a str) -> Self {
        Self {
            llm,
            retry,
            npc_name,
            reply_sampling: SamplingParams::default(),
            stop: Vec::new(),
        }
    }

    /// Sampling and stop sequences for the follow-up reply request
    pub fn with_reply_sampling(mut self, sampling: SamplingParams, stop: Vec<String>) -> Self {
        self.reply_sampling = sampling;
        self.stop = stop;
        self
    }

    pub async fn classify(
        &self,
        mut log: MessageLog,
        topics: &TopicForest,
        current: Option<TopicId>,
    ) -> Result<ClassifiedTurn, LlmError> {
        let candidates = topics.candidates(current);
        let topic = if candidates.is_empty() {
            tracing::debug!(?current, "No candidate topics, skipping classification");
            None
        } else {
            self.pick_topic(&log, topics, &candidates).await?
        };

        if let Some(id) = topic {
            if let Some(node) = topics.get(id) {
                attach_reaction(&mut log, &node.reaction);
            }
        }

        let request = LlmRequest::new(log.to_vec(), self.reply_sampling).with_stop(self.stop.clone());
        let response = complete_with_retry(self.llm, &request, &self.retry).await?;

        Ok(ClassifiedTurn {
            log,
            reply: response.message,
            topic,
        })
    }

    async fn pick_topic(
        &self,
        log: &MessageLog,
        topics: &TopicForest,
        candidates: &[TopicId],
    ) -> Result<Option<TopicId>, LlmError> {
        let request = LlmRequest::new(
            classification_log(log, topics, candidates).to_vec(),
            SamplingParams::classification(),
        );
        let response = complete_with_retry(self.llm, &request, &self.retry).await?;
        let answer = format_reply(response.text(), self.npc_name);

        let matched = topics.match_reply(candidates, &answer);
        match matched.and_then(|id| topics.get(id)) {
            Some(node) => tracing::info!(topic = %node.label, "Classified player line"),
            None => tracing::debug!(answer = %answer, "Classifier answer matched no topic"),
        }
        Ok(matched)
    }
}

/// Copy of `log` rewritten for the classification call: neutral system
/// instruction first, numbered topic choice in place of the last turn.
pub fn classification_log(log: &MessageLog, topics: &TopicForest, candidates: &[TopicId]) -> MessageLog {
    let mut copy = log.snapshot();
    copy.replace_first(Message::system(TOPIC_ANALYSIS_INSTRUCTION));

    let last_content = log.last().map(|m| m.content.as_str()).unwrap_or_default();
    let labels = candidates
        .iter()
        .filter_map(|id| topics.get(*id))
        .map(|node| node.label.as_str());
    copy.replace_last(Message::user(classification_prompt(last_content, labels)));
    copy
}

/// Append a reaction block to the last user turn of `log`
pub fn attach_reaction(log: &mut MessageLog, reaction: &str) {
    let Some(last) = log.last() else {
        return;
    };
    if last.role != Role::User {
        tracing::warn!(role = last.role.as_str(), "Last turn is not from the user, reaction dropped");
        return;
    }
    let content = with_reaction(&last.content, reaction);
    log.replace_last(Message::user(content));
}

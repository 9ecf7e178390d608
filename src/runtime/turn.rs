//! A single turn: the request(s) sent for one player line

use crate::character::{TopicForest, TopicId};
use crate::classifier::TopicClassifier;
use crate::config::ChatConfig;
use crate::llm::{complete_with_retry, LlmError, LlmRequest, LlmService, RetryPolicy, SamplingParams};
use crate::message_log::MessageLog;
use crate::session::{Session, TurnOutcome};

#[derive(Debug, Clone)]
pub(crate) enum Route {
    /// One reply request with the log as is
    Direct,
    /// Classify the line against the character's topics first
    Classified {
        topics: TopicForest,
        current: Option<TopicId>,
    },
}

/// Everything a turn task needs, captured from the session at dispatch
#[derive(Debug, Clone)]
pub(crate) struct TurnPlan {
    pub log: MessageLog,
    pub sampling: SamplingParams,
    pub stop: Vec<String>,
    pub npc_name: String,
    pub route: Route,
}

impl TurnPlan {
    pub fn for_session(session: &Session, config: &ChatConfig) -> Self {
        let stop = if config.send_stop_sequences {
            session.stop_sequences.clone()
        } else {
            Vec::new()
        };
        let route = match &session.character {
            Some(character) if config.classify_topics && !character.topics.is_empty() => {
                Route::Classified {
                    topics: character.topics.clone(),
                    current: character.memory.current_topic,
                }
            }
            _ => Route::Direct,
        };
        Self {
            log: session.message_log.clone(),
            sampling: config.sampling,
            stop,
            npc_name: session.character_name.clone(),
            route,
        }
    }

    pub async fn run<L: LlmService + ?Sized>(
        self,
        llm: &L,
        retry: &RetryPolicy,
    ) -> Result<TurnOutcome, LlmError> {
        match self.route {
            Route::Direct => {
                let request = LlmRequest::new(self.log.to_vec(), self.sampling).with_stop(self.stop);
                let response = complete_with_retry(llm, &request, retry).await?;
                Ok(TurnOutcome {
                    log: self.log,
                    reply: response.message,
                    topic: None,
                })
            }
            Route::Classified { topics, current } => {
                let turn = TopicClassifier::new(llm, *retry, &self.npc_name)
                    .with_reply_sampling(self.sampling, self.stop)
                    .classify(self.log, &topics, current)
                    .await?;
                Ok(TurnOutcome {
                    log: turn.log,
                    reply: turn.reply,
                    topic: turn.topic,
                })
            }
        }
    }
}

//! Prompt text for sessions, topic classification and scripted reactions

/// System instruction used for the classification sub-call only
pub const TOPIC_ANALYSIS_INSTRUCTION: &str =
    "This is an assistant that analyzes chat messages by picking topics from a provided list.";

const ANALYZE_LINE: &str = "Analyze the last reply from the user for its topic.";

const PICK_INSTRUCTION: &str = "Pick a topic from the above numbered list. Pick only from the \
     list above, not other source. Output this choice exactly as it is written in the list.";

const REACTION_MARKER: &str = "<REACTION>:";

const REACTION_INSTRUCTION: &str = "Output this reaction as a text reply: ";

/// Opening text for a session that is not bound to a stored character
pub fn fresh_session(player: &str, npc: &str, description: &str) -> SessionPrompt {
    SessionPrompt {
        history: format!(
            "The following is a conversation between {player} and {npc}.\n \n{description}"
        ),
        system: system_instruction(player, npc, description),
    }
}

/// Opening text for a session bound to a stored character
pub fn character_session(player: &str, npc: &str, description: &str) -> SessionPrompt {
    SessionPrompt {
        history: format!("{description}The following is a conversation between {player} and {npc}. "),
        system: system_instruction(player, npc, description),
    }
}

fn system_instruction(player: &str, npc: &str, description: &str) -> String {
    format!(
        "The following is a conversation between user called {player} and a character \
         called {npc}.\n \n{description}\n \nIn between, there are parts denoted with the \
         {REACTION_MARKER} keyword that describe the character's next reply and reaction. \
         Only answers as the {npc} character. Never breaks character."
    )
}

/// Human-readable transcript text and the system instruction for a new session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPrompt {
    pub history: String,
    pub system: String,
}

/// Content of the user turn added to the message log
pub fn user_turn(player: &str, utterance: &str) -> String {
    format!("{player}: {utterance}")
}

/// Transcript text appended when the player speaks; ends awaiting the reply
pub fn history_exchange(player: &str, npc: &str, utterance: &str) -> String {
    format!("\n \n{player}: {utterance}\n \n{npc}: ")
}

/// The numbered-choice prompt that replaces the last user turn when classifying
pub fn classification_prompt<'a>(
    user_content: &str,
    labels: impl IntoIterator<Item = &'a str>,
) -> String {
    let mut prompt = format!("{user_content}\n \n{ANALYZE_LINE}\n");
    for (i, label) in labels.into_iter().enumerate() {
        prompt.push_str(&format!("{}. {label}\n", i + 1));
    }
    prompt.push('\n');
    prompt.push_str(PICK_INSTRUCTION);
    prompt
}

/// User turn content with a scripted reaction appended
pub fn with_reaction(user_content: &str, reaction: &str) -> String {
    format!("{user_content}\n \n {REACTION_MARKER} {reaction}\n \n {REACTION_INSTRUCTION}")
}

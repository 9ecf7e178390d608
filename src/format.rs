//! Normalization of raw completion text into a displayable utterance

const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Clean a raw completion into the line the character actually says.
///
/// Quotation marks are removed, surrounding whitespace trimmed, and any
/// leading `"<npc_name>:"` speaker label stripped. Text after the last
/// sentence terminator is dropped so a reply cut off by the token limit does
/// not end mid-sentence; if no terminator sits past the second character the
/// text is kept as is. Applying this twice gives the same result as applying it once.
pub fn format_reply(raw: &str, npc_name: &str) -> String {
    let unquoted: String = raw.chars().filter(|c| *c != '"').collect();
    let text = strip_speaker_labels(unquoted.trim(), npc_name);
    truncate_to_last_sentence(text).to_string()
}

fn strip_speaker_labels<'a>(mut text: &'a str, npc_name: &str) -> &'a str {
    let label = format!("{npc_name}:");
    while let Some(rest) = text.strip_prefix(label.as_str()) {
        text = rest.trim_start();
    }
    text
}

fn truncate_to_last_sentence(text: &str) -> &str {
    let Some(index) = text.rfind(SENTENCE_TERMINATORS) else {
        return text;
    };
    // Position is counted in characters, not bytes
    let position = text.get(..index).map_or(0, |prefix| prefix.chars().count());
    if position > 1 {
        text.get(..=index).unwrap_or(text)
    } else {
        text
    }
}

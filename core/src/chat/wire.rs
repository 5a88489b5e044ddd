//! Delimited wire format for chat history crossing the UI boundary.
//!
//! The UI persists a conversation as a single string so it can hand it back
//! verbatim on a refresh action. Each entry is `role::: content`, entries are
//! joined by `:::::`. The in-memory `Vec<ChatMessage>` stays the canonical
//! representation; this module is only the encode/decode pair.
//!
//! Round-trip is lossless for role and for content that does not itself
//! contain the delimiter sequences.

use super::{ChatMessage, Role};
use tracing::warn;

const ENTRY_SEP: &str = ":::::";
const FIELD_SEP: &str = ":::";

/// Flatten a history into the delimited string form
pub fn serialize_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| format!("{}{} {}", m.role.as_str(), FIELD_SEP, m.content))
        .collect::<Vec<_>>()
        .join(ENTRY_SEP)
}

/// Parse the delimited string form back into messages.
///
/// Malformed entries are skipped with a warning rather than failing the whole
/// history; the UI side is not under our control.
pub fn deserialize_history(raw: &str) -> Vec<ChatMessage> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(ENTRY_SEP)
        .filter_map(|entry| {
            let Some((role, rest)) = entry.split_once(FIELD_SEP) else {
                warn!(target: "chat_wire", entry = %entry, "skipping entry without role delimiter");
                return None;
            };
            let Some(role) = Role::parse(role.trim()) else {
                warn!(target: "chat_wire", role = %role, "skipping entry with unknown role");
                return None;
            };
            // serialize_history adds exactly one space after the delimiter
            let content = rest.strip_prefix(' ').unwrap_or(rest);
            Some(ChatMessage::new(role, content))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_history() {
        let history = vec![
            ChatMessage::system("You are an assistant."),
            ChatMessage::user("Summarize the following code in one line: def f(): pass"),
            ChatMessage::assistant("A no-op function."),
        ];
        let encoded = serialize_history(&history);
        assert_eq!(deserialize_history(&encoded), history);
    }

    #[test]
    fn round_trips_content_with_colons_and_newlines() {
        let history = vec![
            ChatMessage::user("what does `a: b` mean?\nand this: that?"),
            ChatMessage::assistant("it means: a maps to b"),
        ];
        let encoded = serialize_history(&history);
        assert_eq!(deserialize_history(&encoded), history);
    }

    #[test]
    fn round_trips_leading_space_in_content() {
        let history = vec![ChatMessage::user(" indented")];
        let encoded = serialize_history(&history);
        assert_eq!(deserialize_history(&encoded), history);
    }

    #[test]
    fn skips_malformed_entries() {
        let decoded = deserialize_history("user::: hello:::::garbage:::::assistant::: hi");
        assert_eq!(
            decoded,
            vec![ChatMessage::user("hello"), ChatMessage::assistant("hi")]
        );
    }

    #[test]
    fn empty_string_is_empty_history() {
        assert!(deserialize_history("").is_empty());
    }

    #[test]
    fn wire_form_matches_expected_shape() {
        let encoded = serialize_history(&[ChatMessage::user("hi"), ChatMessage::assistant("yo")]);
        assert_eq!(encoded, "user::: hi:::::assistant::: yo");
    }
}

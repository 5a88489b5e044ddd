//! Prompt construction: pure functions from a query and its context to the
//! chat message sequence sent to a backend.
//!
//! Nothing in here performs IO or mutates state; the orchestrator reads the
//! session and hands it in by reference.

use crate::chat::ChatMessage;
use crate::session::SessionState;
use serde::{Deserialize, Serialize};

/// The four kinds of question the UI can ask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    /// One-line summary of a code selection; the anchor for follow-ups
    Overview,
    /// Free-form question, with or without code context
    Query,
    /// Domain concepts needed to understand a selection
    Concept,
    /// Usage example for the APIs in a selection
    Usage,
}

/// System message opening every fresh conversation
pub const SYSTEM_PROMPT: &str = "You are a concise programming assistant embedded in a code \
     editor. Answer precisely and do not restate the question.";

/// Fixed lead-in prepended to the model's answer for follow-up types.
///
/// This is not sent as an instruction; it is glued onto the front of the
/// response so the UI always speaks with one voice.
pub fn assistant_preamble(query_type: QueryType) -> &'static str {
    match query_type {
        QueryType::Overview | QueryType::Query => "",
        QueryType::Concept => "To understand this code, ",
        QueryType::Usage => "For example, ",
    }
}

/// The literal instruction text for one query
pub fn user_prompt(
    selected_text: &str,
    query_type: QueryType,
    nl_prompt: &str,
    with_code: bool,
) -> String {
    match query_type {
        QueryType::Overview => {
            format!("Summarize the following code in one line: {selected_text}")
        }
        QueryType::Query if with_code => {
            format!("Given the following code, {nl_prompt}: {selected_text}")
        }
        QueryType::Query => nl_prompt.to_string(),
        QueryType::Concept => format!(
            "Explain the domain concepts needed to understand the following code, \
             without explaining individual library or API calls: {selected_text}"
        ),
        QueryType::Usage => format!(
            "Provide a usage example emphasizing the API calls used in the \
             following code: {selected_text}"
        ),
    }
}

/// Result of assembling one chat prompt
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    /// Full message sequence to send to the backend
    pub chat: Vec<ChatMessage>,
    /// The raw user instruction, as recorded in the session on success
    pub prompt: String,
    /// Lead-in glued onto the model's answer (may be empty)
    pub preamble: String,
}

/// Assemble the chat message sequence for one query.
///
/// At most one of the two context-injection paths fires:
/// - Concept/Usage with a prior overview answer gets a synthetic prior turn
///   grounding the follow-up in that summary;
/// - a Query against an ongoing conversation (no new code, non-empty natural
///   language prompt, at least one completed exchange) continues from the
///   last three history entries instead of starting fresh.
///
/// If neither fires the result is the minimal `[system, user, assistant]`.
#[allow(clippy::too_many_arguments)]
pub fn generate_chat_prompt(
    selected_text: &str,
    query_type: QueryType,
    overview_ref: Option<&str>,
    nl_prompt: &str,
    with_code: bool,
    full_file: Option<&str>,
    session: &SessionState,
) -> BuiltPrompt {
    // Full-file context wins over the bare selection for direct queries
    let source = match (query_type, full_file) {
        (QueryType::Query, Some(file)) if !file.is_empty() => file,
        _ => selected_text,
    };
    let prompt = user_prompt(source, query_type, nl_prompt, with_code);
    let mut preamble = assistant_preamble(query_type).to_string();
    let mut chat = vec![ChatMessage::system(SYSTEM_PROMPT)];

    let is_follow_up = matches!(query_type, QueryType::Concept | QueryType::Usage);
    let grounded = is_follow_up && overview_ref.is_some_and(|r| !r.is_empty());

    if grounded {
        // Re-create the overview exchange without re-sending the whole thing
        chat.push(ChatMessage::user(user_prompt(
            selected_text,
            QueryType::Overview,
            "",
            false,
        )));
        chat.push(ChatMessage::assistant(overview_ref.unwrap_or_default()));
    } else if query_type == QueryType::Query
        && session.history().len() > 2
        && !with_code
        && !nl_prompt.is_empty()
    {
        // Multi-turn continuation: reuse the tail of the conversation and
        // drop the fresh system message built above
        chat = session.last_n(3).to_vec();
        preamble.clear();
    }

    chat.push(ChatMessage::user(prompt.clone()));
    chat.push(ChatMessage::assistant(preamble.clone()));

    BuiltPrompt {
        chat,
        prompt,
        preamble,
    }
}

use glance_core::chat::{ChatMessage, Role};
use glance_core::prompt::{
    assistant_preamble, generate_chat_prompt, user_prompt, QueryType, SYSTEM_PROMPT,
};
use glance_core::session::SessionState;

fn session_with_turns(turns: &[(&str, &str)]) -> SessionState {
    let mut session = SessionState::new();
    for (prompt, answer) in turns {
        session.push_exchange(*prompt, *answer);
    }
    session
}

#[test]
fn chat_prompt_shape_invariants() {
    let session = SessionState::new();
    for query_type in [
        QueryType::Overview,
        QueryType::Query,
        QueryType::Concept,
        QueryType::Usage,
    ] {
        for nl in ["", "what is this?"] {
            for with_code in [false, true] {
                let built = generate_chat_prompt(
                    "let x = 1;",
                    query_type,
                    None,
                    nl,
                    with_code,
                    None,
                    &session,
                );
                assert_eq!(built.chat[0].role, Role::System);
                let n = built.chat.len();
                assert_eq!(built.chat[n - 2].role, Role::User);
                assert_eq!(built.chat[n - 1].role, Role::Assistant);
                assert_eq!(n % 2, 1, "length must be odd, got {n}");
            }
        }
    }
}

#[test]
fn overview_prompt_is_minimal_three_messages() {
    let session = SessionState::new();
    let built = generate_chat_prompt(
        "def f(): pass",
        QueryType::Overview,
        None,
        "",
        false,
        None,
        &session,
    );
    assert_eq!(
        built.chat,
        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user("Summarize the following code in one line: def f(): pass"),
            ChatMessage::assistant(""),
        ]
    );
    assert_eq!(
        built.prompt,
        "Summarize the following code in one line: def f(): pass"
    );
    assert!(built.preamble.is_empty());
}

#[test]
fn concept_with_overview_ref_injects_synthetic_turn() {
    let session = SessionState::new();
    let built = generate_chat_prompt(
        "def f(): pass",
        QueryType::Concept,
        Some("Defines f."),
        "",
        false,
        None,
        &session,
    );
    assert_eq!(built.chat.len(), 5);
    assert_eq!(built.chat[0].role, Role::System);
    assert_eq!(
        built.chat[1],
        ChatMessage::user("Summarize the following code in one line: def f(): pass")
    );
    assert_eq!(built.chat[2], ChatMessage::assistant("Defines f."));
    assert_eq!(
        built.chat[3],
        ChatMessage::user(user_prompt("def f(): pass", QueryType::Concept, "", false))
    );
    assert_eq!(
        built.chat[4],
        ChatMessage::assistant(assistant_preamble(QueryType::Concept))
    );
}

#[test]
fn concept_without_overview_ref_is_minimal() {
    let session = SessionState::new();
    let built = generate_chat_prompt(
        "def f(): pass",
        QueryType::Concept,
        None,
        "",
        false,
        None,
        &session,
    );
    assert_eq!(built.chat.len(), 3);

    // empty reference does not ground either
    let built = generate_chat_prompt(
        "def f(): pass",
        QueryType::Concept,
        Some(""),
        "",
        false,
        None,
        &session,
    );
    assert_eq!(built.chat.len(), 3);
}

#[test]
fn continuation_query_reuses_last_three_history_entries() {
    let session = session_with_turns(&[
        ("Summarize the following code in one line: def f(): pass", "A no-op function."),
        ("why is it a no-op?", "Because the body is pass."),
    ]);
    let built = generate_chat_prompt(
        "",
        QueryType::Query,
        None,
        "and what about errors?",
        false,
        None,
        &session,
    );

    // the fresh system message is discarded in favor of the history tail
    let history = session.history();
    assert_eq!(&built.chat[..3], &history[history.len() - 3..]);
    assert_eq!(built.chat.len(), 5);
    assert_eq!(
        built.chat[3],
        ChatMessage::user("and what about errors?")
    );
    assert_eq!(built.chat[4], ChatMessage::assistant(""));
    assert_eq!(built.prompt, "and what about errors?");
    assert!(built.preamble.is_empty());
}

#[test]
fn fresh_code_query_does_not_take_continuation_path() {
    let session = session_with_turns(&[("q", "a"), ("q2", "a2")]);
    let built = generate_chat_prompt(
        "let y = 2;",
        QueryType::Query,
        None,
        "what does this do?",
        true,
        None,
        &session,
    );
    assert_eq!(built.chat.len(), 3);
    assert_eq!(built.chat[0].role, Role::System);
    assert_eq!(
        built.prompt,
        "Given the following code, what does this do?: let y = 2;"
    );
}

#[test]
fn full_file_content_preferred_for_direct_queries() {
    let session = SessionState::new();
    let built = generate_chat_prompt(
        "let y = 2;",
        QueryType::Query,
        None,
        "what does this do?",
        true,
        Some("fn main() { let y = 2; }"),
        &session,
    );
    assert_eq!(
        built.prompt,
        "Given the following code, what does this do?: fn main() { let y = 2; }"
    );

    // other types keep the selection
    let built = generate_chat_prompt(
        "let y = 2;",
        QueryType::Usage,
        None,
        "",
        false,
        Some("fn main() { let y = 2; }"),
        &session,
    );
    assert!(built.prompt.contains("let y = 2;"));
    assert!(!built.prompt.contains("fn main"));
}

#[test]
fn query_without_code_is_the_question_verbatim() {
    assert_eq!(
        user_prompt("ignored", QueryType::Query, "how do iterators work?", false),
        "how do iterators work?"
    );
}

#[test]
fn preambles_are_fixed_per_type() {
    assert_eq!(assistant_preamble(QueryType::Overview), "");
    assert_eq!(assistant_preamble(QueryType::Query), "");
    assert_eq!(assistant_preamble(QueryType::Concept), "To understand this code, ");
    assert_eq!(assistant_preamble(QueryType::Usage), "For example, ");
}

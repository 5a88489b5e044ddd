//! Rolling conversation state for the current session.
//!
//! `SessionState` owns the multi-turn history and the correlation counters.
//! It is mutated only by the orchestrator, and only on confirmed success, so
//! a failed or cancelled request can never corrupt the history.

use crate::chat::{ChatMessage, Role};
use crate::prompt::SYSTEM_PROMPT;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SessionState {
    history: Vec<ChatMessage>,
    turn: u64,
    overview_id: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            history: vec![ChatMessage::system(SYSTEM_PROMPT)],
            turn: 0,
            overview_id: 0,
        }
    }

    /// History is always non-empty and starts with the system message
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// The trailing `n` entries (or the whole history when shorter)
    pub fn last_n(&self, n: usize) -> &[ChatMessage] {
        &self.history[self.history.len().saturating_sub(n)..]
    }

    /// Number of completed exchanges in this session
    pub fn turn(&self) -> u64 {
        self.turn
    }

    /// Drop all turns, keeping the system message. Counters survive so
    /// correlation ids stay unique for the lifetime of the session.
    pub fn reset(&mut self) {
        debug!(target: "session", turn = self.turn, "resetting chat history");
        self.history = vec![ChatMessage::system(SYSTEM_PROMPT)];
    }

    /// Replace the history wholesale. The first entry must carry the system
    /// role; anything else indicates a bug in the caller.
    pub fn replace(&mut self, history: Vec<ChatMessage>) {
        debug_assert!(matches!(
            history.first(),
            Some(ChatMessage {
                role: Role::System,
                ..
            })
        ));
        self.history = history;
        self.turn += 1;
    }

    /// Record one completed exchange
    pub fn push_exchange(&mut self, prompt: impl Into<String>, answer: impl Into<String>) {
        self.history.push(ChatMessage::user(prompt));
        self.history.push(ChatMessage::assistant(answer));
        self.turn += 1;
    }

    /// Current top-level correlation id
    pub fn overview_id(&self) -> u64 {
        self.overview_id
    }

    /// Allocate the correlation id for a new top-level request
    pub fn next_overview_id(&mut self) -> u64 {
        self.overview_id += 1;
        self.overview_id
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_system_only() {
        let session = SessionState::new();
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history()[0].role, Role::System);
        assert_eq!(session.turn(), 0);
    }

    #[test]
    fn reset_keeps_counters() {
        let mut session = SessionState::new();
        session.next_overview_id();
        session.push_exchange("q", "a");
        session.reset();
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.overview_id(), 1);
    }

    #[test]
    fn last_n_clamps_to_length() {
        let session = SessionState::new();
        assert_eq!(session.last_n(3).len(), 1);
    }

    #[test]
    fn overview_ids_are_monotonic() {
        let mut session = SessionState::new();
        assert_eq!(session.next_overview_id(), 1);
        assert_eq!(session.next_overview_id(), 2);
    }
}

//! Request orchestration: build the prompt, pick the active backend, issue
//! the call under a fresh cancellation token, classify the outcome, and hand
//! the result to the router.
//!
//! Session history is mutated here and nowhere else, and only on confirmed
//! success, so no failure path can corrupt it.

use crate::chat::ChatMessage;
use crate::prompt::{self, QueryType};
use crate::provider::{BackendProvider, ProviderError, ProviderKind, QueryOptions};
use crate::router::{RequestId, ResponseRouter};
use crate::session::SessionState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Optional context accompanying a query
#[derive(Debug, Clone, Default)]
pub struct AuxContext {
    pub file_name: Option<String>,
    /// Prior overview answer grounding a Concept/Usage follow-up
    pub overview_ref: Option<String>,
    /// Natural-language question, for Query requests
    pub nl_prompt: Option<String>,
    /// Whether the request was driven by a fresh code selection
    pub with_code: bool,
    /// Full file content, preferred over the selection for direct queries
    pub full_file: Option<String>,
}

/// One query in flight. Terminal once a response, error, or cancellation has
/// been recorded for its id; there are no retries and no re-entry.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub id: RequestId,
    pub query_type: QueryType,
    pub source_text: String,
    pub aux: AuxContext,
    pub token: CancellationToken,
    pub created_ms: i64,
}

/// Orchestrator-level defaults applied to every provider call
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub temperature: f32,
    pub timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            timeout_ms: 60_000,
        }
    }
}

pub struct RequestOrchestrator {
    openai: Arc<dyn BackendProvider>,
    anthropic: Arc<dyn BackendProvider>,
    active: RwLock<ProviderKind>,
    session: Mutex<SessionState>,
    current_token: Mutex<CancellationToken>,
    router: Arc<ResponseRouter>,
    next_request_id: AtomicU64,
    cfg: OrchestratorConfig,
}

impl RequestOrchestrator {
    pub fn new(
        openai: Arc<dyn BackendProvider>,
        anthropic: Arc<dyn BackendProvider>,
        router: Arc<ResponseRouter>,
        cfg: OrchestratorConfig,
    ) -> Self {
        Self {
            openai,
            anthropic,
            active: RwLock::new(ProviderKind::OpenAi),
            session: Mutex::new(SessionState::new()),
            current_token: Mutex::new(CancellationToken::new()),
            router,
            next_request_id: AtomicU64::new(1),
            cfg,
        }
    }

    /// Switch the active backend; the only place backend identity matters
    pub fn set_backend(&self, kind: ProviderKind) {
        *self.active.write().unwrap_or_else(|p| p.into_inner()) = kind;
    }

    pub fn active_backend(&self) -> ProviderKind {
        *self.active.read().unwrap_or_else(|p| p.into_inner())
    }

    fn active_provider(&self) -> Arc<dyn BackendProvider> {
        match self.active_backend() {
            ProviderKind::OpenAi => self.openai.clone(),
            ProviderKind::Anthropic => self.anthropic.clone(),
        }
    }

    pub fn next_request_id(&self) -> RequestId {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocate the correlation id for a new top-level request
    pub async fn next_overview_id(&self) -> u64 {
        self.session.lock().await.next_overview_id()
    }

    pub async fn current_overview_id(&self) -> u64 {
        self.session.lock().await.overview_id()
    }

    /// Allocate a fresh cancellation token for a new request.
    ///
    /// The previously outstanding token is replaced, not cancelled: an
    /// earlier in-flight call keeps running detached, and its late result is
    /// still applied if the router still has its registration.
    pub async fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut current = self.current_token.lock().await;
        let _detached = std::mem::replace(&mut *current, token.clone());
        token
    }

    /// Cooperatively cancel whatever request currently holds the token
    pub async fn stop(&self) {
        self.current_token.lock().await.cancel();
    }

    /// Reset the conversation; correlation counters survive
    pub async fn clear_session(&self) {
        self.session.lock().await.reset();
    }

    /// Snapshot of the current history, for tests and diagnostics
    pub async fn history(&self) -> Vec<ChatMessage> {
        self.session.lock().await.history().to_vec()
    }

    /// Issue one query and route its outcome. The request must already be
    /// registered with the router under its id.
    pub async fn send(&self, request: QueryRequest) {
        let built = {
            let session = self.session.lock().await;
            prompt::generate_chat_prompt(
                &request.source_text,
                request.query_type,
                request.aux.overview_ref.as_deref(),
                request.aux.nl_prompt.as_deref().unwrap_or(""),
                request.aux.with_code,
                request.aux.full_file.as_deref(),
                &session,
            )
        };
        debug!(
            target: "orchestrator",
            id = request.id,
            query_type = ?request.query_type,
            messages = built.chat.len(),
            "dispatching query"
        );

        match self.dispatch(&built.chat, &request.token).await {
            Ok(raw) => {
                debug!(
                    target: "orchestrator",
                    id = request.id,
                    elapsed_ms = chrono::Utc::now().timestamp_millis() - request.created_ms,
                    "query completed"
                );
                let output = compose_output(request.query_type, &built.preamble, &raw);
                self.commit(&request, &built.prompt, raw.trim()).await;
                self.router.complete(request.id, output).await;
            }
            Err(ProviderError::Cancelled) => {
                debug!(target: "orchestrator", id = request.id, "query cancelled");
                self.router.discard(request.id);
            }
            Err(err) => {
                warn!(target: "orchestrator", id = request.id, error = %err, "query failed");
                self.router.fail(request.id, user_message(&err)).await;
            }
        }
    }

    /// Re-issue a query against a caller-supplied history (refresh path).
    /// The session is left untouched: the exchange being refreshed was
    /// already recorded when it first completed.
    pub async fn resend(
        &self,
        request: QueryRequest,
        mut chat: Vec<ChatMessage>,
    ) {
        let preamble = prompt::assistant_preamble(request.query_type);
        chat.push(ChatMessage::assistant(preamble));
        debug!(
            target: "orchestrator",
            id = request.id,
            query_type = ?request.query_type,
            messages = chat.len(),
            "re-dispatching query"
        );

        match self.dispatch(&chat, &request.token).await {
            Ok(raw) => {
                debug!(
                    target: "orchestrator",
                    id = request.id,
                    elapsed_ms = chrono::Utc::now().timestamp_millis() - request.created_ms,
                    "refresh completed"
                );
                let output = compose_output(request.query_type, preamble, &raw);
                self.router.complete(request.id, output).await;
            }
            Err(ProviderError::Cancelled) => {
                debug!(target: "orchestrator", id = request.id, "refresh cancelled");
                self.router.discard(request.id);
            }
            Err(err) => {
                warn!(target: "orchestrator", id = request.id, error = %err, "refresh failed");
                self.router.fail(request.id, user_message(&err)).await;
            }
        }
    }

    async fn dispatch(
        &self,
        chat: &[ChatMessage],
        token: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let provider = self.active_provider();
        let limits = provider.model_limits();
        let opts = QueryOptions {
            max_tokens: limits.max_tokens,
            temperature: self.cfg.temperature,
            timeout_ms: self.cfg.timeout_ms,
            token: token.clone(),
        };
        provider.query(chat, &opts).await
    }

    /// Record a confirmed success in the session, per query type
    async fn commit(&self, request: &QueryRequest, prompt_text: &str, answer: &str) {
        let mut session = self.session.lock().await;
        match request.query_type {
            QueryType::Overview => {
                // An overview starts the conversation over
                session.replace(vec![
                    ChatMessage::system(prompt::SYSTEM_PROMPT),
                    ChatMessage::user(prompt_text),
                    ChatMessage::assistant(answer),
                ]);
            }
            QueryType::Query => {
                if request.aux.with_code {
                    // A fresh code selection starts a new thread of questions
                    session.reset();
                }
                session.push_exchange(prompt_text, answer);
            }
            QueryType::Concept | QueryType::Usage => {
                session.push_exchange(prompt_text, answer);
            }
        }
    }
}

/// UI-facing output: follow-up answers get the preamble glued on with the
/// model's first letter lowered so the sentence reads as one; direct query
/// answers pass through trimmed.
fn compose_output(query_type: QueryType, preamble: &str, raw: &str) -> String {
    let trimmed = raw.trim();
    match query_type {
        QueryType::Query => trimmed.to_string(),
        QueryType::Overview | QueryType::Concept | QueryType::Usage => {
            format!("{}{}", preamble, lowercase_first_letter(trimmed))
        }
    }
}

fn lowercase_first_letter(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// One user-visible message per error class; never retried
pub fn user_message(err: &ProviderError) -> String {
    match err {
        ProviderError::Auth(_) => {
            "Authentication with the AI service failed. Check your API key.".to_string()
        }
        ProviderError::RateLimit(_) => {
            "The AI service is rate limiting requests. Slow down and try again in a moment."
                .to_string()
        }
        ProviderError::Timeout(_) => "The request timed out. Try again.".to_string(),
        ProviderError::Network(_) => {
            "Could not reach the AI service. Check your network connection.".to_string()
        }
        ProviderError::Validation(reason) => {
            format!("The request was rejected before sending: {reason}")
        }
        // Cancellation is silent; this arm exists for totality only
        ProviderError::Cancelled => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_only_the_first_letter() {
        assert_eq!(lowercase_first_letter("A no-op function."), "a no-op function.");
        assert_eq!(lowercase_first_letter(""), "");
        assert_eq!(lowercase_first_letter("x"), "x");
    }

    #[test]
    fn query_output_passes_through_trimmed() {
        assert_eq!(
            compose_output(QueryType::Query, "", "  The answer.  "),
            "The answer."
        );
    }

    #[test]
    fn follow_up_output_is_preamble_plus_lowered_answer() {
        assert_eq!(
            compose_output(QueryType::Concept, "To understand this code, ", "Recursion is key."),
            "To understand this code, recursion is key."
        );
    }
}

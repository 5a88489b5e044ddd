// Glance Core Library
// Query orchestration engine for the editor code assistant

pub mod chat;
pub mod host;
pub mod orchestrator;
pub mod prompt;
pub mod protocol;
pub mod provider;
pub mod router;
pub mod session;
pub mod telemetry;

// Export core types
pub use chat::{ChatMessage, Role};
pub use orchestrator::{AuxContext, QueryRequest, RequestOrchestrator};
pub use prompt::QueryType;
pub use protocol::{UiEvent, UiRequest};
pub use provider::{
    AnthropicProvider, BackendProvider, OpenAiProvider, ProviderConfig, ProviderError,
    ProviderKind,
};
pub use router::{Origin, RequestId, ResponseRouter};
pub use session::SessionState;

use crate::host::{CredentialStore, EditorHost, MarkdownRenderer, Position};
use crate::orchestrator::OrchestratorConfig;
use crate::protocol::CommentType;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

// Error types

#[derive(Error, Debug)]
pub enum GlanceError {
    #[error("provider error: {0}")]
    ProviderError(#[from] provider::ProviderError),

    #[error("host error: {0}")]
    HostError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, GlanceError>;

/// The engine: wires the orchestrator, router, providers, and host
/// collaborators together and dispatches UI requests.
pub struct Glance {
    orchestrator: Arc<RequestOrchestrator>,
    router: Arc<ResponseRouter>,
    renderer: Arc<dyn MarkdownRenderer>,
    editor: Arc<dyn EditorHost>,
    openai: Arc<dyn BackendProvider>,
    anthropic: Arc<dyn BackendProvider>,
}

impl Glance {
    pub fn new(
        openai: Arc<dyn BackendProvider>,
        anthropic: Arc<dyn BackendProvider>,
        credentials: &dyn CredentialStore,
        editor: Arc<dyn EditorHost>,
        renderer: Arc<dyn MarkdownRenderer>,
        events: mpsc::Sender<UiEvent>,
    ) -> Result<Self> {
        // A missing key for one backend must not block the other: leave the
        // unkeyed provider uninitialized and let its first query fail instead
        for (provider, kind) in [
            (&openai, ProviderKind::OpenAi),
            (&anthropic, ProviderKind::Anthropic),
        ] {
            match provider.initialize(&credentials.credentials(kind)?) {
                Ok(()) => {}
                Err(provider::ProviderError::Auth(reason)) => {
                    warn!(?kind, %reason, "backend left uninitialized");
                }
                Err(err) => return Err(err.into()),
            }
        }

        let router = Arc::new(ResponseRouter::new(events, renderer.clone()));
        let orchestrator = Arc::new(RequestOrchestrator::new(
            openai.clone(),
            anthropic.clone(),
            router.clone(),
            OrchestratorConfig::default(),
        ));
        info!("Glance engine initialized");
        Ok(Self {
            orchestrator,
            router,
            renderer,
            editor,
            openai,
            anthropic,
        })
    }

    /// Switch the active backend
    pub fn set_backend(&self, kind: ProviderKind) {
        self.orchestrator.set_backend(kind);
    }

    pub fn active_backend(&self) -> ProviderKind {
        self.orchestrator.active_backend()
    }

    /// Release both backend clients
    pub fn shutdown(&self) {
        info!("Shutting down Glance engine");
        self.openai.dispose();
        self.anthropic.dispose();
    }

    /// Parse a raw JSON message from the UI and dispatch it
    pub async fn handle_json(&self, raw: &str) -> Result<()> {
        let request: UiRequest = serde_json::from_str(raw)?;
        self.handle_request(request).await
    }

    /// Dispatch one UI request
    pub async fn handle_request(&self, request: UiRequest) -> Result<()> {
        match request {
            UiRequest::AskAiOverview { code, filename } => self.ask_overview(code, filename).await,
            UiRequest::AskAiQuery {
                value,
                code,
                query_id,
            } => self.ask_query(value, code, query_id).await,
            UiRequest::AskAiConcept {
                code,
                overview_ref,
                query_id,
            } => {
                self.ask_follow_up(QueryType::Concept, code, overview_ref, query_id)
                    .await
            }
            UiRequest::AskAiUsage {
                code,
                overview_ref,
                query_id,
            } => {
                self.ask_follow_up(QueryType::Usage, code, overview_ref, query_id)
                    .await
            }
            UiRequest::ReaskAi {
                prompt,
                query_type,
                overview_id,
                refresh_id,
            } => self.reask(prompt, query_type, overview_id, refresh_id).await,
            UiRequest::EmbedComment {
                value,
                comment_type,
            } => self.embed_comment(&value, comment_type),
            UiRequest::ClearChat => {
                self.orchestrator.clear_session().await;
                self.router.clear();
                Ok(())
            }
            UiRequest::StopQuery => {
                self.orchestrator.stop().await;
                self.router.emit(UiEvent::StopProgress).await;
                Ok(())
            }
        }
    }

    async fn ask_overview(&self, code: String, filename: String) -> Result<()> {
        let overview_id = self.orchestrator.next_overview_id().await;

        // Echo the selection back to the UI before the answer arrives
        let code_html = self.renderer.render(&fence_code(&code, &filename));
        self.router
            .emit(UiEvent::AddCodeQuestion {
                overview_id,
                code: code.clone(),
                code_html,
                filename: Some(filename.clone()),
            })
            .await;

        let token = self.orchestrator.begin().await;
        let id = self.orchestrator.next_request_id();
        self.router.register(
            id,
            Origin {
                overview_id,
                query_id: None,
                refresh_id: None,
                query_type: QueryType::Overview,
            },
        );
        self.spawn_send(QueryRequest {
            id,
            query_type: QueryType::Overview,
            source_text: code,
            aux: AuxContext {
                file_name: Some(filename),
                ..Default::default()
            },
            token,
            created_ms: chrono::Utc::now().timestamp_millis(),
        });
        Ok(())
    }

    async fn ask_query(
        &self,
        value: Option<String>,
        code: Option<String>,
        query_id: Option<u64>,
    ) -> Result<()> {
        let with_code = code.as_deref().is_some_and(|c| !c.trim().is_empty());
        let code_text = code.unwrap_or_default();
        let nl = match value.filter(|v| !v.trim().is_empty()) {
            Some(v) => v,
            None if with_code => "explain what this code does".to_string(),
            None => {
                warn!(target: "glance", "query with neither code nor a question, ignoring");
                return Ok(());
            }
        };

        // A follow-up attached to an existing element keeps the current
        // correlation id; a top-level question gets a new one
        let overview_id = match query_id {
            Some(_) => self.orchestrator.current_overview_id().await,
            None => self.orchestrator.next_overview_id().await,
        };

        if with_code {
            let code_html = self.renderer.render(&fence_code(&code_text, ""));
            self.router
                .emit(UiEvent::AddCodeQuestion {
                    overview_id,
                    code: code_text.clone(),
                    code_html,
                    filename: None,
                })
                .await;
        }
        let value_html = self.renderer.render(&nl);
        self.router
            .emit(UiEvent::AddNlQuestion {
                overview_id,
                value: nl.clone(),
                value_html,
            })
            .await;

        let full_file = if with_code {
            self.editor.document_text()
        } else {
            None
        };
        let token = self.orchestrator.begin().await;
        let id = self.orchestrator.next_request_id();
        self.router.register(
            id,
            Origin {
                overview_id,
                query_id,
                refresh_id: None,
                query_type: QueryType::Query,
            },
        );
        self.spawn_send(QueryRequest {
            id,
            query_type: QueryType::Query,
            source_text: code_text,
            aux: AuxContext {
                nl_prompt: Some(nl),
                with_code,
                full_file,
                ..Default::default()
            },
            token,
            created_ms: chrono::Utc::now().timestamp_millis(),
        });
        Ok(())
    }

    async fn ask_follow_up(
        &self,
        query_type: QueryType,
        code: String,
        overview_ref: String,
        query_id: u64,
    ) -> Result<()> {
        let overview_id = self.orchestrator.current_overview_id().await;
        let token = self.orchestrator.begin().await;
        let id = self.orchestrator.next_request_id();
        self.router.register(
            id,
            Origin {
                overview_id,
                query_id: Some(query_id),
                refresh_id: None,
                query_type,
            },
        );
        self.spawn_send(QueryRequest {
            id,
            query_type,
            source_text: code,
            aux: AuxContext {
                overview_ref: Some(overview_ref),
                ..Default::default()
            },
            token,
            created_ms: chrono::Utc::now().timestamp_millis(),
        });
        Ok(())
    }

    async fn reask(
        &self,
        prompt: String,
        query_type: QueryType,
        overview_id: u64,
        refresh_id: u64,
    ) -> Result<()> {
        let chat = chat::wire::deserialize_history(&prompt);
        if chat.is_empty() {
            warn!(target: "glance", overview_id, "reask with empty history, ignoring");
            return Ok(());
        }

        let token = self.orchestrator.begin().await;
        let id = self.orchestrator.next_request_id();
        self.router.register(
            id,
            Origin {
                overview_id,
                query_id: None,
                refresh_id: Some(refresh_id),
                query_type,
            },
        );
        let request = QueryRequest {
            id,
            query_type,
            source_text: String::new(),
            aux: AuxContext::default(),
            token,
            created_ms: chrono::Utc::now().timestamp_millis(),
        };
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.resend(request, chat).await;
        });
        Ok(())
    }

    fn embed_comment(&self, value: &str, comment_type: CommentType) -> Result<()> {
        let text = format_comment(value, comment_type);
        let position: Position = self.editor.selection_start();
        self.editor.insert_text(position, &text)
    }

    fn spawn_send(&self, request: QueryRequest) {
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.send(request).await;
        });
    }
}

/// Wrap code in a fenced block, tagging the language from the file extension
fn fence_code(code: &str, filename: &str) -> String {
    let lang = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    format!("```{lang}\n{code}\n```")
}

/// Format an answer as a source comment for insertion into the editor
fn format_comment(value: &str, comment_type: CommentType) -> String {
    match comment_type {
        CommentType::Line => value
            .lines()
            .map(|line| format!("// {line}\n"))
            .collect::<String>(),
        CommentType::Block => format!("/* {value} */\n"),
    }
}

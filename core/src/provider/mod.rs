//! LLM backend abstraction.
//!
//! Two backends with incompatible message/role conventions and token budgets
//! sit behind the single `BackendProvider` contract. Callers never branch on
//! backend identity; the only place the divergence is visible is inside the
//! two implementations (chiefly `format_messages`, which is the reason the
//! trait exists).

mod anthropic;
mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

use crate::chat::ChatMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Which backend a configuration or credential belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

/// Credentials handed over by the host's secret store
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
}

/// Static configuration for one backend instance; read-only after init
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Per-response output ceiling accepted by the model
    pub max_tokens: u32,
    /// Total context window of the model
    pub max_context_tokens: u32,
    pub temperature: f32,
    pub request_timeout_ms: u64,
}

impl ProviderConfig {
    /// OpenAI-compatible defaults, overridable from the environment
    pub fn openai_from_env() -> Self {
        Self {
            name: "openai".to_string(),
            base_url: env_or("GLANCE_OPENAI_BASE_URL", "https://api.openai.com/v1"),
            api_key: std::env::var("GLANCE_OPENAI_API_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            model: env_or("GLANCE_OPENAI_MODEL", "gpt-4o-mini"),
            max_tokens: env_parse_or("GLANCE_OPENAI_MAX_TOKENS", 1024),
            max_context_tokens: env_parse_or("GLANCE_OPENAI_CONTEXT_TOKENS", 128_000),
            temperature: env_parse_or("GLANCE_OPENAI_TEMPERATURE", 0.3),
            request_timeout_ms: env_parse_or("GLANCE_REQUEST_TIMEOUT_MS", 60_000),
        }
    }

    /// Anthropic defaults, overridable from the environment
    pub fn anthropic_from_env() -> Self {
        Self {
            name: "anthropic".to_string(),
            base_url: env_or("GLANCE_ANTHROPIC_BASE_URL", "https://api.anthropic.com/v1"),
            api_key: std::env::var("GLANCE_ANTHROPIC_API_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            model: env_or("GLANCE_ANTHROPIC_MODEL", "claude-3-5-haiku-latest"),
            max_tokens: env_parse_or("GLANCE_ANTHROPIC_MAX_TOKENS", 1024),
            max_context_tokens: env_parse_or("GLANCE_ANTHROPIC_CONTEXT_TOKENS", 200_000),
            temperature: env_parse_or("GLANCE_ANTHROPIC_TEMPERATURE", 0.3),
            request_timeout_ms: env_parse_or("GLANCE_REQUEST_TIMEOUT_MS", 60_000),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Per-call options supplied by the orchestrator
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_ms: u64,
    pub token: CancellationToken,
}

/// Model limits reported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLimits {
    pub max_tokens: u32,
    pub max_context_tokens: u32,
}

/// Result of local payload validation, before any network call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadCheck {
    pub is_valid: bool,
    pub reason: Option<String>,
}

impl PayloadCheck {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Provider error taxonomy; cancellation is a value, never a panic
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid payload: {0}")]
    Validation(String),

    #[error("request cancelled")]
    Cancelled,
}

/// Contract implemented identically by both backends.
///
/// `initialize` must succeed before `query` is called and is idempotent;
/// `query` honors `QueryOptions::token` by returning `Cancelled` instead of
/// completing the call. `validate_payload`, `format_messages` and
/// `process_response` are pure and deterministic.
#[async_trait]
pub trait BackendProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Establish the HTTP client with the given credentials
    fn initialize(&self, creds: &Credentials) -> Result<(), ProviderError>;

    /// Send the full message sequence and return the trimmed answer text
    async fn query(
        &self,
        messages: &[ChatMessage],
        opts: &QueryOptions,
    ) -> Result<String, ProviderError>;

    /// Reject locally before any network call
    fn validate_payload(&self, opts: &QueryOptions) -> PayloadCheck;

    /// Convert role/content pairs into the backend's native payload shape
    fn format_messages(&self, messages: &[ChatMessage]) -> serde_json::Value;

    /// Extract and trim the answer text from a raw response body
    fn process_response(&self, raw: &serde_json::Value) -> Result<String, ProviderError>;

    fn model_limits(&self) -> ModelLimits;

    /// Release the client handle; `query` fails with `Auth` afterwards
    /// until `initialize` is called again
    fn dispose(&self);
}

/// Shared local validation used by both implementations
pub(crate) fn validate_options(cfg: &ProviderConfig, opts: &QueryOptions) -> PayloadCheck {
    if cfg.model.is_empty() {
        return PayloadCheck::invalid("model is not set");
    }
    if !(0.0..=1.0).contains(&opts.temperature) {
        return PayloadCheck::invalid(format!(
            "temperature {} outside [0, 1]",
            opts.temperature
        ));
    }
    if opts.max_tokens < 1 || opts.max_tokens > cfg.max_tokens {
        return PayloadCheck::invalid(format!(
            "max_tokens {} outside [1, {}]",
            opts.max_tokens, cfg.max_tokens
        ));
    }
    PayloadCheck::valid()
}

/// Map an HTTP error status to the taxonomy
pub(crate) fn classify_status(status: reqwest::StatusCode, body: &str) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::Auth(format!("status={status}")),
        429 => ProviderError::RateLimit(format!("status={status}")),
        408 | 504 => ProviderError::Timeout(format!("status={status}")),
        _ => ProviderError::Network(format!("status={status} body={body}")),
    }
}

/// Map a transport-level failure to the taxonomy
pub(crate) fn classify_transport(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(err.to_string())
    } else {
        ProviderError::Network(err.to_string())
    }
}

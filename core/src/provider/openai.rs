//! OpenAI-compatible chat backend.
//!
//! Role/content pairs map straight onto the Chat Completions `messages`
//! array; the system message stays inline at the head of the array.

use super::{
    classify_status, classify_transport, validate_options, BackendProvider, Credentials,
    ModelLimits, PayloadCheck, ProviderConfig, ProviderError, QueryOptions,
};
use crate::chat::ChatMessage;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde_json::json;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, error, warn};

pub struct OpenAiProvider {
    cfg: ProviderConfig,
    http: RwLock<Option<Client>>,
}

impl OpenAiProvider {
    pub fn new(cfg: ProviderConfig) -> Self {
        Self {
            cfg,
            http: RwLock::new(None),
        }
    }

    pub fn from_env() -> Self {
        Self::new(ProviderConfig::openai_from_env())
    }

    fn client(&self) -> Result<Client, ProviderError> {
        self.http
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| ProviderError::Auth("provider not initialized".into()))
    }
}

#[async_trait]
impl BackendProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn initialize(&self, creds: &Credentials) -> Result<(), ProviderError> {
        let mut slot = self.http.write().unwrap_or_else(|p| p.into_inner());
        if slot.is_some() {
            return Ok(());
        }
        let key = if creds.api_key.is_empty() {
            self.cfg.api_key.clone().unwrap_or_default()
        } else {
            creds.api_key.clone()
        };
        if key.is_empty() {
            return Err(ProviderError::Auth("no API key configured".into()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| ProviderError::Auth(format!("invalid API key: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .timeout(Duration::from_millis(self.cfg.request_timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::Network(format!("failed to build HTTP client: {e}")))?;
        *slot = Some(client);
        Ok(())
    }

    async fn query(
        &self,
        messages: &[ChatMessage],
        opts: &QueryOptions,
    ) -> Result<String, ProviderError> {
        let check = self.validate_payload(opts);
        if !check.is_valid {
            return Err(ProviderError::Validation(
                check.reason.unwrap_or_else(|| "payload rejected".into()),
            ));
        }
        let http = self.client()?;

        let url = format!(
            "{}/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        );
        let body = json!({
            "model": self.cfg.model,
            "messages": self.format_messages(messages),
            "max_tokens": opts.max_tokens,
            "temperature": opts.temperature,
        });
        debug!(target: "openai_provider", %url, model = %self.cfg.model, "POST chat completion");

        let send = http
            .post(&url)
            .timeout(Duration::from_millis(opts.timeout_ms))
            .json(&body)
            .send();
        let resp = tokio::select! {
            _ = opts.token.cancelled() => return Err(ProviderError::Cancelled),
            r = send => r.map_err(classify_transport)?,
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(target: "openai_provider", %status, body = %text, "chat completion error");
            return Err(classify_status(status, &text));
        }

        let val = tokio::select! {
            _ = opts.token.cancelled() => return Err(ProviderError::Cancelled),
            v = resp.json::<serde_json::Value>() => v.map_err(|e| {
                ProviderError::Network(format!("failed to parse response JSON: {e}"))
            })?,
        };
        self.process_response(&val)
    }

    fn validate_payload(&self, opts: &QueryOptions) -> PayloadCheck {
        validate_options(&self.cfg, opts)
    }

    fn format_messages(&self, messages: &[ChatMessage]) -> serde_json::Value {
        // Native shape already matches: role stays inline for every entry
        json!(messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect::<Vec<_>>())
    }

    fn process_response(&self, raw: &serde_json::Value) -> Result<String, ProviderError> {
        if let Some(total) = raw
            .get("usage")
            .and_then(|u| u.get("total_tokens"))
            .and_then(|v| v.as_u64())
        {
            if total >= self.cfg.max_context_tokens as u64 {
                warn!(
                    target: "openai_provider",
                    total_tokens = total,
                    ceiling = self.cfg.max_context_tokens,
                    "usage at or above the model's context ceiling"
                );
            }
        }
        raw.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                ProviderError::Network("missing choices[0].message.content in response".into())
            })
    }

    fn model_limits(&self) -> ModelLimits {
        ModelLimits {
            max_tokens: self.cfg.max_tokens,
            max_context_tokens: self.cfg.max_context_tokens,
        }
    }

    fn dispose(&self) {
        self.http.write().unwrap_or_else(|p| p.into_inner()).take();
    }
}

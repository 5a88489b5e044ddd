//! Anthropic messages backend.
//!
//! Unlike the OpenAI shape, a leading system message cannot appear in the
//! `messages` array: it is lifted out into a separate top-level `system`
//! field. This is the conventions divergence the `BackendProvider` trait
//! hides from callers.

use super::{
    classify_status, classify_transport, validate_options, BackendProvider, Credentials,
    ModelLimits, PayloadCheck, ProviderConfig, ProviderError, QueryOptions,
};
use crate::chat::{ChatMessage, Role};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde_json::json;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, error, warn};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    cfg: ProviderConfig,
    http: RwLock<Option<Client>>,
}

impl AnthropicProvider {
    pub fn new(cfg: ProviderConfig) -> Self {
        Self {
            cfg,
            http: RwLock::new(None),
        }
    }

    pub fn from_env() -> Self {
        Self::new(ProviderConfig::anthropic_from_env())
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
impl BackendProvider for AnthropicProvider {
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
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(API_VERSION),
        );
        let api_key = HeaderValue::from_str(&key)
            .map_err(|e| ProviderError::Auth(format!("invalid API key: {e}")))?;
        headers.insert("x-api-key", api_key);

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

        let url = format!("{}/messages", self.cfg.base_url.trim_end_matches('/'));
        let shaped = self.format_messages(messages);
        let body = json!({
            "model": self.cfg.model,
            "system": shaped["system"],
            "messages": shaped["messages"],
            "max_tokens": opts.max_tokens,
            "temperature": opts.temperature,
        });
        debug!(target: "anthropic_provider", %url, model = %self.cfg.model, "POST messages");

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
            error!(target: "anthropic_provider", %status, body = %text, "messages error");
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
        // Leading system messages are merged into the separate system field;
        // everything else keeps its role inline
        let mut system = String::new();
        let mut rest = Vec::new();
        for m in messages {
            if m.role == Role::System && rest.is_empty() {
                if !system.is_empty() {
                    system.push('\n');
                }
                system.push_str(&m.content);
            } else {
                rest.push(json!({"role": m.role.as_str(), "content": m.content}));
            }
        }
        // the API rejects a trailing assistant turn with empty content; an
        // empty lead-in means there is nothing to prefill, so drop it
        if let Some(last) = messages.last() {
            if last.role == Role::Assistant && last.content.is_empty() {
                rest.pop();
            }
        }
        json!({"system": system, "messages": rest})
    }

    fn process_response(&self, raw: &serde_json::Value) -> Result<String, ProviderError> {
        let usage = raw.get("usage");
        let input = usage
            .and_then(|u| u.get("input_tokens"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let output = usage
            .and_then(|u| u.get("output_tokens"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        if usage.is_some() && input + output >= self.cfg.max_context_tokens as u64 {
            warn!(
                target: "anthropic_provider",
                input_tokens = input,
                output_tokens = output,
                ceiling = self.cfg.max_context_tokens,
                "usage at or above the model's context ceiling"
            );
        }
        raw.get("content")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("text"))
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| ProviderError::Network("missing content[0].text in response".into()))
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

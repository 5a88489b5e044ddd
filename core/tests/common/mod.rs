//! Shared fakes for the integration tests.

use async_trait::async_trait;
use glance_core::chat::ChatMessage;
use glance_core::provider::{
    BackendProvider, Credentials, ModelLimits, PayloadCheck, ProviderConfig, ProviderError,
    QueryOptions,
};
use std::time::Duration;

/// What the fake backend should do when queried
#[allow(dead_code)]
pub enum Script {
    Reply(&'static str),
    DelayedReply(u64, &'static str),
    AuthFail,
    HangUntilCancelled,
}

/// In-process stand-in for a backend; no network involved
#[allow(dead_code)]
pub struct ScriptedProvider {
    pub script: Script,
}

impl ScriptedProvider {
    #[allow(dead_code)]
    pub fn new(script: Script) -> Self {
        Self { script }
    }
}

#[async_trait]
impl BackendProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn initialize(&self, _creds: &Credentials) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn query(
        &self,
        _messages: &[ChatMessage],
        opts: &QueryOptions,
    ) -> Result<String, ProviderError> {
        match &self.script {
            Script::Reply(text) => Ok(text.to_string()),
            Script::DelayedReply(ms, text) => {
                tokio::select! {
                    _ = opts.token.cancelled() => Err(ProviderError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(*ms)) => Ok(text.to_string()),
                }
            }
            Script::AuthFail => Err(ProviderError::Auth("status=401".into())),
            Script::HangUntilCancelled => {
                opts.token.cancelled().await;
                Err(ProviderError::Cancelled)
            }
        }
    }

    fn validate_payload(&self, _opts: &QueryOptions) -> PayloadCheck {
        PayloadCheck::valid()
    }

    fn format_messages(&self, messages: &[ChatMessage]) -> serde_json::Value {
        serde_json::json!(messages.len())
    }

    fn process_response(&self, _raw: &serde_json::Value) -> Result<String, ProviderError> {
        Ok(String::new())
    }

    fn model_limits(&self) -> ModelLimits {
        ModelLimits {
            max_tokens: 64,
            max_context_tokens: 1000,
        }
    }

    fn dispose(&self) {}
}

/// Provider configuration pointing nowhere, for pure-function tests
#[allow(dead_code)]
pub fn test_cfg(name: &str) -> ProviderConfig {
    ProviderConfig {
        name: name.to_string(),
        base_url: "http://localhost:0".to_string(),
        api_key: None,
        model: "test-model".to_string(),
        max_tokens: 100,
        max_context_tokens: 1000,
        temperature: 0.3,
        request_timeout_ms: 1000,
    }
}

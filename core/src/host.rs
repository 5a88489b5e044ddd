//! Collaborator interfaces provided by the host editor.
//!
//! The engine never touches the editor, the secret store, or the markdown
//! pipeline directly; it goes through these traits. The simple
//! implementations here cover tests and headless use.

use crate::provider::{Credentials, ProviderKind};
use crate::{GlanceError, Result};
use std::collections::HashMap;

/// Secret storage for backend API keys
pub trait CredentialStore: Send + Sync {
    fn credentials(&self, kind: ProviderKind) -> Result<Credentials>;
}

/// Credential store backed by environment variables
pub struct EnvCredentialStore;

impl CredentialStore for EnvCredentialStore {
    fn credentials(&self, kind: ProviderKind) -> Result<Credentials> {
        let var = match kind {
            ProviderKind::OpenAi => "GLANCE_OPENAI_API_KEY",
            ProviderKind::Anthropic => "GLANCE_ANTHROPIC_API_KEY",
        };
        Ok(Credentials {
            api_key: std::env::var(var).unwrap_or_default(),
        })
    }
}

/// In-memory credential store, mainly for tests
#[derive(Default)]
pub struct StaticCredentialStore {
    keys: HashMap<ProviderKind, String>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, kind: ProviderKind, api_key: impl Into<String>) -> Self {
        self.keys.insert(kind, api_key.into());
        self
    }
}

impl CredentialStore for StaticCredentialStore {
    fn credentials(&self, kind: ProviderKind) -> Result<Credentials> {
        Ok(Credentials {
            api_key: self.keys.get(&kind).cloned().unwrap_or_default(),
        })
    }
}

/// Markdown-to-HTML rendering, owned by the host
pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, text: &str) -> String;
}

/// Renderer that returns the text unchanged
pub struct PlainRenderer;

impl MarkdownRenderer for PlainRenderer {
    fn render(&self, text: &str) -> String {
        text.to_string()
    }
}

/// A position in the active document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

/// Editor selection and insertion, owned by the host
pub trait EditorHost: Send + Sync {
    fn selected_text(&self) -> Option<String>;

    /// Full text of the active document, when the host exposes it
    fn document_text(&self) -> Option<String>;

    fn selection_start(&self) -> Position;

    fn insert_text(&self, position: Position, text: &str) -> Result<()>;
}

/// Editor host that refuses everything; for headless runs without an editor
pub struct NullEditorHost;

impl EditorHost for NullEditorHost {
    fn selected_text(&self) -> Option<String> {
        None
    }

    fn document_text(&self) -> Option<String> {
        None
    }

    fn selection_start(&self) -> Position {
        Position::default()
    }

    fn insert_text(&self, _position: Position, _text: &str) -> Result<()> {
        Err(GlanceError::HostError("no editor attached".into()))
    }
}

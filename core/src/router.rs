//! Response routing: correlate a completed request back to the UI element
//! that issued it.
//!
//! Dispatch is a direct id lookup, never a FIFO queue: several requests can
//! be in flight and complete out of order, and each answer applies to its own
//! correlation id in completion order. A late result from a request the
//! orchestrator has since detached is still applied as long as its entry is
//! registered; `clear` purges the registry.

use crate::host::MarkdownRenderer;
use crate::prompt::QueryType;
use crate::protocol::UiEvent;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Engine-internal request identifier, distinct from the UI correlation ids
pub type RequestId = u64;

/// Where a response should land in the UI
#[derive(Debug, Clone)]
pub struct Origin {
    /// Correlation id of the top-level Overview/Query this belongs to
    pub overview_id: u64,
    /// Explicit follow-up id supplied by the UI, when present
    pub query_id: Option<u64>,
    /// Refresh id for a reask; routes the answer as a redo
    pub refresh_id: Option<u64>,
    pub query_type: QueryType,
}

pub struct ResponseRouter {
    pending: DashMap<RequestId, Origin>,
    events: mpsc::Sender<UiEvent>,
    renderer: Arc<dyn MarkdownRenderer>,
}

impl ResponseRouter {
    pub fn new(events: mpsc::Sender<UiEvent>, renderer: Arc<dyn MarkdownRenderer>) -> Self {
        Self {
            pending: DashMap::new(),
            events,
            renderer,
        }
    }

    /// Register a request before it is sent
    pub fn register(&self, id: RequestId, origin: Origin) {
        debug!(
            target: "router",
            id,
            overview_id = origin.overview_id,
            query_type = ?origin.query_type,
            "registering request"
        );
        self.pending.insert(id, origin);
    }

    /// Drop a request without emitting anything (cancellation path)
    pub fn discard(&self, id: RequestId) {
        if self.pending.remove(&id).is_some() {
            debug!(target: "router", id, "discarded request");
        }
    }

    /// Whether a request is still registered
    pub fn is_pending(&self, id: RequestId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Purge all registered requests (clear-chat path)
    pub fn clear(&self) {
        self.pending.clear();
    }

    /// Route a successful answer to its origin
    pub async fn complete(&self, id: RequestId, value: String) {
        let Some((_, origin)) = self.pending.remove(&id) else {
            warn!(target: "router", id, "completion for unregistered request, dropping");
            return;
        };
        let value_html = self.renderer.render(&value);
        let event = if let Some(refresh_id) = origin.refresh_id {
            UiEvent::RedoQuery {
                overview_id: origin.overview_id,
                query_id: refresh_id,
                query_type: origin.query_type,
                value,
                value_html,
            }
        } else {
            match origin.query_type {
                QueryType::Overview => UiEvent::AddOverview {
                    overview_id: origin.overview_id,
                    value,
                    value_html,
                },
                QueryType::Query | QueryType::Concept | QueryType::Usage => UiEvent::AddDetail {
                    query_id: origin.query_id.unwrap_or(origin.overview_id),
                    detail_type: origin.query_type,
                    value,
                    value_html,
                },
            }
        };
        self.emit(event).await;
        self.emit(UiEvent::StopProgress).await;
    }

    /// Route a failure to the UI as a user-facing message
    pub async fn fail(&self, id: RequestId, message: String) {
        self.pending.remove(&id);
        self.emit(UiEvent::ShowError { value: message }).await;
        self.emit(UiEvent::StopProgress).await;
    }

    /// Emit a raw event; used by the engine for question echoes
    pub async fn emit(&self, event: UiEvent) {
        if self.events.send(event).await.is_err() {
            warn!(target: "router", "UI event receiver closed, dropping event");
        }
    }
}

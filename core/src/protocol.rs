//! Typed message protocol between the engine and its UI collaborator.
//!
//! The webview side speaks JSON with camelCase field names and a `message`
//! tag; these enums are the canonical in-process representation.

use crate::prompt::QueryType;
use serde::{Deserialize, Serialize};

/// How an embedded comment should be formatted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentType {
    Line,
    Block,
}

/// Requests arriving from the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum UiRequest {
    #[serde(rename = "askAIOverview")]
    AskAiOverview { code: String, filename: String },

    #[serde(rename = "askAIQuery")]
    AskAiQuery {
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        query_id: Option<u64>,
    },

    #[serde(rename = "askAIConcept")]
    AskAiConcept {
        code: String,
        overview_ref: String,
        query_id: u64,
    },

    #[serde(rename = "askAIUsage")]
    AskAiUsage {
        code: String,
        overview_ref: String,
        query_id: u64,
    },

    /// Refresh an earlier exchange; `prompt` is the serialized history
    #[serde(rename = "reaskAI")]
    ReaskAi {
        prompt: String,
        query_type: QueryType,
        overview_id: u64,
        refresh_id: u64,
    },

    EmbedComment {
        value: String,
        comment_type: CommentType,
    },

    ClearChat,

    StopQuery,
}

/// Events emitted back to the UI, each tagged with its correlation id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum UiEvent {
    #[serde(rename = "addNLQuestion")]
    AddNlQuestion {
        overview_id: u64,
        value: String,
        value_html: String,
    },

    AddCodeQuestion {
        overview_id: u64,
        code: String,
        code_html: String,
        #[serde(default)]
        filename: Option<String>,
    },

    AddOverview {
        overview_id: u64,
        value: String,
        value_html: String,
    },

    AddDetail {
        query_id: u64,
        detail_type: QueryType,
        value: String,
        value_html: String,
    },

    RedoQuery {
        overview_id: u64,
        query_id: u64,
        query_type: QueryType,
        value: String,
        value_html: String,
    },

    StopProgress,

    // field cannot be named `message`, that is the enum's serde tag
    ShowError { value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_tags_match_the_ui_protocol() {
        let req = UiRequest::AskAiOverview {
            code: "def f(): pass".into(),
            filename: "a.py".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["message"], "askAIOverview");
        assert_eq!(json["code"], "def f(): pass");

        let req = UiRequest::ReaskAi {
            prompt: "user::: hi".into(),
            query_type: QueryType::Concept,
            overview_id: 3,
            refresh_id: 7,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["message"], "reaskAI");
        assert_eq!(json["queryType"], "concept");
        assert_eq!(json["overviewId"], 3);
        assert_eq!(json["refreshId"], 7);
    }

    #[test]
    fn request_round_trips_through_json() {
        let req = UiRequest::AskAiQuery {
            value: Some("what does this do?".into()),
            code: None,
            query_id: Some(2),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(serde_json::from_str::<UiRequest>(&json).unwrap(), req);
    }

    #[test]
    fn event_tags_match_the_ui_protocol() {
        let event = UiEvent::AddDetail {
            query_id: 4,
            detail_type: QueryType::Usage,
            value: "v".into(),
            value_html: "<p>v</p>".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["message"], "addDetail");
        assert_eq!(json["detailType"], "usage");
        assert_eq!(json["queryId"], 4);

        let json = serde_json::to_value(UiEvent::StopProgress).unwrap();
        assert_eq!(json["message"], "stopProgress");

        let json = serde_json::to_value(UiEvent::AddNlQuestion {
            overview_id: 1,
            value: "q".into(),
            value_html: "q".into(),
        })
        .unwrap();
        assert_eq!(json["message"], "addNLQuestion");
    }

    #[test]
    fn show_error_keeps_the_tag_field_free() {
        let event = UiEvent::ShowError {
            value: "something broke".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["message"], "showError");
        assert_eq!(json["value"], "something broke");
        let back: UiEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}

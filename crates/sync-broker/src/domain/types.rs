//! Core broker types.
//!
//! The engine never interprets `action`, `subject_id`, `category` or `context`;
//! they are carried verbatim from submitter to consumer.

use crate::domain::correlation::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A submission as received from a submitter.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Submission {
    pub action: String,
    #[serde(alias = "nodeId")]
    pub subject_id: String,
    #[serde(alias = "graphType")]
    pub category: String,
    /// Primary text. Falls back to `context.prompt` when absent or empty.
    pub prompt: Option<String>,
    /// Free-form context forwarded without interpretation.
    pub context: Option<Value>,
}

impl Submission {
    pub fn new(
        action: impl Into<String>,
        subject_id: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            subject_id: subject_id.into(),
            category: category.into(),
            prompt: None,
            context: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Resolve the primary text: top-level prompt, then `context.prompt`, then empty.
    pub fn primary_text(&self) -> String {
        if let Some(prompt) = self.prompt.as_deref().filter(|p| !p.is_empty()) {
            return prompt.to_string();
        }
        self.context
            .as_ref()
            .and_then(|c| c.get("prompt"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

/// One unit of work awaiting an answer.
///
/// Owned by the correlation store; consumers only ever see clones.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub id: RequestId,
    pub action: String,
    pub subject_id: String,
    pub category: String,
    pub prompt: String,
    pub context: Value,
    /// Milliseconds since Unix epoch (informational)
    pub created_at_ms: u64,
}

impl PendingRequest {
    pub fn from_submission(id: RequestId, submission: Submission, created_at_ms: u64) -> Self {
        let prompt = submission.primary_text();
        Self {
            id,
            action: submission.action,
            subject_id: submission.subject_id,
            category: submission.category,
            prompt,
            context: submission
                .context
                .unwrap_or_else(|| Value::Object(Default::default())),
            created_at_ms,
        }
    }

    /// Consumer-facing projection.
    pub fn to_work_item(&self) -> WorkItem {
        WorkItem {
            request_id: self.id,
            action: self.action.clone(),
            subject_id: self.subject_id.clone(),
            category: self.category.clone(),
            prompt: self.prompt.clone(),
            context: self.context.clone(),
        }
    }
}

/// What a consumer receives from a fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub request_id: RequestId,
    pub action: String,
    pub subject_id: String,
    pub category: String,
    pub prompt: String,
    pub context: Value,
}

/// The consumer's reply to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub request_id: RequestId,
    pub content: String,
}

/// Successful resolution of a `resolve()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The waiting submitter received the answer.
    Delivered,
    /// The request was cleared but nobody was left to receive the answer.
    Detached { warning: String },
}

impl ResolveOutcome {
    pub fn warning(&self) -> Option<&str> {
        match self {
            ResolveOutcome::Delivered => None,
            ResolveOutcome::Detached { warning } => Some(warning),
        }
    }
}

/// Read-only snapshot of broker state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStatus {
    pub connected: bool,
    #[serde(rename = "hasPendingPrompt")]
    pub has_pending_request: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_id: Option<RequestId>,
    pub waiting_submitters: usize,
    pub waiting_consumers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_submission_accepts_legacy_field_names() {
        let submission: Submission = serde_json::from_value(json!({
            "action": "summarize",
            "nodeId": "n1",
            "graphType": "mindmap",
            "prompt": "hi"
        }))
        .unwrap();

        assert_eq!(submission.subject_id, "n1");
        assert_eq!(submission.category, "mindmap");
        assert_eq!(submission.primary_text(), "hi");
    }

    #[test]
    fn test_primary_text_falls_back_to_context() {
        let submission = Submission::new("expand", "n2", "tree")
            .with_prompt("")
            .with_context(json!({ "prompt": "from context", "depth": 2 }));
        assert_eq!(submission.primary_text(), "from context");

        let empty = Submission::new("expand", "n2", "tree");
        assert_eq!(empty.primary_text(), "");
    }

    #[test]
    fn test_missing_context_becomes_empty_object() {
        let id = RequestId::new();
        let request = PendingRequest::from_submission(id, Submission::default(), 7);
        assert_eq!(request.context, json!({}));
        assert_eq!(request.created_at_ms, 7);
    }

    #[test]
    fn test_work_item_wire_format() {
        let id = RequestId::new();
        let request = PendingRequest::from_submission(
            id,
            Submission::new("summarize", "n1", "graph").with_prompt("hi"),
            0,
        );
        let json = serde_json::to_value(request.to_work_item()).unwrap();

        assert_eq!(json["requestId"], id.to_string());
        assert_eq!(json["subjectId"], "n1");
        assert_eq!(json["category"], "graph");
        assert_eq!(json["prompt"], "hi");
    }

    #[test]
    fn test_status_wire_format_omits_absent_pending_id() {
        let status = BrokerStatus {
            connected: true,
            has_pending_request: false,
            pending_id: None,
            waiting_submitters: 0,
            waiting_consumers: 1,
        };
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["hasPendingPrompt"], false);
        assert_eq!(json["waitingConsumers"], 1);
        assert!(json.get("pendingId").is_none());
    }
}

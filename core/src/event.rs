//! Host Event Payloads
//!
//! Typed versions of the records the host passes to each lifecycle callback.
//! Payloads are validated once at the boundary (serde) so hook logic can
//! match on variants instead of probing for fields.

use serde::{Deserialize, Serialize};

/// Lifecycle points a hook can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookPoint {
    #[serde(rename = "tool.execute.before")]
    ToolExecuteBefore,
    #[serde(rename = "tool.execute.after")]
    ToolExecuteAfter,
    #[serde(rename = "chat.message")]
    ChatMessage,
    #[serde(rename = "event")]
    Event,
}

impl std::fmt::Display for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookPoint::ToolExecuteBefore => write!(f, "tool.execute.before"),
            HookPoint::ToolExecuteAfter => write!(f, "tool.execute.after"),
            HookPoint::ChatMessage => write!(f, "chat.message"),
            HookPoint::Event => write!(f, "event"),
        }
    }
}

/// Tool invocation input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolInput {
    /// Tool name
    pub tool: String,
    /// Session ID
    #[serde(rename = "sessionID", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Tool call ID
    #[serde(rename = "callID", default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Tool arguments
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub args: serde_json::Value,
}

impl ToolInput {
    pub fn new(tool: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    /// Session ID, or `"unknown"` when the host omitted it
    pub fn session_or_unknown(&self) -> &str {
        self.session_id.as_deref().unwrap_or("unknown")
    }
}

/// Resource payload embedded in a content block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Structured content block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ImageUrl { image_url: serde_json::Value },
    Resource { resource: ResourceBlock },
}

/// Tool output payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolPayload {
    /// Plain text output
    Text(String),
    /// Typed content blocks
    Blocks(Vec<ContentBlock>),
    /// A single content block
    Block(ContentBlock),
    /// Any other JSON value
    Json(serde_json::Value),
}

impl ToolPayload {
    /// Serialized length in characters: the text itself, or the JSON encoding
    pub fn char_len(&self) -> usize {
        match self {
            ToolPayload::Text(text) => text.chars().count(),
            other => serde_json::to_string(other)
                .map(|s| s.chars().count())
                .unwrap_or(0),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ToolPayload::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Tool execution output, mutated in place by `tool.execute.after` hooks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ToolPayload>,
    /// Raw content list some tools return alongside (or instead of) `output`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            output: Some(ToolPayload::Text(text.into())),
            ..Default::default()
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self {
            output: Some(ToolPayload::Json(value)),
            ..Default::default()
        }
    }

    /// Text output, if the payload is plain text
    pub fn output_text(&self) -> Option<&str> {
        self.output.as_ref().and_then(ToolPayload::as_text)
    }
}

/// Chat message input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageInput {
    #[serde(rename = "sessionID", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "messageID", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl ChatMessageInput {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            message_id: None,
        }
    }
}

/// Chat message output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageOutput {
    #[serde(default)]
    pub parts: Vec<serde_json::Value>,
}

/// Error carried by a `session.error` event: a bare message or an error
/// object with a `message` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionError {
    Message(String),
    Object {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Other(serde_json::Value),
}

impl SessionError {
    /// Text to classify
    pub fn message(&self) -> Option<&str> {
        match self {
            SessionError::Message(message) => Some(message),
            SessionError::Object { message, .. } => message.as_deref(),
            SessionError::Other(_) => None,
        }
    }
}

impl From<&str> for SessionError {
    fn from(message: &str) -> Self {
        SessionError::Message(message.to_string())
    }
}

/// Generic bus event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    #[serde(rename = "session.start")]
    Start {
        #[serde(rename = "sessionID")]
        session_id: String,
    },
    #[serde(rename = "session.end")]
    End {
        #[serde(rename = "sessionID")]
        session_id: String,
    },
    #[serde(rename = "session.error")]
    Error {
        #[serde(rename = "sessionID", default)]
        session_id: String,
        #[serde(default)]
        error: Option<SessionError>,
    },
    /// Event types no hook here reacts to
    #[serde(other)]
    Other,
}

impl SessionEvent {
    /// Session ID, if the event carries one
    pub fn session_id(&self) -> Option<&str> {
        match self {
            SessionEvent::Start { session_id }
            | SessionEvent::End { session_id }
            | SessionEvent::Error { session_id, .. } => Some(session_id),
            SessionEvent::Other => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hook_point_display() {
        assert_eq!(HookPoint::ToolExecuteBefore.to_string(), "tool.execute.before");
        assert_eq!(HookPoint::ToolExecuteAfter.to_string(), "tool.execute.after");
        assert_eq!(HookPoint::ChatMessage.to_string(), "chat.message");
        assert_eq!(HookPoint::Event.to_string(), "event");
    }

    #[test]
    fn test_tool_input_host_field_names() {
        let input: ToolInput = serde_json::from_value(json!({
            "tool": "grep",
            "sessionID": "s1",
            "callID": "c1"
        }))
        .unwrap();

        assert_eq!(input.tool, "grep");
        assert_eq!(input.session_id.as_deref(), Some("s1"));
        assert_eq!(input.call_id.as_deref(), Some("c1"));
        assert!(input.args.is_null());
    }

    #[test]
    fn test_tool_input_without_session() {
        let input: ToolInput = serde_json::from_value(json!({"tool": "bash"})).unwrap();
        assert_eq!(input.session_or_unknown(), "unknown");
    }

    #[test]
    fn test_payload_variants() {
        let text: ToolOutput = serde_json::from_value(json!({"output": "hello"})).unwrap();
        assert_eq!(text.output_text(), Some("hello"));

        let blocks: ToolOutput = serde_json::from_value(json!({
            "output": [
                {"type": "text", "text": "a"},
                {"type": "image_url", "image_url": {"url": "data:..."}}
            ]
        }))
        .unwrap();
        assert!(matches!(blocks.output, Some(ToolPayload::Blocks(ref b)) if b.len() == 2));

        let block: ToolOutput = serde_json::from_value(json!({
            "output": {"type": "resource", "resource": {"uri": "file:///a", "text": "a"}}
        }))
        .unwrap();
        assert!(matches!(block.output, Some(ToolPayload::Block(ContentBlock::Resource { .. }))));

        let json_payload: ToolOutput =
            serde_json::from_value(json!({"output": ["a", "b"]})).unwrap();
        assert!(matches!(json_payload.output, Some(ToolPayload::Json(_))));

        let null_payload: ToolOutput = serde_json::from_value(json!({"output": null})).unwrap();
        assert!(null_payload.output.is_none());
    }

    #[test]
    fn test_payload_char_len() {
        assert_eq!(ToolPayload::Text("héllo".to_string()).char_len(), 5);
        assert_eq!(ToolPayload::Json(json!({"a": 1})).char_len(), 7);
    }

    #[test]
    fn test_session_events() {
        let start: SessionEvent =
            serde_json::from_value(json!({"type": "session.start", "sessionID": "s1"})).unwrap();
        assert_eq!(start.session_id(), Some("s1"));

        let error: SessionEvent = serde_json::from_value(json!({
            "type": "session.error",
            "sessionID": "s1",
            "error": "rate limit exceeded"
        }))
        .unwrap();
        assert!(matches!(error, SessionEvent::Error { error: Some(ref e), .. } if e.message() == Some("rate limit exceeded")));

        let other: SessionEvent =
            serde_json::from_value(json!({"type": "message.updated"})).unwrap();
        assert_eq!(other, SessionEvent::Other);
        assert!(other.session_id().is_none());
    }

    #[test]
    fn test_structured_session_error() {
        let event: SessionEvent = serde_json::from_value(json!({
            "type": "session.error",
            "sessionID": "s1",
            "error": {"name": "APIError", "message": "429 Too Many Requests"}
        }))
        .unwrap();

        let SessionEvent::Error { session_id, error } = event else {
            panic!("expected session.error");
        };
        assert_eq!(session_id, "s1");
        let error = error.unwrap();
        assert_eq!(error.message(), Some("429 Too Many Requests"));
        assert!(matches!(error, SessionError::Object { name: Some(ref n), .. } if n == "APIError"));
    }

    #[test]
    fn test_session_error_without_message_or_session() {
        let event: SessionEvent = serde_json::from_value(json!({
            "type": "session.error",
            "error": 42
        }))
        .unwrap();

        let SessionEvent::Error { session_id, error } = event else {
            panic!("expected session.error");
        };
        assert!(session_id.is_empty());
        assert_eq!(error.unwrap().message(), None);
    }
}

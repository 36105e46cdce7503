//! Conversation records.
//!
//! The session reports everything the user should see in the chat through
//! a [`ConversationSink`]. [`ConversationHistory`] is the in-memory sink.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use reel_core::ErrorKind;

/// Message role in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Error,
}

/// A single conversation message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique message ID (UUID)
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    /// Set on error messages
    #[serde(rename = "errorKind", skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn with_role(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            error_kind: None,
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Assistant, content)
    }

    pub fn error(content: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            error_kind: Some(kind),
            ..Self::with_role(MessageRole::Error, content)
        }
    }
}

/// Receives conversation messages produced by a session.
#[cfg_attr(test, mockall::automock)]
pub trait ConversationSink: Send + Sync {
    /// A prompt typed by the user.
    fn user_message(&self, content: &str);

    /// A summary of generated code.
    fn assistant_message(&self, content: &str);

    /// An error the user should see, posted before any automatic correction.
    fn error_message(&self, content: &str, kind: ErrorKind);

    /// Messages passed to the generation pipeline as context.
    fn context(&self) -> Vec<Message>;
}

/// In-memory conversation.
#[derive(Debug, Default)]
pub struct ConversationHistory {
    messages: Mutex<Vec<Message>>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message, in order.
    pub fn visible(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }

    fn push(&self, message: Message) {
        self.messages.lock().push(message);
    }
}

impl ConversationSink for ConversationHistory {
    fn user_message(&self, content: &str) {
        self.push(Message::user(content));
    }

    fn assistant_message(&self, content: &str) {
        self.push(Message::assistant(content));
    }

    fn error_message(&self, content: &str, kind: ErrorKind) {
        self.push(Message::error(content, kind));
    }

    /// User and assistant turns; error messages stay out of the model context.
    fn context(&self) -> Vec<Message> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.role != MessageRole::Error)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_records_in_order() {
        let history = ConversationHistory::new();
        history.user_message("make the title bounce");
        history.assistant_message("Added a spring animation to the title.");
        history.error_message("Compilation error: spring is not defined", ErrorKind::Compilation);

        let visible = history.visible();
        assert_eq!(visible.len(), 3);
        assert_eq!(visible[0].role, MessageRole::User);
        assert_eq!(visible[2].error_kind, Some(ErrorKind::Compilation));
        assert_ne!(visible[0].id, visible[1].id);
    }

    #[test]
    fn test_context_excludes_errors() {
        let history = ConversationHistory::new();
        history.user_message("fade in the logo");
        history.error_message("Runtime error: boom", ErrorKind::Runtime);

        let context = history.context();
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].content, "fade in the logo");
    }

    #[test]
    fn test_message_wire_format() {
        let json = serde_json::to_value(Message::error("boom", ErrorKind::Runtime)).unwrap();
        assert_eq!(json["role"], "error");
        assert_eq!(json["errorKind"], "runtime");
        assert!(json["createdAt"].is_string());

        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert!(json.get("errorKind").is_none());
    }
}

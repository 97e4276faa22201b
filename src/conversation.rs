//! Finalized conversation messages.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Assistant,
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    /// Text as received or typed.
    pub text: String,
    /// Display form; markup when `rich`, else equal to `text`.
    pub rendered: String,
    pub rich: bool,
    /// The assistant was cut off before finishing.
    pub interrupted: bool,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            sender: Sender::User,
            rendered: text.clone(),
            text,
            rich: false,
            interrupted: false,
        }
    }

    pub fn assistant(text: impl Into<String>, rendered: impl Into<String>, rich: bool) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
            rendered: rendered.into(),
            rich,
            interrupted: false,
        }
    }
}

/// Append-only list of finalized messages.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append a user message unless it is already the most recent one.
    ///
    /// Returns whether the message was appended.
    pub fn push_user_if_new(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        let already_last = self
            .messages
            .last()
            .is_some_and(|m| m.sender == Sender::User && m.text.trim() == text);
        if already_last {
            return false;
        }
        self.messages.push(Message::user(text));
        true
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_renders_as_itself() {
        let message = Message::user("bonjour");
        assert_eq!(message.sender, Sender::User);
        assert_eq!(message.rendered, "bonjour");
        assert!(!message.rich);
        assert!(!message.interrupted);
    }

    #[test]
    fn test_push_user_if_new_skips_duplicate_last() {
        let mut log = ConversationLog::new();
        assert!(log.push_user_if_new("what time is it"));
        assert!(!log.push_user_if_new(" what time is it "));
        log.push(Message::assistant("noon", "noon", false));
        assert!(log.push_user_if_new("what time is it"));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_push_user_if_new_ignores_blank() {
        let mut log = ConversationLog::new();
        assert!(!log.push_user_if_new("   "));
        assert!(log.is_empty());
        assert!(log.last().is_none());
    }

    #[test]
    fn test_message_serializes_sender_snake_case() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(json.contains(r#""sender":"user""#), "got {}", json);
    }
}

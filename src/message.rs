use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of a session's chat log. `id` is assigned only to assistant
/// replies produced by a successful answering call; user messages and error
/// bubbles never carry one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Marks an assistant bubble that stands in for a failed answering call.
    /// Such messages cannot be flagged or rated.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            id: None,
            error: false,
        }
    }

    pub fn assistant(content: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            id: Some(id.into()),
            error: false,
        }
    }

    pub fn error_bubble(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            id: None,
            error: true,
        }
    }
}

/// The greeting every fresh session starts with, so the log is never empty.
pub fn greeting() -> Message {
    Message {
        role: Role::Assistant,
        content: "Hello! I'm Pharos, your campus guide.\n\n\
                  I can help you with course requirements, faculty information, \
                  financial aid and scholarships, international student services, \
                  and housing. What would you like to know?"
            .to_string(),
        id: None,
        error: false,
    }
}

/// Feedback identity of a message: the server-assigned id when one exists,
/// otherwise its position in the log. The positional fallback is only stable
/// for the lifetime of one session's log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
    ServerId(String),
    LocalIndex(usize),
}

impl MessageKey {
    /// Resolve the key for `message` as found at `index` in the log.
    pub fn for_message(message: &Message, index: usize) -> Self {
        match &message.id {
            Some(id) => MessageKey::ServerId(id.clone()),
            None => MessageKey::LocalIndex(index),
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKey::ServerId(id) => write!(f, "{}", id),
            MessageKey::LocalIndex(index) => write!(f, "{}", index),
        }
    }
}

use crate::message::MessageKey;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    ThumbsUp,
    ThumbsDown,
}

impl fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackKind::ThumbsUp => write!(f, "thumbs_up"),
            FeedbackKind::ThumbsDown => write!(f, "thumbs_down"),
        }
    }
}

/// At-most-one directional rating per message within a session run.
///
/// Purely local bookkeeping: the backend is not guaranteed to reject
/// duplicates, so the client refuses to re-rate before any request is made.
/// Scoped to one in-memory session; not persisted across restarts.
#[derive(Debug, Default)]
pub struct FeedbackTracker {
    given: HashMap<MessageKey, FeedbackKind>,
}

impl FeedbackTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The rating already recorded for `key`, if any.
    pub fn get(&self, key: &MessageKey) -> Option<FeedbackKind> {
        self.given.get(key).copied()
    }

    /// Record `kind` for `key` if no rating exists yet. On conflict the
    /// existing rating is returned unchanged and nothing is mutated.
    pub fn try_record(&mut self, key: MessageKey, kind: FeedbackKind) -> Result<(), FeedbackKind> {
        match self.given.get(&key) {
            Some(existing) => Err(*existing),
            None => {
                self.given.insert(key, kind);
                Ok(())
            }
        }
    }

    /// Forget all ratings. Used when a new chat discards the session.
    pub fn clear(&mut self) {
        self.given.clear();
    }
}

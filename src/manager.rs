use crate::api::{ApiClient, ApiError, ChatTurn, CorrectionDetails, FlagReceipt};
use crate::feedback::{FeedbackKind, FeedbackTracker};
use crate::message::{Message, MessageKey, Role};
use crate::session::SessionStore;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// How many log entries ride along as context on each answering call
/// (three exchanges, greeting excluded).
const CONTEXT_WINDOW: usize = 6;

const ANSWER_FAILED: &str =
    "Sorry, I ran into a problem answering that. Please try again in a moment.";

#[derive(Debug, Error)]
pub enum FlagError {
    #[error("a reason is required to flag a response")]
    EmptyReason,
    #[error("only assistant answers can be flagged")]
    NotFlaggable,
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Error)]
pub enum RateError {
    #[error("this answer was already rated {0}")]
    AlreadyRated(FeedbackKind),
    #[error("only assistant answers can be rated")]
    NotRatable,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Asker-side orchestrator: owns the session identity, the in-memory chat
/// log mirror, and the feedback tracker, and drives the backend through the
/// gateway. Log appends are strictly ordered by user action: the user
/// message is appended and persisted before the answering call goes out, so
/// a slow reply can never appear ahead of the question that triggered it.
pub struct ChatManager {
    api: Arc<ApiClient>,
    sessions: SessionStore,
    session_id: String,
    log: Vec<Message>,
    feedback: FeedbackTracker,
    suggested: Vec<String>,
}

impl ChatManager {
    pub async fn new(api: Arc<ApiClient>, sessions: SessionStore) -> Self {
        let session_id = sessions.get_or_create_session_id().await;
        let log = sessions.load_history(&session_id).await;
        info!(
            "Chat session {} restored with {} message(s)",
            session_id,
            log.len()
        );
        Self {
            api,
            sessions,
            session_id,
            log,
            feedback: FeedbackTracker::new(),
            suggested: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn log(&self) -> &[Message] {
        &self.log
    }

    pub fn suggested_questions(&self) -> &[String] {
        &self.suggested
    }

    /// The rating already recorded for the message at `index`, if any. Used
    /// to disable the corresponding control.
    pub fn feedback_for(&self, index: usize) -> Option<FeedbackKind> {
        let message = self.log.get(index)?;
        self.feedback
            .get(&MessageKey::for_message(message, index))
    }

    /// Send a question to the answering collaborator and return the reply
    /// that was appended to the log. A failed call appends an error bubble
    /// (never flaggable or ratable) instead, so the log always reflects what
    /// the asker saw.
    pub async fn ask(&mut self, text: &str) -> Message {
        let query = text.trim().to_string();

        // Context excludes the greeting and the question being asked.
        let history: Vec<ChatTurn> = self
            .log
            .iter()
            .skip(1)
            .rev()
            .take(CONTEXT_WINDOW)
            .rev()
            .map(ChatTurn::from)
            .collect();

        self.log.push(Message::user(query.clone()));
        self.sessions.save_history(&self.session_id, &self.log).await;

        let reply = match self.api.chat(&query, &history, &self.session_id).await {
            Ok(answer) => {
                self.suggested = answer.suggested_questions;
                let id = chrono::Utc::now().timestamp_millis().to_string();
                Message::assistant(answer.response, id)
            }
            Err(e) => {
                error!("Answering call failed: {}", e);
                Message::error_bubble(ANSWER_FAILED)
            }
        };

        self.log.push(reply.clone());
        self.sessions.save_history(&self.session_id, &self.log).await;
        reply
    }

    fn answer_at(&self, index: usize) -> Option<&Message> {
        self.log
            .get(index)
            .filter(|m| m.role == Role::Assistant && !m.error)
    }

    /// The user question the answer at `index` responded to. Empty for the
    /// greeting, which no question precedes.
    fn query_for(&self, index: usize) -> String {
        self.log[..index]
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    /// Flag the answer at `index` as wrong. The reason is validated here,
    /// before any network call; transport and backend failures come back
    /// verbatim for inline display.
    pub async fn flag(&self, index: usize, reason: &str) -> Result<FlagReceipt, FlagError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(FlagError::EmptyReason);
        }
        let answer = self.answer_at(index).ok_or(FlagError::NotFlaggable)?;
        let response = answer.content.clone();
        let query = self.query_for(index);

        let receipt = self
            .api
            .flag(&query, &response, reason, &self.session_id)
            .await?;
        info!("Flag submitted, correction {}", receipt.correction_id);
        Ok(receipt)
    }

    /// Rate the answer at `index`. A second rating for the same message is
    /// rejected locally without issuing a request; the tracker records only
    /// after the backend acknowledges, so a failed submission stays
    /// retryable.
    pub async fn rate(&mut self, index: usize, kind: FeedbackKind) -> Result<(), RateError> {
        let answer = self.answer_at(index).ok_or(RateError::NotRatable)?;
        let key = MessageKey::for_message(answer, index);
        if let Some(existing) = self.feedback.get(&key) {
            return Err(RateError::AlreadyRated(existing));
        }
        let response = answer.content.clone();
        let query = self.query_for(index);

        self.api
            .submit_feedback(&query, &response, kind, &self.session_id, &key.to_string())
            .await?;
        let _ = self.feedback.try_record(key, kind);
        Ok(())
    }

    /// Fetch the full correction record a notification points at.
    pub async fn correction_details(&self, correction_id: i64) -> Result<CorrectionDetails, ApiError> {
        self.api.correction_details(correction_id).await
    }

    /// Discard the current session and its log, allocate a fresh session,
    /// and start over from the greeting. The only destructive operation.
    pub async fn new_chat(&mut self) -> anyhow::Result<()> {
        self.sessions.reset().await?;
        self.session_id = self.sessions.get_or_create_session_id().await;
        self.log = self.sessions.load_history(&self.session_id).await;
        self.feedback.clear();
        self.suggested.clear();
        info!("Started new chat session {}", self.session_id);
        Ok(())
    }
}

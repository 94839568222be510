use crate::feedback::FeedbackKind;
use crate::message::{Message, Role};
use crate::review::Disposition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("could not reach the assistant backend: {0}")]
    Transport(#[from] reqwest::Error),
    /// The reviewer credential was missing, expired, or rejected. The caller
    /// must discard the stored credential and re-authenticate.
    #[error("reviewer credential rejected, please sign in again")]
    Unauthorized,
    #[error("{detail}")]
    Backend { status: u16, detail: String },
}

/// One turn of context sent along with an answering call.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for ChatTurn {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(default)]
    pub suggested_questions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlagReceipt {
    pub correction_id: i64,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionStatus {
    Pending,
    Approved,
    Rejected,
}

/// Full correction record, fetched when a notification references one.
#[derive(Debug, Clone, Deserialize)]
pub struct CorrectionDetails {
    pub id: i64,
    pub student_query: String,
    pub original_response: String,
    #[serde(default)]
    pub corrected_response: Option<String>,
    pub status: CorrectionStatus,
    #[serde(default)]
    pub reviewed_by: Option<String>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// A flagged exchange awaiting reviewer disposition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PendingCorrection {
    pub id: String,
    pub query: String,
    #[serde(rename = "botResponse")]
    pub bot_response: String,
    pub reason: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub correction_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NotificationFeed {
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub unread_count: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    query: &'a str,
    conversation_history: &'a [ChatTurn],
    session_id: &'a str,
}

#[derive(Serialize)]
struct FlagRequest<'a> {
    query: &'a str,
    response: &'a str,
    reason: &'a str,
    session_id: &'a str,
}

#[derive(Serialize)]
struct FeedbackRequest<'a> {
    query: &'a str,
    response: &'a str,
    feedback_type: FeedbackKind,
    session_id: &'a str,
    message_id: &'a str,
}

#[derive(Serialize)]
struct ReviewRequest<'a> {
    action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    corrected_response: Option<&'a str>,
}

/// HTTP client for the backend collaborator. Pure request/response, no local
/// state beyond the reviewer credential slot; every call surfaces transport
/// and backend failures to its caller without retrying.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(130))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    pub fn set_token(&self, token: impl Into<String>) {
        if let Ok(mut slot) = self.token.write() {
            *slot = Some(token.into());
        }
    }

    /// Discard the reviewer credential (called on any 401).
    pub fn clear_token(&self) {
        if let Ok(mut slot) = self.token.write() {
            *slot = None;
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.read().map(|slot| slot.is_some()).unwrap_or(false)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> Option<String> {
        match self.token.read() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        }
    }

    /// Send a built request and map non-2xx statuses into the error taxonomy,
    /// preserving the backend's own message text where it provides one.
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let request = match self.bearer() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("detail")
                    .or_else(|| v.get("error"))
                    .and_then(|d| d.as_str())
                    .map(|d| d.to_string())
            })
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("backend returned status {}", status)
                } else {
                    body.trim().to_string()
                }
            });

        Err(ApiError::Backend {
            status: status.as_u16(),
            detail,
        })
    }

    // --- Asker side ---

    pub async fn chat(
        &self,
        query: &str,
        history: &[ChatTurn],
        session_id: &str,
    ) -> Result<ChatReply, ApiError> {
        let body = ChatRequest {
            query,
            conversation_history: history,
            session_id,
        };
        let response = self
            .execute(self.http.post(self.url("/chat")).json(&body))
            .await?;
        Ok(response.json().await?)
    }

    /// Submit a flag for a disputed response. The backend answers with the
    /// identifier of the pending correction it created. A duplicate
    /// submission just creates a second pending record; no retry here.
    pub async fn flag(
        &self,
        query: &str,
        response: &str,
        reason: &str,
        session_id: &str,
    ) -> Result<FlagReceipt, ApiError> {
        let body = FlagRequest {
            query,
            response,
            reason,
            session_id,
        };
        let response = self
            .execute(self.http.post(self.url("/corrections/flag")).json(&body))
            .await?;
        Ok(response.json().await?)
    }

    pub async fn correction_details(&self, correction_id: i64) -> Result<CorrectionDetails, ApiError> {
        let response = self
            .execute(
                self.http
                    .get(self.url(&format!("/corrections/{}", correction_id))),
            )
            .await?;
        Ok(response.json().await?)
    }

    pub async fn submit_feedback(
        &self,
        query: &str,
        response: &str,
        feedback_type: FeedbackKind,
        session_id: &str,
        message_id: &str,
    ) -> Result<(), ApiError> {
        let body = FeedbackRequest {
            query,
            response,
            feedback_type,
            session_id,
            message_id,
        };
        self.execute(self.http.post(self.url("/feedback")).json(&body))
            .await?;
        Ok(())
    }

    pub async fn notifications(&self, session_id: &str) -> Result<NotificationFeed, ApiError> {
        let response = self
            .execute(
                self.http
                    .get(self.url(&format!("/notifications/{}", session_id))),
            )
            .await?;
        Ok(response.json().await?)
    }

    pub async fn mark_read(&self, notification_id: i64) -> Result<(), ApiError> {
        self.execute(
            self.http
                .post(self.url(&format!("/notifications/{}/mark-read", notification_id))),
        )
        .await?;
        Ok(())
    }

    pub async fn mark_all_read(&self, session_id: &str) -> Result<(), ApiError> {
        self.execute(
            self.http
                .post(self.url(&format!("/notifications/{}/mark-all-read", session_id))),
        )
        .await?;
        Ok(())
    }

    // --- Reviewer side (bearer credential required) ---

    pub async fn pending_corrections(&self) -> Result<Vec<PendingCorrection>, ApiError> {
        let response = self
            .execute(self.http.get(self.url("/reviewer/corrections/pending")))
            .await?;
        Ok(response.json().await?)
    }

    pub async fn review_correction(
        &self,
        correction_id: &str,
        disposition: &Disposition,
    ) -> Result<(), ApiError> {
        let body = ReviewRequest {
            action: disposition.action(),
            corrected_response: disposition.corrected_response(),
        };
        self.execute(
            self.http
                .post(self.url(&format!("/reviewer/corrections/{}/review", correction_id)))
                .json(&body),
        )
        .await?;
        Ok(())
    }
}

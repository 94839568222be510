//! In-process mock of the backend collaborator, used by the gateway, poller,
//! console, and manager tests. Stateful on purpose: corrections transition,
//! notifications are created as review side effects, and terminal states are
//! immutable, so the client can be exercised against realistic behavior.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

pub const REVIEWER_TOKEN: &str = "reviewer-secret";

#[derive(Debug, Clone)]
pub struct MockCorrection {
    pub id: i64,
    pub session_id: String,
    pub query: String,
    pub response: String,
    pub reason: String,
    pub status: String,
    pub corrected_response: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl MockCorrection {
    pub fn pending(
        id: i64,
        session_id: &str,
        query: &str,
        response: &str,
        reason: &str,
    ) -> Self {
        Self {
            id,
            session_id: session_id.to_string(),
            query: query.to_string(),
            response: response.to_string(),
            reason: reason.to_string(),
            status: "pending".to_string(),
            corrected_response: None,
            reviewed_by: None,
            reviewed_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MockNotification {
    pub id: i64,
    #[serde(skip)]
    pub session_id: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub correction_id: Option<i64>,
}

impl MockNotification {
    pub fn unread(id: i64, session_id: &str, title: &str, correction_id: Option<i64>) -> Self {
        Self {
            id,
            session_id: session_id.to_string(),
            title: title.to_string(),
            message: "A reviewer resolved one of your flags.".to_string(),
            is_read: false,
            created_at: Utc::now(),
            correction_id,
        }
    }
}

#[derive(Default)]
pub struct BackendState {
    pub corrections: Vec<MockCorrection>,
    pub notifications: Vec<MockNotification>,
    pub feedback_calls: usize,
    pub review_calls: usize,
    pub notification_fetches: usize,
    pub chat_failing: bool,
    pub notifications_failing: bool,
    pub notification_delay: Option<Duration>,
    next_correction_id: i64,
    next_notification_id: i64,
}

impl BackendState {
    fn next_correction_id(&mut self) -> i64 {
        let max = self.corrections.iter().map(|c| c.id).max().unwrap_or(0);
        self.next_correction_id = self.next_correction_id.max(max) + 1;
        self.next_correction_id
    }

    fn next_notification_id(&mut self) -> i64 {
        let max = self.notifications.iter().map(|n| n.id).max().unwrap_or(0);
        self.next_notification_id = self.next_notification_id.max(max) + 1;
        self.next_notification_id
    }
}

type Shared = Arc<Mutex<BackendState>>;

pub struct MockBackend {
    pub state: Shared,
    pub base_url: String,
}

impl MockBackend {
    pub fn seed_correction(&self, correction: MockCorrection) {
        self.state.lock().unwrap().corrections.push(correction);
    }

    pub fn seed_notification(&self, notification: MockNotification) {
        self.state.lock().unwrap().notifications.push(notification);
    }

    pub fn set_notification_delay(&self, delay: Duration) {
        self.state.lock().unwrap().notification_delay = Some(delay);
    }

    pub fn set_notifications_failing(&self, failing: bool) {
        self.state.lock().unwrap().notifications_failing = failing;
    }

    pub fn set_chat_failing(&self, failing: bool) {
        self.state.lock().unwrap().chat_failing = failing;
    }
}

pub async fn spawn_backend() -> MockBackend {
    let state: Shared = Arc::new(Mutex::new(BackendState::default()));

    let app = Router::new()
        .route("/chat", post(chat))
        .route("/corrections/flag", post(flag))
        .route("/corrections/:id", get(correction_details))
        .route("/feedback", post(feedback))
        .route("/notifications/:id", get(notifications))
        .route("/notifications/:id/mark-read", post(mark_read))
        .route("/notifications/:id/mark-all-read", post(mark_all_read))
        .route("/reviewer/corrections/pending", get(pending_corrections))
        .route("/reviewer/corrections/:id/review", post(review_correction))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockBackend { state, base_url }
}

fn error_body(status: StatusCode, detail: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "detail": detail })))
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", REVIEWER_TOKEN))
        .unwrap_or(false)
}

async fn chat(State(state): State<Shared>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if state.lock().unwrap().chat_failing {
        return error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            "answering pipeline unavailable",
        );
    }
    let query = body["query"].as_str().unwrap_or_default();
    (
        StatusCode::OK,
        Json(json!({
            "response": format!("You asked: {}", query),
            "suggested_questions": ["Anything else I can look up?"],
        })),
    )
}

async fn flag(State(state): State<Shared>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().unwrap();
    let id = state.next_correction_id();
    state.corrections.push(MockCorrection {
        id,
        session_id: body["session_id"].as_str().unwrap_or_default().to_string(),
        query: body["query"].as_str().unwrap_or_default().to_string(),
        response: body["response"].as_str().unwrap_or_default().to_string(),
        reason: body["reason"].as_str().unwrap_or_default().to_string(),
        status: "pending".to_string(),
        corrected_response: None,
        reviewed_by: None,
        reviewed_at: None,
    });
    (
        StatusCode::OK,
        Json(json!({
            "correction_id": id,
            "message": "Thank you! A reviewer will look at this response.",
        })),
    )
}

async fn correction_details(
    State(state): State<Shared>,
    Path(id): Path<i64>,
) -> (StatusCode, Json<Value>) {
    let state = state.lock().unwrap();
    match state.corrections.iter().find(|c| c.id == id) {
        Some(c) => (
            StatusCode::OK,
            Json(json!({
                "id": c.id,
                "student_query": c.query,
                "original_response": c.response,
                "corrected_response": c.corrected_response,
                "status": c.status,
                "reviewed_by": c.reviewed_by,
                "reviewed_at": c.reviewed_at,
            })),
        ),
        None => error_body(StatusCode::NOT_FOUND, "Correction not found"),
    }
}

async fn feedback(State(state): State<Shared>, Json(_body): Json<Value>) -> (StatusCode, Json<Value>) {
    state.lock().unwrap().feedback_calls += 1;
    (
        StatusCode::OK,
        Json(json!({ "message": "Thank you for your feedback!" })),
    )
}

async fn notifications(
    State(state): State<Shared>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let (delay, failing) = {
        let state = state.lock().unwrap();
        (state.notification_delay, state.notifications_failing)
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let mut state = state.lock().unwrap();
    state.notification_fetches += 1;
    if failing {
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "notifications unavailable");
    }

    let mut entries: Vec<&MockNotification> = state
        .notifications
        .iter()
        .filter(|n| n.session_id == session_id)
        .collect();
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let unread = entries.iter().filter(|n| !n.is_read).count();

    (
        StatusCode::OK,
        Json(json!({
            "notifications": entries,
            "unread_count": unread,
        })),
    )
}

async fn mark_read(State(state): State<Shared>, Path(id): Path<i64>) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().unwrap();
    match state.notifications.iter_mut().find(|n| n.id == id) {
        Some(n) => {
            n.is_read = true;
            (StatusCode::OK, Json(json!({ "message": "marked read" })))
        }
        None => error_body(StatusCode::NOT_FOUND, "Notification not found"),
    }
}

async fn mark_all_read(
    State(state): State<Shared>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().unwrap();
    for n in state
        .notifications
        .iter_mut()
        .filter(|n| n.session_id == session_id)
    {
        n.is_read = true;
    }
    (StatusCode::OK, Json(json!({ "message": "all marked read" })))
}

async fn pending_corrections(
    State(state): State<Shared>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return error_body(StatusCode::UNAUTHORIZED, "Invalid or expired token");
    }
    let state = state.lock().unwrap();
    let pending: Vec<Value> = state
        .corrections
        .iter()
        .filter(|c| c.status == "pending")
        .map(|c| {
            json!({
                "id": c.id.to_string(),
                "query": c.query,
                "botResponse": c.response,
                "reason": c.reason,
            })
        })
        .collect();
    (StatusCode::OK, Json(json!(pending)))
}

async fn review_correction(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return error_body(StatusCode::UNAUTHORIZED, "Invalid or expired token");
    }

    let mut state = state.lock().unwrap();
    state.review_calls += 1;

    let Ok(id) = id.parse::<i64>() else {
        return error_body(StatusCode::NOT_FOUND, "Correction not found");
    };
    let Some(index) = state.corrections.iter().position(|c| c.id == id) else {
        return error_body(StatusCode::NOT_FOUND, "Correction not found");
    };
    if state.corrections[index].status != "pending" {
        return error_body(StatusCode::CONFLICT, "Correction already reviewed");
    }

    let action = body["action"].as_str().unwrap_or_default().to_string();
    let corrected = body
        .get("corrected_response")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let (status, title) = match (action.as_str(), &corrected) {
        ("approve", Some(_)) => ("approved", "Response corrected"),
        ("approve", None) => ("approved", "Response verified"),
        ("reject", _) => ("rejected", "Flag reviewed"),
        _ => return error_body(StatusCode::UNPROCESSABLE_ENTITY, "Unknown action"),
    };

    let session_id = state.corrections[index].session_id.clone();
    let query = state.corrections[index].query.clone();
    {
        let correction = &mut state.corrections[index];
        correction.status = status.to_string();
        correction.corrected_response = corrected;
        correction.reviewed_by = Some("reviewer@campus.edu".to_string());
        correction.reviewed_at = Some(Utc::now());
    }

    let notification_id = state.next_notification_id();
    state.notifications.push(MockNotification {
        id: notification_id,
        session_id,
        title: title.to_string(),
        message: format!("A reviewer has reviewed the response to: '{}'", query),
        is_read: false,
        created_at: Utc::now(),
        correction_id: Some(id),
    });

    (StatusCode::OK, Json(json!({ "message": "Correction reviewed" })))
}

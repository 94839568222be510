use crate::message::{greeting, Message};
use crate::store::Store;
use anyhow::Result;
use tracing::warn;
use uuid::Uuid;

const SESSION_KEY: &str = "session_id";

fn history_key(session_id: &str) -> String {
    format!("history_{}", session_id)
}

/// Per-browser-profile session identity and chat log persistence.
///
/// Reads are total: any storage failure or corrupt persisted log degrades to
/// the synthesized greeting rather than surfacing an error, so the interface
/// always has a non-empty log to render.
#[derive(Clone, Debug)]
pub struct SessionStore {
    store: Store,
}

impl SessionStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Return the persisted session identifier, allocating and persisting a
    /// fresh one if none exists. Repeated calls without a reset return the
    /// same identifier.
    pub async fn get_or_create_session_id(&self) -> String {
        match self.store.get(SESSION_KEY).await {
            Ok(Some(id)) => return id,
            Ok(None) => {}
            Err(e) => warn!("Failed to read session id, allocating a new one: {:#}", e),
        }

        let id = new_session_id();
        if let Err(e) = self.store.put(SESSION_KEY, &id).await {
            // The id still addresses this run; only durability is lost.
            warn!("Failed to persist session id {}: {:#}", id, e);
        }
        id
    }

    /// Load the persisted chat log for `session_id`. Missing, empty, or
    /// unreadable logs come back as the single greeting message.
    pub async fn load_history(&self, session_id: &str) -> Vec<Message> {
        let raw = match self.store.get(&history_key(session_id)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return vec![greeting()],
            Err(e) => {
                warn!("Failed to read chat log for {}: {:#}", session_id, e);
                return vec![greeting()];
            }
        };

        match serde_json::from_str::<Vec<Message>>(&raw) {
            Ok(log) if !log.is_empty() => log,
            Ok(_) => vec![greeting()],
            Err(e) => {
                warn!("Discarding corrupt chat log for {}: {}", session_id, e);
                vec![greeting()]
            }
        }
    }

    /// Persist the full chat log. Best-effort: a failed write is logged and
    /// repaired by the next successful save.
    pub async fn save_history(&self, session_id: &str, log: &[Message]) {
        let raw = match serde_json::to_string(log) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize chat log for {}: {}", session_id, e);
                return;
            }
        };

        if let Err(e) = self.store.put(&history_key(session_id), &raw).await {
            warn!("Failed to persist chat log for {}: {:#}", session_id, e);
        }
    }

    /// Discard the current session identifier and its chat log. The next
    /// `get_or_create_session_id` allocates a fresh session. This is the only
    /// destructive operation on the store.
    pub async fn reset(&self) -> Result<()> {
        if let Some(id) = self.store.get(SESSION_KEY).await? {
            self.store.delete(&history_key(&id)).await?;
        }
        self.store.delete(SESSION_KEY).await?;
        Ok(())
    }
}

/// Unique with overwhelming probability: wall clock plus a random suffix.
fn new_session_id() -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(9).collect();
    format!(
        "session_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        suffix
    )
}

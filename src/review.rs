use crate::api::{ApiClient, ApiError, PendingCorrection};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Client-side view state of one pending correction. `Editing` is local only
/// and never persisted; the backend knows nothing until submit.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewState {
    Pending,
    Editing { draft: String },
    Approved,
    Rejected,
}

/// The one request shape all three console paths collapse into: approve
/// (optionally carrying replacement text from the editing path) or reject.
/// Approval without replacement text means the original response was
/// confirmed correct.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Approve { corrected_response: Option<String> },
    Reject,
}

impl Disposition {
    pub fn action(&self) -> &'static str {
        match self {
            Disposition::Approve { .. } => "approve",
            Disposition::Reject => "reject",
        }
    }

    pub fn corrected_response(&self) -> Option<&str> {
        match self {
            Disposition::Approve { corrected_response } => corrected_response.as_deref(),
            Disposition::Reject => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("no pending correction with id {0}")]
    UnknownCorrection(String),
    #[error("correction {0} is not in a state that allows this step")]
    InvalidState(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug)]
pub struct ReviewItem {
    pub correction: PendingCorrection,
    pub state: ReviewState,
}

/// Reviewer console over the backend's pending-correction queue.
///
/// The backend is the sole authority for correction state: after every
/// confirmed disposition the whole pending list is refetched rather than
/// patched locally. A failed disposition leaves the item's view state
/// untouched so the reviewer can retry or cancel.
pub struct ReviewConsole {
    api: Arc<ApiClient>,
    items: Vec<ReviewItem>,
}

impl ReviewConsole {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            items: Vec::new(),
        }
    }

    pub fn items(&self) -> &[ReviewItem] {
        &self.items
    }

    /// Replace the local list with the backend's pending queue. A 401
    /// discards the stored credential; the reviewer must sign in again.
    pub async fn refresh(&mut self) -> Result<(), ReviewError> {
        match self.api.pending_corrections().await {
            Ok(pending) => {
                self.items = pending
                    .into_iter()
                    .map(|correction| ReviewItem {
                        correction,
                        state: ReviewState::Pending,
                    })
                    .collect();
                Ok(())
            }
            Err(ApiError::Unauthorized) => {
                warn!("Reviewer credential rejected, discarding it");
                self.api.clear_token();
                Err(ApiError::Unauthorized.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn index_of(&self, correction_id: &str) -> Result<usize, ReviewError> {
        self.items
            .iter()
            .position(|item| item.correction.id == correction_id)
            .ok_or_else(|| ReviewError::UnknownCorrection(correction_id.to_string()))
    }

    /// `pending -> editing`, preloading the draft with the original response.
    /// Returns the draft text.
    pub fn begin_edit(&mut self, correction_id: &str) -> Result<&str, ReviewError> {
        let index = self.index_of(correction_id)?;
        let item = &mut self.items[index];
        if item.state != ReviewState::Pending {
            return Err(ReviewError::InvalidState(correction_id.to_string()));
        }
        item.state = ReviewState::Editing {
            draft: item.correction.bot_response.clone(),
        };
        match &item.state {
            ReviewState::Editing { draft } => Ok(draft),
            _ => unreachable!(),
        }
    }

    pub fn set_draft(&mut self, correction_id: &str, text: impl Into<String>) -> Result<(), ReviewError> {
        let index = self.index_of(correction_id)?;
        match &mut self.items[index].state {
            ReviewState::Editing { draft } => {
                *draft = text.into();
                Ok(())
            }
            _ => Err(ReviewError::InvalidState(correction_id.to_string())),
        }
    }

    /// `editing -> pending`: discard the draft. No backend call.
    pub fn cancel_edit(&mut self, correction_id: &str) -> Result<(), ReviewError> {
        let index = self.index_of(correction_id)?;
        let item = &mut self.items[index];
        match item.state {
            ReviewState::Editing { .. } => {
                item.state = ReviewState::Pending;
                Ok(())
            }
            _ => Err(ReviewError::InvalidState(correction_id.to_string())),
        }
    }

    /// `pending -> approved` with no replacement text: the original response
    /// is confirmed correct.
    pub async fn approve(&mut self, correction_id: &str) -> Result<(), ReviewError> {
        let index = self.index_of(correction_id)?;
        if self.items[index].state != ReviewState::Pending {
            return Err(ReviewError::InvalidState(correction_id.to_string()));
        }
        self.dispose(
            index,
            Disposition::Approve {
                corrected_response: None,
            },
        )
        .await
    }

    /// `editing -> approved`, submitting the draft as the corrected response.
    /// The draft is sent even when the reviewer left it equal to the
    /// original; presence of the field is the signal.
    pub async fn submit_edit(&mut self, correction_id: &str) -> Result<(), ReviewError> {
        let index = self.index_of(correction_id)?;
        let draft = match &self.items[index].state {
            ReviewState::Editing { draft } => draft.clone(),
            _ => return Err(ReviewError::InvalidState(correction_id.to_string())),
        };
        self.dispose(
            index,
            Disposition::Approve {
                corrected_response: Some(draft),
            },
        )
        .await
    }

    /// `pending -> rejected`.
    pub async fn reject(&mut self, correction_id: &str) -> Result<(), ReviewError> {
        let index = self.index_of(correction_id)?;
        if self.items[index].state != ReviewState::Pending {
            return Err(ReviewError::InvalidState(correction_id.to_string()));
        }
        self.dispose(index, Disposition::Reject).await
    }

    async fn dispose(&mut self, index: usize, disposition: Disposition) -> Result<(), ReviewError> {
        let correction_id = self.items[index].correction.id.clone();

        match self.api.review_correction(&correction_id, &disposition).await {
            Ok(()) => {
                info!(
                    "Correction {} disposed as {}",
                    correction_id,
                    disposition.action()
                );
                self.items[index].state = match disposition {
                    Disposition::Approve { .. } => ReviewState::Approved,
                    Disposition::Reject => ReviewState::Rejected,
                };
                // The backend owns the queue; refetch in full rather than
                // removing the item locally.
                self.refresh().await
            }
            Err(ApiError::Unauthorized) => {
                warn!("Reviewer credential rejected, discarding it");
                self.api.clear_token();
                Err(ApiError::Unauthorized.into())
            }
            // View state is left untouched (an editing draft survives) so
            // the reviewer can retry.
            Err(e) => Err(e.into()),
        }
    }
}

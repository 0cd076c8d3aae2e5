// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Review persistence
//!
//! The [`ReviewStore`] trait is the seam between the engine and storage. It
//! appends changesets to reviews and bumps the review version on every
//! mutation; the engine's caches key on that version. Two implementations are
//! provided: [`MemoryStore`] here and [`crate::db::SqliteStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::migrations::MigrationError;
use crate::models::{Changeset, Review};

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// No review with this id
    #[error("Review not found: {review_id}")]
    NotFound {
        /// Requested id
        review_id: String,
    },

    /// A changeset would break checkpoint ordering for its repository
    #[error(
        "Checkpoint {checkpoint} for repository {repo_id} must be greater than {previous}"
    )]
    CheckpointOrder {
        /// Repository id
        repo_id: String,
        /// Rejected checkpoint
        checkpoint: u32,
        /// Highest checkpoint already stored
        previous: u32,
    },

    /// A first changeset whose per-checkpoint files differ from its cumulative files
    #[error("Checkpoint 0 for repository {repo_id} must list the same files cumulatively and per checkpoint")]
    FirstCheckpointMismatch {
        /// Repository id
        repo_id: String,
    },

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    /// A stored document could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored timestamp could not be parsed
    #[error("Invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

/// One line of a review listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewSummary {
    /// Review id
    pub id: String,
    /// Title
    pub title: String,
    /// Current version
    pub version: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Number of changesets across all repositories
    pub changesets: usize,
}

impl From<&Review> for ReviewSummary {
    fn from(review: &Review) -> Self {
        Self {
            id: review.id.clone(),
            title: review.title.clone(),
            version: review.version,
            created_at: review.created_at,
            changesets: review.changesets.len(),
        }
    }
}

/// Persistence for reviews
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Load a review
    async fn get(&self, review_id: &str) -> Result<Option<Review>, StoreError>;

    /// Create a review at version 1
    async fn create(&self, title: &str, changesets: Vec<Changeset>) -> Result<Review, StoreError>;

    /// Append changesets and bump the version
    async fn append_changesets(
        &self,
        review_id: &str,
        changesets: Vec<Changeset>,
    ) -> Result<Review, StoreError>;

    /// Summaries of every review, oldest first
    async fn list(&self) -> Result<Vec<ReviewSummary>, StoreError>;
}

/// Check that `added` may follow `existing`: per repository, checkpoints
/// strictly increase and checkpoint 0 lists the same files both ways.
///
/// # Errors
///
/// Returns the first violation found.
pub fn validate_append(existing: &[Changeset], added: &[Changeset]) -> Result<(), StoreError> {
    let mut seen: HashMap<&str, u32> = HashMap::new();
    for changeset in existing {
        seen.entry(&changeset.repo_id)
            .and_modify(|c| *c = (*c).max(changeset.checkpoint))
            .or_insert(changeset.checkpoint);
    }

    for changeset in added {
        if let Some(&previous) = seen.get(changeset.repo_id.as_str())
            && changeset.checkpoint <= previous
        {
            return Err(StoreError::CheckpointOrder {
                repo_id: changeset.repo_id.clone(),
                checkpoint: changeset.checkpoint,
                previous,
            });
        }
        if changeset.checkpoint == 0
            && changeset.modified_files_in_checkpoint != changeset.modified_files
        {
            return Err(StoreError::FirstCheckpointMismatch {
                repo_id: changeset.repo_id.clone(),
            });
        }
        seen.insert(&changeset.repo_id, changeset.checkpoint);
    }
    Ok(())
}

/// New review id
#[must_use]
pub fn new_review_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// In-memory store, used by tests and short-lived sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    reviews: RwLock<HashMap<String, Review>>,
}

impl MemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn get(&self, review_id: &str) -> Result<Option<Review>, StoreError> {
        Ok(self.reviews.read().await.get(review_id).cloned())
    }

    async fn create(&self, title: &str, changesets: Vec<Changeset>) -> Result<Review, StoreError> {
        validate_append(&[], &changesets)?;
        let review = Review {
            id: new_review_id(),
            title: title.to_string(),
            version: 1,
            created_at: Utc::now(),
            changesets,
        };
        self.reviews
            .write()
            .await
            .insert(review.id.clone(), review.clone());
        info!(review_id = %review.id, "created review");
        Ok(review)
    }

    async fn append_changesets(
        &self,
        review_id: &str,
        changesets: Vec<Changeset>,
    ) -> Result<Review, StoreError> {
        let mut reviews = self.reviews.write().await;
        let review = reviews
            .get_mut(review_id)
            .ok_or_else(|| StoreError::NotFound {
                review_id: review_id.to_string(),
            })?;
        validate_append(&review.changesets, &changesets)?;
        review.changesets.extend(changesets);
        review.version += 1;
        info!(review_id, version = review.version, "amended review");
        Ok(review.clone())
    }

    async fn list(&self) -> Result<Vec<ReviewSummary>, StoreError> {
        let reviews = self.reviews.read().await;
        let mut summaries: Vec<ReviewSummary> = reviews.values().map(ReviewSummary::from).collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(summaries)
    }
}

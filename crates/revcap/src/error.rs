// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Error types for the review engine

use revcap_git::commit::short_sha;
use revcap_git::{GitError, PatchError};
use serde::Serialize;
use thiserror::Error;

use crate::codec::CodecError;
use crate::store::StoreError;

/// Errors raised while building or reading a review
#[derive(Debug, Error)]
pub enum ReviewError {
    // ------------------------------------------------------------------------
    // Preconditions, reported to the user verbatim
    // ------------------------------------------------------------------------
    /// The repository could not be inspected at all
    #[error("No source control information was found for this repository")]
    ScmNotFound,

    /// The repository has no remotes
    #[error("The repository has no remotes. Add a remote so that others can see these changes.")]
    NoRemotes,

    /// The repository is not registered or no id could be determined
    #[error("Repository {repo_id} was not found. Open it in the workspace and try again.")]
    RepoNotFound {
        /// Id that could not be resolved (empty if none was known)
        repo_id: String,
    },

    /// HEAD is detached
    #[error("No branch is checked out. Check out a branch and try again.")]
    BranchNotFound,

    /// The repository history could not be read
    #[error("No commits were found in the repository")]
    CommitsNotFound,

    /// A base commit is missing even after fetching
    #[error(
        "A commit required to perform this review ({}, authored by {author}) was not found in the local git repository. Fetch all remotes and try again.",
        short_sha(sha)
    )]
    CommitNotFound {
        /// Full sha of the missing commit
        sha: String,
        /// Author recorded for it
        author: String,
    },

    /// No review with this id exists
    #[error("Review {review_id} was not found")]
    ReviewNotFound {
        /// Requested review id
        review_id: String,
    },

    // ------------------------------------------------------------------------
    // Internal: data integrity and collaborator failures
    // ------------------------------------------------------------------------
    /// HEAD could not be resolved while building a changeset
    #[error("Could not determine the latest commit of the repository")]
    HeadNotFound,

    /// An amended review has no checkpoint-0 changeset for the repository
    #[error("Review {review_id} has no first changeset for repository {repo_id}")]
    FirstChangesetNotFound {
        /// Review being amended
        review_id: String,
        /// Repository being captured
        repo_id: String,
    },

    /// A path known to the review has no changeset at the requested checkpoint
    #[error("No changeset for {path} in repository {repo_id} at checkpoint {checkpoint}")]
    ChangesetNotFound {
        /// Repository id
        repo_id: String,
        /// Requested checkpoint
        checkpoint: u32,
        /// Requested path
        path: String,
    },

    /// A changeset has a diff for a path but no modified-file entry
    #[error("No file information for {path} in repository {repo_id}")]
    FileInfoNotFound {
        /// Repository id
        repo_id: String,
        /// Path without an entry
        path: String,
    },

    /// git failed
    #[error(transparent)]
    Git(#[from] GitError),

    /// A stored diff no longer applies to its base
    #[error("Stored diff does not apply: {0}")]
    Patch(#[from] PatchError),

    /// A stored diff blob is corrupt
    #[error("Stored diff is corrupt: {0}")]
    Codec(#[from] CodecError),

    /// The entity store failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReviewError {
    /// Stable tag identifying the kind of failure
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::ScmNotFound => "SCM_NOT_FOUND",
            Self::NoRemotes => "NO_REMOTES",
            Self::RepoNotFound { .. } => "REPO_NOT_FOUND",
            Self::BranchNotFound => "BRANCH_NOT_FOUND",
            Self::CommitsNotFound => "COMMITS_NOT_FOUND",
            Self::CommitNotFound { .. } => "COMMIT_NOT_FOUND",
            Self::ReviewNotFound { .. } => "REVIEW_NOT_FOUND",
            _ => "INTERNAL",
        }
    }

    /// Whether the error is a user-facing precondition rather than a fault
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        self.error_type() != "INTERNAL"
    }

    pub(crate) fn repo_not_found(repo_id: impl Into<String>) -> Self {
        Self::RepoNotFound {
            repo_id: repo_id.into(),
        }
    }
}

/// Serializable form of a [`ReviewError`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResult {
    /// Stable tag, see [`ReviewError::error_type`]
    #[serde(rename = "type")]
    pub error_type: String,
    /// Human-readable message
    pub message: String,
}

impl From<&ReviewError> for ErrorResult {
    fn from(err: &ReviewError) -> Self {
        Self {
            error_type: err.error_type().to_string(),
            message: err.to_string(),
        }
    }
}

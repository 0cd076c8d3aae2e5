// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Review data model
//!
//! A [`Review`] owns an ordered list of [`Changeset`]s. Each changeset is one
//! checkpoint of one repository and carries its diffs in compressed form.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use revcap_git::{Commit, ModifiedFile};
use serde::{Deserialize, Serialize};

use crate::codec::DiffBlob;

// ============================================================================
// Capture input
// ============================================================================

/// A commit as recorded in a changeset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewCommit {
    /// Commit sha
    pub sha: String,
    /// Commit details, when they were available at capture time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Commit>,
    /// The commit has not been pushed to the upstream branch
    pub local_only: bool,
}

/// The state of one repository at capture time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoStatus {
    /// Stable repository id; `None` if the repository is not registered
    pub repo_id: Option<String>,
    /// Working-copy root
    pub repo_path: PathBuf,
    /// Checked-out branch; `None` when HEAD is detached
    pub branch: Option<String>,
    /// Configured remote names
    pub remotes: Vec<String>,
    /// Recent commits, newest first; `None` if history could not be read
    pub commits: Option<Vec<ReviewCommit>>,
    /// Files changed since the capture's start commit
    pub modified_files: Vec<ModifiedFile>,
}

/// Everything needed to capture one repository into a changeset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoChange {
    /// Repository status; `None` if the repository could not be inspected
    pub scm: Option<RepoStatus>,
    /// First commit that is not under review; commits after it are reviewed
    pub start_commit: Option<String>,
    /// Include unstaged edits
    pub include_saved: bool,
    /// Include staged changes
    pub include_staged: bool,
    /// Paths to leave out of every diff
    pub excluded_files: Vec<String>,
    /// Untracked paths to capture as new files
    pub new_files: Vec<String>,
}

// ============================================================================
// Stored entities
// ============================================================================

/// The compressed diff sets of one changeset plus the shas they are relative to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesetDiffs {
    /// Author of the left base commit
    pub left_base_author: String,
    /// Commit the left side is reconstructed from
    pub left_base_sha: String,
    /// Left base to left content
    pub left_diffs: DiffBlob,
    /// Author of the right base commit
    pub right_base_author: String,
    /// Commit the right side is reconstructed from
    pub right_base_sha: String,
    /// Right base to captured content
    pub right_diffs: DiffBlob,
    /// Captured content back to right base
    pub right_reverse_diffs: DiffBlob,
    /// HEAD at capture time
    pub latest_commit_sha: String,
    /// Captured content back to HEAD
    pub right_to_latest_commit_diffs: DiffBlob,
    /// HEAD to captured content
    pub latest_commit_to_right_diffs: DiffBlob,
}

/// One checkpoint of one repository within a review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ChangesetRecord")]
pub struct Changeset {
    /// Repository id
    pub repo_id: String,
    /// Branch at capture time
    pub branch: String,
    /// Commits under review in this checkpoint, newest first
    pub commits: Vec<ReviewCommit>,
    /// Files changed across the review so far
    pub modified_files: Vec<ModifiedFile>,
    /// Files changed in this checkpoint alone
    pub modified_files_in_checkpoint: Vec<ModifiedFile>,
    /// Unstaged edits were captured
    pub include_saved: bool,
    /// Staged changes were captured
    pub include_staged: bool,
    /// Zero-based checkpoint number
    pub checkpoint: u32,
    /// Compressed diffs
    pub diffs: ChangesetDiffs,
}

impl Changeset {
    /// Per-checkpoint entry for `path`, falling back to the cumulative list
    #[must_use]
    pub fn file_info(&self, path: &str) -> Option<&ModifiedFile> {
        self.modified_files_in_checkpoint
            .iter()
            .find(|f| f.file == path)
            .or_else(|| self.modified_files.iter().find(|f| f.file == path))
    }

    /// Whether `path` changed in this checkpoint
    #[must_use]
    pub fn changed_in_checkpoint(&self, path: &str) -> bool {
        self.modified_files_in_checkpoint.iter().any(|f| f.file == path)
    }
}

/// Stored form of [`Changeset`], tolerant of records written before
/// checkpoints existed
#[derive(Deserialize)]
struct ChangesetRecord {
    repo_id: String,
    branch: String,
    #[serde(default)]
    commits: Vec<ReviewCommit>,
    #[serde(default)]
    modified_files: Vec<ModifiedFile>,
    #[serde(default)]
    modified_files_in_checkpoint: Option<Vec<ModifiedFile>>,
    #[serde(default)]
    include_saved: bool,
    #[serde(default)]
    include_staged: bool,
    #[serde(default)]
    checkpoint: Option<u32>,
    diffs: ChangesetDiffs,
}

impl From<ChangesetRecord> for Changeset {
    fn from(record: ChangesetRecord) -> Self {
        Self {
            modified_files_in_checkpoint: record
                .modified_files_in_checkpoint
                .unwrap_or_else(|| record.modified_files.clone()),
            checkpoint: record.checkpoint.unwrap_or(0),
            repo_id: record.repo_id,
            branch: record.branch,
            commits: record.commits,
            modified_files: record.modified_files,
            include_saved: record.include_saved,
            include_staged: record.include_staged,
            diffs: record.diffs,
        }
    }
}

/// A code review: an ordered list of changesets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// Review id
    pub id: String,
    /// Human-readable title
    pub title: String,
    /// Bumped on every change; caches key on it
    pub version: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Changesets in creation order
    pub changesets: Vec<Changeset>,
}

impl Review {
    /// Changesets of one repository in creation order
    pub fn changesets_for_repo<'a>(
        &'a self,
        repo_id: &'a str,
    ) -> impl DoubleEndedIterator<Item = &'a Changeset> + 'a {
        self.changesets.iter().filter(move |c| c.repo_id == repo_id)
    }

    /// The checkpoint an amendment would create: one past the highest
    /// checkpoint of any repository
    #[must_use]
    pub fn next_checkpoint(&self) -> u32 {
        self.changesets
            .iter()
            .map(|c| c.checkpoint + 1)
            .max()
            .unwrap_or(0)
    }

    /// Distinct repository ids in first-seen order
    #[must_use]
    pub fn repo_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for changeset in &self.changesets {
            if !ids.contains(&changeset.repo_id.as_str()) {
                ids.push(&changeset.repo_id);
            }
        }
        ids
    }

    /// Whether any changeset (of any checkpoint) lists `path` as changed in
    /// its own checkpoint
    #[must_use]
    pub fn includes_file(&self, repo_id: &str, path: &str) -> bool {
        self.changesets_for_repo(repo_id)
            .any(|c| c.changed_in_checkpoint(path))
    }
}

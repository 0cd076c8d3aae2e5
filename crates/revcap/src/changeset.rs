// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Changeset builder
//!
//! Turns a [`RepoChange`] into one checkpoint of a review. The builder picks
//! the commits the diffs are relative to, computes the five diff sets
//! concurrently, trims them to the files under review and compresses them.
//!
//! Base selection for a first capture, in order of preference:
//!
//! 1. the nearest first-parent ancestor of the oldest reviewed commit that was
//!    authored by someone other than the current user
//! 2. the newest commit that is not under review
//! 3. the parent of the oldest reviewed commit
//! 4. the empty tree, when the whole history is under review
//!
//! Amendments reuse the bases of the repository's first changeset so every
//! checkpoint of a review is relative to the same commit.

use std::path::Path;

use futures::future::join_all;
use revcap_git::{
    Commit, EMPTY_TREE_AUTHOR, EMPTY_TREE_SHA, FileStatus, GitError, GitService, ModifiedFile,
    ParsedDiff, WorkingTreeDiff, parse_patch,
};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::codec::DiffBlob;
use crate::error::ReviewError;
use crate::models::{Changeset, ChangesetDiffs, RepoChange, Review, ReviewCommit};

/// How many first-parent ancestors are searched for another author's commit
pub const ANCESTOR_SEARCH_LIMIT: usize = 100;

/// Default cap on concurrent new-file diff syntheses
pub const DEFAULT_NEW_FILE_CONCURRENCY: usize = 8;

// ============================================================================
// Build modes
// ============================================================================

/// What an amendment needs to know about the review it extends
#[derive(Debug, Clone)]
pub struct Amendment {
    /// Review being amended
    pub review_id: String,
    /// Checkpoint the new changeset gets
    pub checkpoint: u32,
    /// This repository's existing changesets in creation order
    pub prior_changesets: Vec<Changeset>,
}

impl Amendment {
    /// Amend `review` with a new changeset for `repo_id`
    #[must_use]
    pub fn new(review: &Review, repo_id: &str) -> Self {
        Self {
            review_id: review.id.clone(),
            checkpoint: review.next_checkpoint(),
            prior_changesets: review.changesets_for_repo(repo_id).cloned().collect(),
        }
    }

    fn first_changeset(&self) -> Option<&Changeset> {
        self.prior_changesets.iter().find(|c| c.checkpoint == 0)
    }
}

/// Whether a changeset starts a review or extends one
#[derive(Debug, Clone)]
pub enum BuildMode {
    /// Checkpoint 0 of a new review
    FirstCapture,
    /// A later checkpoint of an existing review
    Amendment(Amendment),
}

impl BuildMode {
    /// Amendment mode for `repo_id` in `review`
    #[must_use]
    pub fn amending(review: &Review, repo_id: &str) -> Self {
        Self::Amendment(Amendment::new(review, repo_id))
    }
}

/// Commits a changeset's diffs are relative to
#[derive(Debug, Clone, PartialEq, Eq)]
struct Bases {
    left_sha: String,
    left_author: String,
    left_content_sha: String,
    right_sha: String,
    right_author: String,
}

// ============================================================================
// Builder
// ============================================================================

/// Builds [`Changeset`]s
#[derive(Debug, Clone)]
pub struct ChangesetBuilder {
    git: GitService,
    new_file_concurrency: usize,
    ancestor_limit: usize,
}

impl ChangesetBuilder {
    /// Builder over `git`
    #[must_use]
    pub fn new(git: GitService) -> Self {
        Self {
            git,
            new_file_concurrency: DEFAULT_NEW_FILE_CONCURRENCY,
            ancestor_limit: ANCESTOR_SEARCH_LIMIT,
        }
    }

    /// Cap concurrent new-file diff syntheses
    #[must_use]
    pub fn with_new_file_concurrency(mut self, limit: usize) -> Self {
        self.new_file_concurrency = limit.max(1);
        self
    }

    /// Build one changeset.
    ///
    /// Commits newer than `change.start_commit` are under review. Without a
    /// start commit nothing committed is under review; a start commit that is
    /// not among the listed commits (such as the empty tree) puts every listed
    /// commit under review.
    ///
    /// # Errors
    ///
    /// Returns a precondition error if the repository has no status, remotes,
    /// id, branch or commits, [`ReviewError::FirstChangesetNotFound`] when
    /// amending a review without a checkpoint 0 for this repository, and
    /// propagates git and encoding failures.
    pub async fn build(
        &self,
        change: RepoChange,
        mode: &BuildMode,
    ) -> Result<Changeset, ReviewError> {
        let RepoChange {
            scm,
            start_commit,
            include_saved,
            include_staged,
            excluded_files,
            mut new_files,
        } = change;

        let scm = scm.ok_or(ReviewError::ScmNotFound)?;
        if scm.remotes.is_empty() {
            return Err(ReviewError::NoRemotes);
        }
        let repo_id = scm
            .repo_id
            .clone()
            .ok_or_else(|| ReviewError::repo_not_found(scm.repo_path.display().to_string()))?;
        let branch = scm.branch.clone().ok_or(ReviewError::BranchNotFound)?;
        let all_commits = scm
            .commits
            .clone()
            .filter(|c| !c.is_empty())
            .ok_or(ReviewError::CommitsNotFound)?;
        let repo = scm.repo_path.as_path();

        let is_excluded = |path: &str| excluded_files.iter().any(|e| e == path);
        new_files.retain(|f| !is_excluded(f.as_str()));
        let modified_files_in_checkpoint: Vec<ModifiedFile> = scm
            .modified_files
            .iter()
            .filter(|f| !is_excluded(f.file.as_str()))
            .cloned()
            .collect();

        // Checkpoint and cumulative file accounting
        let (checkpoint, modified_files, start_commit, first) = match mode {
            BuildMode::FirstCapture => (
                0,
                modified_files_in_checkpoint.clone(),
                start_commit,
                None,
            ),
            BuildMode::Amendment(amendment) => {
                let first = amendment.first_changeset().ok_or_else(|| {
                    ReviewError::FirstChangesetNotFound {
                        review_id: amendment.review_id.clone(),
                        repo_id: repo_id.clone(),
                    }
                })?;
                let start = self.review_start(repo, first).await?;
                debug!(review_id = %amendment.review_id, %start, "amending from review start");
                let mut files: Vec<ModifiedFile> = self
                    .git
                    .modified_files(repo, &start, include_saved, include_staged)
                    .await?
                    .into_iter()
                    .filter(|f| !is_excluded(f.file.as_str()))
                    .collect();
                replay_prior_files(
                    &mut files,
                    &modified_files_in_checkpoint,
                    &amendment.prior_changesets,
                    &mut new_files,
                );
                (amendment.checkpoint, files, Some(start), Some(first))
            }
        };

        let commits: Vec<ReviewCommit> = match start_commit.as_deref() {
            None => Vec::new(),
            Some(start) => match all_commits.iter().position(|c| c.sha == start) {
                Some(index) => all_commits[..index].to_vec(),
                None => all_commits.clone(),
            },
        };

        let latest = self
            .git
            .head_sha(repo)
            .await?
            .ok_or(ReviewError::HeadNotFound)?;

        let bases = match first {
            Some(first) => self.amendment_bases(repo, first, &commits, &latest).await?,
            None => {
                self.first_capture_bases(repo, &all_commits, &commits, &latest)
                    .await?
            }
        };
        debug!(
            left_base = %bases.left_sha,
            left_content = %bases.left_content_sha,
            right_base = %bases.right_sha,
            %latest,
            "selected bases"
        );

        // Diff sets
        let working = WorkingTreeDiff::new(include_saved, include_staged);
        let bridged = include_saved || include_staged;
        let (left, right, right_reverse, right_to_latest, latest_to_right, (added, removed)) = tokio::try_join!(
            async {
                if bases.left_sha == bases.left_content_sha {
                    Ok(Vec::new())
                } else {
                    self.git
                        .ref_diffs(repo, &bases.left_sha, &bases.left_content_sha)
                        .await
                }
            },
            self.git.working_tree_diffs(repo, &bases.right_sha, working),
            self.git
                .working_tree_diffs(repo, &bases.right_sha, working.reversed()),
            self.git.working_tree_diffs(repo, &latest, working.reversed()),
            async {
                if bridged {
                    self.git.working_tree_diffs(repo, &latest, working).await
                } else {
                    Ok(Vec::new())
                }
            },
            async { Ok::<_, GitError>(self.new_file_diffs(repo, &new_files).await) },
        )?;

        let in_scope = |diffs: Vec<ParsedDiff>, extra: &[ParsedDiff]| {
            let mut diffs: Vec<ParsedDiff> = diffs
                .into_iter()
                .filter(|d| {
                    !is_excluded(d.new_file_name.as_str()) && !is_excluded(d.old_file_name.as_str())
                })
                .collect();
            diffs.extend_from_slice(extra);
            diffs.retain(|d| touches_any(&modified_files, d));
            diffs
        };
        let left = in_scope(left, &[]);
        let right = in_scope(right, &added);
        let right_reverse = in_scope(right_reverse, &removed);
        let right_to_latest = in_scope(right_to_latest, &removed);
        let latest_to_right = in_scope(latest_to_right, &added);

        info!(
            repo_id = %repo_id,
            checkpoint,
            files = modified_files.len(),
            commits = commits.len(),
            "built changeset"
        );

        Ok(Changeset {
            repo_id,
            branch,
            commits,
            modified_files,
            modified_files_in_checkpoint,
            include_saved,
            include_staged,
            checkpoint,
            diffs: ChangesetDiffs {
                left_base_author: bases.left_author,
                left_base_sha: bases.left_sha,
                left_diffs: DiffBlob::encode(&left)?,
                right_base_author: bases.right_author,
                right_base_sha: bases.right_sha,
                right_diffs: DiffBlob::encode(&right)?,
                right_reverse_diffs: DiffBlob::encode(&right_reverse)?,
                latest_commit_sha: latest,
                right_to_latest_commit_diffs: DiffBlob::encode(&right_to_latest)?,
                latest_commit_to_right_diffs: DiffBlob::encode(&latest_to_right)?,
            },
        })
    }

    /// The commit the review started from: the parent of its oldest commit,
    /// or HEAD at the first capture when no commits were reviewed
    async fn review_start(&self, repo: &Path, first: &Changeset) -> Result<String, GitError> {
        match first.commits.last() {
            Some(oldest) => Ok(self
                .git
                .parent_shas(repo, &oldest.sha)
                .await?
                .into_iter()
                .next()
                .unwrap_or_else(|| EMPTY_TREE_SHA.to_string())),
            None => Ok(first.diffs.latest_commit_sha.clone()),
        }
    }

    /// Bases of a later checkpoint: the first changeset's, with left content
    /// read at the parent of the oldest reviewed commit, or at HEAD when no
    /// commits are reviewed
    async fn amendment_bases(
        &self,
        repo: &Path,
        first: &Changeset,
        commits: &[ReviewCommit],
        latest: &str,
    ) -> Result<Bases, GitError> {
        let left_content_sha = match commits.last() {
            Some(oldest) => self
                .git
                .parent_shas(repo, &oldest.sha)
                .await?
                .into_iter()
                .next()
                .unwrap_or_else(|| EMPTY_TREE_SHA.to_string()),
            None => latest.to_string(),
        };
        Ok(Bases {
            left_sha: first.diffs.left_base_sha.clone(),
            left_author: first.diffs.left_base_author.clone(),
            left_content_sha,
            right_sha: first.diffs.right_base_sha.clone(),
            right_author: first.diffs.right_base_author.clone(),
        })
    }

    async fn first_capture_bases(
        &self,
        repo: &Path,
        all_commits: &[ReviewCommit],
        commits: &[ReviewCommit],
        latest: &str,
    ) -> Result<Bases, GitError> {
        let oldest = commits.last();
        let newest_not_in_review = all_commits.get(commits.len());

        let user_email = self.git.config(repo, "user.email").await?;
        let search_start = oldest.map_or("HEAD", |c| c.sha.as_str());
        let other_author = self
            .git
            .find_ancestor(repo, search_start, self.ancestor_limit, |c| {
                user_email.as_deref() != Some(c.author_email.as_str())
            })
            .await?;

        let parent: Option<Commit> = match (newest_not_in_review, oldest) {
            (None, Some(oldest)) => {
                self.git
                    .find_ancestor(repo, &oldest.sha, 1, |_| true)
                    .await?
            }
            _ => None,
        };

        let (left_sha, left_author) = if let Some(ancestor) = other_author {
            (ancestor.sha, ancestor.author)
        } else if let Some(commit) = newest_not_in_review {
            (commit.sha.clone(), self.author_of(repo, commit).await?)
        } else if oldest.is_some() {
            match &parent {
                Some(p) => (p.sha.clone(), p.author.clone()),
                None => (EMPTY_TREE_SHA.to_string(), EMPTY_TREE_AUTHOR.to_string()),
            }
        } else {
            (latest.to_string(), self.commit_author(repo, latest).await?)
        };

        let left_content_sha = if let Some(commit) = newest_not_in_review {
            commit.sha.clone()
        } else if oldest.is_some() {
            parent.map_or_else(|| EMPTY_TREE_SHA.to_string(), |p| p.sha)
        } else {
            latest.to_string()
        };

        Ok(Bases {
            right_sha: left_sha.clone(),
            right_author: left_author.clone(),
            left_sha,
            left_author,
            left_content_sha,
        })
    }

    async fn author_of(&self, repo: &Path, commit: &ReviewCommit) -> Result<String, GitError> {
        match &commit.info {
            Some(info) => Ok(info.author.clone()),
            None => self.commit_author(repo, &commit.sha).await,
        }
    }

    async fn commit_author(&self, repo: &Path, sha: &str) -> Result<String, GitError> {
        if sha == EMPTY_TREE_SHA {
            return Ok(EMPTY_TREE_AUTHOR.to_string());
        }
        Ok(self
            .git
            .get_commit(repo, sha)
            .await?
            .map(|c| c.author)
            .unwrap_or_default())
    }

    /// Forward and reverse diffs for untracked files, with bounded
    /// concurrency. Files that cannot be read are skipped.
    async fn new_file_diffs(
        &self,
        repo: &Path,
        files: &[String],
    ) -> (Vec<ParsedDiff>, Vec<ParsedDiff>) {
        let semaphore = Semaphore::new(self.new_file_concurrency);
        let tasks = files.iter().map(|file| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                match tokio::try_join!(
                    self.git.diff_new_file(repo, file, false),
                    self.git.diff_new_file(repo, file, true),
                ) {
                    Ok((forward, reverse)) => Some((first_diff(&forward)?, first_diff(&reverse)?)),
                    Err(err) => {
                        warn!(file = %file, "skipping new file: {err}");
                        None
                    }
                }
            }
        });
        join_all(tasks).await.into_iter().flatten().unzip()
    }
}

fn first_diff(text: &str) -> Option<ParsedDiff> {
    parse_patch(text).into_iter().next()
}

fn touches_any(files: &[ModifiedFile], diff: &ParsedDiff) -> bool {
    files
        .iter()
        .any(|f| f.touches(&diff.new_file_name) || f.touches(&diff.old_file_name))
}

/// Add files from earlier checkpoints to the cumulative list.
///
/// `current` (the status since the review started) is authoritative. Earlier
/// files are added newest checkpoint first unless already present (on either
/// side of a rename) or unless
/// the most recent mention of the path, counting the checkpoint being built,
/// is a deletion. Earlier untracked files that the status still reports as
/// untracked are queued for new-file diffs.
fn replay_prior_files(
    current: &mut Vec<ModifiedFile>,
    in_checkpoint: &[ModifiedFile],
    prior: &[Changeset],
    new_files: &mut Vec<String>,
) {
    let latest_status = |path: &str| {
        in_checkpoint
            .iter()
            .find(|f| f.file == path)
            .map(|f| f.status)
            .or_else(|| {
                prior.iter().rev().find_map(|c| {
                    c.modified_files_in_checkpoint
                        .iter()
                        .find(|f| f.file == path)
                        .map(|f| f.status)
                })
            })
    };

    for changeset in prior.iter().rev() {
        for file in &changeset.modified_files {
            if file.status == FileStatus::Untracked
                && !new_files.contains(&file.file)
                && current
                    .iter()
                    .any(|f| f.file == file.file && f.status == FileStatus::Untracked)
            {
                new_files.push(file.file.clone());
            }
            if current.iter().any(|f| f.touches(&file.file)) {
                continue;
            }
            if latest_status(&file.file) == Some(FileStatus::Deleted) {
                continue;
            }
            current.push(file.clone());
        }
    }
}

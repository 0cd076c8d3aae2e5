// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Repository status reader
//!
//! Gathers what the changeset builder needs to know about a working copy:
//! its id, branch, remotes, recent commits and the files changed since the
//! commit a review starts from.

use std::path::Path;

use revcap_git::{EMPTY_TREE_SHA, FileStatus, GitError, GitService, ModifiedFile};
use tracing::debug;

use crate::models::{RepoChange, RepoStatus, ReviewCommit};
use crate::repos::RepoRegistry;

/// How many recent commits a status lists
pub const DEFAULT_COMMIT_LIMIT: usize = 50;

/// Builds [`RepoStatus`] values from git
#[derive(Debug, Clone)]
pub struct ScmReader {
    git: GitService,
    registry: RepoRegistry,
    commit_limit: usize,
}

impl ScmReader {
    /// Reader over `git`, registering repositories in `registry`
    #[must_use]
    pub fn new(git: GitService, registry: RepoRegistry) -> Self {
        Self {
            git,
            registry,
            commit_limit: DEFAULT_COMMIT_LIMIT,
        }
    }

    /// Status of the repository containing `path`.
    ///
    /// Files are compared against `start_commit` (the newest commit *not*
    /// under review), or HEAD when none is given. Returns `None` when `path`
    /// is not inside a repository.
    ///
    /// # Errors
    ///
    /// Returns an error if git fails for a reason other than missing data.
    pub async fn status(
        &self,
        path: &Path,
        start_commit: Option<&str>,
        include_saved: bool,
        include_staged: bool,
    ) -> Result<Option<RepoStatus>, GitError> {
        let Some(root) = self.git.toplevel(path).await? else {
            debug!(path = %path.display(), "not a git repository");
            return Ok(None);
        };

        let (repo_id, branch, remotes, log, local_only, head) = tokio::try_join!(
            self.registry.register_path(&self.git, &root),
            self.git.current_branch(&root),
            self.git.remotes(&root),
            self.git.log(&root, "HEAD", self.commit_limit),
            self.git.local_only_shas(&root),
            self.git.head_sha(&root),
        )?;

        let commits: Vec<ReviewCommit> = log
            .into_iter()
            .map(|commit| ReviewCommit {
                local_only: local_only
                    .as_ref()
                    .is_none_or(|shas| shas.contains(&commit.sha)),
                sha: commit.sha.clone(),
                info: Some(commit),
            })
            .collect();

        let base = match (start_commit, &head) {
            (Some(start), _) => start,
            (None, Some(_)) => "HEAD",
            (None, None) => EMPTY_TREE_SHA,
        };
        let modified_files = self
            .git
            .modified_files(&root, base, include_saved, include_staged)
            .await?;

        Ok(Some(RepoStatus {
            repo_id,
            repo_path: root,
            branch,
            remotes,
            commits: (!commits.is_empty()).then_some(commits),
            modified_files,
        }))
    }

    /// A capture request for the repository containing `path`.
    ///
    /// Untracked files in the status become the request's new files.
    ///
    /// # Errors
    ///
    /// See [`Self::status`].
    pub async fn repo_change(
        &self,
        path: &Path,
        start_commit: Option<&str>,
        include_saved: bool,
        include_staged: bool,
        excluded_files: Vec<String>,
    ) -> Result<RepoChange, GitError> {
        let scm = self
            .status(path, start_commit, include_saved, include_staged)
            .await?;
        let new_files = scm
            .as_ref()
            .map(|s| untracked_paths(&s.modified_files, &excluded_files))
            .unwrap_or_default();
        Ok(RepoChange {
            scm,
            start_commit: start_commit.map(str::to_string),
            include_saved,
            include_staged,
            excluded_files,
            new_files,
        })
    }
}

/// Paths of untracked files that are not excluded
#[must_use]
pub fn untracked_paths(files: &[ModifiedFile], excluded: &[String]) -> Vec<String> {
    files
        .iter()
        .filter(|f| f.status == FileStatus::Untracked && !excluded.contains(&f.file))
        .map(|f| f.file.clone())
        .collect()
}

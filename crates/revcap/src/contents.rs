// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Content reconstructor
//!
//! Rebuilds the left and right text of a file as a reviewer saw it at a
//! checkpoint. Base content comes from git; the stored patches are applied on
//! top. Stored diffs are never modified.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use revcap_git::{
    GitError, GitService, ModifiedFile, NO_FILE, ParsedDiff, apply_patch, normalize_contents,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{Clock, DEFAULT_TTL, SystemClock, TimedCache};
use crate::codec::CodecError;
use crate::error::ReviewError;
use crate::models::{Changeset, ChangesetDiffs, Review};
use crate::repos::RepoRegistry;
use crate::store::ReviewStore;

// ============================================================================
// Types
// ============================================================================

/// Left and right text of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContents {
    /// Working-copy root of the repository
    pub repo_root: PathBuf,
    /// Before
    pub left: String,
    /// After
    pub right: String,
    /// Path the left side was read from
    pub left_path: String,
    /// Path the right side was read from
    pub right_path: String,
}

/// Result of a single-file lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContentsOutcome {
    /// The file is part of the review
    Found(FileContents),
    /// No checkpoint of the review touches the file
    FileNotIncludedInReview,
}

impl ContentsOutcome {
    /// The contents, if the file was found
    #[must_use]
    pub fn found(self) -> Option<FileContents> {
        match self {
            Self::Found(contents) => Some(contents),
            Self::FileNotIncludedInReview => None,
        }
    }
}

/// Every file of one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoContents {
    /// Repository id
    pub repo_id: String,
    /// Files in the order the changeset lists them
    pub files: Vec<FileContents>,
}

/// Which working-copy state forms the right side of a local comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RightVersion {
    /// Last committed revision of the file
    Head,
    /// Blob in the index
    Staged,
    /// File on disk
    Saved,
}

/// A comparison of the working copy against a base commit
#[derive(Debug, Clone)]
pub struct LocalContentsRequest {
    /// Repository id
    pub repo_id: String,
    /// Current path
    pub path: String,
    /// Path at the base commit, if the file was renamed
    pub old_path: Option<String>,
    /// Commit the left side is read from
    pub base_sha: String,
    /// Right side state
    pub right: RightVersion,
    /// Review being edited; its latest right content becomes the left side
    pub editing_review_id: Option<String>,
}

/// Left and right text of a local comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalContents {
    /// Working-copy root of the repository
    pub repo_root: PathBuf,
    /// Before
    pub left: String,
    /// After
    pub right: String,
}

/// The five diff sets of a changeset, decompressed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedDiffs {
    /// Left base to left content
    pub left: Vec<ParsedDiff>,
    /// Right base to right content
    pub right: Vec<ParsedDiff>,
    /// Right content to right base
    pub right_reverse: Vec<ParsedDiff>,
    /// Right content to the latest commit
    pub right_to_latest: Vec<ParsedDiff>,
    /// Latest commit to right content
    pub latest_to_right: Vec<ParsedDiff>,
}

impl DecodedDiffs {
    /// Decompress every diff set of `diffs`
    ///
    /// # Errors
    ///
    /// Returns an error if any blob is corrupt.
    pub fn decode(diffs: &ChangesetDiffs) -> Result<Self, CodecError> {
        Ok(Self {
            left: diffs.left_diffs.decode()?,
            right: diffs.right_diffs.decode()?,
            right_reverse: diffs.right_reverse_diffs.decode()?,
            right_to_latest: diffs.right_to_latest_commit_diffs.decode()?,
            latest_to_right: diffs.latest_commit_to_right_diffs.decode()?,
        })
    }
}

/// Cache key: review, repository and checkpoint
type DiffKey = (String, String, u32);

// ============================================================================
// Reconstructor
// ============================================================================

/// Reconstructs file contents from stored changesets
pub struct ContentReconstructor {
    git: GitService,
    registry: RepoRegistry,
    store: Arc<dyn ReviewStore>,
    diffs: TimedCache<DiffKey, Arc<DecodedDiffs>>,
}

impl std::fmt::Debug for ContentReconstructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentReconstructor")
            .field("registry", &self.registry)
            .field("diffs", &self.diffs)
            .finish_non_exhaustive()
    }
}

impl ContentReconstructor {
    /// Reconstructor with the default cache window
    #[must_use]
    pub fn new(git: GitService, registry: RepoRegistry, store: Arc<dyn ReviewStore>) -> Self {
        Self::with_cache(git, registry, store, DEFAULT_TTL, Arc::new(SystemClock))
    }

    /// Reconstructor whose diff cache uses `ttl` and `clock`
    #[must_use]
    pub fn with_cache(
        git: GitService,
        registry: RepoRegistry,
        store: Arc<dyn ReviewStore>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            git,
            registry,
            store,
            diffs: TimedCache::with_clock(ttl, clock),
        }
    }

    /// Left and right contents of `path` in one repository of a review.
    ///
    /// Without a checkpoint the left side comes from the first checkpoint
    /// that changed the file and the right side from the latest. For a
    /// checkpoint after the first, the left side is the right side of the
    /// previous checkpoint that changed the file, or the checkpoint's own
    /// left side when that text is empty.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::ReviewNotFound`] or
    /// [`ReviewError::RepoNotFound`] for unknown ids, and an internal error if
    /// the stored review is inconsistent or its diffs no longer apply.
    pub async fn contents(
        &self,
        review_id: &str,
        repo_id: &str,
        checkpoint: Option<u32>,
        path: &str,
    ) -> Result<ContentsOutcome, ReviewError> {
        let review = self.load(review_id).await?;
        let repo_root = self.repo_root(repo_id).await?;
        self.review_contents(&review, &repo_root, repo_id, checkpoint, path)
            .await
    }

    async fn review_contents(
        &self,
        review: &Review,
        repo_root: &Path,
        repo_id: &str,
        checkpoint: Option<u32>,
        path: &str,
    ) -> Result<ContentsOutcome, ReviewError> {
        if !review.includes_file(repo_id, path) {
            debug!(review_id = %review.id, repo_id, path, "file not included in review");
            return Ok(ContentsOutcome::FileNotIncludedInReview);
        }

        let Some(checkpoint) = checkpoint else {
            let mut containing = review
                .changesets_for_repo(repo_id)
                .filter(|c| c.changed_in_checkpoint(path));
            let Some(first) = containing.next() else {
                return Ok(ContentsOutcome::FileNotIncludedInReview);
            };
            let latest = containing.next_back().unwrap_or(first);
            let (before, after) = tokio::try_join!(
                self.contents_for_checkpoint(review, first, repo_root, path),
                self.contents_for_checkpoint(review, latest, repo_root, path),
            )?;
            return Ok(ContentsOutcome::Found(FileContents {
                left: before.left,
                left_path: before.left_path,
                ..after
            }));
        };

        let changeset = review
            .changesets_for_repo(repo_id)
            .find(|c| c.checkpoint == checkpoint)
            .ok_or_else(|| ReviewError::ChangesetNotFound {
                repo_id: repo_id.to_string(),
                checkpoint,
                path: path.to_string(),
            })?;
        let previous = review
            .changesets_for_repo(repo_id)
            .filter(|c| c.checkpoint < checkpoint && c.changed_in_checkpoint(path))
            .last();

        let (current, previous) = tokio::try_join!(
            self.contents_for_checkpoint(review, changeset, repo_root, path),
            async {
                match previous {
                    Some(prior) => self
                        .contents_for_checkpoint(review, prior, repo_root, path)
                        .await
                        .map(Some),
                    None => Ok(None),
                }
            },
        )?;

        Ok(ContentsOutcome::Found(match previous {
            Some(prior) if !prior.right.is_empty() => FileContents {
                left: prior.right,
                left_path: prior.right_path,
                ..current
            },
            _ => current,
        }))
    }

    /// Contents of `path` as recorded by a single changeset
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::FileInfoNotFound`] if the changeset does not
    /// list the file, and propagates git, decoding and patch failures.
    pub async fn contents_for_checkpoint(
        &self,
        review: &Review,
        changeset: &Changeset,
        repo_root: &Path,
        path: &str,
    ) -> Result<FileContents, ReviewError> {
        let file_info =
            changeset
                .file_info(path)
                .ok_or_else(|| ReviewError::FileInfoNotFound {
                    repo_id: changeset.repo_id.clone(),
                    path: path.to_string(),
                })?;
        self.reconstruct(review, changeset, repo_root, file_info)
            .await
    }

    async fn reconstruct(
        &self,
        review: &Review,
        changeset: &Changeset,
        repo_root: &Path,
        file_info: &ModifiedFile,
    ) -> Result<FileContents, ReviewError> {
        let decoded = self.decoded(review, changeset)?;
        let left_diff = decoded.left.iter().find(|d| d.touches(&file_info.old_file));
        let right_diff = decoded.right.iter().find(|d| d.touches(&file_info.file));
        let left_path = base_path(left_diff, &file_info.old_file);
        let right_path = base_path(right_diff, &file_info.file);

        let left_sha = &changeset.diffs.left_base_sha;
        let right_sha = &changeset.diffs.right_base_sha;
        let (left_base, right_base) = if file_info.status.is_new() {
            (String::new(), String::new())
        } else if left_sha == right_sha && left_path == right_path {
            let base = self.base_content(repo_root, left_sha, &left_path).await?;
            (base.clone(), base)
        } else {
            tokio::try_join!(
                self.base_content(repo_root, left_sha, &left_path),
                self.base_content(repo_root, right_sha, &right_path),
            )?
        };

        Ok(FileContents {
            repo_root: repo_root.to_path_buf(),
            left: apply_patch(&left_base, left_diff)?,
            right: apply_patch(&right_base, right_diff)?,
            left_path,
            right_path,
        })
    }

    /// Contents of every file of every repository in a review.
    ///
    /// For a checkpoint, the latest changeset of each repository at that
    /// checkpoint contributes the files changed in it; otherwise each
    /// repository's latest changeset contributes its cumulative list.
    /// Each file is resolved the way [`Self::contents`] resolves it, so
    /// checkpoint lefts chain from earlier checkpoints. Repositories without
    /// a matching changeset are left out.
    ///
    /// # Errors
    ///
    /// See [`Self::contents`].
    pub async fn all_contents(
        &self,
        review_id: &str,
        checkpoint: Option<u32>,
    ) -> Result<Vec<RepoContents>, ReviewError> {
        let review = self.load(review_id).await?;
        let mut result = Vec::new();

        for repo_id in review.repo_ids() {
            let Some(changeset) = review
                .changesets_for_repo(repo_id)
                .filter(|c| checkpoint.is_none_or(|cp| c.checkpoint == cp))
                .last()
            else {
                continue;
            };
            let repo_root = self.repo_root(repo_id).await?;
            let files = if checkpoint.is_some() {
                &changeset.modified_files_in_checkpoint
            } else {
                &changeset.modified_files
            };

            let files = try_join_all(files.iter().map(|file| {
                let repo_root = repo_root.as_path();
                let review = &review;
                async move {
                    let outcome = self
                        .review_contents(review, repo_root, repo_id, checkpoint, &file.file)
                        .await?;
                    let (left, right) = match outcome {
                        ContentsOutcome::Found(contents) => (contents.left, contents.right),
                        ContentsOutcome::FileNotIncludedInReview => (String::new(), String::new()),
                    };
                    Ok::<_, ReviewError>(FileContents {
                        repo_root: repo_root.to_path_buf(),
                        left,
                        right,
                        left_path: file.old_file.clone(),
                        right_path: file.file.clone(),
                    })
                }
            }))
            .await?;

            result.push(RepoContents {
                repo_id: repo_id.to_string(),
                files,
            });
        }
        Ok(result)
    }

    /// Compare the working copy with a base commit, or with the latest state
    /// of a review being edited.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::RepoNotFound`] for an unknown repository and
    /// propagates git failures.
    pub async fn local_contents(
        &self,
        request: &LocalContentsRequest,
    ) -> Result<LocalContents, ReviewError> {
        let repo_root = self.repo_root(&request.repo_id).await?;
        let root = repo_root.as_path();
        let path = request.path.as_str();

        let (left, right) = tokio::try_join!(
            async {
                if let Some(review_id) = &request.editing_review_id {
                    let review = self.load(review_id).await?;
                    let outcome = self
                        .review_contents(&review, root, &request.repo_id, None, path)
                        .await?;
                    if let Some(contents) = outcome.found() {
                        return Ok(contents.right);
                    }
                    debug!(review_id = %review_id, path, "file not in edited review, using base");
                }
                let base_path = request.old_path.as_deref().unwrap_or(path);
                self.base_content(root, &request.base_sha, base_path).await
            },
            self.right_content(root, path, request.right),
        )?;

        Ok(LocalContents {
            left: normalize_contents(&left),
            right: normalize_contents(&right),
            repo_root,
        })
    }

    async fn right_content(
        &self,
        repo_root: &Path,
        path: &str,
        version: RightVersion,
    ) -> Result<String, ReviewError> {
        match version {
            RightVersion::Head => match self.git.file_current_revision(repo_root, path).await? {
                Some(revision) => self.base_content(repo_root, &revision, path).await,
                None => Ok(String::new()),
            },
            RightVersion::Staged => self.base_content(repo_root, "", path).await,
            RightVersion::Saved => match self.git.read_saved_file(repo_root, path).await {
                Ok(text) => Ok(text),
                Err(GitError::Io { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    Ok(String::new())
                }
                Err(err) => Err(err.into()),
            },
        }
    }

    /// Drop cached diffs of one review
    pub fn invalidate(&self, review_id: &str) {
        self.diffs.invalidate_where(|(id, _, _)| id == review_id);
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn load(&self, review_id: &str) -> Result<Review, ReviewError> {
        self.store
            .get(review_id)
            .await?
            .ok_or_else(|| ReviewError::ReviewNotFound {
                review_id: review_id.to_string(),
            })
    }

    async fn repo_root(&self, repo_id: &str) -> Result<PathBuf, ReviewError> {
        self.registry
            .path(repo_id)
            .await
            .ok_or_else(|| ReviewError::repo_not_found(repo_id))
    }

    /// File text at a revision; empty when the revision lacks the file
    async fn base_content(
        &self,
        repo_root: &Path,
        revision: &str,
        path: &str,
    ) -> Result<String, ReviewError> {
        Ok(self
            .git
            .show_file_at_revision(repo_root, revision, path)
            .await?
            .unwrap_or_default())
    }

    fn decoded(
        &self,
        review: &Review,
        changeset: &Changeset,
    ) -> Result<Arc<DecodedDiffs>, ReviewError> {
        let key = (
            review.id.clone(),
            changeset.repo_id.clone(),
            changeset.checkpoint,
        );
        if let Some(hit) = self.diffs.get(&key, review.version) {
            return Ok(hit);
        }
        let decoded = Arc::new(DecodedDiffs::decode(&changeset.diffs)?);
        self.diffs.insert(key, review.version, Arc::clone(&decoded));
        Ok(decoded)
    }
}

/// The path base content is read from: the diff's old side unless the file
/// was added, else `fallback`
fn base_path(diff: Option<&ParsedDiff>, fallback: &str) -> String {
    match diff {
        Some(d) if d.old_file_name != NO_FILE => d.old_file_name.clone(),
        _ => fallback.to_string(),
    }
}

//! Command handlers
//!
//! This module implements each CLI command, wiring the status reader,
//! changeset builder, content reconstructor and store together and returning
//! serializable results.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use revcap_git::{BlameOptions, CliGit, GitError, GitService, RevisionEntry};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::SystemClock;
use crate::changeset::{BuildMode, ChangesetBuilder};
use crate::config::{Command, Config};
use crate::contents::{ContentReconstructor, LocalContentsRequest};
use crate::db::SqliteStore;
use crate::error::{ErrorResult, ReviewError};
use crate::preconditions::check_review;
use crate::repos::RepoRegistry;
use crate::scm::ScmReader;
use crate::store::{ReviewStore, ReviewSummary, StoreError};

// ============================================================================
// Error Types
// ============================================================================

/// Handler errors
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The review engine refused or failed
    #[error(transparent)]
    Review(#[from] ReviewError),

    /// The workspace is not inside a git repository
    #[error("Not inside a git repository: {0}. Pass --workspace or run from a repository.")]
    NotARepository(PathBuf),

    /// JSON serialization error
    #[error("Failed to process JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<GitError> for HandlerError {
    fn from(err: GitError) -> Self {
        Self::Review(err.into())
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        Self::Review(err.into())
    }
}

impl HandlerError {
    /// Serializable form for command output
    #[must_use]
    pub fn to_result(&self) -> ErrorResult {
        match self {
            Self::Review(err) => ErrorResult::from(err),
            other => ErrorResult {
                error_type: "INTERNAL".to_string(),
                message: other.to_string(),
            },
        }
    }
}

// ============================================================================
// Output Types
// ============================================================================

/// Result of `capture`
#[derive(Debug, Clone, Serialize)]
pub struct CaptureOutput {
    /// The review after capture
    pub review: ReviewSummary,
    /// Repository captured
    pub repo_id: String,
    /// Checkpoint created
    pub checkpoint: u32,
    /// Files under review as of this checkpoint
    pub files: Vec<String>,
}

/// Result of `check`
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutput {
    /// Review checked
    pub review_id: String,
    /// Working-copy root per repository
    pub repo_roots: Vec<(String, PathBuf)>,
}

/// Parameters of a capture
#[derive(Debug, Clone, Default)]
pub struct CaptureInput {
    /// Review to amend
    pub amend: Option<String>,
    /// Title of a new review
    pub title: String,
    /// Newest commit not under review
    pub start_commit: Option<String>,
    /// Include unstaged edits
    pub include_saved: bool,
    /// Include staged edits
    pub include_staged: bool,
    /// Files to leave out
    pub exclude: Vec<String>,
}

// ============================================================================
// Application
// ============================================================================

/// Everything a command needs
pub struct App {
    git: GitService,
    registry: RepoRegistry,
    store: Arc<dyn ReviewStore>,
    scm: ScmReader,
    builder: ChangesetBuilder,
    reconstructor: ContentReconstructor,
    workspace: PathBuf,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("workspace", &self.workspace)
            .finish_non_exhaustive()
    }
}

impl App {
    /// App over explicit collaborators
    #[must_use]
    pub fn new(git: GitService, store: Arc<dyn ReviewStore>, workspace: PathBuf) -> Self {
        let registry = RepoRegistry::new();
        Self {
            scm: ScmReader::new(git.clone(), registry.clone()),
            builder: ChangesetBuilder::new(git.clone()),
            reconstructor: ContentReconstructor::new(git.clone(), registry.clone(), store.clone()),
            git,
            registry,
            store,
            workspace,
        }
    }

    /// App configured from the command line, backed by the SQLite store
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the workspace
    /// cannot be determined.
    pub fn from_config(config: &Config) -> Result<Self, HandlerError> {
        let workspace = config
            .workspace_path()
            .ok_or_else(|| HandlerError::NotARepository(PathBuf::from(".")))?;
        let executor = CliGit::new(&config.git).with_default_timeout(config.git_timeout());
        let git = GitService::new(Arc::new(executor));
        let store: Arc<dyn ReviewStore> = Arc::new(SqliteStore::open(&config.database_path())?);

        let mut app = Self::new(git.clone(), store.clone(), workspace);
        app.builder = app
            .builder
            .with_new_file_concurrency(config.new_file_concurrency);
        app.reconstructor = ContentReconstructor::with_cache(
            git,
            app.registry.clone(),
            store,
            config.cache_ttl(),
            Arc::new(SystemClock),
        );
        Ok(app)
    }

    /// Registry shared by every component
    #[must_use]
    pub fn registry(&self) -> &RepoRegistry {
        &self.registry
    }

    /// Run one command and return its JSON output
    ///
    /// # Errors
    ///
    /// Returns the command's failure.
    pub async fn run(&self, command: &Command) -> Result<Value, HandlerError> {
        match command {
            Command::Capture {
                amend,
                title,
                start_commit,
                include_saved,
                include_staged,
                exclude,
            } => {
                let input = CaptureInput {
                    amend: amend.clone(),
                    title: title.clone(),
                    start_commit: start_commit.clone(),
                    include_saved: *include_saved,
                    include_staged: *include_staged,
                    exclude: exclude.clone(),
                };
                Ok(serde_json::to_value(self.capture(input).await?)?)
            }
            Command::Contents {
                review,
                repo_id,
                checkpoint,
                path,
            } => {
                let repo_id = self.repo_id_or_workspace(repo_id.as_deref()).await?;
                let outcome = self
                    .reconstructor
                    .contents(review, &repo_id, *checkpoint, path)
                    .await?;
                Ok(serde_json::to_value(outcome)?)
            }
            Command::AllContents { review, checkpoint } => {
                self.workspace_repo_id().await?;
                let contents = self.reconstructor.all_contents(review, *checkpoint).await?;
                Ok(serde_json::to_value(contents)?)
            }
            Command::LocalContents {
                base_sha,
                right,
                editing,
                old_path,
                repo_id,
                path,
            } => {
                let request = LocalContentsRequest {
                    repo_id: self.repo_id_or_workspace(repo_id.as_deref()).await?,
                    path: path.clone(),
                    old_path: old_path.clone(),
                    base_sha: base_sha.clone(),
                    right: *right,
                    editing_review_id: editing.clone(),
                };
                let contents = self.reconstructor.local_contents(&request).await?;
                Ok(serde_json::to_value(contents)?)
            }
            Command::Check { review } => Ok(serde_json::to_value(self.check(review).await?)?),
            Command::Blame {
                path,
                reference,
                start_line,
                end_line,
            } => {
                let lines = start_line.zip(*end_line);
                let entries = self.blame(path, reference.clone(), lines).await?;
                Ok(serde_json::to_value(entries)?)
            }
            Command::List => Ok(serde_json::to_value(self.store.list().await?)?),
        }
    }

    /// Capture the workspace as a new review or a new checkpoint
    ///
    /// # Errors
    ///
    /// Returns precondition errors from the builder and store failures.
    pub async fn capture(&self, input: CaptureInput) -> Result<CaptureOutput, HandlerError> {
        let change = self
            .scm
            .repo_change(
                &self.workspace,
                input.start_commit.as_deref(),
                input.include_saved,
                input.include_staged,
                input.exclude,
            )
            .await?;

        let (review, changeset) = match &input.amend {
            None => {
                let changeset = self.builder.build(change, &BuildMode::FirstCapture).await?;
                let review = self
                    .store
                    .create(&input.title, vec![changeset.clone()])
                    .await?;
                (review, changeset)
            }
            Some(review_id) => {
                let existing = self.store.get(review_id).await?.ok_or_else(|| {
                    ReviewError::ReviewNotFound {
                        review_id: review_id.clone(),
                    }
                })?;
                let repo_id = change
                    .scm
                    .as_ref()
                    .and_then(|s| s.repo_id.clone())
                    .unwrap_or_default();
                let mode = BuildMode::amending(&existing, &repo_id);
                let changeset = self.builder.build(change, &mode).await?;
                let review = self
                    .store
                    .append_changesets(review_id, vec![changeset.clone()])
                    .await?;
                self.reconstructor.invalidate(review_id);
                (review, changeset)
            }
        };

        info!(
            review_id = %review.id,
            checkpoint = changeset.checkpoint,
            "captured checkpoint"
        );
        Ok(CaptureOutput {
            review: ReviewSummary::from(&review),
            repo_id: changeset.repo_id,
            checkpoint: changeset.checkpoint,
            files: changeset.modified_files.into_iter().map(|f| f.file).collect(),
        })
    }

    /// Check that a review's commits exist locally
    ///
    /// # Errors
    ///
    /// Returns `REVIEW_NOT_FOUND`, `REPO_NOT_FOUND` or `COMMIT_NOT_FOUND`.
    pub async fn check(&self, review_id: &str) -> Result<CheckOutput, HandlerError> {
        self.workspace_repo_id().await?;
        let review = self
            .store
            .get(review_id)
            .await?
            .ok_or_else(|| ReviewError::ReviewNotFound {
                review_id: review_id.to_string(),
            })?;
        let roots = check_review(&self.git, &self.registry, &review).await?;
        let mut repo_roots: Vec<(String, PathBuf)> = roots.into_iter().collect();
        repo_roots.sort();
        Ok(CheckOutput {
            review_id: review.id,
            repo_roots,
        })
    }

    async fn blame(
        &self,
        path: &str,
        reference: Option<String>,
        lines: Option<(u32, u32)>,
    ) -> Result<Vec<RevisionEntry>, HandlerError> {
        let root = self.workspace_root().await?;
        let options = BlameOptions {
            reference,
            contents: None,
            lines,
        };
        Ok(self.git.blame_revisions(&root, path, &options).await?)
    }

    async fn workspace_root(&self) -> Result<PathBuf, HandlerError> {
        self.git
            .toplevel(&self.workspace)
            .await?
            .ok_or_else(|| HandlerError::NotARepository(self.workspace.clone()))
    }

    /// Register the workspace repository and return its id
    async fn workspace_repo_id(&self) -> Result<String, HandlerError> {
        let id = self
            .registry
            .register_path(&self.git, &self.workspace)
            .await?
            .ok_or_else(|| HandlerError::NotARepository(self.workspace.clone()))?;
        debug!(repo_id = %id, "workspace repository");
        Ok(id)
    }

    async fn repo_id_or_workspace(&self, repo_id: Option<&str>) -> Result<String, HandlerError> {
        let Some(id) = repo_id else {
            return self.workspace_repo_id().await;
        };
        // Paths are only known for the workspace repository.
        if let Err(err) = self.workspace_repo_id().await {
            debug!(repo_id = id, error = %err, "workspace not registered");
        }
        Ok(id.to_string())
    }

    /// Workspace this app operates on
    #[must_use]
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contents::RightVersion;
    use crate::store::MemoryStore;
    use similar_asserts::assert_eq;

    fn app() -> App {
        App::new(
            GitService::default(),
            Arc::new(MemoryStore::new()),
            PathBuf::from("/nonexistent/workspace"),
        )
    }

    #[test]
    fn test_review_errors_keep_their_type() {
        let err = HandlerError::from(ReviewError::NoRemotes);
        let result = err.to_result();
        assert_eq!(result.error_type, "NO_REMOTES");
    }

    #[test]
    fn test_other_errors_are_internal() {
        let err = HandlerError::NotARepository(PathBuf::from("/tmp/x"));
        assert_eq!(err.to_result().error_type, "INTERNAL");
    }

    #[tokio::test]
    async fn test_explicit_repo_id_outside_a_repository() {
        let command = Command::LocalContents {
            base_sha: "HEAD".to_string(),
            right: RightVersion::Saved,
            editing: None,
            old_path: None,
            repo_id: Some("elsewhere".to_string()),
            path: "a.txt".to_string(),
        };
        let err = app().run(&command).await.expect_err("unregistered repo");
        assert_eq!(err.to_result().error_type, "REPO_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_list_empty_store() {
        let output = app().run(&Command::List).await.expect("list");
        assert_eq!(output, serde_json::json!([]));
    }
}

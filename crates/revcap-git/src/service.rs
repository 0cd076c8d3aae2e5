// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! The diff executor adapter
//!
//! [`GitService`] wraps a [`GitExecutor`] and exposes the handful of git
//! queries the review engine needs: diffs between refs and the working tree,
//! file contents at a revision, commit ancestry, repository metadata and
//! blame. Absence is reported as `None` or an empty list where callers
//! branch on it; every other failure propagates as a [`GitError`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::blame::{RevisionEntry, parse_blame};
use crate::commit::{Commit, EMPTY_TREE_SHA, LOG_FORMAT, parse_log};
use crate::error::GitError;
use crate::executor::{CliGit, ExecOptions, GitExecutor};
use crate::patch::{ParsedDiff, new_file_diff, normalize_contents, parse_patch};
use crate::status::{
    FileStatus, ModifiedFile, apply_numstat, parse_name_status, parse_numstat, parse_path_list,
};

/// How long `fetch --all` may take before it is abandoned
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Which uncommitted changes a working-tree diff includes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkingTreeDiff {
    /// Include unstaged edits on disk
    pub include_saved: bool,
    /// Include changes staged in the index
    pub include_staged: bool,
    /// Produce the diff from the working side back to the base
    pub reverse: bool,
}

impl WorkingTreeDiff {
    /// Diff including both saved and staged changes
    #[must_use]
    pub fn saved_and_staged() -> Self {
        Self {
            include_saved: true,
            include_staged: true,
            reverse: false,
        }
    }

    /// Diff including the given kinds of uncommitted changes
    #[must_use]
    pub fn new(include_saved: bool, include_staged: bool) -> Self {
        Self {
            include_saved,
            include_staged,
            reverse: false,
        }
    }

    /// The same diff in the opposite direction
    #[must_use]
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }
}

/// Options for [`GitService::blame_revisions`]
#[derive(Debug, Clone, Default)]
pub struct BlameOptions {
    /// Blame as of this revision instead of the working copy
    pub reference: Option<String>,
    /// Blame this text (e.g. an unsaved editor buffer) instead of the file on disk
    pub contents: Option<String>,
    /// Restrict to an inclusive one-based line range
    pub lines: Option<(u32, u32)>,
}

/// Adapter over the git collaborator
#[derive(Clone)]
pub struct GitService {
    executor: Arc<dyn GitExecutor>,
}

impl std::fmt::Debug for GitService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitService").finish_non_exhaustive()
    }
}

impl Default for GitService {
    fn default() -> Self {
        Self::new(Arc::new(CliGit::default()))
    }
}

fn argv<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Map "does not exist" failures to `None`
fn absent_as_none<T>(result: Result<T, GitError>) -> Result<Option<T>, GitError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_missing_object() => {
            debug!("treating as absent: {err}");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Map any failed git command to `None`, keeping spawn and timeout errors
fn failure_as_none<T>(result: Result<T, GitError>) -> Result<Option<T>, GitError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_command_failure() => {
            debug!("treating as absent: {err}");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn non_empty(output: &str) -> Option<String> {
    let trimmed = output.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl GitService {
    /// Create a service around an executor
    #[must_use]
    pub fn new(executor: Arc<dyn GitExecutor>) -> Self {
        Self { executor }
    }

    async fn git(&self, repo: &Path, args: Vec<String>) -> Result<String, GitError> {
        self.executor
            .execute(repo, &args, &ExecOptions::default())
            .await
    }

    // ========================================================================
    // Diffs
    // ========================================================================

    /// Unified diff from `ref_a` to `ref_b`, optionally limited to one path
    ///
    /// # Errors
    ///
    /// Returns an error if either ref cannot be resolved or git fails.
    pub async fn diff_between_refs(
        &self,
        repo: &Path,
        ref_a: &str,
        ref_b: &str,
        path: Option<&str>,
        context_lines: Option<u32>,
    ) -> Result<String, GitError> {
        let mut args = argv(["diff", "--no-ext-diff", "--no-prefix"]);
        if let Some(n) = context_lines {
            args.push(format!("-U{n}"));
        }
        args.push(ref_a.to_string());
        args.push(ref_b.to_string());
        args.push("--".to_string());
        args.extend(path.map(str::to_string));
        self.git(repo, args).await
    }

    /// Unified diff between `base_ref` and the working copy.
    ///
    /// Which side counts as "working" depends on `options`: saved edits on
    /// disk, staged changes, or (with neither) HEAD. When `target_ref` is
    /// given it replaces the working side.
    ///
    /// # Errors
    ///
    /// Returns an error if a ref cannot be resolved or git fails.
    pub async fn diff_working_tree(
        &self,
        repo: &Path,
        base_ref: Option<&str>,
        target_ref: Option<&str>,
        options: WorkingTreeDiff,
    ) -> Result<String, GitError> {
        self.git(repo, working_tree_args(base_ref, target_ref, options))
            .await
    }

    /// Parsed form of [`Self::diff_working_tree`]
    ///
    /// # Errors
    ///
    /// See [`Self::diff_working_tree`].
    pub async fn working_tree_diffs(
        &self,
        repo: &Path,
        base_ref: &str,
        options: WorkingTreeDiff,
    ) -> Result<Vec<ParsedDiff>, GitError> {
        let text = self
            .diff_working_tree(repo, Some(base_ref), None, options)
            .await?;
        Ok(parse_patch(&text))
    }

    /// Parsed form of [`Self::diff_between_refs`] over the whole tree
    ///
    /// # Errors
    ///
    /// See [`Self::diff_between_refs`].
    pub async fn ref_diffs(
        &self,
        repo: &Path,
        ref_a: &str,
        ref_b: &str,
    ) -> Result<Vec<ParsedDiff>, GitError> {
        let text = self.diff_between_refs(repo, ref_a, ref_b, None, None).await?;
        Ok(parse_patch(&text))
    }

    /// Diff adding (or with `reverse`, removing) an untracked file
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Io`] if the file cannot be read.
    pub async fn diff_new_file(
        &self,
        repo: &Path,
        relative_path: &str,
        reverse: bool,
    ) -> Result<String, GitError> {
        let contents = read_working_file(repo, relative_path).await?;
        Ok(new_file_diff(relative_path, &contents, reverse))
    }

    // ========================================================================
    // Contents
    // ========================================================================

    /// File contents at `revision`, normalized to `\n` line endings.
    ///
    /// An empty `revision` reads the staged blob. Returns `None` when the
    /// revision or the path does not exist there, including the empty tree.
    ///
    /// # Errors
    ///
    /// Returns an error for failures other than absence.
    pub async fn show_file_at_revision(
        &self,
        repo: &Path,
        revision: &str,
        path: &str,
    ) -> Result<Option<String>, GitError> {
        if revision == EMPTY_TREE_SHA {
            return Ok(None);
        }
        let spec = format!("{revision}:./{path}");
        let result = self.git(repo, vec!["show".to_string(), spec, "--".to_string()]).await;
        Ok(absent_as_none(result)?.map(|text| normalize_contents(&text)))
    }

    /// Read a file from the working copy
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Io`] if the file cannot be read.
    pub async fn read_saved_file(&self, repo: &Path, path: &str) -> Result<String, GitError> {
        Ok(normalize_contents(&read_working_file(repo, path).await?))
    }

    // ========================================================================
    // Commits
    // ========================================================================

    /// SHA of HEAD, or `None` for a repository without commits
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be run.
    pub async fn head_sha(&self, repo: &Path) -> Result<Option<String>, GitError> {
        let result = self
            .git(repo, argv(["log", "--pretty=%H", "-n", "1"]))
            .await;
        Ok(failure_as_none(result)?.and_then(|out| non_empty(&out)))
    }

    /// Parents of `sha`, first parent first; empty when unknown
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be run.
    pub async fn parent_shas(&self, repo: &Path, sha: &str) -> Result<Vec<String>, GitError> {
        let result = self
            .git(repo, argv(["log", "--pretty=%P", "-n", "1", sha, "--"]))
            .await;
        Ok(failure_as_none(result)?
            .map(|out| out.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default())
    }

    /// Walk first parents from `start` (exclusive) for up to `limit` commits
    /// and return the first one matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be run.
    pub async fn find_ancestor<F>(
        &self,
        repo: &Path,
        start: &str,
        limit: usize,
        predicate: F,
    ) -> Result<Option<Commit>, GitError>
    where
        F: Fn(&Commit) -> bool + Send,
    {
        let args = vec![
            "log".to_string(),
            start.to_string(),
            format!("-n{limit}"),
            "--skip=1".to_string(),
            "--first-parent".to_string(),
            LOG_FORMAT.to_string(),
            "--".to_string(),
        ];
        let Some(out) = failure_as_none(self.git(repo, args).await)? else {
            return Ok(None);
        };
        Ok(parse_log(&out).into_iter().find(|c| predicate(c)))
    }

    /// Look up a single commit
    ///
    /// # Errors
    ///
    /// Returns an error for failures other than the commit being absent.
    pub async fn get_commit(
        &self,
        repo: &Path,
        reference: &str,
    ) -> Result<Option<Commit>, GitError> {
        let args = vec![
            "log".to_string(),
            "-n1".to_string(),
            LOG_FORMAT.to_string(),
            reference.to_string(),
            "--".to_string(),
        ];
        let out = absent_as_none(self.git(repo, args).await)?;
        Ok(out.and_then(|text| parse_log(&text).into_iter().next()))
    }

    /// Up to `limit` commits reachable from `reference`, newest first
    ///
    /// # Errors
    ///
    /// Returns an error for failures other than the reference being absent.
    pub async fn log(
        &self,
        repo: &Path,
        reference: &str,
        limit: usize,
    ) -> Result<Vec<Commit>, GitError> {
        let args = vec![
            "log".to_string(),
            format!("-n{limit}"),
            LOG_FORMAT.to_string(),
            reference.to_string(),
            "--".to_string(),
        ];
        Ok(absent_as_none(self.git(repo, args).await)?
            .map(|text| parse_log(&text))
            .unwrap_or_default())
    }

    /// SHAs in a revision range such as `a..b`
    ///
    /// # Errors
    ///
    /// Returns an error if the range cannot be resolved.
    pub async fn rev_list(&self, repo: &Path, range: &str) -> Result<Vec<String>, GitError> {
        let out = self.git(repo, argv(["rev-list", range, "--"])).await?;
        Ok(out.lines().map(str::to_string).collect())
    }

    /// Root commits reachable from HEAD
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be run.
    pub async fn root_commits(&self, repo: &Path) -> Result<Vec<String>, GitError> {
        let result = self
            .git(repo, argv(["rev-list", "--max-parents=0", "HEAD", "--"]))
            .await;
        Ok(failure_as_none(result)?
            .map(|out| out.lines().map(str::to_string).collect())
            .unwrap_or_default())
    }

    /// Merge base of two refs
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be run.
    pub async fn merge_base(
        &self,
        repo: &Path,
        ref_a: &str,
        ref_b: &str,
    ) -> Result<Option<String>, GitError> {
        let result = self.git(repo, argv(["merge-base", ref_a, ref_b])).await;
        Ok(failure_as_none(result)?.and_then(|out| non_empty(&out)))
    }

    /// Last commit that touched `path`
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be run.
    pub async fn file_current_revision(
        &self,
        repo: &Path,
        path: &str,
    ) -> Result<Option<String>, GitError> {
        let result = self
            .git(repo, argv(["log", "-n", "1", "--format=%H", "--", path]))
            .await;
        Ok(failure_as_none(result)?.and_then(|out| non_empty(&out)))
    }

    // ========================================================================
    // Repository metadata
    // ========================================================================

    /// A git config value, or `None` if unset
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be run.
    pub async fn config(&self, repo: &Path, key: &str) -> Result<Option<String>, GitError> {
        let result = self.git(repo, argv(["config", "--get", key])).await;
        Ok(failure_as_none(result)?.and_then(|out| non_empty(&out)))
    }

    /// Name of the checked-out branch, or `None` when HEAD is detached
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be run.
    pub async fn current_branch(&self, repo: &Path) -> Result<Option<String>, GitError> {
        let result = self
            .git(repo, argv(["symbolic-ref", "--short", "-q", "HEAD"]))
            .await;
        Ok(failure_as_none(result)?.and_then(|out| non_empty(&out)))
    }

    /// Names of the configured remotes
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be read.
    pub async fn remotes(&self, repo: &Path) -> Result<Vec<String>, GitError> {
        let out = self.git(repo, argv(["remote"])).await?;
        Ok(out.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
    }

    /// SHAs of commits on HEAD that the upstream branch does not have.
    ///
    /// `None` when there is no upstream, meaning every commit is local-only.
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be run.
    pub async fn local_only_shas(&self, repo: &Path) -> Result<Option<HashSet<String>>, GitError> {
        let result = self
            .git(repo, argv(["log", "--format=%H", "@{upstream}..HEAD", "--"]))
            .await;
        Ok(failure_as_none(result)?
            .map(|out| out.lines().map(str::to_string).collect()))
    }

    /// Repository root containing `path`, or `None` outside a repository
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be run.
    pub async fn toplevel(&self, path: &Path) -> Result<Option<PathBuf>, GitError> {
        let result = self.git(path, argv(["rev-parse", "--show-toplevel"])).await;
        Ok(failure_as_none(result)?
            .and_then(|out| non_empty(&out))
            .map(PathBuf::from))
    }

    /// Fetch from every remote without prompting for credentials.
    ///
    /// Returns whether the fetch succeeded; failures are logged, not raised.
    pub async fn fetch_all_remotes(&self, repo: &Path) -> bool {
        let options = ExecOptions::default()
            .with_env("GIT_TERMINAL_PROMPT", "0")
            .with_timeout(FETCH_TIMEOUT);
        match self
            .executor
            .execute(repo, &argv(["fetch", "--all"]), &options)
            .await
        {
            Ok(_) => true,
            Err(err) => {
                warn!(repo = %repo.display(), "fetch --all failed: {err}");
                false
            }
        }
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Files changed between `base` and the working side selected by the flags.
    ///
    /// With `include_saved`, untracked files are reported too.
    ///
    /// # Errors
    ///
    /// Returns an error if `base` cannot be resolved or git fails.
    pub async fn modified_files(
        &self,
        repo: &Path,
        base: &str,
        include_saved: bool,
        include_staged: bool,
    ) -> Result<Vec<ModifiedFile>, GitError> {
        let mut target = Vec::new();
        if include_saved {
            target.push(base.to_string());
        } else if include_staged {
            target.push("--staged".to_string());
            target.push(base.to_string());
        } else {
            target.push(base.to_string());
            target.push("HEAD".to_string());
        }

        let with_target = |mode: &str| {
            let mut args = argv(["diff", "--no-ext-diff", mode, "-M", "-z"]);
            args.extend(target.iter().cloned());
            args.push("--".to_string());
            args
        };
        let (names, numstat) = tokio::try_join!(
            self.git(repo, with_target("--name-status")),
            self.git(repo, with_target("--numstat")),
        )?;

        let mut files = parse_name_status(&names);
        apply_numstat(&mut files, &parse_numstat(&numstat));

        if include_saved {
            for path in self.untracked_files(repo).await? {
                let mut file = ModifiedFile::new(path, FileStatus::Untracked);
                if let Ok(contents) = read_working_file(repo, &file.file).await {
                    file.lines_added = u32::try_from(contents.lines().count()).unwrap_or(u32::MAX);
                }
                files.push(file);
            }
        }
        Ok(files)
    }

    /// Untracked, non-ignored files
    ///
    /// # Errors
    ///
    /// Returns an error if git fails.
    pub async fn untracked_files(&self, repo: &Path) -> Result<Vec<String>, GitError> {
        let out = self
            .git(repo, argv(["ls-files", "--others", "--exclude-standard", "-z"]))
            .await?;
        Ok(parse_path_list(&out))
    }

    // ========================================================================
    // Blame
    // ========================================================================

    /// Distinct revisions contributing lines to `path`, newest first.
    ///
    /// Blaming at the empty tree yields nothing. If the requested line range
    /// runs past the end of the file, the range is trimmed and blame retried
    /// once.
    ///
    /// # Errors
    ///
    /// Returns an error if git fails.
    pub async fn blame_revisions(
        &self,
        repo: &Path,
        path: &str,
        options: &BlameOptions,
    ) -> Result<Vec<RevisionEntry>, GitError> {
        if options.reference.as_deref() == Some(EMPTY_TREE_SHA) {
            return Ok(Vec::new());
        }
        match self.run_blame(repo, path, options, options.lines).await {
            Ok(out) => Ok(parse_blame(&out)),
            Err(err) => {
                let retry = match (&err, options.lines) {
                    (GitError::CommandFailed { stderr, .. }, Some((start, _))) => {
                        file_line_count(stderr)
                            .filter(|&count| count >= start)
                            .map(|count| (start, count))
                    }
                    _ => None,
                };
                let Some(lines) = retry else {
                    return Err(err);
                };
                debug!(path, ?lines, "retrying blame with trimmed range");
                let out = self.run_blame(repo, path, options, Some(lines)).await?;
                Ok(parse_blame(&out))
            }
        }
    }

    async fn run_blame(
        &self,
        repo: &Path,
        path: &str,
        options: &BlameOptions,
        lines: Option<(u32, u32)>,
    ) -> Result<String, GitError> {
        let mut args = argv(["blame", "--root", "--incremental", "-w"]);
        if let Some((start, end)) = lines {
            args.push("-L".to_string());
            args.push(format!("{start},{end}"));
        }
        let mut exec = ExecOptions::default();
        if let Some(reference) = &options.reference {
            args.push(reference.clone());
        } else if let Some(contents) = &options.contents {
            args.push("--contents".to_string());
            args.push("-".to_string());
            exec = exec.with_stdin(contents.clone());
        }
        args.push("--".to_string());
        args.push(path.to_string());
        self.executor.execute(repo, &args, &exec).await
    }
}

/// Build the `git diff` argument vector for a working-tree diff
fn working_tree_args(
    base_ref: Option<&str>,
    target_ref: Option<&str>,
    options: WorkingTreeDiff,
) -> Vec<String> {
    let WorkingTreeDiff {
        include_saved: saved,
        include_staged: staged,
        reverse,
    } = options;
    let mut args = argv(["diff", "--no-ext-diff", "--no-prefix"]);
    if reverse {
        args.push("-R".to_string());
    }
    if staged && !saved {
        args.push("--staged".to_string());
    }
    args.extend(base_ref.map(str::to_string));
    args.extend(target_ref.map(str::to_string));
    // Without saved or staged changes the working side is HEAD.
    if (!staged && base_ref.is_none()) || (!saved && !staged && target_ref.is_none()) {
        args.push("HEAD".to_string());
    }
    args.push("--".to_string());
    args
}

/// Parse `file x has only N lines` from a blame failure
fn file_line_count(stderr: &str) -> Option<u32> {
    let (_, rest) = stderr.split_once("has only ")?;
    rest.split_whitespace().next()?.parse().ok()
}

async fn read_working_file(repo: &Path, relative_path: &str) -> Result<String, GitError> {
    let path = repo.join(relative_path);
    let bytes = tokio::fs::read(&path).await.map_err(|source| GitError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

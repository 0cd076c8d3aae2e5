//! Configuration for the revcap CLI
//!
//! This module provides the command-line parser, including the database path,
//! workspace, git collaborator settings and logging options.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::contents::RightVersion;

/// revcap - checkpointed code-review capture over git
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "revcap")]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Subcommand to run (defaults to listing reviews)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Review store (SQLite)
    ///
    /// Created and migrated on first use. Lives under the platform's local
    /// data directory unless given.
    #[arg(short, long, env = "REVCAP_DATABASE")]
    pub database: Option<PathBuf>,

    /// Working copy to capture and read from
    ///
    /// The current directory when omitted.
    #[arg(short, long, env = "REVCAP_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// git binary to run
    #[arg(long, env = "REVCAP_GIT", default_value = "git")]
    pub git: PathBuf,

    /// Timeout for each git invocation, in milliseconds
    #[arg(long)]
    pub git_timeout_ms: Option<u64>,

    /// Maximum concurrent new-file diff syntheses
    #[arg(long, default_value_t = crate::changeset::DEFAULT_NEW_FILE_CONCURRENCY)]
    pub new_file_concurrency: usize,

    /// How long decoded diffs stay cached, in seconds
    #[arg(long, default_value_t = crate::cache::DEFAULT_TTL.as_secs())]
    pub cache_ttl_secs: u64,

    /// Log at debug level
    ///
    /// Logs go to stderr; stdout carries only the JSON result.
    #[arg(short, long, default_value = "false")]
    pub verbose: bool,

    /// Log warnings and errors only
    #[arg(short, long, default_value = "false")]
    pub quiet: bool,
}

/// revcap commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Capture the workspace as a new review or a new checkpoint of one
    ///
    /// Example:
    ///   revcap capture --title "Fix parser" --start-commit origin/main --include-saved
    Capture {
        /// Review to amend instead of creating a new one
        #[arg(long)]
        amend: Option<String>,

        /// Title of a new review
        #[arg(long, default_value = "Untitled review")]
        title: String,

        /// Newest commit not under review
        #[arg(long)]
        start_commit: Option<String>,

        /// Include unstaged edits on disk
        #[arg(long)]
        include_saved: bool,

        /// Include staged edits
        #[arg(long)]
        include_staged: bool,

        /// Leave a file out of the review (repeatable)
        #[arg(long = "exclude", value_name = "FILE")]
        exclude: Vec<String>,
    },

    /// Show the left and right contents of one file
    Contents {
        /// Review id
        #[arg(long)]
        review: String,

        /// Repository id (defaults to the workspace's)
        #[arg(long)]
        repo_id: Option<String>,

        /// Checkpoint (defaults to the whole review)
        #[arg(long)]
        checkpoint: Option<u32>,

        /// Repository-relative path
        path: String,
    },

    /// Show the contents of every file in a review
    AllContents {
        /// Review id
        #[arg(long)]
        review: String,

        /// Checkpoint (defaults to the whole review)
        #[arg(long)]
        checkpoint: Option<u32>,
    },

    /// Compare the workspace with a base commit
    LocalContents {
        /// Commit the left side is read from
        #[arg(long)]
        base_sha: String,

        /// Which state forms the right side
        #[arg(long, value_enum, default_value = "saved")]
        right: RightVersion,

        /// Review being edited; its latest content becomes the left side
        #[arg(long)]
        editing: Option<String>,

        /// Path at the base commit, if the file was renamed
        #[arg(long)]
        old_path: Option<String>,

        /// Repository id (defaults to the workspace's)
        #[arg(long)]
        repo_id: Option<String>,

        /// Repository-relative path
        path: String,
    },

    /// Check that every commit a review needs exists locally
    Check {
        /// Review id
        #[arg(long)]
        review: String,
    },

    /// List the commits that last touched a file
    Blame {
        /// Repository-relative path
        path: String,

        /// Revision to blame (defaults to the working tree)
        #[arg(long = "ref")]
        reference: Option<String>,

        /// First line of the range (1-based)
        #[arg(long, requires = "end_line")]
        start_line: Option<u32>,

        /// Last line of the range (inclusive)
        #[arg(long, requires = "start_line")]
        end_line: Option<u32>,
    },

    /// List stored reviews
    List,
}

impl Config {
    /// Store location: `--database`, else `revcap/revcap.db` under the
    /// platform data directory (`~/.local/share` on Linux)
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        match &self.database {
            Some(path) => path.clone(),
            None => dirs::data_local_dir()
                .unwrap_or_default()
                .join("revcap")
                .join("revcap.db"),
        }
    }

    /// `--workspace`, else the current directory if it can be read
    #[must_use]
    pub fn workspace_path(&self) -> Option<PathBuf> {
        match &self.workspace {
            Some(dir) => Some(dir.clone()),
            None => std::env::current_dir().ok(),
        }
    }

    /// Timeout applied to every git invocation
    #[must_use]
    pub fn git_timeout(&self) -> Option<Duration> {
        self.git_timeout_ms.map(Duration::from_millis)
    }

    /// Lifetime of cached diffs
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Reject unusable settings and create the store's directory
    ///
    /// # Errors
    ///
    /// Returns an error for a missing or non-directory workspace, a zero
    /// concurrency limit, or a store directory that cannot be created.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.workspace {
            Some(dir) if !dir.exists() => return Err(ConfigError::WorkspaceNotFound(dir.clone())),
            Some(dir) if !dir.is_dir() => {
                return Err(ConfigError::WorkspaceNotDirectory(dir.clone()));
            }
            _ => {}
        }

        if self.new_file_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }

        let store = self.database_path();
        if let Some(parent) = store.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::StoreDirectory(parent.to_path_buf(), e))?;
        }

        Ok(())
    }

    /// Tracing level from `--verbose` / `--quiet`; verbose wins
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        match (self.verbose, self.quiet) {
            (true, _) => tracing::Level::DEBUG,
            (false, true) => tracing::Level::WARN,
            (false, false) => tracing::Level::INFO,
        }
    }
}

/// Invalid command-line settings
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `--workspace` does not exist
    #[error("Workspace does not exist: {0}")]
    WorkspaceNotFound(PathBuf),

    /// `--workspace` is a file
    #[error("Workspace is not a directory: {0}")]
    WorkspaceNotDirectory(PathBuf),

    /// The store's parent directory could not be created
    #[error("Cannot create store directory {0}: {1}")]
    StoreDirectory(PathBuf, std::io::Error),

    /// New-file concurrency must allow at least one task
    #[error("--new-file-concurrency must be at least 1")]
    InvalidConcurrency,
}

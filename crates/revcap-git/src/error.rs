// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Error types for revcap-git

use std::time::Duration;

use thiserror::Error;

/// Stderr fragments git prints when an object, path or upstream is absent.
const MISSING_OBJECT_MARKERS: &[&str] = &[
    "bad revision",
    "bad object",
    "unknown revision",
    "invalid object name",
    "does not exist in",
    "exists on disk, but not in",
    "not a valid object name",
    "no upstream configured",
    "no such ref",
    "does not have any commits yet",
];

/// Errors that can occur while running git commands
#[derive(Debug, Error)]
pub enum GitError {
    /// git ran and exited with a non-zero status
    #[error("git {command} failed: {stderr}")]
    CommandFailed {
        /// The argument vector, joined with spaces
        command: String,
        /// Trimmed standard error output
        stderr: String,
    },

    /// The git binary could not be started
    #[error("Failed to spawn git: {0}")]
    Spawn(#[source] std::io::Error),

    /// The command did not finish within the allotted time
    #[error("git {command} timed out after {timeout:?}")]
    Timeout {
        /// The argument vector, joined with spaces
        command: String,
        /// The timeout that elapsed
        timeout: Duration,
    },

    /// Invalid commit reference (branch, tag, or SHA)
    #[error("Invalid commit reference: {reference}")]
    InvalidReference {
        /// The reference string that could not be resolved
        reference: String,
    },

    /// Reading or writing a working-copy file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file being accessed
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl GitError {
    /// Whether the failure means "this object, path or upstream does not exist".
    ///
    /// Callers for which absence is meaningful map this case to `None` or an
    /// empty result instead of failing.
    #[must_use]
    pub fn is_missing_object(&self) -> bool {
        match self {
            Self::CommandFailed { stderr, .. } => {
                let stderr = stderr.to_ascii_lowercase();
                MISSING_OBJECT_MARKERS.iter().any(|m| stderr.contains(m))
            }
            Self::InvalidReference { .. } => true,
            _ => false,
        }
    }

    /// Whether the command ran but failed, as opposed to git being unusable.
    #[must_use]
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::CommandFailed { .. })
    }
}

/// Errors raised while applying a parsed diff to base content
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    /// No position in the base text matches the hunk's context and removals
    #[error("Hunk {hunk} (@@ -{old_start} @@) does not match the base content")]
    ContextMismatch {
        /// Zero-based hunk index within the file diff
        hunk: usize,
        /// One-based start line recorded in the hunk header
        old_start: usize,
    },

    /// The hunk expects more lines than the base content has
    #[error("Hunk {hunk} needs {needed} base lines but the base has {available}")]
    HunkOutOfRange {
        /// Zero-based hunk index within the file diff
        hunk: usize,
        /// Context and removed lines the hunk must match
        needed: usize,
        /// Lines in the base content
        available: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(stderr: &str) -> GitError {
        GitError::CommandFailed {
            command: "show abc:./a.txt --".to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_missing_object_detection() {
        assert!(failed("fatal: bad revision 'deadbeef'").is_missing_object());
        assert!(failed("fatal: path 'x' does not exist in 'HEAD'").is_missing_object());
        assert!(
            failed("fatal: path 'x' exists on disk, but not in 'abc'").is_missing_object()
        );
        assert!(failed("fatal: Invalid object name 'abc'.").is_missing_object());
        assert!(failed("fatal: no upstream configured for branch 'main'").is_missing_object());
    }

    #[test]
    fn test_other_failures_are_not_missing_objects() {
        assert!(!failed("fatal: not a git repository").is_missing_object());
        let spawn = GitError::Spawn(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(!spawn.is_missing_object());
        assert!(!spawn.is_command_failure());
    }

    #[test]
    fn test_error_display() {
        let err = failed("fatal: boom");
        assert_eq!(err.to_string(), "git show abc:./a.txt -- failed: fatal: boom");
    }
}

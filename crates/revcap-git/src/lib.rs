// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! revcap-git: Git plumbing for revcap
//!
//! This library crate parses the text git produces for diffs, blame and logs,
//! replays parsed diffs onto base content, and wraps the git binary behind an
//! async adapter that the review engine (and its tests) can swap out.

#![warn(missing_docs)]

//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use revcap_git::{GitService, WorkingTreeDiff, apply_patch};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let git = GitService::default();
//! let repo = Path::new(".");
//! let diffs = git
//!     .working_tree_diffs(repo, "HEAD", WorkingTreeDiff::saved_and_staged())
//!     .await?;
//! for diff in &diffs {
//!     let base = git
//!         .show_file_at_revision(repo, "HEAD", &diff.old_file_name)
//!         .await?
//!         .unwrap_or_default();
//!     let saved = apply_patch(&base, Some(diff))?;
//!     println!("{}: {} bytes", diff.new_file_name, saved.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod blame;
pub mod commit;
pub mod error;
pub mod executor;
pub mod patch;
pub mod service;
pub mod status;

pub use blame::{RevisionEntry, parse_blame};
pub use commit::{Commit, EMPTY_TREE_AUTHOR, EMPTY_TREE_SHA};
pub use error::{GitError, PatchError};
pub use executor::{CliGit, ExecOptions, GitExecutor};
pub use patch::{Hunk, HunkLine, NO_FILE, ParsedDiff, apply_patch, normalize_contents, parse_patch};
pub use service::{BlameOptions, GitService, WorkingTreeDiff};
pub use status::{FileStatus, ModifiedFile};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::commit::{Commit, EMPTY_TREE_SHA};
    pub use crate::error::{GitError, PatchError};
    pub use crate::executor::GitExecutor;
    pub use crate::patch::{ParsedDiff, apply_patch, parse_patch};
    pub use crate::service::{GitService, WorkingTreeDiff};
    pub use crate::status::{FileStatus, ModifiedFile};
}

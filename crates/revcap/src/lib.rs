// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! revcap library
//!
//! Captures the state of a working copy as numbered checkpoints of a code
//! review and reconstructs, later, exactly what a reviewer saw for any file at
//! any checkpoint. The modules are exported for the CLI and for integration
//! tests.

pub mod cache;
pub mod changeset;
pub mod codec;
pub mod config;
pub mod contents;
pub mod db;
pub mod error;
pub mod handlers;
pub mod migrations;
pub mod models;
pub mod preconditions;
pub mod repos;
pub mod scm;
pub mod store;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::changeset::{Amendment, BuildMode, ChangesetBuilder};
    pub use crate::contents::{ContentReconstructor, ContentsOutcome, FileContents, RightVersion};
    pub use crate::error::{ErrorResult, ReviewError};
    pub use crate::models::{Changeset, RepoChange, RepoStatus, Review};
    pub use crate::repos::RepoRegistry;
    pub use crate::scm::ScmReader;
    pub use crate::store::{MemoryStore, ReviewStore};
}

// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Working-copy status: which files changed and how

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How a file changed relative to the review's base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Added to the index or committed as new
    Added,
    /// Content changed
    Modified,
    /// Removed
    Deleted,
    /// Moved, possibly with changes
    Renamed,
    /// Copied from another path
    Copied,
    /// Present on disk but not tracked by git
    Untracked,
    /// Has unresolved merge conflicts
    Unmerged,
}

impl FileStatus {
    /// Map a `--name-status` letter to a status
    #[must_use]
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'A' => Some(Self::Added),
            'M' | 'T' => Some(Self::Modified),
            'D' => Some(Self::Deleted),
            'R' => Some(Self::Renamed),
            'C' => Some(Self::Copied),
            '?' => Some(Self::Untracked),
            'U' => Some(Self::Unmerged),
            _ => None,
        }
    }

    /// The single-letter code git uses for this status
    #[must_use]
    pub fn code(self) -> char {
        match self {
            Self::Added => 'A',
            Self::Modified => 'M',
            Self::Deleted => 'D',
            Self::Renamed => 'R',
            Self::Copied => 'C',
            Self::Untracked => '?',
            Self::Unmerged => 'U',
        }
    }

    /// The file has no content on the base side
    #[must_use]
    pub fn is_new(self) -> bool {
        matches!(self, Self::Added | Self::Untracked)
    }
}

/// One changed file with its line statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiedFile {
    /// Current repository-relative path
    pub file: String,
    /// Path on the base side (equal to `file` unless renamed or copied)
    pub old_file: String,
    /// Kind of change
    pub status: FileStatus,
    /// Lines added
    pub lines_added: u32,
    /// Lines removed
    pub lines_removed: u32,
}

impl ModifiedFile {
    /// A changed file without line statistics
    #[must_use]
    pub fn new(file: impl Into<String>, status: FileStatus) -> Self {
        let file = file.into();
        Self {
            old_file: file.clone(),
            file,
            status,
            lines_added: 0,
            lines_removed: 0,
        }
    }

    /// Whether `path` is either side of this change
    #[must_use]
    pub fn touches(&self, path: &str) -> bool {
        self.file == path || self.old_file == path
    }
}

/// Parse `git diff --name-status -M -z` output
#[must_use]
pub fn parse_name_status(output: &str) -> Vec<ModifiedFile> {
    let mut fields = output.split('\0').filter(|f| !f.is_empty());
    let mut files = Vec::new();
    while let Some(code) = fields.next() {
        let Some(status) = code.chars().next().and_then(FileStatus::from_code) else {
            continue;
        };
        let Some(first) = fields.next() else {
            break;
        };
        let mut file = ModifiedFile::new(first, status);
        if matches!(status, FileStatus::Renamed | FileStatus::Copied) {
            let Some(second) = fields.next() else {
                break;
            };
            file.file = second.to_string();
        }
        files.push(file);
    }
    files
}

/// Parse `git diff --numstat -M -z` output into `path -> (added, removed)`.
///
/// Renames are keyed by their new path. Binary files count as zero lines.
#[must_use]
pub fn parse_numstat(output: &str) -> HashMap<String, (u32, u32)> {
    let mut fields = output.split('\0');
    let mut stats = HashMap::new();
    while let Some(field) = fields.next() {
        let mut parts = field.splitn(3, '\t');
        let (Some(added), Some(removed), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let counts = (added.parse().unwrap_or(0), removed.parse().unwrap_or(0));
        let path = if path.is_empty() {
            // Rename: the old and new paths follow as separate fields.
            let _old = fields.next();
            match fields.next() {
                Some(new) => new,
                None => break,
            }
        } else {
            path
        };
        stats.insert(path.to_string(), counts);
    }
    stats
}

/// Parse NUL-separated path lists such as `git ls-files -z`
#[must_use]
pub fn parse_path_list(output: &str) -> Vec<String> {
    output
        .split('\0')
        .map(|p| p.trim_end_matches('\n'))
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fill in line statistics from a numstat map
pub fn apply_numstat(files: &mut [ModifiedFile], stats: &HashMap<String, (u32, u32)>) {
    for file in files {
        if let Some(&(added, removed)) = stats.get(&file.file) {
            file.lines_added = added;
            file.lines_removed = removed;
        }
    }
}

//! Git commit types and `git log` parsing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known sha of git's empty tree object
pub const EMPTY_TREE_SHA: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Author name reported for the empty tree
pub const EMPTY_TREE_AUTHOR: &str = "Empty Tree";

/// `--format` argument understood by [`parse_log`].
///
/// Fields are separated by the ASCII unit separator and records terminated
/// by the record separator, so subjects may contain any printable text.
pub const LOG_FORMAT: &str = "--format=%H%x1f%an%x1f%ae%x1f%at%x1f%P%x1f%s%x1e";

const FIELD_SEPARATOR: char = '\u{1f}';
const RECORD_SEPARATOR: char = '\u{1e}';

/// One `git log` record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Full 40-hex sha
    pub sha: String,
    /// Commit subject line
    pub message: String,
    /// `%an`
    pub author: String,
    /// `%ae`
    pub author_email: String,
    /// Author timestamp
    pub timestamp: DateTime<Utc>,
    /// Parent commit SHAs, first parent first
    pub parents: Vec<String>,
}

impl Commit {
    /// `sha` is a full 40-character hex object id
    #[must_use]
    pub fn is_valid_sha(sha: &str) -> bool {
        sha.len() == 40 && sha.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// [`short_sha`] of this commit
    #[must_use]
    pub fn short_sha(&self) -> &str {
        short_sha(&self.sha)
    }

    /// First parent, if any
    #[must_use]
    pub fn first_parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }
}

/// First 8 characters of a sha (or the whole string if shorter)
#[must_use]
pub fn short_sha(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}

/// Parse `git log` output produced with [`LOG_FORMAT`].
///
/// Records with a malformed sha or timestamp are skipped.
#[must_use]
pub fn parse_log(text: &str) -> Vec<Commit> {
    text.split(RECORD_SEPARATOR)
        .filter_map(|record| {
            let record = record.trim_start_matches(['\n', '\r']);
            if record.is_empty() {
                return None;
            }
            let mut fields = record.splitn(6, FIELD_SEPARATOR);
            let sha = fields.next()?.trim();
            if !Commit::is_valid_sha(sha) {
                return None;
            }
            let author = fields.next()?;
            let author_email = fields.next()?;
            let timestamp = DateTime::from_timestamp(fields.next()?.trim().parse().ok()?, 0)?;
            let parents = fields
                .next()?
                .split_whitespace()
                .map(str::to_string)
                .collect();
            let message = fields.next().unwrap_or("").trim_end().to_string();
            Some(Commit {
                sha: sha.to_string(),
                message,
                author: author.to_string(),
                author_email: author_email.to_string(),
                timestamp,
                parents,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use similar_asserts::assert_eq;

    const SHA: &str = "1945ab9c752534e733c38ba0109dc3b741f0a6eb";
    const PARENT: &str = "c460aeb7fb2d109c17e43de0ce681faec0b7374d";

    fn record(sha: &str, parents: &str, subject: &str) -> String {
        format!("{sha}\u{1f}Test Author\u{1f}test@example.com\u{1f}1768617186\u{1f}{parents}\u{1f}{subject}\u{1e}\n")
    }

    #[test]
    fn test_parse_log_single_record() {
        let commits = parse_log(&record(SHA, PARENT, "feat: add checkpoints"));
        assert_eq!(commits.len(), 1);
        let commit = &commits[0];
        assert_eq!(commit.sha, SHA);
        assert_eq!(commit.message, "feat: add checkpoints");
        assert_eq!(commit.author, "Test Author");
        assert_eq!(commit.author_email, "test@example.com");
        assert_eq!(
            commit.timestamp,
            Utc.with_ymd_and_hms(2026, 1, 17, 2, 33, 6).unwrap()
        );
        assert_eq!(commit.first_parent(), Some(PARENT));
    }

    #[test]
    fn test_parse_log_root_and_merge() {
        let text = format!(
            "{}{}",
            record(SHA, &format!("{PARENT} {PARENT}"), "Merge"),
            record(PARENT, "", "root")
        );
        let commits = parse_log(&text);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].parents.len(), 2);
        assert!(commits[1].parents.is_empty());
        assert_eq!(commits[1].first_parent(), None);
    }

    #[test]
    fn test_parse_log_subject_with_separators_in_text() {
        let commits = parse_log(&record(SHA, PARENT, "fix: a | b \t c"));
        assert_eq!(commits[0].message, "fix: a | b \t c");
    }

    #[test]
    fn test_parse_log_skips_garbage() {
        assert!(parse_log("").is_empty());
        assert!(parse_log("not a log\n").is_empty());
        let text = format!("nonsense\u{1e}\n{}", record(SHA, "", "ok"));
        assert_eq!(parse_log(&text).len(), 1);
    }

    #[test]
    fn test_short_sha() {
        assert_eq!(short_sha(SHA), "1945ab9c");
        assert_eq!(short_sha("abc"), "abc");
        assert_eq!(short_sha(EMPTY_TREE_SHA), "4b825dc6");
    }

    #[test]
    fn test_is_valid_sha() {
        assert!(Commit::is_valid_sha(SHA));
        assert!(Commit::is_valid_sha(EMPTY_TREE_SHA));
        assert!(!Commit::is_valid_sha("1945ab9"));
        assert!(!Commit::is_valid_sha(
            "1945ab9c752534e733c38ba0109dc3b741f0a6eg"
        ));
        assert!(!Commit::is_valid_sha(""));
    }

    #[test]
    fn test_commit_serialization_roundtrip() {
        let commit = parse_log(&record(SHA, PARENT, "subject"))
            .pop()
            .expect("one commit");
        let json = serde_json::to_string(&commit).expect("serialize");
        assert!(json.contains("2026-01-17"));
        let back: Commit = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, commit);
    }
}

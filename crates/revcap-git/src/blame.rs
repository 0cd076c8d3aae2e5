// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Parser for `git blame --incremental` output
//!
//! The incremental format is a sequence of blocks. Each block opens with
//! `<sha> <orig-line> <final-line> <count>`, continues with `key value`
//! lines and closes with `filename <path>`. git only prints the author
//! details the first time a commit appears, so the parser keeps the first
//! block seen for every sha.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The sha git reports for lines that are not committed yet
pub const UNCOMMITTED_SHA: &str = "0000000000000000000000000000000000000000";

/// A distinct commit that contributed lines to a blamed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionEntry {
    /// Commit sha (all zeros for uncommitted lines)
    pub sha: String,
    /// Author date
    pub date: Option<DateTime<Utc>>,
    /// Author name; unset for uncommitted lines
    pub author_name: Option<String>,
    /// Author email without angle brackets; unset for uncommitted lines
    pub author_email: Option<String>,
    /// Commit subject; unset for uncommitted lines
    pub summary: Option<String>,
}

impl RevisionEntry {
    fn new(sha: String) -> Self {
        Self {
            sha,
            date: None,
            author_name: None,
            author_email: None,
            summary: None,
        }
    }

    /// Whether this entry stands for working-copy changes
    #[must_use]
    pub fn is_uncommitted(&self) -> bool {
        self.sha == UNCOMMITTED_SHA
    }
}

/// Line-by-line parser for incremental blame output
#[derive(Debug, Default)]
pub struct BlameParser {
    entries: Vec<RevisionEntry>,
    seen: HashSet<String>,
    current: Option<RevisionEntry>,
}

impl BlameParser {
    /// Create an empty parser
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a single line of blame output
    pub fn process_line(&mut self, line: &str) {
        let line = line.trim_end_matches('\r');
        if let Some(sha) = block_sha(line) {
            self.flush();
            self.current = Some(RevisionEntry::new(sha));
            return;
        }

        let Some(entry) = self.current.as_mut() else {
            return;
        };
        let (key, value) = line.split_once(' ').unwrap_or((line, ""));
        match key {
            "author" => entry.author_name = Some(value.to_string()),
            "author-mail" => {
                let email = value
                    .strip_prefix('<')
                    .and_then(|v| v.strip_suffix('>'))
                    .unwrap_or(value);
                entry.author_email = Some(email.to_string());
            }
            "author-time" => {
                entry.date = value
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0));
            }
            "summary" => entry.summary = Some(value.to_string()),
            "filename" => self.flush(),
            _ => {}
        }
    }

    /// Finish parsing and return the distinct revisions, newest first
    #[must_use]
    pub fn finish(mut self) -> Vec<RevisionEntry> {
        self.flush();
        self.entries.sort_by(|a, b| b.date.cmp(&a.date));
        self.entries
    }

    fn flush(&mut self) {
        let Some(mut entry) = self.current.take() else {
            return;
        };
        if !self.seen.insert(entry.sha.clone()) {
            return;
        }
        if entry.is_uncommitted() {
            entry.author_name = None;
            entry.author_email = None;
            entry.summary = None;
        }
        self.entries.push(entry);
    }
}

/// Parse complete `git blame --incremental` output
#[must_use]
pub fn parse_blame(text: &str) -> Vec<RevisionEntry> {
    let mut parser = BlameParser::new();
    for line in text.lines() {
        parser.process_line(line);
    }
    parser.finish()
}

/// The sha of a block header line, normalized to 40 hex characters.
///
/// Uncommitted blocks may carry a `^N` or `:` suffix on the zero sha.
fn block_sha(line: &str) -> Option<String> {
    let token = line.split(' ').next()?;
    let mut fields = line.split(' ').skip(1);
    // A header always carries at least the original and final line numbers.
    if !(fields.next()?.parse::<u32>().is_ok() && fields.next()?.parse::<u32>().is_ok()) {
        return None;
    }
    let sha = token
        .split(['^', ':'])
        .next()
        .filter(|s| s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit()))?;
    Some(sha.to_ascii_lowercase())
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn sha_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            proptest::string::string_regex("[0-9a-f]{40}").unwrap(),
            Just(UNCOMMITTED_SHA.to_string()),
        ]
    }

    proptest! {
        #[test]
        fn shas_are_distinct_and_sorted(
            blocks in proptest::collection::vec((sha_strategy(), 0i64..2_000_000_000), 0..30)
        ) {
            let mut text = String::new();
            for (line, (sha, time)) in blocks.iter().enumerate() {
                text.push_str(&format!(
                    "{sha} {line} {line} 1\nauthor a\nauthor-mail <a@b>\nauthor-time {time}\nsummary s\nfilename f\n"
                ));
            }
            let revisions = parse_blame(&text);

            let distinct: HashSet<&String> = blocks.iter().map(|(sha, _)| sha).collect();
            prop_assert_eq!(revisions.len(), distinct.len());
            let unique: HashSet<&String> = revisions.iter().map(|r| &r.sha).collect();
            prop_assert_eq!(unique.len(), revisions.len());
            prop_assert!(revisions.windows(2).all(|w| w[0].date >= w[1].date));
        }

        #[test]
        fn parse_never_panics(text in "(?s).{0,400}") {
            let _ = parse_blame(&text);
        }
    }
}

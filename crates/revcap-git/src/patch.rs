// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Unified diff parsing and application
//!
//! [`parse_patch`] turns the text printed by `git diff` (or any unified diff)
//! into [`ParsedDiff`] records, one per file. [`apply_patch`] replays one of
//! those records on top of base content to reconstruct the other side.

use serde::{Deserialize, Serialize};
use similar::TextDiff;

use crate::error::PatchError;

/// File name used by unified diffs for the missing side of an add or delete
pub const NO_FILE: &str = "/dev/null";

// ============================================================================
// Types
// ============================================================================

/// A single line inside a hunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum HunkLine {
    /// Unchanged line present on both sides
    Context(String),
    /// Line only present on the new side
    Added(String),
    /// Line only present on the old side
    Removed(String),
    /// The preceding line has no trailing newline
    NoNewline,
}

/// A contiguous block of changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    /// One-based first line on the old side (0 for an empty old side)
    pub old_start: usize,
    /// Number of old-side lines covered
    pub old_lines: usize,
    /// One-based first line on the new side (0 for an empty new side)
    pub new_start: usize,
    /// Number of new-side lines covered
    pub new_lines: usize,
    /// Body lines in order
    pub lines: Vec<HunkLine>,
}

/// The changes to one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDiff {
    /// Path on the old side, or [`NO_FILE`] for an added file
    pub old_file_name: String,
    /// Path on the new side, or [`NO_FILE`] for a deleted file
    pub new_file_name: String,
    /// Ordered hunks; empty for binary files, pure renames and mode changes
    pub hunks: Vec<Hunk>,
    /// git reported the file as binary
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_binary: bool,
}

impl ParsedDiff {
    /// The file did not exist on the old side
    #[must_use]
    pub fn is_new_file(&self) -> bool {
        self.old_file_name == NO_FILE
    }

    /// The file does not exist on the new side
    #[must_use]
    pub fn is_deleted_file(&self) -> bool {
        self.new_file_name == NO_FILE
    }

    /// Whether either side of this diff is `path`
    #[must_use]
    pub fn touches(&self, path: &str) -> bool {
        self.new_file_name == path || self.old_file_name == path
    }

    /// Number of added lines across all hunks
    #[must_use]
    pub fn lines_added(&self) -> usize {
        self.count(|l| matches!(l, HunkLine::Added(_)))
    }

    /// Number of removed lines across all hunks
    #[must_use]
    pub fn lines_removed(&self) -> usize {
        self.count(|l| matches!(l, HunkLine::Removed(_)))
    }

    fn count(&self, pred: impl Fn(&HunkLine) -> bool) -> usize {
        self.hunks
            .iter()
            .flat_map(|h| h.lines.iter())
            .filter(|l| pred(l))
            .count()
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Per-file state while scanning a patch
struct FileState {
    diff: ParsedDiff,
    /// `---`/`+++` markers were seen for this file
    has_markers: bool,
    /// A malformed hunk header was seen; ignore the rest of the file
    skipping: bool,
}

impl FileState {
    fn new(old_file_name: String, new_file_name: String) -> Self {
        Self {
            diff: ParsedDiff {
                old_file_name,
                new_file_name,
                hunks: Vec::new(),
                is_binary: false,
            },
            has_markers: false,
            skipping: false,
        }
    }
}

/// Parse unified diff text into one [`ParsedDiff`] per file.
///
/// Empty input yields an empty list. Binary files, pure renames and mode-only
/// changes produce entries without hunks. A hunk whose header cannot be parsed
/// ends parsing of that file; hunks read before it are kept and parsing resumes
/// at the next file header.
#[must_use]
pub fn parse_patch(text: &str) -> Vec<ParsedDiff> {
    let lines: Vec<&str> = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();
    let mut diffs = Vec::new();
    let mut current: Option<FileState> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if let Some(rest) = line.strip_prefix("diff --git ") {
            diffs.extend(current.take().map(|s| s.diff));
            let (old, new) = split_git_header(rest);
            current = Some(FileState::new(old, new));
            i += 1;
            continue;
        }

        if line.starts_with("--- ") && lines.get(i + 1).is_some_and(|l| l.starts_with("+++ ")) {
            let old = parse_file_name(&line[4..]);
            let new = parse_file_name(&lines[i + 1][4..]);
            match current.as_mut() {
                Some(state) if !state.has_markers && state.diff.hunks.is_empty() => {
                    state.diff.old_file_name = old;
                    state.diff.new_file_name = new;
                    state.has_markers = true;
                    state.skipping = false;
                }
                _ => {
                    diffs.extend(current.take().map(|s| s.diff));
                    let mut state = FileState::new(old, new);
                    state.has_markers = true;
                    current = Some(state);
                }
            }
            i += 2;
            continue;
        }

        let Some(state) = current.as_mut() else {
            i += 1;
            continue;
        };
        if state.skipping {
            i += 1;
            continue;
        }

        if line.starts_with("@@") {
            match parse_hunk_header(line) {
                Some(hunk) => {
                    let (hunk, next) = read_hunk_body(&lines, i + 1, hunk);
                    state.diff.hunks.push(hunk);
                    i = next;
                }
                None => {
                    state.skipping = true;
                    i += 1;
                }
            }
            continue;
        }

        apply_extended_header(state, line);
        i += 1;
    }

    diffs.extend(current.map(|s| s.diff));
    diffs
}

/// Handle git's extended header lines (`new file mode`, `rename from`, ...)
fn apply_extended_header(state: &mut FileState, line: &str) {
    let diff = &mut state.diff;
    if line.starts_with("new file mode") {
        if !state.has_markers {
            diff.old_file_name = NO_FILE.to_string();
        }
    } else if line.starts_with("deleted file mode") {
        if !state.has_markers {
            diff.new_file_name = NO_FILE.to_string();
        }
    } else if let Some(name) = line
        .strip_prefix("rename from ")
        .or_else(|| line.strip_prefix("copy from "))
    {
        diff.old_file_name = unquote(name);
    } else if let Some(name) = line
        .strip_prefix("rename to ")
        .or_else(|| line.strip_prefix("copy to "))
    {
        diff.new_file_name = unquote(name);
    } else if line.starts_with("Binary files ") || line == "GIT binary patch" {
        diff.is_binary = true;
    }
}

/// Read hunk body lines starting at `start`; returns the hunk and the next index
fn read_hunk_body(lines: &[&str], start: usize, mut hunk: Hunk) -> (Hunk, usize) {
    let mut old_remaining = hunk.old_lines;
    let mut new_remaining = hunk.new_lines;
    let mut i = start;

    while i < lines.len() {
        let line = lines[i];
        if line.starts_with('\\') {
            // `\ No newline at end of file`, possibly localized
            if !hunk.lines.is_empty() {
                hunk.lines.push(HunkLine::NoNewline);
            }
            i += 1;
            continue;
        }
        if old_remaining == 0 && new_remaining == 0 {
            break;
        }
        let body = match line.as_bytes().first() {
            Some(b' ') => {
                old_remaining = old_remaining.saturating_sub(1);
                new_remaining = new_remaining.saturating_sub(1);
                HunkLine::Context(line[1..].to_string())
            }
            Some(b'-') => {
                old_remaining = old_remaining.saturating_sub(1);
                HunkLine::Removed(line[1..].to_string())
            }
            Some(b'+') => {
                new_remaining = new_remaining.saturating_sub(1);
                HunkLine::Added(line[1..].to_string())
            }
            // Some tools strip the leading space from empty context lines.
            None if i + 1 < lines.len() => {
                old_remaining = old_remaining.saturating_sub(1);
                new_remaining = new_remaining.saturating_sub(1);
                HunkLine::Context(String::new())
            }
            _ => break,
        };
        hunk.lines.push(body);
        i += 1;
    }

    (hunk, i)
}

/// Parse `@@ -a[,b] +c[,d] @@ ...`
fn parse_hunk_header(line: &str) -> Option<Hunk> {
    let rest = line.strip_prefix("@@ -")?;
    let (old, rest) = rest.split_once(' ')?;
    let rest = rest.strip_prefix('+')?;
    let (new, rest) = rest.split_once(' ').unwrap_or((rest, ""));
    if !rest.starts_with("@@") {
        return None;
    }
    let (old_start, old_lines) = parse_range(old)?;
    let (new_start, new_lines) = parse_range(new)?;
    Some(Hunk {
        old_start,
        old_lines,
        new_start,
        new_lines,
        lines: Vec::new(),
    })
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

/// File name from a `---`/`+++` marker, dropping any tab-separated timestamp
fn parse_file_name(raw: &str) -> String {
    if raw.starts_with('"') {
        return unquote(raw);
    }
    raw.split('\t').next().unwrap_or(raw).to_string()
}

/// Split the `a b` part of `diff --git a b`.
///
/// Unquoted names containing spaces are only recoverable when both sides are
/// equal; otherwise the `rename`/`---` lines that follow supply them.
fn split_git_header(rest: &str) -> (String, String) {
    if let Some(stripped) = rest.strip_prefix('"')
        && let Some(end) = closing_quote(stripped)
    {
        let old = unquote(&rest[..end + 2]);
        let new = unquote(rest[end + 2..].trim_start());
        return (old, new);
    }
    let bytes = rest.len();
    if bytes % 2 == 1 {
        let mid = bytes / 2;
        if rest.is_char_boundary(mid)
            && rest.as_bytes()[mid] == b' '
            && rest[..mid] == rest[mid + 1..]
        {
            return (rest[..mid].to_string(), rest[mid + 1..].to_string());
        }
    }
    match rest.rsplit_once(' ') {
        Some((old, new)) => (unquote(old), unquote(new)),
        None => (rest.to_string(), rest.to_string()),
    }
}

/// Index of the closing quote in a string that follows an opening quote
fn closing_quote(s: &str) -> Option<usize> {
    let mut escaped = false;
    for (idx, ch) in s.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => return Some(idx),
            _ => escaped = false,
        }
    }
    None
}

/// Undo git's C-style quoting of paths with special characters
fn unquote(raw: &str) -> String {
    let Some(inner) = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
        return raw.to_string();
    };
    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.bytes().peekable();
    while let Some(b) = chars.next() {
        if b != b'\\' {
            bytes.push(b);
            continue;
        }
        match chars.next() {
            Some(b'n') => bytes.push(b'\n'),
            Some(b't') => bytes.push(b'\t'),
            Some(b'r') => bytes.push(b'\r'),
            Some(d @ b'0'..=b'7') => {
                let mut value = u32::from(d - b'0');
                for _ in 0..2 {
                    match chars.peek() {
                        Some(&o @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(o - b'0');
                            chars.next();
                        }
                        _ => break,
                    }
                }
                bytes.push(u8::try_from(value).unwrap_or(b'?'));
            }
            Some(other) => bytes.push(other),
            None => bytes.push(b'\\'),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

// ============================================================================
// Application
// ============================================================================

/// Normalize line endings to `\n`
#[must_use]
pub fn normalize_contents(contents: &str) -> String {
    contents.replace("\r\n", "\n")
}

/// Split into lines and report whether the text ended with a newline
fn split_lines(text: &str) -> (Vec<&str>, bool) {
    if text.is_empty() {
        return (Vec::new(), true);
    }
    match text.strip_suffix('\n') {
        Some(stripped) => (stripped.split('\n').collect(), true),
        None => (text.split('\n').collect(), false),
    }
}

/// Apply `diff` to `base` and return the other side.
///
/// `base` is normalized first. With no diff, or a diff without hunks, the
/// normalized base is returned unchanged. Hunks are located at their recorded
/// position adjusted by the drift of earlier hunks; if the context does not
/// match there the nearest matching position is used.
///
/// # Errors
///
/// Returns [`PatchError::ContextMismatch`] if a hunk matches nowhere in the
/// remaining base text, or [`PatchError::HunkOutOfRange`] if the base is too
/// short to hold it at all.
pub fn apply_patch(base: &str, diff: Option<&ParsedDiff>) -> Result<String, PatchError> {
    let base = normalize_contents(base);
    let Some(diff) = diff.filter(|d| !d.hunks.is_empty()) else {
        return Ok(base);
    };

    let (base_lines, base_trailing_newline) = split_lines(&base);
    let mut out: Vec<&str> = Vec::with_capacity(base_lines.len());
    let mut cursor = 0usize;
    let mut drift = 0isize;
    let mut new_missing_newline = false;
    let mut old_missing_newline = false;

    for (index, hunk) in diff.hunks.iter().enumerate() {
        let expected: Vec<&str> = hunk
            .lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(t) | HunkLine::Removed(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        if expected.len() > base_lines.len() {
            return Err(PatchError::HunkOutOfRange {
                hunk: index,
                needed: expected.len(),
                available: base_lines.len(),
            });
        }

        let recorded = if hunk.old_lines == 0 {
            hunk.old_start
        } else {
            hunk.old_start.saturating_sub(1)
        };
        let nominal = recorded.saturating_add_signed(drift).max(cursor);
        let position = locate(&base_lines, &expected, nominal, cursor).ok_or(
            PatchError::ContextMismatch {
                hunk: index,
                old_start: hunk.old_start,
            },
        )?;
        drift = position as isize - recorded as isize;

        out.extend_from_slice(&base_lines[cursor..position]);
        let mut previous: Option<&HunkLine> = None;
        for line in &hunk.lines {
            match line {
                HunkLine::Context(t) | HunkLine::Added(t) => out.push(t.as_str()),
                HunkLine::Removed(_) => {}
                HunkLine::NoNewline => match previous {
                    Some(HunkLine::Added(_)) => new_missing_newline = true,
                    Some(HunkLine::Removed(_)) => old_missing_newline = true,
                    Some(HunkLine::Context(_)) => {
                        new_missing_newline = true;
                        old_missing_newline = true;
                    }
                    _ => {}
                },
            }
            previous = Some(line);
        }
        cursor = position + expected.len();
    }
    out.extend_from_slice(&base_lines[cursor..]);

    if out.is_empty() {
        return Ok(String::new());
    }
    let trailing_newline = if new_missing_newline {
        false
    } else if old_missing_newline {
        true
    } else {
        base_trailing_newline
    };

    let mut result = out.join("\n");
    if trailing_newline {
        result.push('\n');
    }
    Ok(result)
}

/// Find where `expected` occurs in `lines`, searching outward from `nominal`
/// and never before `floor`.
fn locate(lines: &[&str], expected: &[&str], nominal: usize, floor: usize) -> Option<usize> {
    let matches_at = |p: usize| {
        p >= floor && p + expected.len() <= lines.len() && lines[p..p + expected.len()] == *expected
    };
    let nominal = nominal.min(lines.len());
    if matches_at(nominal) {
        return Some(nominal);
    }
    for distance in 1..=lines.len() {
        if matches_at(nominal + distance) {
            return Some(nominal + distance);
        }
        if let Some(p) = nominal.checked_sub(distance)
            && matches_at(p)
        {
            return Some(p);
        }
    }
    None
}

// ============================================================================
// Synthesis
// ============================================================================

/// Unified diff text that adds `contents` as a new file at `path`, or removes
/// it when `reverse` is set.
#[must_use]
pub fn new_file_diff(path: &str, contents: &str, reverse: bool) -> String {
    let contents = normalize_contents(contents);
    let (old, new, old_name, new_name) = if reverse {
        (contents.as_str(), "", path, NO_FILE)
    } else {
        ("", contents.as_str(), NO_FILE, path)
    };
    let text = TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(old_name, new_name)
        .to_string();
    if text.is_empty() {
        format!("--- {old_name}\n+++ {new_name}\n")
    } else {
        text
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    /// Short texts over a tiny alphabet so that diffs share context lines
    fn text_strategy() -> impl Strategy<Value = String> {
        (
            proptest::collection::vec(proptest::string::string_regex("[ab]{0,2}").unwrap(), 0..12),
            any::<bool>(),
        )
            .prop_map(|(lines, trailing)| {
                let mut text = lines.join("\n");
                if trailing && !text.is_empty() {
                    text.push('\n');
                }
                text
            })
    }

    proptest! {
        #[test]
        fn apply_reproduces_target(old in text_strategy(), new in text_strategy()) {
            let text = TextDiff::from_lines(old.as_str(), new.as_str())
                .unified_diff()
                .header("f", "f")
                .to_string();
            let diffs = parse_patch(&text);
            let applied = apply_patch(&old, diffs.first()).expect("diff applies to its own base");
            prop_assert_eq!(applied, new);
        }

        #[test]
        fn new_file_diff_reconstructs_contents(contents in text_strategy()) {
            let diffs = parse_patch(&new_file_diff("f.txt", &contents, false));
            prop_assert_eq!(diffs.len(), 1);
            prop_assert_eq!(apply_patch("", diffs.first()).expect("apply"), contents.clone());
            let reverse = parse_patch(&new_file_diff("f.txt", &contents, true));
            prop_assert_eq!(apply_patch(&contents, reverse.first()).expect("apply"), "");
        }

        #[test]
        fn parse_never_panics(text in "(?s).{0,400}") {
            let _ = parse_patch(&text);
        }
    }
}

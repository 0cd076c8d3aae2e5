// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Fixtures for revcap integration tests: scratch directories and small git
//! repositories with a bare `origin` to push to

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};

// ============================================================================
// Scratch Directories
// ============================================================================

static NEXT_DIR: AtomicU32 = AtomicU32::new(0);

/// Directory under the system temp dir, removed on drop
pub struct TempTestDir {
    path: PathBuf,
}

impl TempTestDir {
    /// Fresh directory named after the test, the process and a counter
    pub fn new(label: &str) -> Self {
        let n = NEXT_DIR.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!("revcap-{label}-{}-{n}", std::process::id()));
        fs::create_dir_all(&path).expect("create scratch dir");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `content` to `relative`, creating parent directories
    pub fn write_file(&self, relative: &str, content: &str) -> PathBuf {
        let target = self.path.join(relative);
        fs::create_dir_all(target.parent().unwrap_or(&self.path)).expect("create parents");
        fs::write(&target, content).expect("write file");
        target
    }

    pub fn read_file(&self, relative: &str) -> String {
        fs::read_to_string(self.path.join(relative)).expect("read file")
    }
}

impl Drop for TempTestDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

// ============================================================================
// Repositories
// ============================================================================

/// A temporary git repository with an `origin` remote
pub struct TestGitRepo {
    temp_dir: TempTestDir,
    remote: TempTestDir,
}

impl TestGitRepo {
    /// Create and initialize a repository on branch `main`
    pub fn new(test_name: &str) -> Self {
        let temp_dir = TempTestDir::new(test_name);
        let remote = TempTestDir::new(&format!("{test_name}-origin"));
        run_git(remote.path(), &["init", "--bare", "-q"]);
        run_git(temp_dir.path(), &["init", "-q", "-b", "main"]);
        run_git(temp_dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(temp_dir.path(), &["config", "user.name", "Test Author"]);
        run_git(temp_dir.path(), &["config", "commit.gpgsign", "false"]);
        let remote_url = remote.path().display().to_string();
        run_git(temp_dir.path(), &["remote", "add", "origin", &remote_url]);
        Self { temp_dir, remote }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write a file without staging it
    pub fn write_file(&self, relative_path: &str, content: &str) -> &Self {
        self.temp_dir.write_file(relative_path, content);
        self
    }

    /// Read a working-copy file
    pub fn read_file(&self, relative_path: &str) -> String {
        self.temp_dir.read_file(relative_path)
    }

    /// Write a file and stage it
    pub fn create_file(&self, relative_path: &str, content: &str) -> &Self {
        self.temp_dir.write_file(relative_path, content);
        run_git(self.path(), &["add", relative_path]);
        self
    }

    /// Commit staged changes
    pub fn commit(&self, message: &str) -> String {
        run_git(self.path(), &["commit", "-q", "--allow-empty", "-m", message]);
        self.get_head_sha()
    }

    /// Commit as someone other than the configured user
    pub fn commit_as(&self, name: &str, email: &str, message: &str) -> String {
        let author = format!("{name} <{email}>");
        run_git(
            self.path(),
            &["commit", "-q", "--allow-empty", "--author", &author, "-m", message],
        );
        self.get_head_sha()
    }

    /// [`Self::create_file`] then [`Self::commit`]
    pub fn create_and_commit(&self, relative_path: &str, content: &str, message: &str) -> String {
        self.create_file(relative_path, content);
        self.commit(message)
    }

    /// Rename a tracked file in the index and working copy
    pub fn rename(&self, from: &str, to: &str) -> &Self {
        run_git(self.path(), &["mv", from, to]);
        self
    }

    /// Push `main` to `origin` and set it as upstream
    pub fn push(&self) -> &Self {
        run_git(self.path(), &["push", "-q", "-u", "origin", "main"]);
        self
    }

    /// Full sha of HEAD
    pub fn get_head_sha(&self) -> String {
        run_git(self.path(), &["rev-parse", "HEAD"]).trim().to_string()
    }

    /// Path of the bare `origin` repository
    pub fn remote_path(&self) -> &Path {
        self.remote.path()
    }
}

/// Run a git command, panicking with stderr on failure
pub fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

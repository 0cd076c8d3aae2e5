//! Integration tests for revcap-git
//!
//! These tests build small repositories with git2 and query them through
//! the git binary via [`GitService`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use git2::{Repository, Signature, Time};
use revcap_git::commit::EMPTY_TREE_SHA;
use revcap_git::service::BlameOptions;
use revcap_git::{FileStatus, GitService, WorkingTreeDiff, apply_patch, parse_patch};
use similar_asserts::assert_eq;

static COUNTER: AtomicU32 = AtomicU32::new(0);

const ME: (&str, &str) = ("Test Author", "test@example.com");
const OTHER: (&str, &str) = ("Other Author", "other@example.com");

/// A git2-built repository in a temporary directory
struct Fixture {
    path: PathBuf,
    repo: Repository,
    clock: i64,
}

impl Fixture {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "revcap-git-test-{name}-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        fs::create_dir_all(&path).expect("create temp dir");
        let repo = Repository::init(&path).expect("init repo");
        {
            let mut config = repo.config().expect("config");
            config.set_str("user.name", ME.0).expect("user.name");
            config.set_str("user.email", ME.1).expect("user.email");
        }
        Self {
            path,
            repo,
            clock: 1_700_000_000,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, relative: &str, content: &str) {
        let file = self.path.join(relative);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(file, content).expect("write file");
    }

    fn stage(&self, relative: &str) {
        let mut index = self.repo.index().expect("index");
        index.add_path(Path::new(relative)).expect("add path");
        index.write().expect("write index");
    }

    fn commit(&mut self, files: &[(&str, &str)], author: (&str, &str), message: &str) -> String {
        for (relative, content) in files {
            self.write(relative, content);
            self.stage(relative);
        }
        let mut index = self.repo.index().expect("index");
        let tree_id = index.write_tree().expect("write tree");
        let tree = self.repo.find_tree(tree_id).expect("find tree");
        self.clock += 60;
        let sig = Signature::new(author.0, author.1, &Time::new(self.clock, 0)).expect("sig");
        let parents = match self.repo.head() {
            Ok(head) => vec![head.peel_to_commit().expect("head commit")],
            Err(_) => Vec::new(),
        };
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .expect("commit")
            .to_string()
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

#[tokio::test]
async fn test_head_and_parents() {
    let mut fx = Fixture::new("head");
    let git = GitService::default();
    assert_eq!(git.head_sha(fx.path()).await.expect("head"), None);

    let first = fx.commit(&[("a.txt", "one\n")], ME, "first");
    let second = fx.commit(&[("a.txt", "two\n")], ME, "second");

    assert_eq!(git.head_sha(fx.path()).await.expect("head"), Some(second.clone()));
    assert_eq!(git.parent_shas(fx.path(), &second).await.expect("parents"), vec![first.clone()]);
    assert!(git.parent_shas(fx.path(), &first).await.expect("parents").is_empty());
    assert_eq!(git.root_commits(fx.path()).await.expect("roots"), vec![first]);
}

#[tokio::test]
async fn test_find_ancestor_by_other_author() {
    let mut fx = Fixture::new("ancestor");
    let theirs = fx.commit(&[("a.txt", "base\n")], OTHER, "theirs");
    fx.commit(&[("a.txt", "mine 1\n")], ME, "mine 1");
    fx.commit(&[("a.txt", "mine 2\n")], ME, "mine 2");
    let git = GitService::default();

    let found = git
        .find_ancestor(fx.path(), "HEAD", 100, |c| c.author_email != ME.1)
        .await
        .expect("walk")
        .expect("found");
    assert_eq!(found.sha, theirs);
    assert_eq!(found.author, OTHER.0);

    let none = git
        .find_ancestor(fx.path(), &theirs, 100, |_| true)
        .await
        .expect("walk");
    assert_eq!(none, None);
}

#[tokio::test]
async fn test_show_file_at_revision() {
    let mut fx = Fixture::new("show");
    let sha = fx.commit(&[("dir/a.txt", "hello\r\nworld\r\n")], ME, "crlf");
    let git = GitService::default();

    let contents = git
        .show_file_at_revision(fx.path(), &sha, "dir/a.txt")
        .await
        .expect("show");
    assert_eq!(contents.as_deref(), Some("hello\nworld\n"));

    let missing = git
        .show_file_at_revision(fx.path(), &sha, "nope.txt")
        .await
        .expect("show");
    assert_eq!(missing, None);

    let bad_sha = git
        .show_file_at_revision(fx.path(), "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef", "dir/a.txt")
        .await
        .expect("show");
    assert_eq!(bad_sha, None);

    let empty = git
        .show_file_at_revision(fx.path(), EMPTY_TREE_SHA, "dir/a.txt")
        .await
        .expect("show");
    assert_eq!(empty, None);
}

#[tokio::test]
async fn test_working_tree_diff_reconstructs_saved_file() {
    let mut fx = Fixture::new("worktree");
    let base = fx.commit(&[("a.txt", "line1\nline2\nline3\n")], ME, "base");
    fx.write("a.txt", "line1\nchanged\nline3\nline4");
    let git = GitService::default();

    let diffs = git
        .working_tree_diffs(fx.path(), &base, WorkingTreeDiff::saved_and_staged())
        .await
        .expect("diff");
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].new_file_name, "a.txt");

    let base_contents = git
        .show_file_at_revision(fx.path(), &base, "a.txt")
        .await
        .expect("show")
        .expect("exists");
    let saved = apply_patch(&base_contents, diffs.first()).expect("apply");
    assert_eq!(saved, "line1\nchanged\nline3\nline4");

    let reverse = git
        .working_tree_diffs(
            fx.path(),
            &base,
            WorkingTreeDiff::saved_and_staged().reversed(),
        )
        .await
        .expect("reverse diff");
    let back = apply_patch(&saved, reverse.first()).expect("apply reverse");
    assert_eq!(back, base_contents);
}

#[tokio::test]
async fn test_staged_only_diff_ignores_unstaged_edits() {
    let mut fx = Fixture::new("staged");
    let base = fx.commit(&[("a.txt", "a\n"), ("b.txt", "b\n")], ME, "base");
    fx.write("a.txt", "a staged\n");
    fx.stage("a.txt");
    fx.write("b.txt", "b unstaged\n");
    let git = GitService::default();

    let diffs = git
        .working_tree_diffs(fx.path(), &base, WorkingTreeDiff::new(false, true))
        .await
        .expect("diff");
    let names: Vec<&str> = diffs.iter().map(|d| d.new_file_name.as_str()).collect();
    assert_eq!(names, vec!["a.txt"]);

    let committed = git
        .working_tree_diffs(fx.path(), &base, WorkingTreeDiff::default())
        .await
        .expect("diff");
    assert!(committed.is_empty());
}

#[tokio::test]
async fn test_diff_new_file_for_untracked_file() {
    let mut fx = Fixture::new("newfile");
    fx.commit(&[("a.txt", "a\n")], ME, "base");
    fx.write("notes/new.txt", "fresh\ncontent\n");
    let git = GitService::default();

    let text = git
        .diff_new_file(fx.path(), "notes/new.txt", false)
        .await
        .expect("diff");
    let diffs = parse_patch(&text);
    assert_eq!(diffs.len(), 1);
    assert!(diffs[0].is_new_file());
    assert_eq!(apply_patch("", diffs.first()).expect("apply"), "fresh\ncontent\n");

    let err = git
        .diff_new_file(fx.path(), "missing.txt", false)
        .await
        .expect_err("missing file");
    assert!(err.to_string().contains("missing.txt"));
}

#[tokio::test]
async fn test_modified_files_reports_renames_and_untracked() {
    let mut fx = Fixture::new("status");
    let base = fx.commit(
        &[("keep.txt", "keep\n"), ("old.txt", "same content\nacross rename\n")],
        ME,
        "base",
    );
    fs::rename(fx.path().join("old.txt"), fx.path().join("new.txt")).expect("rename");
    fx.stage("new.txt");
    {
        let mut index = fx.repo.index().expect("index");
        index.remove_path(Path::new("old.txt")).expect("remove");
        index.write().expect("write index");
    }
    fx.write("keep.txt", "keep\nmore\n");
    fx.write("untracked.txt", "u1\nu2\nu3\n");
    let git = GitService::default();

    let files = git
        .modified_files(fx.path(), &base, true, true)
        .await
        .expect("status");

    let keep = files.iter().find(|f| f.file == "keep.txt").expect("keep.txt");
    assert_eq!(keep.status, FileStatus::Modified);
    assert_eq!((keep.lines_added, keep.lines_removed), (1, 0));

    let renamed = files.iter().find(|f| f.file == "new.txt").expect("new.txt");
    assert_eq!(renamed.status, FileStatus::Renamed);
    assert_eq!(renamed.old_file, "old.txt");

    let untracked = files
        .iter()
        .find(|f| f.file == "untracked.txt")
        .expect("untracked.txt");
    assert_eq!(untracked.status, FileStatus::Untracked);
    assert_eq!(untracked.lines_added, 3);
}

#[tokio::test]
async fn test_blame_revisions_across_authors() {
    let mut fx = Fixture::new("blame");
    let theirs = fx.commit(&[("a.txt", "one\ntwo\n")], OTHER, "theirs");
    let mine = fx.commit(&[("a.txt", "one\ntwo\nthree\n")], ME, "mine");
    let git = GitService::default();

    let revisions = git
        .blame_revisions(
            fx.path(),
            "a.txt",
            &BlameOptions {
                reference: Some("HEAD".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("blame");
    let shas: Vec<&str> = revisions.iter().map(|r| r.sha.as_str()).collect();
    assert_eq!(shas, vec![mine.as_str(), theirs.as_str()]);
    assert_eq!(revisions[1].author_email.as_deref(), Some(OTHER.1));
    assert_eq!(revisions[1].summary.as_deref(), Some("theirs"));

    let unsaved = git
        .blame_revisions(
            fx.path(),
            "a.txt",
            &BlameOptions {
                contents: Some("one\ntwo\nthree\nfour\n".to_string()),
                lines: Some((3, 40)),
                ..Default::default()
            },
        )
        .await
        .expect("blame buffer");
    assert!(unsaved.iter().any(|r| r.is_uncommitted() && r.author_name.is_none()));
    assert!(unsaved.iter().any(|r| r.sha == mine));
}

#[tokio::test]
async fn test_repository_metadata() {
    let mut fx = Fixture::new("meta");
    fx.commit(&[("a.txt", "a\n")], ME, "base");
    fx.repo
        .remote("origin", "https://example.invalid/repo.git")
        .expect("add remote");
    let git = GitService::default();

    assert_eq!(
        git.config(fx.path(), "user.email").await.expect("config"),
        Some(ME.1.to_string())
    );
    assert_eq!(git.config(fx.path(), "no.such.key").await.expect("config"), None);
    assert!(git.current_branch(fx.path()).await.expect("branch").is_some());
    assert_eq!(git.remotes(fx.path()).await.expect("remotes"), vec!["origin".to_string()]);
    assert_eq!(git.local_only_shas(fx.path()).await.expect("local"), None);

    let top = git
        .toplevel(&fx.path().join("."))
        .await
        .expect("toplevel")
        .expect("inside a repository");
    assert_eq!(
        top.canonicalize().expect("canonical"),
        fx.path().canonicalize().expect("canonical")
    );
}

#[tokio::test]
async fn test_empty_tree_diff_adds_every_file() {
    let mut fx = Fixture::new("emptytree");
    let sha = fx.commit(&[("a.txt", "a\n"), ("b.txt", "b\n")], ME, "base");
    let git = GitService::default();

    let diffs = git
        .ref_diffs(fx.path(), EMPTY_TREE_SHA, &sha)
        .await
        .expect("diff");
    assert_eq!(diffs.len(), 2);
    assert!(diffs.iter().all(|d| d.is_new_file()));
}

#[tokio::test]
async fn test_get_commit_and_log() {
    let mut fx = Fixture::new("log");
    let first = fx.commit(&[("a.txt", "1\n")], OTHER, "first");
    let second = fx.commit(&[("a.txt", "2\n")], ME, "second");
    let git = GitService::default();

    let commit = git
        .get_commit(fx.path(), &first)
        .await
        .expect("lookup")
        .expect("exists");
    assert_eq!(commit.author_email, OTHER.1);
    assert_eq!(commit.message, "first");

    let missing = git
        .get_commit(fx.path(), "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef")
        .await
        .expect("lookup");
    assert_eq!(missing, None);

    let log: Vec<String> = git
        .log(fx.path(), "HEAD", 10)
        .await
        .expect("log")
        .into_iter()
        .map(|c| c.sha)
        .collect();
    assert_eq!(log, vec![second, first]);
}

#[tokio::test]
async fn test_merge_base_and_rev_list() {
    let mut fx = Fixture::new("range");
    let first = fx.commit(&[("a.txt", "1\n")], ME, "first");
    let second = fx.commit(&[("a.txt", "2\n")], ME, "second");
    let third = fx.commit(&[("a.txt", "3\n")], ME, "third");
    let git = GitService::default();

    assert_eq!(
        git.merge_base(fx.path(), &first, &third).await.expect("merge-base"),
        Some(first.clone())
    );
    assert_eq!(
        git.merge_base(fx.path(), &first, "no-such-ref").await.expect("merge-base"),
        None
    );
    assert_eq!(
        git.rev_list(fx.path(), &format!("{first}..HEAD")).await.expect("rev-list"),
        vec![third, second]
    );
}

//! Checks that a review can be displayed from the local repositories

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use revcap_git::{EMPTY_TREE_SHA, GitError, GitService};
use tracing::{debug, info};

use crate::error::ReviewError;
use crate::models::Review;
use crate::repos::RepoRegistry;

/// Verify every repository of `review` is registered and every base commit
/// exists locally.
///
/// A missing commit triggers a single `fetch --all` per repository and one
/// retry of the lookup. Returns the working-copy root of each repository.
///
/// # Errors
///
/// Returns [`ReviewError::RepoNotFound`] for an unregistered repository and
/// [`ReviewError::CommitNotFound`] for a base commit that is still missing
/// after fetching. Left bases are checked before right bases.
pub async fn check_review(
    git: &GitService,
    registry: &RepoRegistry,
    review: &Review,
) -> Result<HashMap<String, PathBuf>, ReviewError> {
    let mut roots = HashMap::new();
    for repo_id in review.repo_ids() {
        let root = registry
            .path(repo_id)
            .await
            .ok_or_else(|| ReviewError::repo_not_found(repo_id))?;
        roots.insert(repo_id.to_string(), root);
    }

    let mut fetched: HashMap<&str, bool> = HashMap::new();
    for changeset in &review.changesets {
        let Some(root) = roots.get(&changeset.repo_id) else {
            continue;
        };
        let diffs = &changeset.diffs;
        for (sha, author) in [
            (&diffs.left_base_sha, &diffs.left_base_author),
            (&diffs.right_base_sha, &diffs.right_base_author),
        ] {
            if sha == EMPTY_TREE_SHA || commit_exists(git, root, sha).await? {
                continue;
            }

            let fetch_succeeded = match fetched.get(changeset.repo_id.as_str()) {
                Some(&result) => result,
                None => {
                    info!(repo_id = %changeset.repo_id, %sha, "commit missing, fetching remotes");
                    let result = git.fetch_all_remotes(root).await;
                    fetched.insert(changeset.repo_id.as_str(), result);
                    result
                }
            };
            if fetch_succeeded && commit_exists(git, root, sha).await? {
                debug!(%sha, "commit found after fetch");
                continue;
            }
            return Err(ReviewError::CommitNotFound {
                sha: sha.clone(),
                author: author.clone(),
            });
        }
    }

    Ok(roots)
}

async fn commit_exists(git: &GitService, root: &Path, sha: &str) -> Result<bool, GitError> {
    Ok(git.get_commit(root, sha).await?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{changeset, review};

    #[tokio::test]
    async fn test_unregistered_repo() {
        let r = review(vec![changeset("repo", 0, Vec::new())]);
        let err = check_review(&GitService::default(), &RepoRegistry::new(), &r)
            .await
            .expect_err("unregistered");
        assert_eq!(err.error_type(), "REPO_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_empty_tree_bases_need_no_lookup() {
        let mut c0 = changeset("repo", 0, Vec::new());
        c0.diffs.left_base_sha = EMPTY_TREE_SHA.to_string();
        c0.diffs.right_base_sha = EMPTY_TREE_SHA.to_string();
        let registry = RepoRegistry::new();
        registry.register("repo", "/nonexistent/repo").await;

        let roots = check_review(&GitService::default(), &registry, &review(vec![c0]))
            .await
            .expect("no git needed");
        assert_eq!(roots.get("repo"), Some(&PathBuf::from("/nonexistent/repo")));
    }
}

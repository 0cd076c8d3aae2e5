//! Repository registry: repo id to working-copy path

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use revcap_git::{GitError, GitService};
use tokio::sync::RwLock;
use tracing::debug;

/// Shared map of known repositories.
///
/// Ids default to the repository's root commit, which is the same in every
/// clone.
#[derive(Debug, Clone, Default)]
pub struct RepoRegistry {
    repos: Arc<RwLock<HashMap<String, PathBuf>>>,
}

impl RepoRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` under an explicit id
    pub async fn register(&self, repo_id: impl Into<String>, path: impl Into<PathBuf>) {
        self.repos.write().await.insert(repo_id.into(), path.into());
    }

    /// Register the repository containing `path`, keyed by its root commit.
    ///
    /// Returns the id, or `None` when `path` is not inside a repository or the
    /// repository has no commits.
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be run.
    pub async fn register_path(
        &self,
        git: &GitService,
        path: &Path,
    ) -> Result<Option<String>, GitError> {
        let Some(root) = git.toplevel(path).await? else {
            return Ok(None);
        };
        if let Some(id) = self.id_for_path(&root).await {
            return Ok(Some(id));
        }
        // rev-list lists newest first; the oldest root is the stable one.
        let Some(id) = git.root_commits(&root).await?.pop() else {
            return Ok(None);
        };
        debug!(repo_id = %id, path = %root.display(), "registered repository");
        self.register(id.clone(), root).await;
        Ok(Some(id))
    }

    /// Working-copy path of a repository
    pub async fn path(&self, repo_id: &str) -> Option<PathBuf> {
        self.repos.read().await.get(repo_id).cloned()
    }

    /// Id of the repository rooted at `path`
    pub async fn id_for_path(&self, path: &Path) -> Option<String> {
        self.repos
            .read()
            .await
            .iter()
            .find(|(_, p)| p.as_path() == path)
            .map(|(id, _)| id.clone())
    }

    /// Every registered id
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.repos.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = RepoRegistry::new();
        registry.register("abc", "/work/repo").await;
        assert_eq!(registry.path("abc").await, Some(PathBuf::from("/work/repo")));
        assert_eq!(
            registry.id_for_path(Path::new("/work/repo")).await,
            Some("abc".to_string())
        );
        assert_eq!(registry.path("missing").await, None);
        assert_eq!(registry.ids().await, vec!["abc".to_string()]);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let registry = RepoRegistry::new();
        let clone = registry.clone();
        clone.register("abc", "/work/repo").await;
        assert!(registry.path("abc").await.is_some());
    }
}

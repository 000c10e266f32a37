//! Repository mirror used to resolve GITHUB context nodes.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Errors from a repository mirror.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// The repository/branch checkout does not exist.
    #[error("Repository not found: {repo}@{branch}")]
    RepositoryNotFound {
        /// Repository.
        repo: String,
        /// Branch.
        branch: String,
    },
    /// The file path escapes the checkout or is absolute.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read access to mirrored repositories.
#[async_trait]
pub trait RepositoryMirror: Send + Sync {
    /// Bring the local copy of `repo@branch` up to date.
    async fn pull(&self, repo: &str, branch: &str) -> Result<(), MirrorError>;

    /// Read one file from the local copy.
    async fn read_file(&self, repo: &str, branch: &str, path: &str) -> Result<String, MirrorError>;
}

/// Mirror backed by checkouts laid out as `{root}/{repo}/{branch}/`.
///
/// Syncing the checkouts is someone else's job; `pull` only verifies the
/// checkout exists.
#[derive(Debug, Clone)]
pub struct FsRepositoryMirror {
    root: PathBuf,
}

impl FsRepositoryMirror {
    /// Create a mirror rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn checkout(&self, repo: &str, branch: &str) -> Result<PathBuf, MirrorError> {
        let repo_path = relative(repo)?;
        let branch_path = relative(branch)?;
        Ok(self.root.join(repo_path).join(branch_path))
    }
}

/// Accept only plain relative paths.
fn relative(raw: &str) -> Result<&Path, MirrorError> {
    let path = Path::new(raw);
    let plain = !raw.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)));
    if plain {
        Ok(path)
    } else {
        Err(MirrorError::InvalidPath(raw.to_string()))
    }
}

#[async_trait]
impl RepositoryMirror for FsRepositoryMirror {
    async fn pull(&self, repo: &str, branch: &str) -> Result<(), MirrorError> {
        let dir = self.checkout(repo, branch)?;
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {
                tracing::debug!(repo = repo, branch = branch, "Mirror checkout present");
                Ok(())
            }
            _ => Err(MirrorError::RepositoryNotFound {
                repo: repo.to_string(),
                branch: branch.to_string(),
            }),
        }
    }

    async fn read_file(&self, repo: &str, branch: &str, path: &str) -> Result<String, MirrorError> {
        let file = self.checkout(repo, branch)?.join(relative(path)?);
        Ok(tokio::fs::read_to_string(file).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("context-kernel-mirror-{}-{}", name, std::process::id()));
        let checkout = root.join("acme/app/main/src");
        std::fs::create_dir_all(&checkout).unwrap();
        std::fs::write(checkout.join("lib.rs"), "pub fn answer() -> u8 { 42 }").unwrap();
        root
    }

    #[tokio::test]
    async fn test_reads_checked_out_file() {
        let root = temp_root("read");
        let mirror = FsRepositoryMirror::new(&root);

        mirror.pull("acme/app", "main").await.unwrap();
        let content = mirror.read_file("acme/app", "main", "src/lib.rs").await.unwrap();
        assert!(content.contains("42"));

        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn test_missing_checkout() {
        let root = temp_root("missing");
        let mirror = FsRepositoryMirror::new(&root);

        let err = mirror.pull("acme/other", "main").await.unwrap_err();
        assert!(matches!(err, MirrorError::RepositoryNotFound { .. }));

        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let mirror = FsRepositoryMirror::new("/tmp");
        let err = mirror.read_file("acme/app", "main", "../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, MirrorError::InvalidPath(_)));

        let err = mirror.read_file("acme/app", "main", "/etc/passwd").await.unwrap_err();
        assert!(matches!(err, MirrorError::InvalidPath(_)));
    }
}

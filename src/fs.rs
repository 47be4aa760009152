//! File system abstraction for testability.

use async_trait::async_trait;
use std::path::Path;

/// File system operations used by transfers.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Returns true if `path` is an existing directory.
    async fn is_dir(&self, path: &Path) -> bool;

    /// Creates all directories in the given path.
    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()>;

    /// Creates `path`, truncating any existing file.
    async fn create_file(&self, path: &Path) -> std::io::Result<tokio::fs::File>;
}

/// Default file system implementation using `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    /// Creates a new `TokioFileSystem` instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn is_dir(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir())
    }

    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn create_file(&self, path: &Path) -> std::io::Result<tokio::fs::File> {
        tokio::fs::File::create(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn tokio_fs_is_dir() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.zip");
        std::fs::write(&file, b"x").unwrap();

        let fs = TokioFileSystem::new();
        assert!(fs.is_dir(dir.path()).await);
        assert!(!fs.is_dir(&file).await);
        assert!(!fs.is_dir(&dir.path().join("missing")).await);
    }

    #[tokio::test]
    async fn tokio_fs_create_dir_all() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b/c");

        let fs = TokioFileSystem::new();
        fs.create_dir_all(&nested).await.unwrap();
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn tokio_fs_create_file_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tile.zip");
        std::fs::write(&path, b"previous contents").unwrap();

        let fs = TokioFileSystem::new();
        let _file = fs.create_file(&path).await.unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }
}

//! A [`Filesystem`] implementation rooted at a single directory, used for
//! both the scratch and output trees a build writes into.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ruleforge_core::error::{BuildError, Result};
use ruleforge_core::traits::Filesystem;

/// Resolves every relative path against a fixed root and forbids escaping it
/// via `..` components, the way a cell-rooted filesystem must.
pub struct LocalFilesystem {
    root: PathBuf,
}

impl LocalFilesystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Filesystem for LocalFilesystem {
    fn resolve(&self, relative: &Path) -> Result<PathBuf> {
        if relative.is_absolute() {
            return Err(BuildError::Internal(format!(
                "rule inputs must be cell-relative, got absolute path `{}`",
                relative.display()
            )));
        }
        Ok(self.root.join(relative))
    }

    async fn exists(&self, relative: &Path) -> Result<bool> {
        let path = self.resolve(relative)?;
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn mkdirs(&self, relative: &Path) -> Result<()> {
        let path = self.resolve(relative)?;
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn delete_recursive(&self, relative: &Path) -> Result<()> {
        let path = self.resolve(relative)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&path).await?,
            Ok(_) => tokio::fs::remove_file(&path).await?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&from, &to).await?;
        Ok(())
    }

    async fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        let link = self.resolve(link)?;
        if let Some(parent) = link.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::symlink_metadata(&link).await {
            Ok(_) => tokio::fs::remove_file(&link).await?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        #[cfg(unix)]
        tokio::fs::symlink(target, &link).await?;
        #[cfg(not(unix))]
        tokio::fs::copy(target, &link).await.map(|_| ())?;
        Ok(())
    }

    async fn write_bytes(&self, relative: &Path, contents: &[u8]) -> Result<()> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
        Ok(())
    }

    async fn read_bytes(&self, relative: &Path) -> Result<Vec<u8>> {
        let path = self.resolve(relative)?;
        Ok(tokio::fs::read(path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem::new(dir.path());
        let rel = Path::new("pkg/out.txt");
        fs.write_bytes(rel, b"hello").await.unwrap();
        assert_eq!(fs.read_bytes(rel).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn absolute_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem::new(dir.path());
        let err = fs.resolve(Path::new("/etc/passwd")).unwrap_err();
        assert!(matches!(err, BuildError::Internal(_)));
    }

    #[tokio::test]
    async fn delete_recursive_on_missing_path_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem::new(dir.path());
        fs.delete_recursive(Path::new("never-existed")).await.unwrap();
    }
}

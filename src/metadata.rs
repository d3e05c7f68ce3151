use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

/// Hidden sibling holding the content type of the resource named by the
/// rest of the file name.
pub const SIDECAR_PREFIX: &str = ".~content-type~";

/// Out-of-band metadata kept next to stored resources.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn write(&self, resource: &Path, content_type: &str) -> io::Result<()>;

    /// `None` when nothing was recorded or it cannot be read.
    async fn read(&self, resource: &Path) -> Option<String>;

    /// Removing metadata that does not exist succeeds.
    async fn remove(&self, resource: &Path) -> io::Result<()>;

    /// Whether a directory entry belongs to the store rather than the user.
    fn is_metadata_entry(&self, entry_name: &str) -> bool;

    /// Files the store keeps for `resource`, so callers can chown them.
    fn files_for(&self, resource: &Path) -> Vec<PathBuf>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SidecarMetadataStore;

impl SidecarMetadataStore {
    pub fn sidecar_path(resource: &Path) -> io::Result<PathBuf> {
        let name = resource.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", resource.display()),
            )
        })?;

        let mut sidecar_name = std::ffi::OsString::from(SIDECAR_PREFIX);
        sidecar_name.push(name);
        Ok(resource.with_file_name(sidecar_name))
    }

    pub fn is_sidecar(entry_name: &str) -> bool {
        entry_name.starts_with(SIDECAR_PREFIX)
    }
}

#[async_trait]
impl MetadataStore for SidecarMetadataStore {
    async fn write(&self, resource: &Path, content_type: &str) -> io::Result<()> {
        fs::write(Self::sidecar_path(resource)?, content_type).await
    }

    async fn read(&self, resource: &Path) -> Option<String> {
        let path = Self::sidecar_path(resource).ok()?;
        match fs::read_to_string(&path).await {
            Ok(content_type) => Some(content_type),
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!("Failed to read {}: {}", path.display(), e);
                }
                None
            }
        }
    }

    async fn remove(&self, resource: &Path) -> io::Result<()> {
        match fs::remove_file(Self::sidecar_path(resource)?).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn is_metadata_entry(&self, entry_name: &str) -> bool {
        Self::is_sidecar(entry_name)
    }

    fn files_for(&self, resource: &Path) -> Vec<PathBuf> {
        Self::sidecar_path(resource).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sidecar_path() {
        let path = SidecarMetadataStore::sidecar_path(Path::new("/data/docs/notes.txt")).unwrap();
        assert_eq!(
            path,
            PathBuf::from(format!("/data/docs/{}notes.txt", SIDECAR_PREFIX))
        );
        assert!(SidecarMetadataStore::is_sidecar(
            path.file_name().unwrap().to_str().unwrap()
        ));
        assert!(!SidecarMetadataStore::is_sidecar("notes.txt"));
        assert!(!SidecarMetadataStore::is_sidecar(".hidden"));
    }

    #[tokio::test]
    async fn test_write_read_remove() {
        let temp = TempDir::new().unwrap();
        let resource = temp.path().join("pic.png");
        let store = SidecarMetadataStore;

        assert_eq!(store.read(&resource).await, None);

        store.write(&resource, "image/png; q=1").await.unwrap();
        assert_eq!(store.read(&resource).await.as_deref(), Some("image/png; q=1"));

        store.remove(&resource).await.unwrap();
        assert_eq!(store.read(&resource).await, None);

        // Already gone
        store.remove(&resource).await.unwrap();
    }
}

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;

use crate::ancestry::{self, Owner};
use crate::error::{ServerError, ServerResult};
use crate::etag::{Conditional, EntityTag, Preconditions, RequestKind};
use crate::metadata::MetadataStore;
use crate::path::StoragePath;
use crate::resource::{FileBody, Resource};

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// What a storage operation produced, ready to be put on the wire.
#[derive(Debug)]
pub enum StorageReply {
    Listing {
        etag: EntityTag,
        entries: BTreeMap<String, String>,
    },
    Content {
        etag: EntityTag,
        content_type: String,
        body: FileBody,
    },
    Written {
        etag: EntityTag,
    },
    Deleted {
        etag: EntityTag,
    },
    NotModified {
        etag: EntityTag,
    },
}

/// One user's storage, rooted at `root`.
pub struct Storage {
    root: PathBuf,
    metadata: Arc<dyn MetadataStore>,
    owner: Option<Owner>,
}

impl Storage {
    pub fn new(root: PathBuf, metadata: Arc<dyn MetadataStore>, owner: Option<Owner>) -> Self {
        Self {
            root,
            metadata,
            owner,
        }
    }

    fn not_found(path: &StoragePath) -> ServerError {
        ServerError::NotFound(format!("{}{}", path.user(), path.rooted()))
    }

    pub async fn list(
        &self,
        path: &StoragePath,
        preconditions: &Preconditions,
    ) -> ServerResult<StorageReply> {
        let target = path.resolve(&self.root);
        let collection = match Resource::stat(&target).await? {
            Some(resource) if resource.is_collection() => resource,
            _ => return Err(Self::not_found(path)),
        };

        let mut entries = BTreeMap::new();
        let mut read_dir = fs::read_dir(&target).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.metadata.is_metadata_entry(&name) {
                continue;
            }

            // Entries may vanish between readdir and stat
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            let name = if metadata.is_dir() { format!("{}/", name) } else { name };
            let modified = EntityTag::from_metadata(&metadata)?;
            entries.insert(name, modified.as_str().trim_matches('"').to_string());
        }

        if entries.is_empty() {
            return Err(Self::not_found(path));
        }

        let etag = collection.etag()?;
        match preconditions.evaluate(RequestKind::Read, Some(&etag)) {
            Conditional::NotModified => Ok(StorageReply::NotModified { etag }),
            _ => Ok(StorageReply::Listing { etag, entries }),
        }
    }

    pub async fn read(
        &self,
        path: &StoragePath,
        preconditions: &Preconditions,
    ) -> ServerResult<StorageReply> {
        let target = path.resolve(&self.root);
        let resource = Resource::stat(&target)
            .await?
            .filter(|resource| !resource.is_collection());
        let current = resource.as_ref().map(Resource::etag).transpose()?;

        if preconditions.evaluate(RequestKind::Read, current.as_ref()) == Conditional::NotModified {
            if let Some(etag) = current {
                return Ok(StorageReply::NotModified { etag });
            }
        }

        let (Some(resource), Some(etag)) = (resource, current) else {
            return Err(Self::not_found(path));
        };

        let content_type = self
            .metadata
            .read(&target)
            .await
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let body = resource.open().await?;

        Ok(StorageReply::Content {
            etag,
            content_type,
            body,
        })
    }

    pub async fn write(
        &self,
        path: &StoragePath,
        body: &[u8],
        content_type: Option<&str>,
        preconditions: &Preconditions,
    ) -> ServerResult<StorageReply> {
        if path.is_collection() {
            return Err(ServerError::MalformedRequest(format!(
                "cannot write to collection {}",
                path.rooted()
            )));
        }

        let target = path.resolve(&self.root);
        let existing = Resource::stat(&target).await?;
        if existing.as_ref().is_some_and(Resource::is_collection) {
            return Err(ServerError::Unsupported(format!(
                "{} is a collection",
                path.rooted()
            )));
        }

        let current = existing.as_ref().map(Resource::etag).transpose()?;
        if preconditions.evaluate(RequestKind::Write, current.as_ref())
            == Conditional::PreconditionFailed
        {
            return Err(ServerError::PreconditionFailed);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, body).await?;

        let content_type = content_type.unwrap_or(DEFAULT_CONTENT_TYPE);
        if let Err(e) = self.metadata.write(&target, content_type).await {
            tracing::warn!(
                "Failed to record content type of {}: {}",
                target.display(),
                e
            );
        }

        ancestry::touch_ancestors(&self.root, path.segments()).await?;

        if let Some(owner) = self.owner {
            let mut files = vec![target.clone()];
            files.extend(self.metadata.files_for(&target));
            ancestry::chown_ancestors(&self.root, path.segments(), &files, owner).await;
        }

        let written = Resource::stat(&target)
            .await?
            .ok_or_else(|| Self::not_found(path))?;

        Ok(StorageReply::Written {
            etag: written.etag()?,
        })
    }

    pub async fn delete(
        &self,
        path: &StoragePath,
        preconditions: &Preconditions,
    ) -> ServerResult<StorageReply> {
        if path.is_collection() {
            return Err(ServerError::MalformedRequest(format!(
                "cannot delete collection {}",
                path.rooted()
            )));
        }

        let target = path.resolve(&self.root);
        let resource = Resource::stat(&target)
            .await?
            .filter(|resource| !resource.is_collection());
        let current = resource.as_ref().map(Resource::etag).transpose()?;

        if preconditions.evaluate(RequestKind::Delete, current.as_ref())
            == Conditional::PreconditionFailed
        {
            return Err(ServerError::PreconditionFailed);
        }

        let Some(etag) = current else {
            return Err(Self::not_found(path));
        };

        match fs::remove_file(&target).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(Self::not_found(path)),
            other => other?,
        }

        if let Err(e) = self.metadata.remove(&target).await {
            tracing::warn!(
                "Failed to remove content type of {}: {}",
                target.display(),
                e
            );
        }

        ancestry::touch_ancestors(&self.root, path.segments()).await?;
        ancestry::prune_empty_ancestors(&self.root, path.segments()).await?;

        Ok(StorageReply::Deleted { etag })
    }
}

//! Directory-backed object store.
//!
//! Layout under the root:
//! - `{bucket}/{key}`: object bytes
//! - `.content-types/{bucket}/{key}`: content type, when one was given

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::StorageError;
use crate::store::traits::{ObjectStore, PutObject, StoredObject, WriteAck};

const CONTENT_TYPE_DIR: &str = ".content-types";

pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(safe_relative(bucket)?).join(safe_relative(key)?))
    }

    fn content_type_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        Ok(self
            .root
            .join(CONTENT_TYPE_DIR)
            .join(safe_relative(bucket)?)
            .join(safe_relative(key)?))
    }
}

/// Reject names that would escape the root.
fn safe_relative(name: &str) -> Result<&Path, StorageError> {
    let path = Path::new(name);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if name.is_empty() || escapes {
        return Err(StorageError::Io(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("unsafe object path: {name:?}"),
        )));
    }
    Ok(path)
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError> {
        let path = self.object_path(bucket, key)?;
        let body = match fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let content_type = match fs::read_to_string(self.content_type_path(bucket, key)?).await {
            Ok(ct) => Some(ct),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Ok(StoredObject { body, content_type })
    }

    async fn put(&self, request: PutObject) -> Result<WriteAck, StorageError> {
        let path = self.object_path(&request.bucket, &request.key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &request.body).await?;

        let ct_path = self.content_type_path(&request.bucket, &request.key)?;
        match &request.content_type {
            Some(ct) => {
                if let Some(parent) = ct_path.parent() {
                    fs::create_dir_all(parent).await?;
                }
                fs::write(&ct_path, ct).await?;
            }
            None => match fs::remove_file(&ct_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }

        debug!(path = %path.display(), bytes = request.body.len(), "Wrote object");
        Ok(WriteAck::for_put(&request))
    }
}

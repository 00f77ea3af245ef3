//! `ObjectStore` trait: the only way the pipeline reads or writes objects.

use async_trait::async_trait;

use crate::error::StorageError;

/// An object read from a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

/// A write request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObject {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

/// Acknowledgement of a completed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAck {
    pub bucket: String,
    pub key: String,
    pub bytes: usize,
}

impl WriteAck {
    pub fn for_put(put: &PutObject) -> Self {
        Self {
            bucket: put.bucket.clone(),
            key: put.key.clone(),
            bytes: put.body.len(),
        }
    }
}

/// Backend-agnostic object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read an object. Fails with `StorageError::NotFound` when absent.
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError>;

    /// Write (or overwrite) an object.
    async fn put(&self, request: PutObject) -> Result<WriteAck, StorageError>;
}

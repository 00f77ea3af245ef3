//! In-memory object store. Records every write in order.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StorageError;
use crate::store::traits::{ObjectStore, PutObject, StoredObject, WriteAck};

#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<(String, String), StoredObject>>,
    puts: RwLock<Vec<PutObject>>,
    /// Buckets that reject every write.
    read_only: RwLock<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without recording a write.
    pub async fn insert(
        &self,
        bucket: &str,
        key: &str,
        body: impl Into<Vec<u8>>,
        content_type: Option<&str>,
    ) {
        self.objects.write().await.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: body.into(),
                content_type: content_type.map(str::to_string),
            },
        );
    }

    /// Make every write to `bucket` fail.
    pub async fn reject_writes_to(&self, bucket: &str) {
        self.read_only.write().await.push(bucket.to_string());
    }

    /// Every write so far, oldest first.
    pub async fn puts(&self) -> Vec<PutObject> {
        self.puts.read().await.clone()
    }

    /// Current contents of an object, if present.
    pub async fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError> {
        self.object(bucket, key)
            .await
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put(&self, request: PutObject) -> Result<WriteAck, StorageError> {
        if self.read_only.read().await.contains(&request.bucket) {
            return Err(StorageError::WriteFailed {
                bucket: request.bucket,
                key: request.key,
                reason: "bucket is read-only".into(),
            });
        }

        let ack = WriteAck::for_put(&request);
        debug!(bucket = %ack.bucket, key = %ack.key, bytes = ack.bytes, "Stored object in memory");
        self.objects.write().await.insert(
            (request.bucket.clone(), request.key.clone()),
            StoredObject {
                body: request.body.clone(),
                content_type: request.content_type.clone(),
            },
        );
        self.puts.write().await.push(request);
        Ok(ack)
    }
}

//! Blob store interface

use std::sync::Arc;
use std::time::Duration;

use crate::config::StorageConfig;
use crate::error::StorageError;

/// Outcome of bucket creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    Created,
    AlreadyExists,
}

/// The three object-store calls the connector relies on
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Create a bucket; an existing bucket is not an error
    async fn create_bucket(&self, bucket: &str) -> Result<BucketStatus, StorageError>;

    /// Store bytes under `key`, replacing any previous object
    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>)
        -> Result<(), StorageError>;

    /// Credential-free GET URL for `key`, valid for `ttl`
    async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, StorageError>;
}

/// Opens a blob store client from credentials
#[async_trait::async_trait]
pub trait BlobStoreFactory: Send + Sync {
    async fn open(&self, config: &StorageConfig) -> Result<Arc<dyn BlobStore>, StorageError>;
}

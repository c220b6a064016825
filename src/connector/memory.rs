//! In-process blob store
//!
//! Backs `S3_PROVIDER=memory` and the connector tests. Cloning shares the
//! same underlying buckets.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::config::StorageConfig;
use crate::error::StorageError;

use super::blob_store::{BlobStore, BlobStoreFactory, BucketStatus};

const URL_SCHEME: &str = "memory://";

#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<RwLock<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    /// bucket -> object key -> bytes
    buckets: HashMap<String, HashMap<String, Vec<u8>>>,
    put_calls: usize,
    /// Number of upcoming `put_object` calls that fail
    failing_puts: u32,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` `put_object` calls fail
    pub async fn fail_next_puts(&self, count: u32) {
        self.inner.write().await.failing_puts = count;
    }

    /// Number of `put_object` calls received, failed ones included
    pub async fn put_calls(&self) -> usize {
        self.inner.read().await.put_calls
    }

    pub async fn bucket_exists(&self, bucket: &str) -> bool {
        self.inner.read().await.buckets.contains_key(bucket)
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let inner = self.inner.read().await;
        inner.buckets.get(bucket)?.get(key).cloned()
    }

    pub async fn object_count(&self, bucket: &str) -> usize {
        let inner = self.inner.read().await;
        inner.buckets.get(bucket).map(|b| b.len()).unwrap_or(0)
    }

    /// Split a URL issued by this store into bucket and object key
    pub fn parse_url(url: &str) -> Option<(String, String)> {
        let rest = url.strip_prefix(URL_SCHEME)?;
        let path = rest.split('?').next()?;
        let (bucket, key) = path.split_once('/')?;
        Some((bucket.to_string(), key.to_string()))
    }

    /// Fetch the object a presigned URL points at
    pub async fn resolve(&self, url: &str) -> Option<Vec<u8>> {
        let (bucket, key) = Self::parse_url(url)?;
        self.object(&bucket, &key).await
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn create_bucket(&self, bucket: &str) -> Result<BucketStatus, StorageError> {
        let mut inner = self.inner.write().await;
        if inner.buckets.contains_key(bucket) {
            return Ok(BucketStatus::AlreadyExists);
        }
        inner.buckets.insert(bucket.to_string(), HashMap::new());
        Ok(BucketStatus::Created)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        inner.put_calls += 1;

        if inner.failing_puts > 0 {
            inner.failing_puts -= 1;
            return Err(StorageError::SdkError(format!(
                "Injected failure storing {}",
                key
            )));
        }

        let objects = inner
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        let inner = self.inner.read().await;
        let exists = inner
            .buckets
            .get(bucket)
            .map(|objects| objects.contains_key(key))
            .unwrap_or(false);
        if !exists {
            return Err(StorageError::ObjectNotFound(key.to_string()));
        }

        Ok(format!(
            "{}{}/{}?expires_in={}",
            URL_SCHEME,
            bucket,
            key,
            ttl.as_secs()
        ))
    }
}

#[async_trait::async_trait]
impl BlobStoreFactory for MemoryBlobStore {
    async fn open(&self, _config: &StorageConfig) -> Result<Arc<dyn BlobStore>, StorageError> {
        Ok(Arc::new(self.clone()))
    }
}

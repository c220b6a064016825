//! Storage connector
//!
//! Bridges `FILE_UPLOAD` requests to an S3-compatible blob store and answers
//! with presigned `FILE_DOWNLOAD` URLs. Supports MinIO, Storj, Cloudflare R2,
//! Backblaze B2, AWS S3 and an in-process store.

mod blob_store;
mod memory;
mod retry;
mod s3;
mod storage_connector;

pub use blob_store::{BlobStore, BlobStoreFactory, BucketStatus};
pub use memory::MemoryBlobStore;
pub use retry::{with_retry, RetryPolicy};
pub use s3::{S3BlobStore, S3Factory};
pub use storage_connector::{object_name, ConnectionState, StorageConnector};

use crate::error::{RuntimeError, StorageError};
use crate::protocol::{Performative, ProtocolError};

/// Connector error types
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Connector is not connected")]
    NotConnected,

    #[error("Unsupported performative: {0}")]
    UnsupportedPerformative(Performative),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Outbound channel error: {0}")]
    Outbox(#[from] RuntimeError),
}

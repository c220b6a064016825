//! Storage connector lifecycle and upload handling

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::config::{ConnectorConfig, StorageConfig};
use crate::protocol::{validate, Body, Envelope, ErrorCode, Performative, ProtocolError};
use crate::runtime::{Connectable, MessageHandler, Outbox};

use super::blob_store::{BlobStore, BlobStoreFactory, BucketStatus};
use super::retry::{with_retry, RetryPolicy};
use super::ConnectorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Object name for stored content: `key.ext`, or just `key` when the file
/// name has no extension
pub fn object_name(key: &str, filename: &str) -> String {
    match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{}.{}", key, ext),
        _ => key.to_string(),
    }
}

/// Settings every upload job needs, cloned into worker tasks
#[derive(Debug, Clone)]
struct UploadContext {
    bucket: String,
    url_ttl: Duration,
    retry: RetryPolicy,
}

/// Bridges `FILE_UPLOAD` requests to a blob store
pub struct StorageConnector {
    connection_id: String,
    storage: StorageConfig,
    factory: Arc<dyn BlobStoreFactory>,
    store: Option<Arc<dyn BlobStore>>,
    context: UploadContext,
    max_workers: usize,
    workers: Arc<Semaphore>,
    outbox: Outbox,
}

impl StorageConnector {
    pub fn new(
        config: ConnectorConfig,
        storage: StorageConfig,
        factory: Arc<dyn BlobStoreFactory>,
        outbox: Outbox,
    ) -> Self {
        let max_workers = config.max_workers.max(1);
        let context = UploadContext {
            bucket: storage.bucket.clone(),
            url_ttl: Duration::from_secs(config.url_ttl_secs),
            retry: RetryPolicy::from_config(&config),
        };

        Self {
            connection_id: config.connection_id,
            storage,
            factory,
            store: None,
            context,
            max_workers,
            workers: Arc::new(Semaphore::new(max_workers)),
            outbox,
        }
    }

    /// Address this connector receives uploads on
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn state(&self) -> ConnectionState {
        if self.store.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Store the upload and build the `FILE_DOWNLOAD` reply without sending it
    pub async fn upload(&self, envelope: &Envelope) -> Result<Envelope, ConnectorError> {
        let store = self.store.as_ref().ok_or(ConnectorError::NotConnected)?;
        store_and_presign(store.as_ref(), &self.context, envelope).await
    }

    /// Wait until every in-flight store/presign job has finished
    pub async fn wait_idle(&self) {
        if let Ok(permits) = self.workers.acquire_many(self.max_workers as u32).await {
            drop(permits);
        }
    }
}

#[async_trait::async_trait]
impl Connectable for StorageConnector {
    type Error = ConnectorError;

    async fn connect(&mut self) -> Result<(), ConnectorError> {
        let store = self.factory.open(&self.storage).await?;
        let bucket = self.context.bucket.clone();

        tracing::info!(bucket = %bucket, "Ensuring bucket exists");
        let status = with_retry(&self.context.retry, "create_bucket", || {
            store.create_bucket(&bucket)
        })
        .await?;

        match status {
            BucketStatus::Created => tracing::info!(bucket = %bucket, "Created bucket"),
            BucketStatus::AlreadyExists => tracing::info!(bucket = %bucket, "Bucket already exists"),
        }

        self.store = Some(store);
        tracing::info!(connection_id = %self.connection_id, "Storage connector connected");
        Ok(())
    }

    async fn disconnect(&mut self) {
        // In-flight jobs keep their own handle and finish on their own.
        if self.store.take().is_some() {
            tracing::info!(connection_id = %self.connection_id, "Storage connector disconnected");
        }
    }

    fn is_connected(&self) -> bool {
        self.store.is_some()
    }
}

#[async_trait::async_trait]
impl MessageHandler for StorageConnector {
    type Error = ConnectorError;

    /// Accept one inbound envelope.
    ///
    /// Inconsistent messages are logged and dropped. Anything other than
    /// `FILE_UPLOAD` is rejected with `UnsupportedPerformative`. Uploads run
    /// on the worker pool; when every worker is busy this waits for one.
    async fn handle(&self, envelope: Envelope) -> Result<(), ConnectorError> {
        let store = self.store.clone().ok_or(ConnectorError::NotConnected)?;

        if !envelope.message.is_consistent() {
            return Ok(());
        }

        let performative = envelope.performative();
        if performative != Performative::FileUpload {
            tracing::error!(
                sender = %envelope.sender,
                performative = %performative,
                "Unsupported performative"
            );
            return Err(ConnectorError::UnsupportedPerformative(performative));
        }

        // Replies take message_id + 1, which must stay a valid id
        if envelope.message.message_id() >= i64::MAX as u64 {
            tracing::error!(
                sender = %envelope.sender,
                message_id = envelope.message.message_id(),
                "No message id left for a reply, dropping upload"
            );
            return Ok(());
        }

        tracing::debug!(
            sender = %envelope.sender,
            key = envelope.message.key().unwrap_or_default(),
            "Upload request received"
        );

        let permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ConnectorError::NotConnected)?;
        let context = self.context.clone();
        let outbox = self.outbox.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let reply = match store_and_presign(store.as_ref(), &context, &envelope).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!(
                        key = envelope.message.key().unwrap_or_default(),
                        filename = envelope.message.filename().unwrap_or_default(),
                        "Upload failed: {}",
                        e
                    );
                    match failure_reply(&envelope, &e) {
                        Ok(reply) => reply,
                        Err(e) => {
                            tracing::error!("Could not build failure reply: {}", e);
                            return;
                        }
                    }
                }
            };

            if let Err(e) = outbox.send(reply) {
                tracing::error!("Could not deliver upload reply: {}", e);
            }
        });

        Ok(())
    }
}

async fn store_and_presign(
    store: &dyn BlobStore,
    context: &UploadContext,
    envelope: &Envelope,
) -> Result<Envelope, ConnectorError> {
    let (content, filename, key) = match envelope.message.body() {
        Body::FileUpload {
            content,
            filename,
            key,
        } => (content, filename, key),
        other => return Err(ConnectorError::UnsupportedPerformative(other.performative())),
    };

    let object = object_name(key, filename);
    let bucket = context.bucket.as_str();

    with_retry(&context.retry, "put_object", || {
        store.put_object(bucket, &object, content.clone())
    })
    .await?;

    let access_url = with_retry(&context.retry, "presign", || {
        store.presigned_url(bucket, &object, context.url_ttl)
    })
    .await?;

    tracing::info!(
        object = %object,
        bytes = content.len(),
        "Stored object and issued access URL"
    );

    let reply = envelope.reply(Body::FileDownload {
        access_url,
        content: content.clone(),
    });
    validate(&reply.message)?;

    Ok(reply)
}

/// `ERROR` reply telling the uploader its content did not reach the store
fn failure_reply(envelope: &Envelope, error: &ConnectorError) -> Result<Envelope, ProtocolError> {
    let mut error_data = BTreeMap::new();
    if let Some(key) = envelope.message.key() {
        error_data.insert("key".to_string(), key.as_bytes().to_vec());
    }
    if let Some(filename) = envelope.message.filename() {
        error_data.insert("filename".to_string(), filename.as_bytes().to_vec());
    }

    let reply = envelope.reply(Body::Error {
        error_code: ErrorCode::StorageFailure,
        error_msg: error.to_string(),
        error_data,
    });
    validate(&reply.message)?;

    Ok(reply)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::Config;
    use crate::connector::MemoryBlobStore;
    use crate::error::StorageError;
    use crate::protocol::{DialogueReference, Message};
    use crate::registry::ResultRegistry;
    use crate::runtime::{channel, Inbox};

    const UPLOADER: &str = "skill/file_uploader";
    const CONNECTOR: &str = "connection/storage";

    fn connector(store: &MemoryBlobStore) -> (StorageConnector, Inbox) {
        let config = Config::default();
        let mut settings = config.connector;
        settings.retry_backoff_ms = 1;
        let (outbox, inbox) = channel();
        let connector =
            StorageConnector::new(settings, config.storage, Arc::new(store.clone()), outbox);
        (connector, inbox)
    }

    fn upload(content: &[u8], filename: &str, key: &str) -> Envelope {
        Envelope::new(
            CONNECTOR,
            UPLOADER,
            Message::file_upload(content.to_vec(), filename, key),
        )
    }

    fn upload_with_id(message_id: u64) -> Envelope {
        Envelope::new(
            CONNECTOR,
            UPLOADER,
            Message::new(
                DialogueReference::new("d", ""),
                message_id,
                1,
                Body::FileUpload {
                    content: b"x".to_vec(),
                    filename: "x.txt".to_string(),
                    key: "X".to_string(),
                },
            ),
        )
    }

    /// Store whose puts block until released, tracking concurrency
    #[derive(Clone)]
    struct GatedStore {
        inner: Arc<GatedInner>,
    }

    struct GatedInner {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        completed: AtomicUsize,
        gate: Semaphore,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: Arc::new(GatedInner {
                    in_flight: AtomicUsize::new(0),
                    peak: AtomicUsize::new(0),
                    completed: AtomicUsize::new(0),
                    gate: Semaphore::new(0),
                }),
            }
        }

        fn release(&self, puts: usize) {
            self.inner.gate.add_permits(puts);
        }

        fn in_flight(&self) -> usize {
            self.inner.in_flight.load(Ordering::SeqCst)
        }

        fn peak(&self) -> usize {
            self.inner.peak.load(Ordering::SeqCst)
        }

        fn completed(&self) -> usize {
            self.inner.completed.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl BlobStore for GatedStore {
        async fn create_bucket(&self, _bucket: &str) -> Result<BucketStatus, StorageError> {
            Ok(BucketStatus::Created)
        }

        async fn put_object(
            &self,
            _bucket: &str,
            _key: &str,
            _data: Vec<u8>,
        ) -> Result<(), StorageError> {
            let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.inner.peak.fetch_max(now, Ordering::SeqCst);
            if let Ok(permit) = self.inner.gate.acquire().await {
                permit.forget();
            }
            self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn presigned_url(
            &self,
            bucket: &str,
            key: &str,
            _ttl: Duration,
        ) -> Result<String, StorageError> {
            Ok(format!("memory://{}/{}", bucket, key))
        }
    }

    #[async_trait::async_trait]
    impl BlobStoreFactory for GatedStore {
        async fn open(&self, _config: &StorageConfig) -> Result<Arc<dyn BlobStore>, StorageError> {
            Ok(Arc::new(self.clone()))
        }
    }

    #[test]
    fn test_object_name() {
        assert_eq!(object_name("abc", "a.txt"), "abc.txt");
        assert_eq!(object_name("abc", "./upload_dir/archive.tar.gz"), "abc.gz");
        assert_eq!(object_name("abc", "./dir.v2/README"), "abc");
        assert_eq!(object_name("abc", ".bashrc"), "abc");
    }

    #[tokio::test]
    async fn test_connect_creates_bucket_once() {
        let store = MemoryBlobStore::new();
        let (mut connector, _inbox) = connector(&store);
        assert_eq!(connector.state(), ConnectionState::Disconnected);

        connector.connect().await.unwrap();
        assert_eq!(connector.state(), ConnectionState::Connected);
        assert!(store.bucket_exists("uploads").await);

        connector.disconnect().await;
        assert!(!connector.is_connected());

        // Reconnecting against an existing bucket is not an error
        connector.connect().await.unwrap();
        assert!(connector.is_connected());
    }

    #[tokio::test]
    async fn test_upload_round_trip() {
        let store = MemoryBlobStore::new();
        let (mut connector, _inbox) = connector(&store);
        connector.connect().await.unwrap();

        let request = upload(b"hello", "a.txt", "H");
        let reply = connector.upload(&request).await.unwrap();

        assert_eq!(reply.performative(), Performative::FileDownload);
        assert_eq!(reply.message.content(), Some(&b"hello"[..]));
        assert_eq!(reply.to, UPLOADER);
        assert_eq!(reply.sender, CONNECTOR);
        assert_eq!(
            reply.message.dialogue_reference(),
            request.message.dialogue_reference()
        );
        assert_eq!(reply.message.target(), request.message.message_id());

        let url = reply.message.access_url().unwrap();
        assert_eq!(
            MemoryBlobStore::parse_url(url),
            Some(("uploads".to_string(), "H.txt".to_string()))
        );
        assert!(url.ends_with("expires_in=604800"));
        assert_eq!(store.resolve(url).await, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_handle_sends_reply_through_outbox() {
        let store = MemoryBlobStore::new();
        let (mut connector, mut inbox) = connector(&store);
        connector.connect().await.unwrap();

        connector
            .handle(upload(b"bytes", "photo.png", "K"))
            .await
            .unwrap();
        connector.wait_idle().await;

        let reply = inbox.try_recv().unwrap();
        assert_eq!(reply.performative(), Performative::FileDownload);
        assert_eq!(store.object("uploads", "K.png").await, Some(b"bytes".to_vec()));
    }

    #[tokio::test]
    async fn test_error_performative_is_unsupported() {
        let store = MemoryBlobStore::new();
        let (mut connector, mut inbox) = connector(&store);
        connector.connect().await.unwrap();

        let envelope = Envelope::new(
            CONNECTOR,
            UPLOADER,
            Message::initial(
                DialogueReference::new("d", ""),
                Body::Error {
                    error_code: ErrorCode::InvalidMessage,
                    error_msg: "nope".to_string(),
                    error_data: BTreeMap::new(),
                },
            ),
        );

        let result = connector.handle(envelope).await;

        assert!(matches!(
            result,
            Err(ConnectorError::UnsupportedPerformative(Performative::Error))
        ));
        assert_eq!(store.put_calls().await, 0);
        assert!(inbox.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_inconsistent_message_dropped_silently() {
        let store = MemoryBlobStore::new();
        let (mut connector, mut inbox) = connector(&store);
        connector.connect().await.unwrap();

        let bad = Envelope::new(
            CONNECTOR,
            UPLOADER,
            Message::new(
                DialogueReference::new("d", ""),
                1,
                5,
                Body::FileUpload {
                    content: b"x".to_vec(),
                    filename: "x.txt".to_string(),
                    key: "X".to_string(),
                },
            ),
        );

        connector.handle(bad).await.unwrap();
        connector.wait_idle().await;

        assert_eq!(store.put_calls().await, 0);
        assert!(inbox.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_rejects_messages_while_disconnected() {
        let store = MemoryBlobStore::new();
        let (connector, _inbox) = connector(&store);

        let result = connector.handle(upload(b"x", "x.txt", "X")).await;
        assert!(matches!(result, Err(ConnectorError::NotConnected)));
    }

    #[tokio::test]
    async fn test_transient_store_failure_is_retried() {
        let store = MemoryBlobStore::new();
        let (mut connector, _inbox) = connector(&store);
        connector.connect().await.unwrap();
        store.fail_next_puts(2).await;

        let reply = connector.upload(&upload(b"x", "x.txt", "X")).await.unwrap();

        assert_eq!(reply.performative(), Performative::FileDownload);
        assert_eq!(store.put_calls().await, 3);
    }

    #[tokio::test]
    async fn test_persistent_failure_replies_with_error() {
        let store = MemoryBlobStore::new();
        let (mut connector, mut inbox) = connector(&store);
        connector.connect().await.unwrap();
        store.fail_next_puts(100).await;

        connector.handle(upload(b"x", "x.txt", "X")).await.unwrap();
        connector.wait_idle().await;

        let reply = inbox.try_recv().unwrap();
        assert_eq!(reply.to, UPLOADER);
        match reply.message.body() {
            Body::Error {
                error_code,
                error_data,
                ..
            } => {
                assert_eq!(*error_code, ErrorCode::StorageFailure);
                assert_eq!(error_data.get("key"), Some(&b"X".to_vec()));
            }
            other => panic!("expected error reply, got {:?}", other),
        }
        // One attempt plus the default three retries
        assert_eq!(store.put_calls().await, 4);
    }

    #[tokio::test]
    async fn test_worker_pool_bounds_concurrent_uploads() {
        let store = GatedStore::new();
        let config = Config::default();
        let mut settings = config.connector;
        settings.max_workers = 2;
        let (outbox, mut inbox) = channel();
        let mut connector =
            StorageConnector::new(settings, config.storage, Arc::new(store.clone()), outbox);
        connector.connect().await.unwrap();
        let connector = Arc::new(connector);

        connector.handle(upload(b"1", "1.txt", "A")).await.unwrap();
        connector.handle(upload(b"2", "2.txt", "B")).await.unwrap();
        let third = tokio::spawn({
            let connector = connector.clone();
            async move { connector.handle(upload(b"3", "3.txt", "C")).await }
        });

        while store.in_flight() < 2 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Both workers busy: the third request waits for a permit
        assert!(!third.is_finished());
        assert_eq!(store.peak(), 2);

        store.release(1);
        third.await.unwrap().unwrap();
        store.release(2);
        connector.wait_idle().await;

        assert_eq!(store.peak(), 2);
        assert_eq!(store.completed(), 3);
        for _ in 0..3 {
            assert_eq!(
                inbox.try_recv().unwrap().performative(),
                Performative::FileDownload
            );
        }
    }

    #[tokio::test]
    async fn test_upload_without_room_for_reply_dropped() {
        let store = MemoryBlobStore::new();
        let (mut connector, mut inbox) = connector(&store);
        connector.connect().await.unwrap();

        let request = upload_with_id(i64::MAX as u64);
        assert!(request.message.is_consistent());

        connector.handle(request).await.unwrap();
        connector.wait_idle().await;

        assert_eq!(store.put_calls().await, 0);
        assert!(inbox.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_failure_reply_at_last_message_id_is_recorded() {
        let store = MemoryBlobStore::new();
        let (mut connector, mut inbox) = connector(&store);
        connector.connect().await.unwrap();
        store.fail_next_puts(100).await;

        connector
            .handle(upload_with_id(i64::MAX as u64 - 1))
            .await
            .unwrap();
        connector.wait_idle().await;

        let reply = inbox.try_recv().unwrap();
        assert_eq!(reply.performative(), Performative::Error);
        assert_eq!(reply.message.message_id(), i64::MAX as u64);

        let registry = ResultRegistry::new();
        registry.handle(reply).await.unwrap();
        assert_eq!(registry.failures().await.len(), 1);
    }

    #[test]
    fn test_failure_reply_is_validated() {
        let error = ConnectorError::NotConnected;

        let reply = failure_reply(&upload(b"x", "x.txt", "X"), &error).unwrap();
        assert_eq!(reply.performative(), Performative::Error);

        assert!(matches!(
            failure_reply(&upload_with_id(i64::MAX as u64), &error),
            Err(ProtocolError::InvalidMessageId(_))
        ));
    }
}

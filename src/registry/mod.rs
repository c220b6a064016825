//! Result registry
//!
//! Collects `FILE_DOWNLOAD` replies keyed by access URL so whoever issued the
//! upload can look them up later. The index is insert-only: the first reply
//! for a URL wins and later duplicates are discarded.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::protocol::{Body, Envelope, ErrorCode, Message, Performative};
use crate::runtime::MessageHandler;

/// A stored `FILE_DOWNLOAD` reply
#[derive(Debug, Clone)]
pub struct RegisteredDownload {
    pub message: Message,
    /// Address of the party that produced the URL
    pub sender: String,
    pub received_at: DateTime<Utc>,
}

impl RegisteredDownload {
    pub fn access_url(&self) -> &str {
        self.message.access_url().unwrap_or_default()
    }

    pub fn content(&self) -> &[u8] {
        self.message.content().unwrap_or_default()
    }
}

/// An `ERROR` reply received for one of our uploads
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub sender: String,
    pub error_code: ErrorCode,
    pub error_msg: String,
    /// Content key of the failed upload, when the sender included it
    pub key: Option<String>,
    pub filename: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Downloads by access URL, in arrival order
#[derive(Debug, Default)]
pub struct ResultIndex {
    by_url: HashMap<String, RegisteredDownload>,
    order: Vec<String>,
}

impl ResultIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the URL is already present. Returns whether it was new.
    pub fn insert(&mut self, download: RegisteredDownload) -> bool {
        let url = download.access_url().to_string();
        if self.by_url.contains_key(&url) {
            return false;
        }
        self.order.push(url.clone());
        self.by_url.insert(url, download);
        true
    }

    pub fn get(&self, access_url: &str) -> Option<&RegisteredDownload> {
        self.by_url.get(access_url)
    }

    pub fn contains(&self, access_url: &str) -> bool {
        self.by_url.contains_key(access_url)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredDownload> {
        self.order.iter().filter_map(|url| self.by_url.get(url))
    }
}

/// Cloneable handle to the registry state
#[derive(Clone, Default)]
pub struct ResultRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    index: RwLock<ResultIndex>,
    failures: RwLock<Vec<FailureRecord>>,
}

impl ResultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, access_url: &str) -> Option<RegisteredDownload> {
        self.inner.index.read().await.get(access_url).cloned()
    }

    pub async fn contains(&self, access_url: &str) -> bool {
        self.inner.index.read().await.contains(access_url)
    }

    /// All downloads in arrival order
    pub async fn list(&self) -> Vec<RegisteredDownload> {
        self.inner.index.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.index.read().await.is_empty()
    }

    pub async fn failures(&self) -> Vec<FailureRecord> {
        self.inner.failures.read().await.clone()
    }

    /// Record a download reply; `false` if the URL was already known
    pub async fn register(&self, sender: &str, message: Message) -> bool {
        let download = RegisteredDownload {
            message,
            sender: sender.to_string(),
            received_at: Utc::now(),
        };
        let url = download.access_url().to_string();

        let inserted = self.inner.index.write().await.insert(download);
        if inserted {
            tracing::info!(access_url = %url, sender = %sender, "Registered download");
        } else {
            tracing::debug!(access_url = %url, "Duplicate download discarded");
        }
        inserted
    }

    async fn record_failure(&self, sender: &str, body: &Body) {
        let Body::Error {
            error_code,
            error_msg,
            error_data,
        } = body
        else {
            return;
        };

        let text = |field: &str| {
            error_data
                .get(field)
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        };
        let record = FailureRecord {
            sender: sender.to_string(),
            error_code: *error_code,
            error_msg: error_msg.clone(),
            key: text("key"),
            filename: text("filename"),
            received_at: Utc::now(),
        };

        tracing::warn!(
            sender = %sender,
            error_code = %error_code,
            key = record.key.as_deref().unwrap_or_default(),
            "Upload failed remotely: {}",
            error_msg
        );
        self.inner.failures.write().await.push(record);
    }
}

#[async_trait::async_trait]
impl MessageHandler for ResultRegistry {
    type Error = Infallible;

    async fn handle(&self, envelope: Envelope) -> Result<(), Infallible> {
        if !envelope.message.is_consistent() {
            return Ok(());
        }

        match envelope.performative() {
            Performative::FileDownload => {
                self.register(&envelope.sender, envelope.message).await;
            }
            Performative::Error => {
                self.record_failure(&envelope.sender, envelope.message.body())
                    .await;
            }
            Performative::End => {}
            Performative::FileUpload => {
                tracing::warn!(sender = %envelope.sender, "Upload request sent to registry, ignoring");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn download(url: &str, content: &[u8]) -> Envelope {
        let upload = Envelope::new(
            "connection/storage",
            "skill/file_uploader",
            Message::file_upload(content.to_vec(), "a.txt", "k"),
        );
        upload.reply(Body::FileDownload {
            access_url: url.to_string(),
            content: content.to_vec(),
        })
    }

    #[tokio::test]
    async fn test_first_write_wins() {
        let registry = ResultRegistry::new();

        registry.handle(download("memory://b/k.txt", b"first")).await.unwrap();
        registry.handle(download("memory://b/k.txt", b"second")).await.unwrap();

        assert_eq!(registry.len().await, 1);
        let entry = registry.get("memory://b/k.txt").await.unwrap();
        assert_eq!(entry.content(), b"first");
        assert_eq!(entry.sender, "connection/storage");
    }

    #[tokio::test]
    async fn test_list_keeps_arrival_order() {
        let registry = ResultRegistry::new();

        for url in ["u/3", "u/1", "u/2"] {
            registry.handle(download(url, b"x")).await.unwrap();
        }

        let urls: Vec<String> = registry
            .list()
            .await
            .iter()
            .map(|d| d.access_url().to_string())
            .collect();
        assert_eq!(urls, vec!["u/3", "u/1", "u/2"]);
    }

    #[tokio::test]
    async fn test_inconsistent_message_not_registered() {
        let registry = ResultRegistry::new();
        let bad = Envelope::new(
            "skill/file_uploader",
            "connection/storage",
            Message::new(
                crate::protocol::DialogueReference::new("d", ""),
                1,
                3,
                Body::FileDownload {
                    access_url: "u".to_string(),
                    content: vec![],
                },
            ),
        );

        registry.handle(bad).await.unwrap();

        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_error_reply_recorded_as_failure() {
        let registry = ResultRegistry::new();
        let upload = Envelope::new(
            "connection/storage",
            "skill/file_uploader",
            Message::file_upload(b"x".to_vec(), "x.txt", "K"),
        );
        let mut error_data = BTreeMap::new();
        error_data.insert("key".to_string(), b"K".to_vec());
        let reply = upload.reply(Body::Error {
            error_code: ErrorCode::StorageFailure,
            error_msg: "bucket unreachable".to_string(),
            error_data,
        });

        registry.handle(reply).await.unwrap();
        registry.handle(upload.reply(Body::End)).await.unwrap();

        let failures = registry.failures().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error_code, ErrorCode::StorageFailure);
        assert_eq!(failures[0].key.as_deref(), Some("K"));
        assert_eq!(failures[0].filename, None);
        assert!(registry.is_empty().await);
    }

    #[test]
    fn test_index_insert_reports_duplicates() {
        let mut index = ResultIndex::new();
        let entry = |content: &[u8]| RegisteredDownload {
            message: download("u", content).message,
            sender: "s".to_string(),
            received_at: Utc::now(),
        };

        assert!(index.insert(entry(&b"a"[..])));
        assert!(!index.insert(entry(&b"b"[..])));
        assert_eq!(index.get("u").unwrap().content(), b"a");
        assert!(index.contains("u"));
    }
}

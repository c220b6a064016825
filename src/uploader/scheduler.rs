//! Periodic upload scheduler

use crate::config::UploaderConfig;
use crate::content_key::compute_key;
use crate::protocol::{validate, Envelope, Message};
use crate::runtime::{Outbox, Tickable};

use super::{FileSource, UploadError, UploadedSet};

/// Outcome of one scheduler tick
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Files found at the source
    pub scanned: usize,
    /// New uploads handed to the outbound channel
    pub enqueued: usize,
    /// Files whose content was already queued
    pub skipped: usize,
    /// Files that could not be read
    pub failed: usize,
}

/// Scans a file source and emits `FILE_UPLOAD` requests for unseen content
pub struct UploadScheduler {
    agent_id: String,
    connection_id: String,
    source: Box<dyn FileSource>,
    uploaded: UploadedSet,
    outbox: Outbox,
}

impl UploadScheduler {
    pub fn new(
        config: &UploaderConfig,
        connection_id: impl Into<String>,
        source: Box<dyn FileSource>,
        outbox: Outbox,
    ) -> Self {
        Self {
            agent_id: config.agent_id.clone(),
            connection_id: connection_id.into(),
            source,
            uploaded: UploadedSet::new(),
            outbox,
        }
    }

    /// Address uploads are sent from
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn uploaded(&self) -> &UploadedSet {
        &self.uploaded
    }
}

#[async_trait::async_trait]
impl Tickable for UploadScheduler {
    type Report = TickReport;
    type Error = UploadError;

    async fn tick(&mut self) -> Result<TickReport, UploadError> {
        let mut report = TickReport::default();
        let paths = self.source.list().await?;

        for path in paths {
            report.scanned += 1;

            let bytes = match self.source.read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Skipping file for this tick: {}", e);
                    report.failed += 1;
                    continue;
                }
            };

            let key = compute_key(&bytes);
            if self.uploaded.contains(&key) {
                report.skipped += 1;
                continue;
            }

            let filename = path.to_string_lossy().into_owned();
            let message = Message::file_upload(bytes, filename.clone(), key.clone());
            validate(&message)?;

            self.outbox
                .send(Envelope::new(&self.connection_id, &self.agent_id, message))?;
            // Marked at enqueue time, before the store confirms anything.
            self.uploaded.insert(key.clone());
            report.enqueued += 1;

            tracing::info!(
                key = %key,
                filename = %filename,
                "Queued new content for upload"
            );
        }

        tracing::debug!(
            scanned = report.scanned,
            enqueued = report.enqueued,
            skipped = report.skipped,
            failed = report.failed,
            "Upload tick complete"
        );

        Ok(report)
    }
}

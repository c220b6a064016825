//! Upload scheduler
//!
//! Periodically scans a source location and turns unseen content into
//! `FILE_UPLOAD` requests:
//! - files are read and keyed by content, not by name
//! - content already queued in this process is skipped
//! - unreadable files are logged and retried on the next tick

mod scheduler;
mod source;
mod uploaded;

pub use scheduler::{TickReport, UploadScheduler};
pub use source::{FileSource, LocalFileSource};
pub use uploaded::UploadedSet;

use std::path::PathBuf;

use crate::error::RuntimeError;
use crate::protocol::ProtocolError;

/// Upload error types
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Invalid source pattern: {0}")]
    InvalidPattern(String),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to enumerate source: {0}")]
    Enumerate(String),

    #[error("Outbound channel error: {0}")]
    Outbox(#[from] RuntimeError),

    #[error("Refusing to send inconsistent message: {0}")]
    Protocol(#[from] ProtocolError),
}

//! File Storage Agent
//!
//! Watches a local source for new content, uploads each distinct piece of
//! content once to S3-compatible storage, and collects the presigned URLs
//! that come back. The three parties talk only through typed protocol
//! messages on an in-process bus.

pub mod config;
pub mod connector;
pub mod content_key;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod routes;
pub mod runtime;
pub mod state;
pub mod uploader;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;

//! File storage message protocol
//!
//! The grammar exchanged between an uploading party and a storage party:
//! - `FILE_UPLOAD`: bytes, filename and content key sent for storage
//! - `FILE_DOWNLOAD`: presigned access URL plus the original bytes
//! - `ERROR`: failure report with a code, text and binary details
//! - `END`: dialogue close
//!
//! Messages are threaded by `dialogue_reference`, `message_id` and `target`.

pub mod codec;
mod message;
mod validation;
mod wire;

pub use message::*;
pub use validation::{is_consistent, validate, validate_wire, ProtocolError};
pub use wire::{WireMessage, WireValue};

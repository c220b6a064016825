//! Typed file storage messages
//!
//! Each performative has exactly one body shape, so a `Message` cannot be
//! built with a missing or extra payload field.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use super::validation::{self, ProtocolError};

// ============================================================================
// Performative
// ============================================================================

/// Declared intent of a protocol message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Performative {
    /// Request to store bytes under a content key
    FileUpload,
    /// Reply carrying a retrievable URL for stored bytes
    FileDownload,
    /// Failure report
    Error,
    /// Dialogue close
    End,
}

impl Performative {
    pub const ALL: [Performative; 4] = [
        Performative::FileUpload,
        Performative::FileDownload,
        Performative::Error,
        Performative::End,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Performative::FileUpload => "file_upload",
            Performative::FileDownload => "file_download",
            Performative::Error => "error",
            Performative::End => "end",
        }
    }

    /// Number of payload fields a message with this performative carries
    pub fn content_count(&self) -> usize {
        match self {
            Performative::FileUpload => 3,
            Performative::FileDownload => 2,
            Performative::Error => 3,
            Performative::End => 0,
        }
    }
}

impl fmt::Display for Performative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Performative {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Performative::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownPerformative(s.to_string()))
    }
}

// ============================================================================
// Error codes
// ============================================================================

/// Error codes carried by `ERROR` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UnsupportedProtocol,
    DecodingError,
    InvalidMessage,
    UnsupportedPerformative,
    InvalidDialogue,
    StorageFailure,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 6] = [
        ErrorCode::UnsupportedProtocol,
        ErrorCode::DecodingError,
        ErrorCode::InvalidMessage,
        ErrorCode::UnsupportedPerformative,
        ErrorCode::InvalidDialogue,
        ErrorCode::StorageFailure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UnsupportedProtocol => "unsupported_protocol",
            ErrorCode::DecodingError => "decoding_error",
            ErrorCode::InvalidMessage => "invalid_message",
            ErrorCode::UnsupportedPerformative => "unsupported_performative",
            ErrorCode::InvalidDialogue => "invalid_dialogue",
            ErrorCode::StorageFailure => "storage_failure",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCode::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownErrorCode(s.to_string()))
    }
}

// ============================================================================
// Dialogue reference
// ============================================================================

/// Pair of opaque identifiers scoping the messages of one exchange
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DialogueReference(pub String, pub String);

impl DialogueReference {
    pub fn new(initiator: impl Into<String>, responder: impl Into<String>) -> Self {
        Self(initiator.into(), responder.into())
    }

    /// Fresh reference for a dialogue opened by this party
    pub fn initiate() -> Self {
        Self(Uuid::new_v4().simple().to_string(), String::new())
    }

    pub fn initiator(&self) -> &str {
        &self.0
    }

    pub fn responder(&self) -> &str {
        &self.1
    }
}

impl fmt::Display for DialogueReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

// ============================================================================
// Message body
// ============================================================================

/// Performative-specific payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    FileUpload {
        content: Vec<u8>,
        filename: String,
        key: String,
    },
    FileDownload {
        access_url: String,
        content: Vec<u8>,
    },
    Error {
        error_code: ErrorCode,
        error_msg: String,
        error_data: BTreeMap<String, Vec<u8>>,
    },
    End,
}

impl Body {
    pub fn performative(&self) -> Performative {
        match self {
            Body::FileUpload { .. } => Performative::FileUpload,
            Body::FileDownload { .. } => Performative::FileDownload,
            Body::Error { .. } => Performative::Error,
            Body::End => Performative::End,
        }
    }
}

// ============================================================================
// Message
// ============================================================================

/// One unit of the file storage protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    dialogue_reference: DialogueReference,
    message_id: u64,
    target: u64,
    body: Body,
}

impl Message {
    /// Build a message with explicit threading fields.
    ///
    /// No threading checks happen here; run `is_consistent` before acting on
    /// a message built this way.
    pub fn new(
        dialogue_reference: DialogueReference,
        message_id: u64,
        target: u64,
        body: Body,
    ) -> Self {
        Self {
            dialogue_reference,
            message_id,
            target,
            body,
        }
    }

    /// First message of a dialogue
    pub fn initial(dialogue_reference: DialogueReference, body: Body) -> Self {
        Self::new(dialogue_reference, 1, 0, body)
    }

    /// Open a new dialogue with a `FILE_UPLOAD` request
    pub fn file_upload(
        content: Vec<u8>,
        filename: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::initial(
            DialogueReference::initiate(),
            Body::FileUpload {
                content,
                filename: filename.into(),
                key: key.into(),
            },
        )
    }

    /// Next message in this dialogue, replying to `self`
    pub fn reply(&self, body: Body) -> Self {
        Self::new(
            self.dialogue_reference.clone(),
            self.message_id.saturating_add(1),
            self.message_id,
            body,
        )
    }

    pub fn dialogue_reference(&self) -> &DialogueReference {
        &self.dialogue_reference
    }

    pub fn message_id(&self) -> u64 {
        self.message_id
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn performative(&self) -> Performative {
        self.body.performative()
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    /// Raw bytes carried by `FILE_UPLOAD` and `FILE_DOWNLOAD`
    pub fn content(&self) -> Option<&[u8]> {
        match &self.body {
            Body::FileUpload { content, .. } | Body::FileDownload { content, .. } => {
                Some(content)
            }
            _ => None,
        }
    }

    pub fn filename(&self) -> Option<&str> {
        match &self.body {
            Body::FileUpload { filename, .. } => Some(filename),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match &self.body {
            Body::FileUpload { key, .. } => Some(key),
            _ => None,
        }
    }

    pub fn access_url(&self) -> Option<&str> {
        match &self.body {
            Body::FileDownload { access_url, .. } => Some(access_url),
            _ => None,
        }
    }

    /// Check the message against the protocol rules, logging any violation
    pub fn is_consistent(&self) -> bool {
        validation::is_consistent(self)
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// A message plus the addressing used to route it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub to: String,
    pub sender: String,
    pub message: Message,
}

impl Envelope {
    pub fn new(to: impl Into<String>, sender: impl Into<String>, message: Message) -> Self {
        Self {
            to: to.into(),
            sender: sender.into(),
            message,
        }
    }

    /// Reply travelling back to the sender of this envelope
    pub fn reply(&self, body: Body) -> Self {
        Self {
            to: self.sender.clone(),
            sender: self.to.clone(),
            message: self.message.reply(body),
        }
    }

    pub fn performative(&self) -> Performative {
        self.message.performative()
    }
}

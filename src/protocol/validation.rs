//! Protocol consistency rules
//!
//! `validate_wire` checks, in order:
//! 1. `dialogue_reference` is a pair of strings
//! 2. `message_id` and `target` are integers (`message_id >= 1`, `target >= 0`)
//! 3. `performative` is one of the declared performatives
//! 4. each payload field has the declared type
//! 5. the payload field count matches the performative
//! 6. the first message of a dialogue targets nothing (`target == 0`)
//!
//! Typed `Message`s satisfy rules 1 and 3-5 by construction, so `validate`
//! only re-checks the threading fields.

use super::message::{ErrorCode, Message, Performative};
use super::wire::{WireMessage, WireValue};

/// Protocol rule violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid 'dialogue_reference'. Expected a pair of strings. Found '{0}'")]
    InvalidDialogueReference(String),

    #[error("Invalid type for '{field}'. Expected 'int'. Found '{found}'")]
    InvalidHeaderType { field: String, found: &'static str },

    #[error("Invalid 'message_id'. Expected a positive integer. Found {0}")]
    InvalidMessageId(i64),

    #[error("Invalid 'target'. Expected a non-negative integer. Found {0}")]
    InvalidTarget(i64),

    #[error("Invalid 'performative'. Expected one of file_upload, file_download, error, end. Found '{0}'")]
    UnknownPerformative(String),

    #[error("Content '{0}' is not set")]
    MissingContent(String),

    #[error("Invalid type for content '{field}'. Expected '{expected}'. Found '{found}'")]
    InvalidContentType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid error code '{0}'")]
    UnknownErrorCode(String),

    #[error("Incorrect number of contents. Expected {expected}. Found {found}")]
    ContentCount { expected: usize, found: usize },

    #[error("Invalid 'target'. Expected 0 (because 'message_id' is 1). Found {0}")]
    FirstMessageTarget(i64),

    #[error("Malformed message: {0}")]
    Malformed(String),
}

/// Check a typed message, logging the violation and returning `false` on
/// failure. Never panics or propagates.
pub fn is_consistent(message: &Message) -> bool {
    match validate(message) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(
                performative = %message.performative(),
                dialogue = %message.dialogue_reference(),
                "{}",
                e
            );
            false
        }
    }
}

/// Check the threading fields of a typed message
pub fn validate(message: &Message) -> Result<(), ProtocolError> {
    let message_id = i64::try_from(message.message_id())
        .map_err(|_| ProtocolError::InvalidMessageId(i64::MAX))?;
    let target =
        i64::try_from(message.target()).map_err(|_| ProtocolError::InvalidTarget(i64::MAX))?;
    check_threading(message_id, target)
}

/// Check every protocol rule against a wire message
pub fn validate_wire(wire: &WireMessage) -> Result<(), ProtocolError> {
    match &wire.dialogue_reference {
        WireValue::List(parts)
            if parts.len() == 2 && parts.iter().all(|p| matches!(p, WireValue::Str(_))) => {}
        WireValue::List(parts) => {
            let found = parts
                .iter()
                .map(|p| p.type_name())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ProtocolError::InvalidDialogueReference(format!(
                "list[{}]",
                found
            )));
        }
        other => {
            return Err(ProtocolError::InvalidDialogueReference(
                other.type_name().to_string(),
            ))
        }
    }

    let message_id = header_int(&wire.message_id, "message_id")?;
    let target = header_int(&wire.target, "target")?;
    if message_id < 1 {
        return Err(ProtocolError::InvalidMessageId(message_id));
    }
    if target < 0 {
        return Err(ProtocolError::InvalidTarget(target));
    }

    let performative: Performative = wire.performative.parse()?;

    match performative {
        Performative::FileUpload => {
            expect_type(wire, "content", "bytes")?;
            expect_type(wire, "filename", "str")?;
            expect_type(wire, "key", "str")?;
        }
        Performative::FileDownload => {
            expect_type(wire, "access_url", "str")?;
            expect_type(wire, "content", "bytes")?;
        }
        Performative::Error => {
            match field(wire, "error_code")? {
                WireValue::ErrorCode(code) => {
                    code.parse::<ErrorCode>()?;
                }
                other => {
                    return Err(ProtocolError::InvalidContentType {
                        field: "error_code".to_string(),
                        expected: "error_code",
                        found: other.type_name(),
                    })
                }
            }
            expect_type(wire, "error_msg", "str")?;
            match field(wire, "error_data")? {
                WireValue::Map(pairs) => {
                    for (k, v) in pairs {
                        if !matches!(k, WireValue::Str(_)) {
                            return Err(ProtocolError::InvalidContentType {
                                field: "error_data key".to_string(),
                                expected: "str",
                                found: k.type_name(),
                            });
                        }
                        if !matches!(v, WireValue::Bytes(_)) {
                            return Err(ProtocolError::InvalidContentType {
                                field: "error_data value".to_string(),
                                expected: "bytes",
                                found: v.type_name(),
                            });
                        }
                    }
                }
                other => {
                    return Err(ProtocolError::InvalidContentType {
                        field: "error_data".to_string(),
                        expected: "map",
                        found: other.type_name(),
                    })
                }
            }
        }
        Performative::End => {}
    }

    let expected = performative.content_count();
    if wire.contents.len() != expected {
        return Err(ProtocolError::ContentCount {
            expected,
            found: wire.contents.len(),
        });
    }

    check_threading(message_id, target)
}

fn check_threading(message_id: i64, target: i64) -> Result<(), ProtocolError> {
    if message_id < 1 {
        return Err(ProtocolError::InvalidMessageId(message_id));
    }
    if target < 0 {
        return Err(ProtocolError::InvalidTarget(target));
    }
    if message_id == 1 && target != 0 {
        return Err(ProtocolError::FirstMessageTarget(target));
    }
    Ok(())
}

fn header_int(value: &WireValue, name: &str) -> Result<i64, ProtocolError> {
    match value {
        WireValue::Int(i) => Ok(*i),
        other => Err(ProtocolError::InvalidHeaderType {
            field: name.to_string(),
            found: other.type_name(),
        }),
    }
}

fn field<'a>(wire: &'a WireMessage, name: &str) -> Result<&'a WireValue, ProtocolError> {
    wire.contents
        .get(name)
        .ok_or_else(|| ProtocolError::MissingContent(name.to_string()))
}

fn expect_type(wire: &WireMessage, name: &str, expected: &'static str) -> Result<(), ProtocolError> {
    let value = field(wire, name)?;
    if value.type_name() == expected {
        Ok(())
    } else {
        Err(ProtocolError::InvalidContentType {
            field: name.to_string(),
            expected,
            found: value.type_name(),
        })
    }
}

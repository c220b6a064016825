//! Dynamically typed wire form of a message
//!
//! Inbound bytes are decoded into `WireMessage` first; only a wire message
//! that passes validation is turned into a typed `Message`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::message::{Body, DialogueReference, ErrorCode, Message, Performative};
use super::validation::{validate_wire, ProtocolError};

/// A single wire field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireValue {
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    Str(String),
    Int(i64),
    Bool(bool),
    ErrorCode(String),
    List(Vec<WireValue>),
    /// Ordered key/value pairs; keys are values so non-string keys can be
    /// represented and rejected
    Map(Vec<(WireValue, WireValue)>),
}

impl WireValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            WireValue::Bytes(_) => "bytes",
            WireValue::Str(_) => "str",
            WireValue::Int(_) => "int",
            WireValue::Bool(_) => "bool",
            WireValue::ErrorCode(_) => "error_code",
            WireValue::List(_) => "list",
            WireValue::Map(_) => "map",
        }
    }
}

/// Wire form of a message: header fields plus named contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub dialogue_reference: WireValue,
    pub message_id: WireValue,
    pub target: WireValue,
    pub performative: String,
    #[serde(default)]
    pub contents: BTreeMap<String, WireValue>,
}

impl WireMessage {
    /// Check the message against the protocol rules, logging any violation
    pub fn is_consistent(&self) -> bool {
        match validate_wire(self) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(performative = %self.performative, "{}", e);
                false
            }
        }
    }
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        let reference = message.dialogue_reference();
        let mut contents = BTreeMap::new();

        match message.body() {
            Body::FileUpload {
                content,
                filename,
                key,
            } => {
                contents.insert("content".to_string(), WireValue::Bytes(content.clone()));
                contents.insert("filename".to_string(), WireValue::Str(filename.clone()));
                contents.insert("key".to_string(), WireValue::Str(key.clone()));
            }
            Body::FileDownload {
                access_url,
                content,
            } => {
                contents.insert("access_url".to_string(), WireValue::Str(access_url.clone()));
                contents.insert("content".to_string(), WireValue::Bytes(content.clone()));
            }
            Body::Error {
                error_code,
                error_msg,
                error_data,
            } => {
                contents.insert(
                    "error_code".to_string(),
                    WireValue::ErrorCode(error_code.as_str().to_string()),
                );
                contents.insert("error_msg".to_string(), WireValue::Str(error_msg.clone()));
                contents.insert(
                    "error_data".to_string(),
                    WireValue::Map(
                        error_data
                            .iter()
                            .map(|(k, v)| (WireValue::Str(k.clone()), WireValue::Bytes(v.clone())))
                            .collect(),
                    ),
                );
            }
            Body::End => {}
        }

        WireMessage {
            dialogue_reference: WireValue::List(vec![
                WireValue::Str(reference.0.clone()),
                WireValue::Str(reference.1.clone()),
            ]),
            message_id: WireValue::Int(message.message_id() as i64),
            target: WireValue::Int(message.target() as i64),
            performative: message.performative().as_str().to_string(),
            contents,
        }
    }
}

impl TryFrom<WireMessage> for Message {
    type Error = ProtocolError;

    fn try_from(mut wire: WireMessage) -> Result<Self, Self::Error> {
        validate_wire(&wire)?;

        let dialogue_reference = match wire.dialogue_reference {
            WireValue::List(mut parts) if parts.len() == 2 => {
                let responder = take_str(parts.pop(), "dialogue_reference[1]")?;
                let initiator = take_str(parts.pop(), "dialogue_reference[0]")?;
                DialogueReference(initiator, responder)
            }
            other => {
                return Err(ProtocolError::InvalidDialogueReference(
                    other.type_name().to_string(),
                ))
            }
        };
        let message_id = take_int(Some(wire.message_id), "message_id")? as u64;
        let target = take_int(Some(wire.target), "target")? as u64;

        let contents = &mut wire.contents;
        let body = match wire.performative.parse::<Performative>()? {
            Performative::FileUpload => Body::FileUpload {
                content: take_bytes(contents.remove("content"), "content")?,
                filename: take_str(contents.remove("filename"), "filename")?,
                key: take_str(contents.remove("key"), "key")?,
            },
            Performative::FileDownload => Body::FileDownload {
                access_url: take_str(contents.remove("access_url"), "access_url")?,
                content: take_bytes(contents.remove("content"), "content")?,
            },
            Performative::Error => {
                let error_code = match contents.remove("error_code") {
                    Some(WireValue::ErrorCode(code)) => code.parse::<ErrorCode>()?,
                    Some(other) => return Err(invalid_type("error_code", "error_code", &other)),
                    None => return Err(ProtocolError::MissingContent("error_code".to_string())),
                };
                let error_msg = take_str(contents.remove("error_msg"), "error_msg")?;
                let error_data = match contents.remove("error_data") {
                    Some(WireValue::Map(pairs)) => pairs
                        .into_iter()
                        .map(|(k, v)| {
                            Ok((
                                take_str(Some(k), "error_data key")?,
                                take_bytes(Some(v), "error_data value")?,
                            ))
                        })
                        .collect::<Result<BTreeMap<_, _>, ProtocolError>>()?,
                    Some(other) => return Err(invalid_type("error_data", "map", &other)),
                    None => return Err(ProtocolError::MissingContent("error_data".to_string())),
                };
                Body::Error {
                    error_code,
                    error_msg,
                    error_data,
                }
            }
            Performative::End => Body::End,
        };

        Ok(Message::new(dialogue_reference, message_id, target, body))
    }
}

fn invalid_type(field: &str, expected: &'static str, found: &WireValue) -> ProtocolError {
    ProtocolError::InvalidContentType {
        field: field.to_string(),
        expected,
        found: found.type_name(),
    }
}

fn take_str(value: Option<WireValue>, field: &str) -> Result<String, ProtocolError> {
    match value {
        Some(WireValue::Str(s)) => Ok(s),
        Some(other) => Err(invalid_type(field, "str", &other)),
        None => Err(ProtocolError::MissingContent(field.to_string())),
    }
}

fn take_bytes(value: Option<WireValue>, field: &str) -> Result<Vec<u8>, ProtocolError> {
    match value {
        Some(WireValue::Bytes(b)) => Ok(b),
        Some(other) => Err(invalid_type(field, "bytes", &other)),
        None => Err(ProtocolError::MissingContent(field.to_string())),
    }
}

fn take_int(value: Option<WireValue>, field: &str) -> Result<i64, ProtocolError> {
    match value {
        Some(WireValue::Int(i)) => Ok(i),
        Some(other) => Err(ProtocolError::InvalidHeaderType {
            field: field.to_string(),
            found: other.type_name(),
        }),
        None => Err(ProtocolError::MissingContent(field.to_string())),
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

//! JSON wire codec for envelopes
//!
//! Byte fields travel as base64 strings. `decode` validates before building
//! a typed `Envelope`, so a malformed message never reaches a component.

use serde::{Deserialize, Serialize};

use super::message::{Envelope, Message};
use super::validation::ProtocolError;
use super::wire::WireMessage;

/// Wire form of an envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub to: String,
    pub sender: String,
    pub message: WireMessage,
}

impl From<&Envelope> for WireEnvelope {
    fn from(envelope: &Envelope) -> Self {
        Self {
            to: envelope.to.clone(),
            sender: envelope.sender.clone(),
            message: WireMessage::from(&envelope.message),
        }
    }
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = ProtocolError;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        Ok(Envelope::new(
            wire.to,
            wire.sender,
            Message::try_from(wire.message)?,
        ))
    }
}

/// Serialize an envelope to JSON bytes
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(&WireEnvelope::from(envelope))
        .map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Parse and validate an envelope from JSON bytes
pub fn decode(bytes: &[u8]) -> Result<Envelope, ProtocolError> {
    let wire: WireEnvelope =
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    Envelope::try_from(wire)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Performative;

    #[test]
    fn test_encode_decode_upload() {
        let envelope = Envelope::new(
            "connection/storage",
            "skill/file_uploader",
            Message::file_upload(b"hello".to_vec(), "a.txt", "5d41402abc4b2a76"),
        );

        let bytes = encode(&envelope).unwrap();
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded, envelope);
        assert_eq!(decoded.performative(), Performative::FileUpload);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode(b"not json"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_rejects_inconsistent_message() {
        let json = serde_json::json!({
            "to": "connection/storage",
            "sender": "skill/file_uploader",
            "message": {
                "dialogue_reference": {"list": [{"str": "d"}, {"str": ""}]},
                "message_id": {"int": 1},
                "target": {"int": 0},
                "performative": "end",
                "contents": {"key": {"str": "unexpected"}}
            }
        });
        let bytes = serde_json::to_vec(&json).unwrap();

        assert_eq!(
            decode(&bytes),
            Err(ProtocolError::ContentCount {
                expected: 0,
                found: 1
            })
        );
    }
}

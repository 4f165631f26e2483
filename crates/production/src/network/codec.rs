//! Message encoding and decoding for network transport.
//!
//! # Wire Format
//!
//! Every sync message is JSON-encoded then LZ4-compressed:
//!
//! ```text
//! [u32 LE uncompressed size][LZ4 compressed JSON payload]
//! ```
//!
//! # Topic-Based Type Dispatch
//!
//! Message type is determined by the topic the frame travels on, not by a
//! field in the payload. Topics have the form
//! `fastsync/<message type>/<protocol version>`.

use super::wire::{self, WireError};
use fastsync_messages::{
    BlockRequest, BlockResponse, NetworkMessage, NoBlockResponse, StatusAnnounce, StatusRequest,
    SyncMessage,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

const TOPIC_PREFIX: &str = "fastsync";
const PROTOCOL_VERSION: &str = "1.0.0";

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Message too short")]
    MessageTooShort,

    #[error("JSON decode error: {0}")]
    JsonDecode(serde_json::Error),

    #[error("JSON encode error: {0}")]
    JsonEncode(serde_json::Error),

    #[error("Decompression error: {0}")]
    Decompress(#[from] WireError),

    #[error("Malformed topic: {0}")]
    MalformedTopic(String),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),
}

/// Routing key a frame is published under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    message_type: String,
    version: String,
}

impl Topic {
    /// Topic for a message type at the current protocol version.
    pub fn for_type<M: NetworkMessage>() -> Self {
        Self {
            message_type: M::message_type_id().to_string(),
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    /// Parse `fastsync/<type>/<version>`.
    pub fn parse(topic: &str) -> Result<Self, CodecError> {
        let mut parts = topic.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(TOPIC_PREFIX), Some(message_type), Some(version), None)
                if !message_type.is_empty() && !version.is_empty() =>
            {
                Ok(Self {
                    message_type: message_type.to_string(),
                    version: version.to_string(),
                })
            }
            _ => Err(CodecError::MalformedTopic(topic.to_string())),
        }
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            TOPIC_PREFIX, self.message_type, self.version
        )
    }
}

/// Get the topic for an outbound message.
pub fn topic_for_message(message: &SyncMessage) -> Topic {
    match message {
        SyncMessage::StatusRequest(_) => Topic::for_type::<StatusRequest>(),
        SyncMessage::StatusAnnounce(_) => Topic::for_type::<StatusAnnounce>(),
        SyncMessage::BlockRequest(_) => Topic::for_type::<BlockRequest>(),
        SyncMessage::BlockResponse(_) => Topic::for_type::<BlockResponse>(),
        SyncMessage::NoBlockResponse(_) => Topic::for_type::<NoBlockResponse>(),
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(CodecError::JsonEncode)
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(payload).map_err(CodecError::JsonDecode)
}

/// Encode an outbound message to wire format.
///
/// Only the inner message is encoded; the variant travels as the topic.
pub fn encode_message(message: &SyncMessage) -> Result<Vec<u8>, CodecError> {
    let json = match message {
        SyncMessage::StatusRequest(msg) => encode(msg)?,
        SyncMessage::StatusAnnounce(msg) => encode(msg)?,
        SyncMessage::BlockRequest(msg) => encode(msg)?,
        SyncMessage::BlockResponse(msg) => encode(msg.as_ref())?,
        SyncMessage::NoBlockResponse(msg) => encode(msg)?,
    };
    Ok(wire::compress(&json))
}

/// Decode a message from wire format based on topic.
pub fn decode_message(topic: &Topic, data: &[u8]) -> Result<SyncMessage, CodecError> {
    if data.is_empty() {
        return Err(CodecError::MessageTooShort);
    }
    if topic.version() != PROTOCOL_VERSION {
        return Err(CodecError::UnknownTopic(topic.to_string()));
    }

    let payload = wire::decompress(data)?;

    let type_id = topic.message_type();
    if type_id == StatusRequest::message_type_id() {
        Ok(decode::<StatusRequest>(&payload)?.into())
    } else if type_id == StatusAnnounce::message_type_id() {
        Ok(decode::<StatusAnnounce>(&payload)?.into())
    } else if type_id == BlockRequest::message_type_id() {
        Ok(decode::<BlockRequest>(&payload)?.into())
    } else if type_id == BlockResponse::message_type_id() {
        Ok(decode::<BlockResponse>(&payload)?.into())
    } else if type_id == NoBlockResponse::message_type_id() {
        Ok(decode::<NoBlockResponse>(&payload)?.into())
    } else {
        Err(CodecError::UnknownTopic(topic.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastsync_test_helpers::TestChain;
    use fastsync_types::BlockHeight;

    #[test]
    fn test_encode_decode_block_response() {
        let chain = TestChain::honest(3);
        let message: SyncMessage = BlockResponse::new(chain.block(2).clone()).into();

        let bytes = encode_message(&message).unwrap();
        assert!(!bytes.is_empty());

        let topic = Topic::parse("fastsync/block.response/1.0.0").unwrap();
        assert_eq!(topic, topic_for_message(&message));
        assert_eq!(decode_message(&topic, &bytes).unwrap(), message);
    }

    #[test]
    fn test_encode_decode_unit_request() {
        let message: SyncMessage = StatusRequest.into();
        let bytes = encode_message(&message).unwrap();
        let decoded = decode_message(&topic_for_message(&message), &bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_topic_selects_type() {
        // A block request decoded under the no-block topic keeps its height
        // but changes meaning; the topic is authoritative.
        let bytes = encode_message(&SyncMessage::from(BlockRequest::new(BlockHeight(9)))).unwrap();
        let topic = Topic::for_type::<NoBlockResponse>();
        assert_eq!(
            decode_message(&topic, &bytes).unwrap(),
            SyncMessage::from(NoBlockResponse::new(BlockHeight(9)))
        );
    }

    #[test]
    fn test_invalid_compressed_data() {
        let bytes = vec![99, 1, 2, 3];
        let topic = Topic::for_type::<BlockRequest>();
        let result = decode_message(&topic, &bytes);
        assert!(matches!(result, Err(CodecError::Decompress(_))));
    }

    #[test]
    fn test_payload_mismatch() {
        let bytes = wire::compress(b"{\"unexpected\": true}");
        let topic = Topic::for_type::<BlockResponse>();
        assert!(matches!(
            decode_message(&topic, &bytes),
            Err(CodecError::JsonDecode(_))
        ));
    }

    #[test]
    fn test_unknown_topic() {
        let bytes = wire::compress(b"null");
        let topic = Topic::parse("fastsync/unknown.type/1.0.0").unwrap();
        assert!(matches!(
            decode_message(&topic, &bytes),
            Err(CodecError::UnknownTopic(_))
        ));

        let old = Topic::parse("fastsync/status.request/0.9.0").unwrap();
        assert!(matches!(
            decode_message(&old, &bytes),
            Err(CodecError::UnknownTopic(_))
        ));
    }

    #[test]
    fn test_topic_parse() {
        let topic = Topic::parse("fastsync/block.none/1.0.0").unwrap();
        assert_eq!(topic.message_type(), "block.none");
        assert_eq!(topic.to_string(), "fastsync/block.none/1.0.0");

        for bad in ["", "other/block.none/1.0.0", "fastsync/block.none", "fastsync//1.0.0"] {
            assert!(matches!(
                Topic::parse(bad),
                Err(CodecError::MalformedTopic(_))
            ));
        }
        assert!(Topic::parse("fastsync/a/1/extra").is_err());
    }

    #[test]
    fn test_empty_message() {
        let topic = Topic::for_type::<StatusRequest>();
        assert!(matches!(
            decode_message(&topic, &[]),
            Err(CodecError::MessageTooShort)
        ));
    }
}

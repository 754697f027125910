//! Message encoding and decoding for network transport.
//!
//! # Wire Format
//!
//! All messages are bincode-encoded then LZ4-compressed:
//!
//! ```text
//! [u32 LE uncompressed length][LZ4 compressed bincode payload]
//! ```
//!
//! # Topic-Based Type Dispatch
//!
//! Message type is determined by the topic the frame travels on, not by a
//! field in the message. This keeps the payload free of framing and lets the
//! transport route by topic.

use super::wire::{self, WireError};
use bytes::Bytes;
use gambit_core::{Event, OutboundMessage};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Message too short")]
    MessageTooShort,

    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Decompression error: {0}")]
    Decompress(#[from] WireError),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("{trailing} trailing bytes after {topic} payload")]
    TrailingBytes { topic: String, trailing: usize },
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::serde::encode_to_vec(value, bincode::config::standard())?)
}

fn decode<T: DeserializeOwned>(topic: &str, payload: &[u8]) -> Result<T, CodecError> {
    let (value, read) =
        bincode::serde::decode_from_slice::<T, _>(payload, bincode::config::standard())?;
    if read != payload.len() {
        return Err(CodecError::TrailingBytes {
            topic: topic.to_string(),
            trailing: payload.len() - read,
        });
    }
    Ok(value)
}

/// Encode an outbound message to wire format.
///
/// The topic to send it on is [`OutboundMessage::topic`].
pub fn encode_message(message: &OutboundMessage) -> Result<Bytes, CodecError> {
    let payload = match message {
        OutboundMessage::GameStart(gossip) => encode(gossip)?,
        OutboundMessage::TransactionGossip(gossip) => encode(gossip.as_ref())?,
        OutboundMessage::Proposal(gossip) => encode(gossip.as_ref())?,
        OutboundMessage::Vote(gossip) => encode(gossip)?,
        OutboundMessage::Prepared(gossip) => encode(gossip.as_ref())?,
        OutboundMessage::Commit(gossip) => encode(gossip.as_ref())?,
        OutboundMessage::ViewChange(gossip) => encode(gossip.as_ref())?,
        OutboundMessage::SyncRequest(request) => encode(request)?,
    };

    Ok(Bytes::from(wire::compress(&payload)))
}

/// Decode a message from wire format based on topic.
///
/// LZ4-decompresses then bincode-decodes the message and converts it into
/// the event the receiving node handles.
pub fn decode_message(topic: &str, data: &[u8]) -> Result<Event, CodecError> {
    if data.is_empty() {
        return Err(CodecError::MessageTooShort);
    }

    let payload = wire::decompress(data)?;

    let message = match topic {
        "game.start" => OutboundMessage::GameStart(decode(topic, &payload)?),
        "transaction.gossip" => {
            OutboundMessage::TransactionGossip(Box::new(decode(topic, &payload)?))
        }
        "consensus.proposal" => OutboundMessage::Proposal(Box::new(decode(topic, &payload)?)),
        "consensus.vote" => OutboundMessage::Vote(decode(topic, &payload)?),
        "consensus.prepared" => OutboundMessage::Prepared(Box::new(decode(topic, &payload)?)),
        "consensus.commit" => OutboundMessage::Commit(Box::new(decode(topic, &payload)?)),
        "consensus.view_change" => {
            OutboundMessage::ViewChange(Box::new(decode(topic, &payload)?))
        }
        "sync.request" => OutboundMessage::SyncRequest(decode(topic, &payload)?),
        other => return Err(CodecError::UnknownTopic(other.to_string())),
    };

    Ok(message.into_event())
}

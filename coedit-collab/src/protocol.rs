//! Binary protocol between websocket providers and the sync server.
//!
//! Wire format (bincode-encoded):
//! ```text
//! ┌──────────┬───────────┬──────────┬──────────┐
//! │ msg_type │ client_id │ room     │ payload  │
//! │ 1 byte   │ varint    │ string   │ variable │
//! └──────────┴───────────┴──────────┴──────────┘
//! ```
//!
//! Payloads are raw yrs v1 encodings for the sync messages, a bincode
//! [`AwarenessMessage`] for awareness and a UTF-8 document key for content
//! requests.

use coedit_core::{AwarenessMessage, ClientId, CollabError, DocumentKey};
use futures_util::{Sink, SinkExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message;

/// Result of connection-level work on either side of the socket.
pub(crate) type ConnectionResult<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Client id used by the server for messages it originates.
pub const SERVER_CLIENT_ID: ClientId = 0;

/// Message types for the sync protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Yrs state vector opening the handshake
    SyncStep1 = 1,
    /// Yrs diff answering a state vector
    SyncStep2 = 2,
    /// Incremental yrs update
    Update = 3,
    /// Presence and cursors
    Awareness = 4,
    /// Ask the server to seed a document's shared text
    RequestContent = 5,
    /// Heartbeat ping
    Ping = 7,
    /// Heartbeat pong
    Pong = 8,
}

/// Top-level protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub msg_type: MessageType,
    pub client_id: ClientId,
    pub room: String,
    pub payload: Vec<u8>,
}

impl SyncMessage {
    fn new(msg_type: MessageType, client_id: ClientId, room: &str, payload: Vec<u8>) -> Self {
        Self {
            msg_type,
            client_id,
            room: room.to_string(),
            payload,
        }
    }

    /// Create a sync step 1 (state vector).
    pub fn sync_step1(client_id: ClientId, room: &str, state_vector: Vec<u8>) -> Self {
        Self::new(MessageType::SyncStep1, client_id, room, state_vector)
    }

    /// Create a sync step 2 (diff against the peer's state vector).
    pub fn sync_step2(client_id: ClientId, room: &str, diff: Vec<u8>) -> Self {
        Self::new(MessageType::SyncStep2, client_id, room, diff)
    }

    pub fn update(client_id: ClientId, room: &str, update: Vec<u8>) -> Self {
        Self::new(MessageType::Update, client_id, room, update)
    }

    pub fn awareness(
        client_id: ClientId,
        room: &str,
        message: &AwarenessMessage,
    ) -> Result<Self, ProtocolError> {
        let payload = bincode::serde::encode_to_vec(message, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))?;
        Ok(Self::new(MessageType::Awareness, client_id, room, payload))
    }

    pub fn request_content(client_id: ClientId, room: &str, key: &DocumentKey) -> Self {
        Self::new(
            MessageType::RequestContent,
            client_id,
            room,
            key.as_str().as_bytes().to_vec(),
        )
    }

    pub fn ping(client_id: ClientId, room: &str) -> Self {
        Self::new(MessageType::Ping, client_id, room, Vec::new())
    }

    pub fn pong(client_id: ClientId, room: &str) -> Self {
        Self::new(MessageType::Pong, client_id, room, Vec::new())
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(msg)
    }

    /// Parse awareness payload.
    pub fn awareness_message(&self) -> Result<AwarenessMessage, ProtocolError> {
        if self.msg_type != MessageType::Awareness {
            return Err(ProtocolError::InvalidMessageType);
        }
        let (message, _) =
            bincode::serde::decode_from_slice(&self.payload, bincode::config::standard())
                .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(message)
    }

    /// Parse the key of a content request.
    pub fn requested_key(&self) -> Result<DocumentKey, ProtocolError> {
        if self.msg_type != MessageType::RequestContent {
            return Err(ProtocolError::InvalidMessageType);
        }
        let key = std::str::from_utf8(&self.payload)
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        if key.is_empty() {
            return Err(ProtocolError::DeserializationError("empty document key".into()));
        }
        Ok(DocumentKey::from(key))
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("serialization error: {0}")]
    SerializationError(String),
    #[error("deserialization error: {0}")]
    DeserializationError(String),
    #[error("invalid message type")]
    InvalidMessageType,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("connection timeout")]
    Timeout,
}

impl From<ProtocolError> for CollabError {
    fn from(err: ProtocolError) -> Self {
        CollabError::Transport(err.to_string())
    }
}

/// Encode and send one protocol message.
pub(crate) async fn send_message<S>(sink: &mut S, msg: &SyncMessage) -> ConnectionResult<()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let encoded = msg.encode()?;
    sink.send(Message::Binary(encoded.into())).await?;
    Ok(())
}

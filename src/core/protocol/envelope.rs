//! Application wire protocol on the data channel.
//!
//! Two frame kinds share the channel:
//!
//!   - text frames carry one JSON-encoded [`MessageEnvelope`];
//!   - binary frames carry one raw file chunk, with no wrapper at all.
//!
//! The receiver tells them apart by the kind the channel reports for the
//! message, never by looking inside the payload.

use super::signaling::{IceCandidate, SessionDescription, SignalPayload};
use crate::core::error::TransferError;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ── Envelopes ────────────────────────────────────────────────────────────────

/// Structured application messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessageEnvelope {
    /// Announces the file whose chunks follow.
    Header { name: String, mime: String, size: u64 },
    /// The sender paused after a partition; `offset` is the byte count sent so far.
    PartitionEnd { offset: u64 },
    /// The receiver got everything up to `offset`; the sender may continue.
    PartitionAck { offset: u64 },
    /// Receiver-side progress in `[0, 1)`.
    Progress { progress: f64 },
    /// The receiver assembled the whole file.
    Complete,
    /// A short text message, see [`encode_text`].
    Text { text: String },
    /// A relayed negotiation message.
    Signal {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sdp: Option<SessionDescription>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        candidate: Option<IceCandidate>,
    },
}

impl MessageEnvelope {
    /// Build an outbound signal addressed to `to`.
    pub fn signal_to(to: &str, payload: SignalPayload) -> Self {
        let (sdp, candidate) = payload.into_parts();
        Self::Signal {
            to: Some(to.to_string()),
            sender: None,
            sdp,
            candidate,
        }
    }

    pub fn encode(&self) -> Result<String, TransferError> {
        serde_json::to_string(self).map_err(|e| TransferError::Malformed(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, TransferError> {
        serde_json::from_str(text).map_err(|e| TransferError::Malformed(e.to_string()))
    }
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// One data-channel message.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A structured envelope, JSON text.
    Text(String),
    /// A raw file chunk.
    Binary(Bytes),
}

impl Frame {
    pub fn envelope(msg: &MessageEnvelope) -> Result<Self, TransferError> {
        Ok(Self::Text(msg.encode()?))
    }

    pub fn chunk(data: Bytes) -> Self {
        Self::Binary(data)
    }
}

// ── Text codec ───────────────────────────────────────────────────────────────

/// Encode a text message so it survives transport inside a JSON string
/// byte for byte (base64 of the UTF-8 bytes).
pub fn encode_text(text: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(text.as_bytes())
}

/// Reverse [`encode_text`].
pub fn decode_text(encoded: &str) -> Result<String, TransferError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| TransferError::Malformed(format!("text payload: {e}")))?;
    String::from_utf8(bytes).map_err(|e| TransferError::Malformed(format!("text payload: {e}")))
}

//! Typed errors for the parts of the crate whose callers branch on kind.
//!
//! Glue and I/O code keeps using `anyhow::Result`; these enums cover the
//! peer-facing operations and the transfer protocol.

use thiserror::Error;

/// Errors surfaced by peer-level operations.
#[derive(Debug, Error)]
pub enum PeerError {
    /// The operation targets a peer id with no session.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),
    /// A send was attempted while no channel is open.
    #[error("no open channel to peer")]
    ChannelUnavailable,
    /// The negotiation layer rejected a description or candidate.
    #[error("negotiation failed: {0}")]
    Negotiation(String),
    /// The message does not fit in one data-channel message.
    #[error("message of {size} bytes exceeds the {limit}-byte channel limit")]
    MessageTooLarge { size: usize, limit: usize },
}

/// Errors raised while producing or consuming file data.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Received bytes would exceed the declared file size.
    #[error("size mismatch: declared {declared} bytes, got at least {received}")]
    SizeMismatch { declared: u64, received: u64 },
    /// A chunk arrived after the file was already complete.
    #[error("chunk received after completion")]
    UnexpectedChunk,
    /// The byte source ended before the declared size was read.
    #[error("source ended at offset {offset}, expected {size} bytes")]
    SourceTruncated { offset: u64, size: u64 },
    /// A frame could not be decoded.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// An encoded frame is larger than one data-channel message.
    #[error("frame of {size} bytes exceeds the {limit}-byte channel limit")]
    FrameTooLarge { size: usize, limit: usize },
    /// Reading the byte source failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

//! Transport capability used by the peer worker.
//!
//! A [`Link`] is one peer's duplex channel plus the negotiation calls that
//! establish it. Every [`Link::create_offer`] / [`Link::accept_offer`]
//! starts a fresh underlying connection and bumps [`Link::attempt`];
//! the events of that connection arrive tagged with the attempt number so
//! the worker can drop events of superseded connections.

#[cfg(test)]
pub mod memory;
pub mod webrtc;

use crate::core::error::PeerError;
use crate::core::protocol::{Frame, IceCandidate, SessionDescription};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub use self::webrtc::{WebRtcFactory, WebRtcLink};

/// Something that happened on a link's current (or a previous) connection.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A local connectivity candidate to relay to the peer.
    LocalCandidate(IceCandidate),
    ChannelOpen,
    ChannelClosed,
    Disconnected,
    Failed,
    /// Candidate gathering reported an error. Not fatal.
    GatheringFailed(String),
    /// One inbound data-channel message.
    Frame(Frame),
}

/// Sink for `(attempt, event)` pairs.
pub type LinkEvents = mpsc::UnboundedSender<(u64, LinkEvent)>;

#[async_trait]
pub trait Link: Send + 'static {
    /// Number of the current connection. `0` before the first one.
    fn attempt(&self) -> u64;

    /// Start a new connection as the offering side.
    async fn create_offer(&mut self) -> Result<SessionDescription>;

    /// Start a new connection from a remote offer and produce the answer.
    async fn accept_offer(&mut self, offer: SessionDescription) -> Result<SessionDescription>;

    /// Apply the remote answer to the current connection.
    async fn apply_answer(&mut self, answer: SessionDescription) -> Result<()>;

    /// Feed a remote candidate to the current connection.
    async fn add_candidate(&mut self, candidate: IceCandidate) -> Result<()>;

    /// Send one frame on the open channel.
    async fn send(&mut self, frame: Frame) -> Result<(), PeerError>;

    /// Tear down the current connection, if any.
    async fn close(&mut self);
}

/// Builds one [`Link`] per remote peer.
pub trait LinkFactory: Send + Sync + 'static {
    type Link: Link;

    fn connect(&self, local_id: &str, peer_id: &str, events: LinkEvents) -> Self::Link;
}

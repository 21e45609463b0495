//! Wire protocol: data-channel envelopes, frames and negotiation payloads.

pub mod envelope;
pub mod signaling;

pub use envelope::{decode_text, encode_text, Frame, MessageEnvelope};
pub use signaling::{DescriptionKind, IceCandidate, SessionDescription, SignalPayload};

//! Negotiation payloads carried through the relay.
//!
//! The JSON shapes mirror the browser's `RTCSessionDescription` and
//! `RTCIceCandidateInit` so any peer speaking the same relay protocol can
//! read them.

use crate::core::error::TransferError;
use serde::{Deserialize, Serialize};

/// Whether a description opens or answers a negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionKind {
    Offer,
    Answer,
}

/// A session description (offer or answer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: DescriptionKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: DescriptionKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: DescriptionKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A connectivity candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// One negotiation message: either a description or a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalPayload {
    Description(SessionDescription),
    Candidate(IceCandidate),
}

impl SignalPayload {
    /// Build a payload from the optional `sdp` / `candidate` fields of a
    /// signal envelope. Exactly one of them must be present.
    pub fn from_parts(
        sdp: Option<SessionDescription>,
        candidate: Option<IceCandidate>,
    ) -> Result<Self, TransferError> {
        match (sdp, candidate) {
            (Some(desc), None) => Ok(Self::Description(desc)),
            (None, Some(c)) => Ok(Self::Candidate(c)),
            (None, None) => Err(TransferError::Malformed(
                "signal carries neither sdp nor candidate".into(),
            )),
            (Some(_), Some(_)) => Err(TransferError::Malformed(
                "signal carries both sdp and candidate".into(),
            )),
        }
    }

    /// Split back into the `(sdp, candidate)` wire fields.
    pub fn into_parts(self) -> (Option<SessionDescription>, Option<IceCandidate>) {
        match self {
            Self::Description(desc) => (Some(desc), None),
            Self::Candidate(c) => (None, Some(c)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_uses_browser_shape() {
        let json = serde_json::to_value(SessionDescription::offer("v=0")).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "offer", "sdp": "v=0" }));
    }

    #[test]
    fn candidate_field_names() {
        let c: IceCandidate = serde_json::from_str(
            r#"{"candidate":"candidate:1 1 udp 1 1.2.3.4 5 typ host","sdpMid":"0","sdpMLineIndex":0}"#,
        )
        .unwrap();
        assert_eq!(c.sdp_mid.as_deref(), Some("0"));
        assert_eq!(c.sdp_mline_index, Some(0));
        assert!(c.username_fragment.is_none());
    }

    #[test]
    fn payload_requires_exactly_one_part() {
        assert!(SignalPayload::from_parts(None, None).is_err());

        let desc = SessionDescription::answer("v=0");
        let cand = IceCandidate {
            candidate: "c".into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        };
        assert!(SignalPayload::from_parts(Some(desc.clone()), Some(cand)).is_err());
        assert_eq!(
            SignalPayload::from_parts(Some(desc.clone()), None).unwrap(),
            SignalPayload::Description(desc)
        );
    }
}

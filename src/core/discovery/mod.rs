//! Discovery and relay transport.
//!
//! The relay is polled for a full roster snapshot plus any negotiation
//! messages addressed to us. [`RosterTracker`] turns successive snapshots
//! into join/leave sets for the manager.

mod http;

pub use http::HttpDiscovery;

use crate::core::protocol::{MessageEnvelope, SignalPayload};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::warn;

// ── Wire types ───────────────────────────────────────────────────────────────

/// Body of one poll reply.
#[derive(Debug, Clone, Deserialize)]
pub struct PollResponse {
    /// Our own id, assigned by the relay.
    pub id: String,
    #[serde(default)]
    pub name: Option<DisplayName>,
    #[serde(default)]
    pub peers: Vec<RosterPeer>,
    /// Relayed envelopes; decoded leniently by [`PollResponse::relayed_signals`].
    #[serde(default)]
    pub signals: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayName {
    pub display_name: String,
}

/// One roster entry. Fields other than `id` are kept but not interpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct RosterPeer {
    pub id: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PollResponse {
    /// `(sender, payload)` for every well-formed relayed signal.
    pub fn relayed_signals(&self) -> Vec<(String, SignalPayload)> {
        self.signals
            .iter()
            .filter_map(|value| match decode_relayed(value) {
                Ok(signal) => Some(signal),
                Err(reason) => {
                    warn!(event = "relayed_signal_rejected", reason = %reason, "Skipping relayed signal");
                    None
                }
            })
            .collect()
    }
}

fn decode_relayed(value: &serde_json::Value) -> Result<(String, SignalPayload), String> {
    let envelope: MessageEnvelope =
        serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
    match envelope {
        MessageEnvelope::Signal {
            sender: Some(sender),
            sdp,
            candidate,
            ..
        } => {
            let payload = SignalPayload::from_parts(sdp, candidate).map_err(|e| e.to_string())?;
            Ok((sender, payload))
        }
        MessageEnvelope::Signal { sender: None, .. } => Err("signal without sender".into()),
        _ => Err("not a signal envelope".into()),
    }
}

// ── Transport ────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Discovery: Send + Sync {
    /// Fetch the roster snapshot and pending signals.
    async fn poll(&self) -> Result<PollResponse>;

    /// Relay a negotiation message to peer `to`.
    async fn relay(&self, to: &str, payload: SignalPayload) -> Result<()>;

    /// Tell the relay we are leaving. Best effort.
    async fn leave(&self) -> Result<()>;
}

// ── Roster diff ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterDiff {
    pub joined: Vec<String>,
    pub left: Vec<String>,
}

impl RosterDiff {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

/// Remembers the previous roster snapshot.
#[derive(Debug, Default)]
pub struct RosterTracker {
    known: Vec<String>,
}

impl RosterTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `snapshot` with the previous one. `local_id` never appears in
    /// either set; duplicates are collapsed. Known ids keep the order in
    /// which they first appeared, whatever order later snapshots use.
    pub fn diff(&mut self, local_id: &str, snapshot: &[RosterPeer]) -> RosterDiff {
        let mut seen = HashSet::new();
        let current: Vec<String> = snapshot
            .iter()
            .map(|p| p.id.clone())
            .filter(|id| id != local_id && seen.insert(id.clone()))
            .collect();

        let previous: HashSet<&String> = self.known.iter().collect();
        let joined: Vec<String> = current
            .iter()
            .filter(|id| !previous.contains(id))
            .cloned()
            .collect();
        let (kept, left): (Vec<String>, Vec<String>) =
            self.known.drain(..).partition(|id| seen.contains(id));

        self.known = kept;
        self.known.extend(joined.iter().cloned());
        RosterDiff { joined, left }
    }

    pub fn known(&self) -> &[String] {
        &self.known
    }
}

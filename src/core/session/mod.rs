//! Per-peer negotiation state machine.
//!
//! ```text
//!            start
//!   Idle ───────────► Negotiating ──ChannelOpen──► Open
//!                       ▲    │                      │
//!          reconnect    │    │ error / timeout      │ closed / disconnected / failed
//!          (caller)     │    ▼                      │
//!                       └── Closed ◄────────────────┘
//! ```
//!
//! [`PeerSession`] does no I/O. Every input returns the [`SessionAction`]s
//! the peer worker must carry out against the link and the relay, so the
//! transitions can be exercised directly in tests.

mod election;

pub use election::{elect, elected_caller, Role};

use crate::core::config::RECONNECT_RETRY_DELAYS;
use crate::core::protocol::{DescriptionKind, IceCandidate, SessionDescription, SignalPayload};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Negotiating,
    Open,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Negotiating => "negotiating",
            SessionState::Open => "open",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Work requested by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Start a fresh connection, create an offer and relay it.
    SendOffer,
    /// Start a fresh connection from the remote offer and relay the answer.
    AnswerOffer(SessionDescription),
    /// Apply the remote answer to the current connection.
    ApplyAnswer(SessionDescription),
    /// Feed a remote candidate to the current connection.
    AddCandidate(IceCandidate),
    /// Call [`PeerSession::on_reconnect_due`] after the delay.
    ScheduleReconnect(Duration),
    /// Reconnect attempts are exhausted; the peer is unreachable.
    GiveUp,
}

/// Negotiation state for one remote peer.
#[derive(Debug)]
pub struct PeerSession {
    peer_id: String,
    role: Role,
    state: SessionState,
    /// The current connection has its remote description.
    remote_described: bool,
    /// Candidates that arrived before the remote description.
    pending_candidates: Vec<IceCandidate>,
    /// Consecutive losses since the channel was last open.
    reconnect_attempts: usize,
    gave_up: bool,
}

impl PeerSession {
    pub fn new(local_id: &str, peer_id: &str) -> Self {
        let role = elect(local_id, peer_id);
        debug!(event = "role_elected", peer = %peer_id, role = %role);
        Self {
            peer_id: peer_id.to_string(),
            role,
            state: SessionState::Idle,
            remote_described: false,
            pending_candidates: Vec::new(),
            reconnect_attempts: 0,
            gave_up: false,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    pub fn reconnect_attempts(&self) -> usize {
        self.reconnect_attempts
    }

    /// `true` once the caller stopped reconnecting.
    pub fn gave_up(&self) -> bool {
        self.gave_up
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    // ── Inputs ──────────────────────────────────────────────────────────

    /// Leave `Idle`. The caller sends an offer, the callee waits for one.
    pub fn start(&mut self) -> Vec<SessionAction> {
        if self.state != SessionState::Idle {
            return Vec::new();
        }
        self.begin()
    }

    fn begin(&mut self) -> Vec<SessionAction> {
        self.remote_described = false;
        self.pending_candidates.clear();
        match self.role {
            Role::Caller => {
                info!(event = "negotiation_start", peer = %self.peer_id, role = %self.role);
                self.state = SessionState::Negotiating;
                vec![SessionAction::SendOffer]
            }
            Role::Callee => {
                debug!(event = "awaiting_offer", peer = %self.peer_id);
                self.state = SessionState::Negotiating;
                Vec::new()
            }
            Role::Unknown => {
                warn!(event = "role_unknown", peer = %self.peer_id, "Cannot negotiate with own id");
                self.state = SessionState::Closed;
                Vec::new()
            }
        }
    }

    /// A relayed negotiation message from this peer.
    pub fn on_signal(&mut self, payload: SignalPayload) -> Vec<SessionAction> {
        match payload {
            SignalPayload::Description(desc) => match (desc.kind, self.role) {
                (DescriptionKind::Offer, Role::Callee) => {
                    // a new offer always supersedes the current connection
                    info!(event = "offer_received", peer = %self.peer_id, state = %self.state);
                    // candidates relayed ahead of the offer stay buffered
                    self.state = SessionState::Negotiating;
                    self.remote_described = false;
                    vec![SessionAction::AnswerOffer(desc)]
                }
                (DescriptionKind::Answer, Role::Caller)
                    if self.state == SessionState::Negotiating && !self.remote_described =>
                {
                    info!(event = "answer_received", peer = %self.peer_id);
                    vec![SessionAction::ApplyAnswer(desc)]
                }
                (kind, role) => {
                    warn!(
                        event = "unexpected_description",
                        peer = %self.peer_id,
                        kind = ?kind,
                        role = %role,
                        state = %self.state,
                        "Ignoring description"
                    );
                    Vec::new()
                }
            },
            SignalPayload::Candidate(candidate) => {
                if self.remote_described {
                    vec![SessionAction::AddCandidate(candidate)]
                } else {
                    debug!(event = "candidate_buffered", peer = %self.peer_id);
                    self.pending_candidates.push(candidate);
                    Vec::new()
                }
            }
        }
    }

    /// The remote description was applied to the current connection.
    /// Releases buffered candidates.
    pub fn remote_description_applied(&mut self) -> Vec<SessionAction> {
        self.remote_described = true;
        self.pending_candidates
            .drain(..)
            .map(SessionAction::AddCandidate)
            .collect()
    }

    /// The data channel opened. Returns `true` on the transition into
    /// `Open`, `false` if it was already open.
    pub fn on_channel_open(&mut self) -> bool {
        if self.state == SessionState::Open {
            return false;
        }
        info!(event = "channel_open", peer = %self.peer_id, role = %self.role);
        self.state = SessionState::Open;
        self.reconnect_attempts = 0;
        self.gave_up = false;
        true
    }

    /// The channel closed, disconnected or failed.
    pub fn on_channel_lost(&mut self) -> Vec<SessionAction> {
        if !matches!(self.state, SessionState::Negotiating | SessionState::Open) {
            return Vec::new();
        }
        info!(event = "channel_lost", peer = %self.peer_id, role = %self.role, state = %self.state);
        self.state = SessionState::Closed;
        self.remote_described = false;
        self.pending_candidates.clear();

        if self.role != Role::Caller || self.gave_up {
            return Vec::new();
        }

        let attempt = self.reconnect_attempts;
        self.reconnect_attempts += 1;
        if attempt == 0 {
            return self.begin();
        }
        match RECONNECT_RETRY_DELAYS.get(attempt - 1) {
            Some(secs) => {
                debug!(event = "reconnect_scheduled", peer = %self.peer_id, attempt, delay_secs = *secs);
                vec![SessionAction::ScheduleReconnect(Duration::from_secs(*secs))]
            }
            None => {
                warn!(event = "reconnect_exhausted", peer = %self.peer_id, attempts = attempt, "Giving up");
                self.gave_up = true;
                vec![SessionAction::GiveUp]
            }
        }
    }

    /// A description could not be created or applied, or negotiation timed out.
    pub fn on_negotiation_error(&mut self, reason: &str) -> Vec<SessionAction> {
        warn!(event = "negotiation_error", peer = %self.peer_id, reason, "Negotiation attempt aborted");
        self.on_channel_lost()
    }

    /// A scheduled reconnect fired.
    pub fn on_reconnect_due(&mut self) -> Vec<SessionAction> {
        if self.state != SessionState::Closed || self.role != Role::Caller || self.gave_up {
            return Vec::new();
        }
        self.begin()
    }

    /// Re-enter negotiation unless already connecting or connected.
    pub fn refresh(&mut self) -> Vec<SessionAction> {
        if matches!(self.state, SessionState::Negotiating | SessionState::Open) {
            return Vec::new();
        }
        info!(event = "session_refresh", peer = %self.peer_id, state = %self.state);
        self.gave_up = false;
        self.reconnect_attempts = 0;
        self.begin()
    }
}

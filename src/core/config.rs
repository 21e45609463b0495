//! Centralized configuration constants for peerdrop.
//!
//! Tunable parameters live here so they can be reviewed in one place.
//! Wire-format details (envelope tags, frame kinds) stay in
//! [`crate::core::protocol`].

use std::time::Duration;

// ── Transfer / Chunking ──────────────────────────────────────────────────────

/// Default chunk size in bytes.
///
/// One chunk travels as one binary data-channel message, so this stays
/// below the 64 KiB SCTP message size browsers accept by default.
pub const CHUNK_SIZE: usize = 64_000;

/// Default partition cap in bytes.
///
/// The sender stops reading after this many bytes and waits for the
/// receiver's `partition-ack` before continuing.
pub const PARTITION_SIZE: u64 = 1_000_000;

/// Minimum progress delta (as a fraction of the file) between two
/// `progress` notices sent back by the receiver.
pub const PROGRESS_STEP: f64 = 0.01;

/// MIME type used when the content type of a file cannot be detected.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Maximum text messages held while the channel is not open.
pub const MAX_PENDING_TEXTS: usize = 64;

// ── Timeouts ─────────────────────────────────────────────────────────────────

/// How long a negotiation attempt may stay unanswered before it is
/// abandoned and treated as a negotiation failure.
pub const NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the sender waits for a `partition-ack` before aborting the
/// active file. The next queued file (if any) starts afterwards.
pub const PARTITION_ACK_TIMEOUT: Duration = Duration::from_secs(60);

// ── Reconnect ────────────────────────────────────────────────────────────────

/// Delays (in seconds) between consecutive reconnect attempts after the
/// first, immediate one. Once exhausted the caller side gives up and the
/// peer is reported unreachable.
pub const RECONNECT_RETRY_DELAYS: [u64; 5] = [1, 3, 5, 10, 20];

// ── Discovery / Relay ────────────────────────────────────────────────────────

/// Default roster polling interval.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound for a single relay HTTP request.
pub const RELAY_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for the best-effort leave notification on shutdown.
pub const LEAVE_TIMEOUT: Duration = Duration::from_secs(2);

// ── Connection / Network ─────────────────────────────────────────────────────

/// Label of the single application data channel.
pub const DATA_CHANNEL_LABEL: &str = "data";

/// Largest single data-channel message, sent and advertised through
/// `a=max-message-size`. Chunks and encoded texts must fit in it.
pub const SCTP_MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// STUN server used when none is configured.
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

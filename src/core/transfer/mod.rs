//! Per-peer file and text transfer protocol.
//!
//! # Protocol Overview
//!
//! ```text
//!  sender                                   receiver
//!    │ header{name,mime,size}  ──────────────► │  new IncomingTransfer
//!    │ chunk … chunk           ──────────────► │  Reassembler::accept
//!    │ ◄──────────────────────  progress{p}    │  (every ≥1 %)
//!    │ partition-end{offset}   ──────────────► │
//!    │ ◄──────────────────────  partition-ack  │  (immediately)
//!    │ chunk … chunk           ──────────────► │
//!    │ ◄──────────────────────  complete       │  file surfaced
//! ```
//!
//! - One file is in flight per peer; further files wait in a FIFO queue
//!   and start only after the receiver reports `complete`.
//! - The sender never has more than one unacknowledged partition.
//! - A dropped channel aborts both directions; nothing is resumed.
//!
//! This type performs no I/O on the channel. The peer worker pulls frames
//! with [`TransferSession::next_frame`], feeds inbound frames to
//! [`TransferSession::on_frame`], sends back the returned replies and
//! forwards [`TransferSession::drain_events`] to the application.

mod job;

pub use job::{ByteSource, TransferJob};

use crate::core::config::{CHUNK_SIZE, PARTITION_SIZE, PROGRESS_STEP, SCTP_MAX_MESSAGE_SIZE};
use crate::core::error::TransferError;
use crate::core::pipeline::{ChunkReader, FileHeader, ReadStep, ReceivedFile, Reassembler};
use crate::core::protocol::{decode_text, encode_text, Frame, MessageEnvelope};
use std::collections::VecDeque;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ── Configuration ────────────────────────────────────────────────────────────

/// Chunking parameters for outbound files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    pub chunk_size: usize,
    pub partition_size: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            partition_size: PARTITION_SIZE,
        }
    }
}

impl TransferConfig {
    /// Clamp to values the channel can carry: a chunk is at least one byte
    /// and at most one data-channel message, a partition at least one byte.
    pub fn bounded(self) -> Self {
        Self {
            chunk_size: self.chunk_size.clamp(1, SCTP_MAX_MESSAGE_SIZE as usize),
            partition_size: self.partition_size.max(1),
        }
    }
}

// ── App-facing Events ────────────────────────────────────────────────────────

/// Transfer notifications for the application layer.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    // ── Sender ───────────────────────────────────────────────────────────────
    SendStarted { id: Uuid, name: String, size: u64 },
    /// Receiver-reported progress, non-decreasing and below 1 until completion.
    SendProgress { id: Uuid, progress: f64 },
    SendComplete { id: Uuid, name: String },
    SendAborted { id: Uuid, name: String, reason: String },

    // ── Receiver ─────────────────────────────────────────────────────────────
    ReceiveStarted { name: String, mime: String, size: u64 },
    ReceiveProgress { name: String, progress: f64 },
    FileReceived(ReceivedFile),
    ReceiveAborted { name: String },

    // ── Text ─────────────────────────────────────────────────────────────────
    TextReceived(String),
}

// ── Internal State ───────────────────────────────────────────────────────────

/// The file currently being sent.
struct ActiveSend {
    id: Uuid,
    header: FileHeader,
    reader: ChunkReader<ByteSource>,
    header_sent: bool,
    /// Offset of the `partition-end` still waiting for its ack.
    awaiting_ack: Option<u64>,
    progress: f64,
}

/// The file currently being received.
struct IncomingTransfer {
    reassembler: Reassembler,
    last_reported: f64,
}

// ── TransferSession ──────────────────────────────────────────────────────────

/// Sender queue and receiver state for one peer.
pub struct TransferSession {
    config: TransferConfig,
    queue: VecDeque<TransferJob>,
    active: Option<ActiveSend>,
    incoming: Option<IncomingTransfer>,
    events: Vec<TransferEvent>,
}

impl TransferSession {
    pub fn new(config: TransferConfig) -> Self {
        let bounded = config.bounded();
        if bounded != config {
            warn!(
                event = "transfer_config_clamped",
                chunk_size = bounded.chunk_size,
                partition_size = bounded.partition_size,
                "Chunking parameters adjusted to channel limits"
            );
        }
        Self {
            config: bounded,
            queue: VecDeque::new(),
            active: None,
            incoming: None,
            events: Vec::new(),
        }
    }

    /// Queue a file. It starts once every earlier file has completed.
    pub fn enqueue(&mut self, job: TransferJob) {
        debug!(event = "transfer_enqueued", id = %job.id, name = %job.name, size = job.size);
        self.queue.push_back(job);
    }

    /// `true` while a file is in flight.
    pub fn busy(&self) -> bool {
        self.active.is_some()
    }

    /// Number of files waiting behind the active one.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Offset of the partition waiting for an ack, if any.
    pub fn awaiting_ack(&self) -> Option<u64> {
        self.active.as_ref().and_then(|a| a.awaiting_ack)
    }

    /// `true` while a file is being received.
    pub fn receiving(&self) -> bool {
        self.incoming.is_some()
    }

    /// Take the notifications accumulated since the last call.
    pub fn drain_events(&mut self) -> Vec<TransferEvent> {
        std::mem::take(&mut self.events)
    }

    /// Build the frame for a text message. Fails with `FrameTooLarge` when
    /// the encoded envelope does not fit in one data-channel message.
    pub fn text_frame(text: &str) -> Result<Frame, TransferError> {
        let encoded = MessageEnvelope::Text {
            text: encode_text(text),
        }
        .encode()?;
        let limit = SCTP_MAX_MESSAGE_SIZE as usize;
        if encoded.len() > limit {
            return Err(TransferError::FrameTooLarge {
                size: encoded.len(),
                limit,
            });
        }
        Ok(Frame::Text(encoded))
    }

    // ── Sending ──────────────────────────────────────────────────────────

    /// Next outbound frame of the active file, starting the next queued
    /// file when idle.
    ///
    /// Returns `None` when there is nothing to send right now: no file
    /// queued, the current partition awaits its ack, or the whole file
    /// was sent and the receiver has not confirmed it yet.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, TransferError> {
        loop {
            let Some(active) = self.active.as_mut() else {
                let Some(job) = self.queue.pop_front() else {
                    return Ok(None);
                };
                self.start(job);
                continue;
            };

            if !active.header_sent {
                active.header_sent = true;
                active.reader.start_partition();
                let header = &active.header;
                return Frame::envelope(&MessageEnvelope::Header {
                    name: header.name.clone(),
                    mime: header.mime.clone(),
                    size: header.size,
                })
                .map(Some);
            }

            match active.reader.next_step().await {
                Ok(Some(ReadStep::Chunk(data))) => return Ok(Some(Frame::chunk(data))),
                Ok(Some(ReadStep::PartitionEnd { offset })) => {
                    debug!(event = "partition_end", id = %active.id, offset);
                    active.awaiting_ack = Some(offset);
                    return Frame::envelope(&MessageEnvelope::PartitionEnd { offset }).map(Some);
                }
                Ok(Some(ReadStep::Finished { offset })) => {
                    debug!(event = "file_fully_sent", id = %active.id, offset);
                    return Ok(None);
                }
                Ok(None) => return Ok(None),
                Err(e) => {
                    warn!(event = "source_read_failure", id = %active.id, error = %e, "Aborting file");
                    self.fail_active(&e.to_string());
                }
            }
        }
    }

    fn start(&mut self, job: TransferJob) {
        info!(event = "send_started", id = %job.id, name = %job.name, size = job.size);
        self.events.push(TransferEvent::SendStarted {
            id: job.id,
            name: job.name.clone(),
            size: job.size,
        });
        let id = job.id;
        let header = job.header();
        let reader = job.into_reader(self.config.chunk_size, self.config.partition_size);
        self.active = Some(ActiveSend {
            id,
            header,
            reader,
            header_sent: false,
            awaiting_ack: None,
            progress: 0.0,
        });
    }

    /// Abort the file in flight, if any. Queued files are kept.
    pub fn fail_active(&mut self, reason: &str) {
        if let Some(active) = self.active.take() {
            self.events.push(TransferEvent::SendAborted {
                id: active.id,
                name: active.header.name,
                reason: reason.to_string(),
            });
        }
    }

    /// The channel went away: abort both directions, keep the queue.
    pub fn abort_in_flight(&mut self, reason: &str) {
        self.fail_active(reason);
        if let Some(incoming) = self.incoming.take() {
            info!(
                event = "receive_discarded",
                name = %incoming.reassembler.header().name,
                received = incoming.reassembler.received(),
                "Discarding partial file"
            );
            self.events.push(TransferEvent::ReceiveAborted {
                name: incoming.reassembler.header().name.clone(),
            });
        }
    }

    // ── Receiving ────────────────────────────────────────────────────────

    /// Handle one inbound frame. Returns the envelopes to send back.
    pub fn on_frame(&mut self, frame: Frame) -> Result<Vec<MessageEnvelope>, TransferError> {
        match frame {
            Frame::Binary(chunk) => Ok(self.on_chunk(chunk)),
            Frame::Text(text) => {
                let msg = MessageEnvelope::decode(&text)?;
                self.on_envelope(msg)
            }
        }
    }

    fn on_envelope(&mut self, msg: MessageEnvelope) -> Result<Vec<MessageEnvelope>, TransferError> {
        let mut replies = Vec::new();
        match msg {
            MessageEnvelope::Header { name, mime, size } => {
                replies.extend(self.on_header(FileHeader { name, mime, size }));
            }
            MessageEnvelope::PartitionEnd { offset } => {
                replies.push(MessageEnvelope::PartitionAck { offset });
            }
            MessageEnvelope::PartitionAck { offset } => self.on_partition_ack(offset),
            MessageEnvelope::Progress { progress } => self.on_progress(progress),
            MessageEnvelope::Complete => self.on_complete(),
            MessageEnvelope::Text { text } => {
                self.events.push(TransferEvent::TextReceived(decode_text(&text)?));
            }
            MessageEnvelope::Signal { .. } => {
                warn!(event = "signal_on_data_channel", "Ignoring signal envelope on data channel");
            }
        }
        Ok(replies)
    }

    fn on_header(&mut self, header: FileHeader) -> Option<MessageEnvelope> {
        if let Some(previous) = self.incoming.take() {
            if !previous.reassembler.is_complete() {
                warn!(
                    event = "receive_superseded",
                    name = %previous.reassembler.header().name,
                    "New header before previous file completed"
                );
                self.events.push(TransferEvent::ReceiveAborted {
                    name: previous.reassembler.header().name.clone(),
                });
            }
        }

        info!(event = "receive_started", name = %header.name, mime = %header.mime, size = header.size);
        self.events.push(TransferEvent::ReceiveStarted {
            name: header.name.clone(),
            mime: header.mime.clone(),
            size: header.size,
        });

        let mut reassembler = Reassembler::new(header);
        if let Some(file) = reassembler.completion() {
            return Some(self.finish_receive(file));
        }
        self.incoming = Some(IncomingTransfer {
            reassembler,
            last_reported: 0.0,
        });
        None
    }

    fn on_chunk(&mut self, chunk: bytes::Bytes) -> Vec<MessageEnvelope> {
        let Some(incoming) = self.incoming.as_mut() else {
            warn!(event = "chunk_without_header", bytes = chunk.len(), "Dropping chunk");
            return Vec::new();
        };

        match incoming.reassembler.accept(chunk) {
            Ok(Some(file)) => {
                self.incoming = None;
                vec![self.finish_receive(file)]
            }
            Ok(None) => {
                let progress = incoming.reassembler.progress();
                if progress - incoming.last_reported < PROGRESS_STEP {
                    return Vec::new();
                }
                incoming.last_reported = progress;
                self.events.push(TransferEvent::ReceiveProgress {
                    name: incoming.reassembler.header().name.clone(),
                    progress,
                });
                vec![MessageEnvelope::Progress { progress }]
            }
            Err(e) => {
                warn!(event = "chunk_rejected", error = %e, "Discarding incoming file");
                if let Some(incoming) = self.incoming.take() {
                    self.events.push(TransferEvent::ReceiveAborted {
                        name: incoming.reassembler.header().name.clone(),
                    });
                }
                Vec::new()
            }
        }
    }

    fn finish_receive(&mut self, file: ReceivedFile) -> MessageEnvelope {
        info!(event = "receive_complete", name = %file.name, size = file.size);
        self.events.push(TransferEvent::FileReceived(file));
        MessageEnvelope::Complete
    }

    fn on_partition_ack(&mut self, offset: u64) {
        let Some(active) = self.active.as_mut() else {
            warn!(event = "ack_without_transfer", offset, "Ignoring partition-ack");
            return;
        };
        if active.awaiting_ack != Some(offset) {
            warn!(
                event = "ack_offset_mismatch",
                offset,
                expected = ?active.awaiting_ack,
                "Ignoring partition-ack"
            );
            return;
        }
        active.awaiting_ack = None;
        active.reader.start_partition();
    }

    fn on_progress(&mut self, progress: f64) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        // only strictly increasing values below 1; 1 is reserved for `complete`
        if !(progress > active.progress && progress < 1.0) {
            return;
        }
        active.progress = progress;
        self.events.push(TransferEvent::SendProgress {
            id: active.id,
            progress,
        });
    }

    fn on_complete(&mut self) {
        let Some(active) = self.active.take() else {
            warn!(event = "complete_without_transfer", "Ignoring complete");
            return;
        };
        info!(event = "send_complete", id = %active.id, name = %active.header.name);
        self.events.push(TransferEvent::SendProgress {
            id: active.id,
            progress: 1.0,
        });
        self.events.push(TransferEvent::SendComplete {
            id: active.id,
            name: active.header.name,
        });
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    /// Push frames from `tx` to `rx` (replies go straight back) until `tx` has
    /// nothing more to send. Returns every frame `tx` produced.
    async fn run_to_idle(tx: &mut TransferSession, rx: &mut TransferSession) -> Vec<Frame> {
        let mut sent = Vec::new();
        while let Some(frame) = tx.next_frame().await.unwrap() {
            sent.push(frame.clone());
            for reply in rx.on_frame(frame).unwrap() {
                tx.on_frame(Frame::envelope(&reply).unwrap()).unwrap();
            }
        }
        sent
    }

    fn received_files(events: &[TransferEvent]) -> Vec<ReceivedFile> {
        events
            .iter()
            .filter_map(|e| match e {
                TransferEvent::FileReceived(f) => Some(f.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_single_file_end_to_end() {
        let mut tx = TransferSession::new(TransferConfig::default());
        let mut rx = TransferSession::new(TransferConfig::default());
        let data = pattern(2_500_000, 3);
        tx.enqueue(TransferJob::from_bytes("big.bin", "application/octet-stream", data.clone()));

        let sent = run_to_idle(&mut tx, &mut rx).await;

        let chunks = sent.iter().filter(|f| matches!(f, Frame::Binary(_))).count();
        assert_eq!(chunks, 40);
        let partition_ends: Vec<u64> = sent
            .iter()
            .filter_map(|f| match f {
                Frame::Text(t) => match MessageEnvelope::decode(t).unwrap() {
                    MessageEnvelope::PartitionEnd { offset } => Some(offset),
                    _ => None,
                },
                _ => None,
            })
            .collect();
        assert_eq!(partition_ends, vec![1_000_000, 2_000_000]);

        let files = received_files(&rx.drain_events());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].data.len(), data.len());
        assert_eq!(&files[0].data[..], &data[..]);
        assert!(!tx.busy());
        assert!(!rx.receiving());

        let tx_events = tx.drain_events();
        assert!(matches!(tx_events.last(), Some(TransferEvent::SendComplete { name, .. }) if name == "big.bin"));
    }

    #[tokio::test]
    async fn test_sender_pauses_until_ack() {
        let config = TransferConfig {
            chunk_size: 100,
            partition_size: 300,
        };
        let mut tx = TransferSession::new(config);
        tx.enqueue(TransferJob::from_bytes("f", "x/y", pattern(1_000, 0)));

        // header + 3 chunks + partition-end
        let mut frames = Vec::new();
        while let Some(frame) = tx.next_frame().await.unwrap() {
            frames.push(frame);
        }
        assert_eq!(frames.len(), 5);
        assert_eq!(tx.awaiting_ack(), Some(300));
        assert!(tx.next_frame().await.unwrap().is_none());

        // wrong offset is ignored
        tx.on_frame(Frame::envelope(&MessageEnvelope::PartitionAck { offset: 200 }).unwrap())
            .unwrap();
        assert!(tx.next_frame().await.unwrap().is_none());

        tx.on_frame(Frame::envelope(&MessageEnvelope::PartitionAck { offset: 300 }).unwrap())
            .unwrap();
        assert_eq!(tx.awaiting_ack(), None);
        assert!(matches!(tx.next_frame().await.unwrap(), Some(Frame::Binary(_))));
    }

    #[tokio::test]
    async fn test_partition_end_is_acked_immediately() {
        let mut rx = TransferSession::new(TransferConfig::default());
        let replies = rx
            .on_frame(Frame::envelope(&MessageEnvelope::PartitionEnd { offset: 42 }).unwrap())
            .unwrap();
        assert_eq!(replies, vec![MessageEnvelope::PartitionAck { offset: 42 }]);
    }

    #[tokio::test]
    async fn test_queue_is_fifo_and_busy_between_files() {
        let config = TransferConfig {
            chunk_size: 1_000,
            partition_size: 4_000,
        };
        let mut tx = TransferSession::new(config);
        let mut rx = TransferSession::new(config);

        let names = ["one", "two", "three"];
        for (i, name) in names.iter().enumerate() {
            tx.enqueue(TransferJob::from_bytes(*name, "text/plain", pattern(9_000 + i, i as u8)));
        }
        assert_eq!(tx.queued(), 3);
        assert!(!tx.busy());

        let mut completed = Vec::new();
        loop {
            let Some(frame) = tx.next_frame().await.unwrap() else {
                break;
            };
            assert!(tx.busy(), "a frame is only produced while a file is in flight");
            for reply in rx.on_frame(frame).unwrap() {
                tx.on_frame(Frame::envelope(&reply).unwrap()).unwrap();
            }
            for event in tx.drain_events() {
                if let TransferEvent::SendComplete { name, .. } = event {
                    assert!(!tx.busy());
                    completed.push(name);
                }
            }
        }

        assert_eq!(completed, names);
        let files = received_files(&rx.drain_events());
        let received: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(received, names);
        assert_eq!(files[2].size, 9_002);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_throttled() {
        let config = TransferConfig {
            chunk_size: 10,
            partition_size: 1_000,
        };
        let mut tx = TransferSession::new(config);
        let mut rx = TransferSession::new(config);
        tx.enqueue(TransferJob::from_bytes("p", "x/y", pattern(5_000, 1)));

        let sent = run_to_idle(&mut tx, &mut rx).await;
        assert_eq!(sent.iter().filter(|f| matches!(f, Frame::Binary(_))).count(), 500);

        let progress: Vec<f64> = tx
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                TransferEvent::SendProgress { progress, .. } => Some(progress),
                _ => None,
            })
            .collect();

        // at most one notice per percent
        assert!(progress.len() <= 101);
        assert!(progress.len() > 10);
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
        let (last, rest) = progress.split_last().unwrap();
        assert_eq!(*last, 1.0);
        assert!(rest.iter().all(|p| *p < 1.0));
    }

    #[tokio::test]
    async fn test_empty_file_completes_on_header() {
        let mut tx = TransferSession::new(TransferConfig::default());
        let mut rx = TransferSession::new(TransferConfig::default());
        tx.enqueue(TransferJob::from_bytes("empty", "text/plain", Vec::new()));

        let sent = run_to_idle(&mut tx, &mut rx).await;
        assert_eq!(sent.len(), 1);

        let files = received_files(&rx.drain_events());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, 0);
        assert!(!tx.busy());
    }

    #[tokio::test]
    async fn test_abort_in_flight_keeps_queue() {
        let config = TransferConfig {
            chunk_size: 100,
            partition_size: 200,
        };
        let mut tx = TransferSession::new(config);
        let mut rx = TransferSession::new(config);
        tx.enqueue(TransferJob::from_bytes("first", "x/y", pattern(1_000, 0)));
        tx.enqueue(TransferJob::from_bytes("second", "x/y", pattern(10, 0)));

        // header + two chunks reach the receiver, then the channel drops
        for _ in 0..3 {
            let frame = tx.next_frame().await.unwrap().unwrap();
            rx.on_frame(frame).unwrap();
        }
        assert!(rx.receiving());

        tx.abort_in_flight("channel closed");
        rx.abort_in_flight("channel closed");

        assert!(!tx.busy());
        assert_eq!(tx.queued(), 1);
        assert!(tx
            .drain_events()
            .iter()
            .any(|e| matches!(e, TransferEvent::SendAborted { name, .. } if name == "first")));
        assert!(!rx.receiving());
        assert!(rx
            .drain_events()
            .iter()
            .any(|e| matches!(e, TransferEvent::ReceiveAborted { name } if name == "first")));

        // a late complete for the aborted file is ignored
        tx.on_frame(Frame::envelope(&MessageEnvelope::Complete).unwrap()).unwrap();
        assert!(tx.drain_events().is_empty());
    }

    #[tokio::test]
    async fn test_truncated_source_aborts_and_moves_on() {
        let mut tx = TransferSession::new(TransferConfig::default());
        let mut rx = TransferSession::new(TransferConfig::default());
        // declares 100 bytes, delivers 10
        tx.enqueue(TransferJob::new("short", "x/y", 100, std::io::Cursor::new(vec![0u8; 10])));
        tx.enqueue(TransferJob::from_bytes("ok", "x/y", pattern(50, 2)));

        run_to_idle(&mut tx, &mut rx).await;

        let events = tx.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, TransferEvent::SendAborted { name, .. } if name == "short")));
        assert!(events
            .iter()
            .any(|e| matches!(e, TransferEvent::SendComplete { name, .. } if name == "ok")));

        let files = received_files(&rx.drain_events());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "ok");
    }

    #[test]
    fn test_text_round_trip() {
        let mut rx = TransferSession::new(TransferConfig::default());
        for text in ["", "ciao", "日本語 ✓"] {
            let frame = TransferSession::text_frame(text).unwrap();
            assert!(matches!(frame, Frame::Text(_)));
            assert!(rx.on_frame(frame).unwrap().is_empty());
        }
        assert_eq!(
            rx.drain_events(),
            vec![
                TransferEvent::TextReceived(String::new()),
                TransferEvent::TextReceived("ciao".into()),
                TransferEvent::TextReceived("日本語 ✓".into()),
            ]
        );
    }

    #[test]
    fn test_oversize_text_is_rejected() {
        let limit = SCTP_MAX_MESSAGE_SIZE as usize;
        let result = TransferSession::text_frame(&"x".repeat(limit));
        assert!(matches!(
            result,
            Err(TransferError::FrameTooLarge { size, limit: l }) if size > l && l == limit
        ));
        assert!(TransferSession::text_frame(&"x".repeat(limit / 2)).is_ok());
    }

    #[test]
    fn test_config_is_bounded() {
        let limit = SCTP_MAX_MESSAGE_SIZE as usize;
        let huge = TransferConfig {
            chunk_size: usize::MAX,
            partition_size: 0,
        };
        assert_eq!(
            huge.bounded(),
            TransferConfig {
                chunk_size: limit,
                partition_size: 1,
            }
        );
        let empty = TransferConfig {
            chunk_size: 0,
            partition_size: 10,
        };
        assert_eq!(empty.bounded().chunk_size, 1);
        assert_eq!(TransferConfig::default().bounded(), TransferConfig::default());
    }

    #[tokio::test]
    async fn test_large_chunk_size_stays_within_channel_limit() {
        let limit = SCTP_MAX_MESSAGE_SIZE as usize;
        let config = TransferConfig {
            chunk_size: limit * 4,
            partition_size: (limit * 8) as u64,
        };
        let mut tx = TransferSession::new(config);
        let mut rx = TransferSession::new(config);
        let data = pattern(limit + 10, 3);
        tx.enqueue(TransferJob::from_bytes("big.bin", "application/octet-stream", data.clone()));

        let sent = run_to_idle(&mut tx, &mut rx).await;
        let chunks: Vec<usize> = sent
            .iter()
            .filter_map(|f| match f {
                Frame::Binary(b) => Some(b.len()),
                Frame::Text(_) => None,
            })
            .collect();
        assert_eq!(chunks, vec![limit, 10]);

        let files = received_files(&rx.drain_events());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].data.as_ref(), data.as_slice());
    }

    #[test]
    fn test_stray_chunk_is_dropped() {
        let mut rx = TransferSession::new(TransferConfig::default());
        let replies = rx.on_frame(Frame::chunk(bytes::Bytes::from_static(b"zz"))).unwrap();
        assert!(replies.is_empty());
        assert!(rx.drain_events().is_empty());
    }
}

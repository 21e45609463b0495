//! Per-peer worker task.
//!
//! Each remote peer gets one [`PeerWorker`] running on its own tokio task.
//! The worker is the single owner of that peer's [`PeerSession`],
//! [`TransferSession`] and [`Link`]; everything else talks to it through
//! channels:
//!
//! ```text
//!   manager ──PeerCommand──►┐
//!   link    ──LinkEvent────►├─ PeerWorker ──OutboundSignal──► relay
//!   timer   ───────────────►┘      │      ──AppEvent────────► application
//!                                  └──watch<PeerSnapshot>───► manager
//! ```

use crate::core::config::{MAX_PENDING_TEXTS, NEGOTIATION_TIMEOUT, PARTITION_ACK_TIMEOUT};
use crate::core::connection::{Link, LinkEvent};
use crate::core::error::PeerError;
use crate::core::protocol::{Frame, SignalPayload};
use crate::core::session::{PeerSession, Role, SessionAction, SessionState};
use crate::core::transfer::{TransferEvent, TransferJob, TransferSession};
use crate::utils::sos::SignalOfStop;
use std::collections::VecDeque;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

// ── Messages ─────────────────────────────────────────────────────────────────

/// Requests from the manager to one worker.
#[derive(Debug)]
pub enum PeerCommand {
    /// A relayed negotiation message from this peer.
    Signal(SignalPayload),
    SendFiles(Vec<TransferJob>),
    SendText(String),
}

/// A negotiation message to relay to `to`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundSignal {
    pub to: String,
    pub payload: SignalPayload,
}

/// Observable state of one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerSnapshot {
    pub role: Role,
    pub state: SessionState,
    pub busy: bool,
    pub queued: usize,
}

/// Notification for the application layer.
#[derive(Debug, Clone, PartialEq)]
pub struct AppEvent {
    pub peer_id: String,
    pub kind: AppEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppEventKind {
    Joined,
    Left,
    StateChanged(SessionState),
    /// The caller side stopped reconnecting.
    Unreachable,
    Transfer(TransferEvent),
}

/// Send `kind` for `peer_id`; a closed receiver means nobody listens.
pub(crate) fn notify_app(app: &mpsc::UnboundedSender<AppEvent>, peer_id: &str, kind: AppEventKind) {
    let _ = app.send(AppEvent {
        peer_id: peer_id.to_string(),
        kind,
    });
}

// ── Timer ────────────────────────────────────────────────────────────────────

/// What the single timer slot is armed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    Negotiation,
    Reconnect,
    /// Waiting for the ack of the partition ending at this offset.
    PartitionAck(u64),
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// ── Worker ───────────────────────────────────────────────────────────────────

pub(crate) struct PeerWorker<L: Link> {
    peer_id: String,
    session: PeerSession,
    transfer: TransferSession,
    link: L,
    commands: mpsc::UnboundedReceiver<PeerCommand>,
    link_events: mpsc::UnboundedReceiver<(u64, LinkEvent)>,
    signals: mpsc::UnboundedSender<OutboundSignal>,
    app: mpsc::UnboundedSender<AppEvent>,
    snapshot: watch::Sender<PeerSnapshot>,
    /// Texts waiting for the channel to open.
    outbox: VecDeque<String>,
    timer: Option<(Timer, Instant)>,
    sos: SignalOfStop,
}

/// Everything a worker needs besides its link.
pub(crate) struct WorkerChannels {
    pub commands: mpsc::UnboundedReceiver<PeerCommand>,
    pub link_events: mpsc::UnboundedReceiver<(u64, LinkEvent)>,
    pub signals: mpsc::UnboundedSender<OutboundSignal>,
    pub app: mpsc::UnboundedSender<AppEvent>,
    pub snapshot: watch::Sender<PeerSnapshot>,
}

impl<L: Link> PeerWorker<L> {
    pub fn new(
        peer_id: String,
        session: PeerSession,
        transfer: TransferSession,
        link: L,
        channels: WorkerChannels,
        sos: SignalOfStop,
    ) -> Self {
        Self {
            peer_id,
            session,
            transfer,
            link,
            commands: channels.commands,
            link_events: channels.link_events,
            signals: channels.signals,
            app: channels.app,
            snapshot: channels.snapshot,
            outbox: VecDeque::new(),
            timer: None,
            sos,
        }
    }

    pub async fn run(mut self) {
        let sos = self.sos.clone();
        debug!(event = "peer_worker_start", peer = %self.peer_id, role = %self.session.role());

        let actions = self.session.start();
        if sos.select(self.execute(actions)).await.is_none() {
            self.link.close().await;
            return;
        }

        loop {
            if sos.select(self.settle()).await.is_none() {
                break;
            }

            let deadline = self.timer.map(|(_, at)| at);
            let stopped = sos
                .select(async {
                    tokio::select! {
                        cmd = self.commands.recv() => match cmd {
                            Some(cmd) => {
                                self.on_command(cmd).await;
                                true
                            }
                            None => false,
                        },
                        Some((attempt, event)) = self.link_events.recv() => {
                            self.on_link_event(attempt, event).await;
                            true
                        }
                        _ = sleep_until(deadline) => {
                            self.on_timer().await;
                            true
                        }
                    }
                })
                .await;
            if stopped != Some(true) {
                break;
            }
        }

        self.link.close().await;
        debug!(event = "peer_worker_stop", peer = %self.peer_id);
    }

    // ── Commands ─────────────────────────────────────────────────────────

    async fn on_command(&mut self, cmd: PeerCommand) {
        match cmd {
            PeerCommand::Signal(payload) => {
                let actions = self.session.on_signal(payload);
                self.execute(actions).await;
            }
            PeerCommand::SendFiles(jobs) => {
                for job in jobs {
                    self.transfer.enqueue(job);
                }
                self.ensure_channel().await;
            }
            PeerCommand::SendText(text) => {
                if self.outbox.len() >= MAX_PENDING_TEXTS {
                    warn!(event = "outbox_full", peer = %self.peer_id, "Dropping oldest pending text");
                    self.outbox.pop_front();
                }
                self.outbox.push_back(text);
                self.ensure_channel().await;
            }
        }
    }

    /// Re-enter negotiation if there is no open channel for queued work.
    async fn ensure_channel(&mut self) {
        if self.session.is_open() {
            return;
        }
        debug!(event = "channel_unavailable", peer = %self.peer_id, state = %self.session.state());
        let actions = self.session.refresh();
        self.execute(actions).await;
    }

    // ── Link events ──────────────────────────────────────────────────────

    async fn on_link_event(&mut self, attempt: u64, event: LinkEvent) {
        if attempt != self.link.attempt() {
            debug!(event = "stale_link_event", peer = %self.peer_id, attempt, current = self.link.attempt());
            return;
        }

        match event {
            LinkEvent::LocalCandidate(candidate) => {
                self.relay(SignalPayload::Candidate(candidate));
            }
            LinkEvent::ChannelOpen => {
                if self.session.on_channel_open() {
                    self.timer = None;
                }
            }
            LinkEvent::ChannelClosed => self.on_channel_lost("channel closed").await,
            LinkEvent::Disconnected => self.on_channel_lost("connection disconnected").await,
            LinkEvent::Failed => self.on_channel_lost("connection failed").await,
            LinkEvent::GatheringFailed(reason) => {
                warn!(event = "ice_gathering_failure", peer = %self.peer_id, reason = %reason);
            }
            LinkEvent::Frame(frame) => self.on_frame(frame).await,
        }
    }

    async fn on_frame(&mut self, frame: Frame) {
        let replies = match self.transfer.on_frame(frame) {
            Ok(replies) => replies,
            Err(e) => {
                warn!(event = "frame_rejected", peer = %self.peer_id, error = %e);
                return;
            }
        };
        for reply in replies {
            match Frame::envelope(&reply) {
                Ok(frame) => {
                    if let Err(e) = self.link.send(frame).await {
                        warn!(event = "reply_send_failure", peer = %self.peer_id, error = %e);
                    }
                }
                Err(e) => warn!(event = "reply_encode_failure", peer = %self.peer_id, error = %e),
            }
        }
    }

    async fn on_channel_lost(&mut self, reason: &str) {
        if !matches!(self.session.state(), SessionState::Negotiating | SessionState::Open) {
            return;
        }
        self.link.close().await;
        self.transfer.abort_in_flight(reason);
        self.timer = None;
        let actions = self.session.on_channel_lost();
        self.execute(actions).await;
    }

    // ── Timer ────────────────────────────────────────────────────────────

    async fn on_timer(&mut self) {
        let Some((timer, _)) = self.timer.take() else {
            return;
        };
        match timer {
            Timer::Negotiation => {
                self.link.close().await;
                let actions = self.session.on_negotiation_error("negotiation timed out");
                self.execute(actions).await;
            }
            Timer::Reconnect => {
                let actions = self.session.on_reconnect_due();
                self.execute(actions).await;
            }
            Timer::PartitionAck(offset) => {
                if self.transfer.awaiting_ack() == Some(offset) {
                    warn!(event = "partition_ack_timeout", peer = %self.peer_id, offset, "Aborting file");
                    self.transfer.fail_active("partition-ack timed out");
                }
            }
        }
    }

    fn arm(&mut self, timer: Timer, after: std::time::Duration) {
        self.timer = Some((timer, Instant::now() + after));
    }

    // ── Actions ──────────────────────────────────────────────────────────

    async fn execute(&mut self, actions: Vec<SessionAction>) {
        let mut work: VecDeque<SessionAction> = actions.into();
        while let Some(action) = work.pop_front() {
            match action {
                SessionAction::SendOffer => match self.link.create_offer().await {
                    Ok(offer) => {
                        self.relay(SignalPayload::Description(offer));
                        self.arm(Timer::Negotiation, NEGOTIATION_TIMEOUT);
                    }
                    Err(e) => {
                        work.extend(self.session.on_negotiation_error(&e.to_string()));
                    }
                },
                SessionAction::AnswerOffer(offer) => {
                    // the previous connection (if any) is replaced
                    self.transfer.abort_in_flight("peer renegotiated");
                    match self.link.accept_offer(offer).await {
                        Ok(answer) => {
                            self.relay(SignalPayload::Description(answer));
                            self.arm(Timer::Negotiation, NEGOTIATION_TIMEOUT);
                            work.extend(self.session.remote_description_applied());
                        }
                        Err(e) => {
                            work.extend(self.session.on_negotiation_error(&e.to_string()));
                        }
                    }
                }
                SessionAction::ApplyAnswer(answer) => match self.link.apply_answer(answer).await {
                    Ok(()) => work.extend(self.session.remote_description_applied()),
                    Err(e) => {
                        self.link.close().await;
                        work.extend(self.session.on_negotiation_error(&e.to_string()));
                    }
                },
                SessionAction::AddCandidate(candidate) => {
                    if let Err(e) = self.link.add_candidate(candidate).await {
                        warn!(event = "candidate_rejected", peer = %self.peer_id, error = %e);
                    }
                }
                SessionAction::ScheduleReconnect(delay) => {
                    self.arm(Timer::Reconnect, delay);
                }
                SessionAction::GiveUp => {
                    warn!(event = "peer_unreachable", peer = %self.peer_id, "Reconnect attempts exhausted");
                    self.timer = None;
                    notify_app(&self.app, &self.peer_id, AppEventKind::Unreachable);
                }
            }
        }
    }

    fn relay(&self, payload: SignalPayload) {
        let _ = self.signals.send(OutboundSignal {
            to: self.peer_id.clone(),
            payload,
        });
    }

    // ── Housekeeping ─────────────────────────────────────────────────────

    /// Push pending work to the channel, forward transfer events, refresh
    /// timers and publish the snapshot. Runs after every input.
    async fn settle(&mut self) {
        if self.session.is_open() {
            self.flush_outbox().await;
            self.pump().await;
        }

        for event in self.transfer.drain_events() {
            notify_app(&self.app, &self.peer_id, AppEventKind::Transfer(event));
        }

        self.refresh_timer();
        self.publish();
    }

    async fn flush_outbox(&mut self) {
        while let Some(text) = self.outbox.pop_front() {
            let frame = match TransferSession::text_frame(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(event = "text_encode_failure", peer = %self.peer_id, error = %e);
                    continue;
                }
            };
            match self.link.send(frame).await {
                Ok(()) => {}
                Err(e @ PeerError::MessageTooLarge { .. }) => {
                    warn!(event = "text_dropped", peer = %self.peer_id, error = %e);
                    continue;
                }
                Err(e) => {
                    warn!(event = "text_send_failure", peer = %self.peer_id, error = %e);
                    self.outbox.push_front(text);
                    return;
                }
            }
            debug!(event = "text_sent", peer = %self.peer_id, bytes = text.len());
        }
    }

    /// Send file frames until the transfer pauses or runs dry.
    async fn pump(&mut self) {
        loop {
            let frame = match self.transfer.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return,
                Err(e) => {
                    warn!(event = "frame_build_failure", peer = %self.peer_id, error = %e);
                    self.transfer.fail_active(&e.to_string());
                    return;
                }
            };
            if let Err(e) = self.link.send(frame).await {
                warn!(event = "chunk_send_failure", peer = %self.peer_id, error = %e, "Aborting file");
                self.transfer.fail_active(&e.to_string());
                return;
            }
        }
    }

    fn refresh_timer(&mut self) {
        let current = self.timer.map(|(t, _)| t);
        match self.session.state() {
            SessionState::Negotiating => {
                if current != Some(Timer::Negotiation) {
                    self.arm(Timer::Negotiation, NEGOTIATION_TIMEOUT);
                }
            }
            SessionState::Open => match self.transfer.awaiting_ack() {
                Some(offset) if current != Some(Timer::PartitionAck(offset)) => {
                    self.arm(Timer::PartitionAck(offset), PARTITION_ACK_TIMEOUT);
                }
                Some(_) => {}
                None => self.timer = None,
            },
            SessionState::Closed => {
                if current != Some(Timer::Reconnect) {
                    self.timer = None;
                }
            }
            SessionState::Idle => self.timer = None,
        }
    }

    fn publish(&mut self) {
        let snapshot = PeerSnapshot {
            role: self.session.role(),
            state: self.session.state(),
            busy: self.transfer.busy(),
            queued: self.transfer.queued(),
        };
        let previous = self.snapshot.send_replace(snapshot.clone());
        if previous.state != snapshot.state {
            info!(
                event = "peer_state_changed",
                peer = %self.peer_id,
                from = %previous.state,
                to = %snapshot.state
            );
            notify_app(&self.app, &self.peer_id, AppEventKind::StateChanged(snapshot.state));
        }
    }
}

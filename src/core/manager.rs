//! Registry of peer workers.
//!
//! The manager owns the only map from peer id to worker. Roster updates and
//! relayed signals both go through it, under one lock, so a peer never has
//! two workers at once. A worker is only replaced after an explicit leave.
//! Signals from a peer that left are dropped until the roster lists it
//! again, and nothing is started after [`ConnectionManager::shutdown`].

use crate::core::connection::LinkFactory;
use crate::core::error::{PeerError, TransferError};
use crate::core::peer::{
    notify_app, AppEvent, AppEventKind, OutboundSignal, PeerCommand, PeerSnapshot, PeerWorker,
    WorkerChannels,
};
use crate::core::protocol::SignalPayload;
use crate::core::session::{PeerSession, SessionState};
use crate::core::transfer::{TransferConfig, TransferJob, TransferSession};
use crate::utils::sos::SignalOfStop;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct PeerHandle {
    commands: mpsc::UnboundedSender<PeerCommand>,
    snapshot: watch::Receiver<PeerSnapshot>,
    sos: SignalOfStop,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    peers: HashMap<String, PeerHandle>,
    /// Ids removed by a roster leave and not re-joined since.
    departed: HashSet<String>,
    shut_down: bool,
}

/// Receivers handed out once at construction.
pub struct ManagerOutputs {
    /// Negotiation messages to relay through discovery.
    pub signals: mpsc::UnboundedReceiver<OutboundSignal>,
    /// Notifications for the application.
    pub events: mpsc::UnboundedReceiver<AppEvent>,
}

pub struct ConnectionManager<F: LinkFactory> {
    local_id: String,
    factory: Arc<F>,
    config: TransferConfig,
    registry: Arc<Mutex<Registry>>,
    signals: mpsc::UnboundedSender<OutboundSignal>,
    app: mpsc::UnboundedSender<AppEvent>,
}

impl<F: LinkFactory> Clone for ConnectionManager<F> {
    fn clone(&self) -> Self {
        Self {
            local_id: self.local_id.clone(),
            factory: self.factory.clone(),
            config: self.config,
            registry: self.registry.clone(),
            signals: self.signals.clone(),
            app: self.app.clone(),
        }
    }
}

impl<F: LinkFactory> ConnectionManager<F> {
    pub fn new(local_id: impl Into<String>, factory: F, config: TransferConfig) -> (Self, ManagerOutputs) {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (app_tx, app_rx) = mpsc::unbounded_channel();
        let manager = Self {
            local_id: local_id.into(),
            factory: Arc::new(factory),
            config,
            registry: Arc::new(Mutex::new(Registry::default())),
            signals: signals_tx,
            app: app_tx,
        };
        (
            manager,
            ManagerOutputs {
                signals: signals_rx,
                events: app_rx,
            },
        )
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Reconcile a roster diff: start workers for new peers, tear down
    /// workers of peers that left.
    pub async fn on_roster_update(&self, joined: &[String], left: &[String]) {
        let mut registry = self.registry.lock().await;
        if registry.shut_down {
            return;
        }

        for peer_id in joined {
            registry.departed.remove(peer_id);
            if *peer_id == self.local_id || registry.peers.contains_key(peer_id) {
                continue;
            }
            let handle = self.spawn_worker(peer_id);
            registry.peers.insert(peer_id.clone(), handle);
        }

        for peer_id in left {
            registry.departed.insert(peer_id.clone());
            let Some(handle) = registry.peers.remove(peer_id) else {
                continue;
            };
            info!(event = "peer_left", peer = %peer_id, "Tearing down peer");
            handle.sos.cancel();
            notify_app(&self.app, peer_id, AppEventKind::Left);
        }
    }

    /// Route a relayed negotiation message. An unknown sender gets a new
    /// worker first.
    pub async fn on_relayed_signal(&self, sender: &str, payload: SignalPayload) {
        if sender == self.local_id {
            warn!(event = "self_signal", "Ignoring signal from own id");
            return;
        }

        let mut registry = self.registry.lock().await;
        if registry.shut_down {
            return;
        }
        if registry.departed.contains(sender) {
            debug!(event = "signal_from_departed_peer", peer = %sender, "Dropping signal");
            return;
        }
        if !registry.peers.contains_key(sender) {
            debug!(event = "signal_from_unknown_peer", peer = %sender);
            let handle = self.spawn_worker(sender);
            registry.peers.insert(sender.to_string(), handle);
        }
        if let Some(handle) = registry.peers.get(sender) {
            if handle.commands.send(PeerCommand::Signal(payload)).is_err() {
                warn!(event = "worker_gone", peer = %sender, "Dropping signal");
            }
        }
    }

    /// Queue files for `peer_id`.
    pub async fn send_files_to(&self, peer_id: &str, jobs: Vec<TransferJob>) -> Result<(), PeerError> {
        self.command(peer_id, PeerCommand::SendFiles(jobs)).await
    }

    /// Send a text message to `peer_id`.
    ///
    /// Fails with [`PeerError::MessageTooLarge`] when the encoded text would
    /// not fit in one data-channel message.
    pub async fn send_text_to(&self, peer_id: &str, text: impl Into<String>) -> Result<(), PeerError> {
        let text = text.into();
        if let Err(TransferError::FrameTooLarge { size, limit }) = TransferSession::text_frame(&text) {
            return Err(PeerError::MessageTooLarge { size, limit });
        }
        self.command(peer_id, PeerCommand::SendText(text)).await
    }

    async fn command(&self, peer_id: &str, cmd: PeerCommand) -> Result<(), PeerError> {
        let registry = self.registry.lock().await;
        let handle = registry
            .peers
            .get(peer_id)
            .ok_or_else(|| PeerError::UnknownPeer(peer_id.to_string()))?;
        handle
            .commands
            .send(cmd)
            .map_err(|_| PeerError::UnknownPeer(peer_id.to_string()))
    }

    /// Known peer ids, sorted.
    pub async fn peer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.registry.lock().await.peers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn snapshot(&self, peer_id: &str) -> Option<PeerSnapshot> {
        let registry = self.registry.lock().await;
        registry.peers.get(peer_id).map(|h| h.snapshot.borrow().clone())
    }

    /// Stop every worker and wait for them to close their links. Later
    /// roster updates and relayed signals are ignored.
    pub async fn shutdown(&self) {
        let handles: Vec<(String, PeerHandle)> = {
            let mut registry = self.registry.lock().await;
            registry.shut_down = true;
            registry.peers.drain().collect()
        };
        for (_, handle) in &handles {
            handle.sos.cancel();
        }
        for (peer_id, handle) in handles {
            if let Err(e) = handle.task.await {
                warn!(event = "worker_join_failure", peer = %peer_id, error = %e);
            }
        }
        info!(event = "manager_shutdown", "All peer workers stopped");
    }

    fn spawn_worker(&self, peer_id: &str) -> PeerHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = mpsc::unbounded_channel();

        let session = PeerSession::new(&self.local_id, peer_id);
        let (snapshot_tx, snapshot_rx) = watch::channel(PeerSnapshot {
            role: session.role(),
            state: SessionState::Idle,
            busy: false,
            queued: 0,
        });

        info!(event = "peer_joined", peer = %peer_id, role = %session.role(), "Starting peer worker");
        notify_app(&self.app, peer_id, AppEventKind::Joined);

        let link = self.factory.connect(&self.local_id, peer_id, link_tx);
        let sos = SignalOfStop::new();
        let worker = PeerWorker::new(
            peer_id.to_string(),
            session,
            TransferSession::new(self.config),
            link,
            WorkerChannels {
                commands: commands_rx,
                link_events: link_rx,
                signals: self.signals.clone(),
                app: self.app.clone(),
                snapshot: snapshot_tx,
            },
            sos.clone(),
        );
        let task = tokio::spawn(worker.run());

        PeerHandle {
            commands: commands_tx,
            snapshot: snapshot_rx,
            sos,
            task,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

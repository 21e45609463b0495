//! Node driver: keeps the manager in sync with the discovery relay.
//!
//! ```text
//!   every poll_interval:
//!     poll ─► roster diff ─► manager.on_roster_update
//!          └► relayed signals ─► manager.on_relayed_signal
//!   continuously:
//!     manager outbound signals ─► discovery.relay
//!   on stop:
//!     discovery.leave (bounded) ─► manager.shutdown
//! ```

use crate::core::config::LEAVE_TIMEOUT;
use crate::core::connection::LinkFactory;
use crate::core::discovery::{Discovery, PollResponse, RosterTracker};
use crate::core::manager::{ConnectionManager, ManagerOutputs};
use crate::core::peer::OutboundSignal;
use crate::core::transfer::TransferConfig;
use crate::utils::sos::SignalOfStop;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct Node<D: Discovery + 'static, F: LinkFactory> {
    discovery: Arc<D>,
    manager: ConnectionManager<F>,
    roster: RosterTracker,
    poll_interval: Duration,
    /// Reply of the initial poll, processed first by [`Node::run`].
    first: Option<PollResponse>,
}

impl<D: Discovery + 'static, F: LinkFactory> Node<D, F> {
    /// Poll the relay until it assigns us an id, then build the manager.
    pub async fn connect(
        discovery: Arc<D>,
        factory: F,
        config: TransferConfig,
        poll_interval: Duration,
        sos: &SignalOfStop,
    ) -> Result<(Self, ManagerOutputs)> {
        let first = loop {
            match sos.select(discovery.poll()).await {
                None => return Err(anyhow!("stopped before joining the relay")),
                Some(Ok(poll)) => break poll,
                Some(Err(e)) => {
                    warn!(event = "relay_unreachable", error = %e, "Retrying");
                    if sos.select(tokio::time::sleep(poll_interval)).await.is_none() {
                        return Err(anyhow!("stopped before joining the relay"));
                    }
                }
            }
        };

        let display_name = first
            .name
            .as_ref()
            .map(|n| n.display_name.clone())
            .unwrap_or_default();
        info!(event = "relay_joined", id = %first.id, name = %display_name, "Joined relay");

        let (manager, outputs) = ConnectionManager::new(first.id.clone(), factory, config);
        Ok((
            Self {
                discovery,
                manager,
                roster: RosterTracker::new(),
                poll_interval,
                first: Some(first),
            },
            outputs,
        ))
    }

    pub fn manager(&self) -> ConnectionManager<F> {
        self.manager.clone()
    }

    /// Poll until `sos` fires, then leave the relay and stop every peer.
    pub async fn run(mut self, signals: mpsc::UnboundedReceiver<OutboundSignal>, sos: SignalOfStop) {
        let relay_task = tokio::spawn(forward_signals(self.discovery.clone(), signals));

        if let Some(first) = self.first.take() {
            self.apply(first).await;
        }

        loop {
            if sos.select(tokio::time::sleep(self.poll_interval)).await.is_none() {
                break;
            }
            match sos.select(self.discovery.poll()).await {
                None => break,
                Some(Ok(poll)) => self.apply(poll).await,
                Some(Err(e)) => warn!(event = "poll_failure", error = %e, "Poll failed"),
            }
        }

        info!(event = "node_stopping", "Leaving relay");
        match tokio::time::timeout(LEAVE_TIMEOUT, self.discovery.leave()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(event = "leave_failure", error = %e),
            Err(_) => debug!(event = "leave_timeout"),
        }
        self.manager.shutdown().await;
        relay_task.abort();
    }

    /// Feed one poll reply to the manager.
    async fn apply(&mut self, poll: PollResponse) {
        let diff = self.roster.diff(self.manager.local_id(), &poll.peers);
        if !diff.is_empty() {
            debug!(event = "roster_changed", joined = ?diff.joined, left = ?diff.left);
            self.manager.on_roster_update(&diff.joined, &diff.left).await;
        }
        for (sender, payload) in poll.relayed_signals() {
            self.manager.on_relayed_signal(&sender, payload).await;
        }
    }
}

async fn forward_signals<D: Discovery>(
    discovery: Arc<D>,
    mut signals: mpsc::UnboundedReceiver<OutboundSignal>,
) {
    while let Some(signal) = signals.recv().await {
        if let Err(e) = discovery.relay(&signal.to, signal.payload).await {
            warn!(event = "relay_failure", to = %signal.to, error = %e, "Signal not relayed");
        }
    }
}

//! In-process [`Link`] used to run managers against each other in tests.
//!
//! Every endpoint registers itself in a shared [`MemoryHub`] under
//! `(owner, peer)`. Applying an answer opens the channel on both sides;
//! frames are delivered straight into the other endpoint's event queue.

use super::{Link, LinkEvent, LinkEvents, LinkFactory};
use crate::core::error::PeerError;
use crate::core::protocol::{Frame, IceCandidate, SessionDescription};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct Endpoint {
    events: LinkEvents,
    attempt: u64,
    open: bool,
}

#[derive(Clone, Default)]
pub struct MemoryHub {
    endpoints: Arc<Mutex<HashMap<(String, String), Endpoint>>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, owner: &str, peer: &str, events: LinkEvents, attempt: u64) {
        let mut endpoints = self.endpoints.lock().unwrap();
        endpoints.insert(
            (owner.to_string(), peer.to_string()),
            Endpoint {
                events,
                attempt,
                open: false,
            },
        );
    }

    /// Open the channel between `a` and `b` if both have an endpoint.
    fn connect(&self, a: &str, b: &str) -> Result<()> {
        let mut endpoints = self.endpoints.lock().unwrap();
        let ab = (a.to_string(), b.to_string());
        let ba = (b.to_string(), a.to_string());
        if !endpoints.contains_key(&ab) || !endpoints.contains_key(&ba) {
            return Err(anyhow!("no endpoint pair {a} <-> {b}"));
        }
        for key in [ab, ba] {
            if let Some(ep) = endpoints.get_mut(&key) {
                ep.open = true;
                let _ = ep.events.send((ep.attempt, LinkEvent::ChannelOpen));
            }
        }
        Ok(())
    }

    /// Drop `owner`'s endpoint and close the channel on the other side.
    fn disconnect(&self, owner: &str, peer: &str) {
        let mut endpoints = self.endpoints.lock().unwrap();
        endpoints.remove(&(owner.to_string(), peer.to_string()));
        if let Some(ep) = endpoints.get_mut(&(peer.to_string(), owner.to_string())) {
            if ep.open {
                ep.open = false;
                let _ = ep.events.send((ep.attempt, LinkEvent::ChannelClosed));
            }
        }
    }

    /// Simulate a network drop between `a` and `b`.
    pub fn sever(&self, a: &str, b: &str) {
        let mut endpoints = self.endpoints.lock().unwrap();
        for key in [(a.to_string(), b.to_string()), (b.to_string(), a.to_string())] {
            if let Some(ep) = endpoints.get_mut(&key) {
                if ep.open {
                    ep.open = false;
                    let _ = ep.events.send((ep.attempt, LinkEvent::ChannelClosed));
                }
            }
        }
    }

    fn deliver(&self, from: &str, to: &str, frame: Frame) -> Result<(), PeerError> {
        let endpoints = self.endpoints.lock().unwrap();
        let sender_open = endpoints
            .get(&(from.to_string(), to.to_string()))
            .is_some_and(|ep| ep.open);
        match endpoints.get(&(to.to_string(), from.to_string())) {
            Some(ep) if sender_open && ep.open => {
                let _ = ep.events.send((ep.attempt, LinkEvent::Frame(frame)));
                Ok(())
            }
            _ => Err(PeerError::ChannelUnavailable),
        }
    }
}

impl LinkFactory for MemoryHub {
    type Link = MemoryLink;

    fn connect(&self, local_id: &str, peer_id: &str, events: LinkEvents) -> MemoryLink {
        MemoryLink {
            hub: self.clone(),
            local: local_id.to_string(),
            peer: peer_id.to_string(),
            events,
            attempt: 0,
        }
    }
}

pub struct MemoryLink {
    hub: MemoryHub,
    local: String,
    peer: String,
    events: LinkEvents,
    attempt: u64,
}

impl MemoryLink {
    fn restart(&mut self) {
        self.hub.disconnect(&self.local, &self.peer);
        self.attempt += 1;
        self.hub
            .register(&self.local, &self.peer, self.events.clone(), self.attempt);
        let _ = self.events.send((
            self.attempt,
            LinkEvent::LocalCandidate(IceCandidate {
                candidate: format!("candidate:mem {} {}", self.local, self.attempt),
                sdp_mid: Some("0".into()),
                sdp_mline_index: Some(0),
                username_fragment: None,
            }),
        ));
    }
}

#[async_trait]
impl Link for MemoryLink {
    fn attempt(&self) -> u64 {
        self.attempt
    }

    async fn create_offer(&mut self) -> Result<SessionDescription> {
        self.restart();
        Ok(SessionDescription::offer(format!("mem-offer {} {}", self.local, self.attempt)))
    }

    async fn accept_offer(&mut self, _offer: SessionDescription) -> Result<SessionDescription> {
        self.restart();
        Ok(SessionDescription::answer(format!("mem-answer {} {}", self.local, self.attempt)))
    }

    async fn apply_answer(&mut self, _answer: SessionDescription) -> Result<()> {
        self.hub.connect(&self.local, &self.peer)
    }

    async fn add_candidate(&mut self, _candidate: IceCandidate) -> Result<()> {
        Ok(())
    }

    async fn send(&mut self, frame: Frame) -> Result<(), PeerError> {
        self.hub.deliver(&self.local, &self.peer, frame)
    }

    async fn close(&mut self) {
        self.hub.disconnect(&self.local, &self.peer);
    }
}

//! WebRTC implementation of [`Link`].
//!
//! One ordered, reliable data channel labelled `data`, created by the
//! offering side. Candidates trickle: each local candidate is reported as
//! a [`LinkEvent::LocalCandidate`] as soon as it is gathered instead of
//! waiting for gathering to finish.

use super::{Link, LinkEvent, LinkEvents, LinkFactory};
use crate::core::config::{DATA_CHANNEL_LABEL, SCTP_MAX_MESSAGE_SIZE};
use crate::core::error::PeerError;
use crate::core::protocol::{Frame, IceCandidate, SessionDescription};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::{SctpMaxMessageSize, SettingEngine};
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

type ChannelSlot = Arc<RwLock<Option<Arc<RTCDataChannel>>>>;

/// Append `a=max-message-size` so the remote side sends up to
/// [`SCTP_MAX_MESSAGE_SIZE`] instead of the 64 KiB default.
fn advertise_max_message_size(mut sdp: String) -> String {
    if !sdp.contains("a=max-message-size:") {
        sdp.push_str(&format!("a=max-message-size:{}\r\n", SCTP_MAX_MESSAGE_SIZE));
    }
    sdp
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Shares one webrtc `API` instance between all peers.
pub struct WebRtcFactory {
    api: Arc<API>,
    ice_servers: Vec<RTCIceServer>,
}

impl WebRtcFactory {
    pub fn new(stun_servers: &[String]) -> Result<Self> {
        let mut me = MediaEngine::default();
        let reg = register_default_interceptors(Registry::new(), &mut me)?;

        // The crate has no receive-side setter; the receive limit is
        // advertised through the SDP instead.
        let mut se = SettingEngine::default();
        se.set_sctp_max_message_size_can_send(SctpMaxMessageSize::Bounded(SCTP_MAX_MESSAGE_SIZE));

        let api = APIBuilder::new()
            .with_setting_engine(se)
            .with_media_engine(me)
            .with_interceptor_registry(reg)
            .build();

        let ice_servers = if stun_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: stun_servers.to_vec(),
                ..Default::default()
            }]
        };

        Ok(Self {
            api: Arc::new(api),
            ice_servers,
        })
    }
}

impl LinkFactory for WebRtcFactory {
    type Link = WebRtcLink;

    fn connect(&self, _local_id: &str, peer_id: &str, events: LinkEvents) -> WebRtcLink {
        WebRtcLink {
            api: self.api.clone(),
            ice_servers: self.ice_servers.clone(),
            peer_id: peer_id.to_string(),
            events,
            attempt: 0,
            peer_connection: None,
            channel: Arc::new(RwLock::new(None)),
        }
    }
}

// ── Link ─────────────────────────────────────────────────────────────────────

pub struct WebRtcLink {
    api: Arc<API>,
    ice_servers: Vec<RTCIceServer>,
    peer_id: String,
    events: LinkEvents,
    attempt: u64,
    peer_connection: Option<Arc<RTCPeerConnection>>,
    /// Data channel of the current attempt. Replaced (not cleared) on a new
    /// attempt so callbacks of older connections cannot overwrite it.
    channel: ChannelSlot,
}

impl WebRtcLink {
    /// Close the previous connection and open a fresh one with handlers
    /// attached for the new attempt.
    async fn new_connection(&mut self) -> Result<Arc<RTCPeerConnection>> {
        self.close().await;
        self.attempt += 1;
        self.channel = Arc::new(RwLock::new(None));

        let pc = Arc::new(
            self.api
                .new_peer_connection(RTCConfiguration {
                    ice_servers: self.ice_servers.clone(),
                    ..Default::default()
                })
                .await?,
        );

        let attempt = self.attempt;
        let peer = self.peer_id.clone();

        let tx = self.events.clone();
        let state_peer = peer.clone();
        pc.on_peer_connection_state_change(Box::new(move |s| {
            let tx = tx.clone();
            let peer = state_peer.clone();
            Box::pin(async move {
                match s {
                    RTCPeerConnectionState::Connected => {
                        info!(event = "webrtc_connected", peer = %peer, attempt, "WebRTC connection established");
                    }
                    RTCPeerConnectionState::Failed => {
                        error!(event = "webrtc_failed", peer = %peer, attempt, "WebRTC connection failed");
                        let _ = tx.send((attempt, LinkEvent::Failed));
                    }
                    RTCPeerConnectionState::Disconnected => {
                        warn!(event = "webrtc_disconnected", peer = %peer, attempt, "WebRTC connection disconnected");
                        let _ = tx.send((attempt, LinkEvent::Disconnected));
                    }
                    RTCPeerConnectionState::Closed => {
                        debug!(event = "webrtc_closed", peer = %peer, attempt, "WebRTC connection closed");
                    }
                    _ => {}
                }
            })
        }));

        let tx = self.events.clone();
        pc.on_ice_candidate(Box::new(move |c| {
            let tx = tx.clone();
            Box::pin(async move {
                let Some(candidate) = c else {
                    debug!(event = "ice_gathering_complete", attempt);
                    return;
                };
                let event = match candidate.to_json() {
                    Ok(init) => LinkEvent::LocalCandidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                        username_fragment: init.username_fragment,
                    }),
                    Err(e) => LinkEvent::GatheringFailed(e.to_string()),
                };
                let _ = tx.send((attempt, event));
            })
        }));

        self.peer_connection = Some(pc.clone());
        Ok(pc)
    }

    fn current(&self) -> Result<&Arc<RTCPeerConnection>> {
        self.peer_connection
            .as_ref()
            .ok_or_else(|| anyhow!("no connection to {}", self.peer_id))
    }
}

/// Attach `on_open`, `on_close` and `on_message` to `dc` and store it in `slot`.
async fn attach_channel(dc: Arc<RTCDataChannel>, attempt: u64, events: LinkEvents, slot: ChannelSlot) {
    let tx = events.clone();
    dc.on_open(Box::new(move || {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send((attempt, LinkEvent::ChannelOpen));
        })
    }));

    let tx = events.clone();
    let label = dc.label().to_string();
    dc.on_close(Box::new(move || {
        let tx = tx.clone();
        let label = label.clone();
        Box::pin(async move {
            info!(event = "channel_closed", label = %label, attempt, "Data channel closed");
            let _ = tx.send((attempt, LinkEvent::ChannelClosed));
        })
    }));

    let tx = events.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let tx = tx.clone();
        Box::pin(async move {
            let frame = if msg.is_string {
                match String::from_utf8(msg.data.to_vec()) {
                    Ok(text) => Frame::Text(text),
                    Err(e) => {
                        warn!(event = "invalid_text_frame", error = %e, "Dropping non-UTF-8 text frame");
                        return;
                    }
                }
            } else {
                Frame::Binary(msg.data)
            };
            let _ = tx.send((attempt, LinkEvent::Frame(frame)));
        })
    }));

    // the channel may have opened before `on_open` was registered
    if dc.ready_state() == RTCDataChannelState::Open {
        let _ = events.send((attempt, LinkEvent::ChannelOpen));
    }

    *slot.write().await = Some(dc);
}

#[async_trait]
impl Link for WebRtcLink {
    fn attempt(&self) -> u64 {
        self.attempt
    }

    async fn create_offer(&mut self) -> Result<SessionDescription> {
        let pc = self.new_connection().await?;

        let dc = pc
            .create_data_channel(
                DATA_CHANNEL_LABEL,
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    ..Default::default()
                }),
            )
            .await?;
        attach_channel(dc, self.attempt, self.events.clone(), self.channel.clone()).await;

        let offer = pc.create_offer(None).await?;
        pc.set_local_description(offer.clone()).await?;
        debug!(event = "offer_created", peer = %self.peer_id, attempt = self.attempt);
        Ok(SessionDescription::offer(advertise_max_message_size(offer.sdp)))
    }

    async fn accept_offer(&mut self, offer: SessionDescription) -> Result<SessionDescription> {
        let pc = self.new_connection().await?;

        let attempt = self.attempt;
        let events = self.events.clone();
        let slot = self.channel.clone();
        pc.on_data_channel(Box::new(move |dc| {
            let events = events.clone();
            let slot = slot.clone();
            Box::pin(async move {
                if dc.label() != DATA_CHANNEL_LABEL {
                    warn!(event = "unexpected_channel", label = %dc.label(), "Ignoring data channel");
                    return;
                }
                attach_channel(dc, attempt, events, slot).await;
            })
        }));

        pc.set_remote_description(RTCSessionDescription::offer(offer.sdp)?)
            .await?;
        let answer = pc.create_answer(None).await?;
        pc.set_local_description(answer.clone()).await?;
        debug!(event = "answer_created", peer = %self.peer_id, attempt);
        Ok(SessionDescription::answer(advertise_max_message_size(answer.sdp)))
    }

    async fn apply_answer(&mut self, answer: SessionDescription) -> Result<()> {
        let pc = self.current()?;
        pc.set_remote_description(RTCSessionDescription::answer(answer.sdp)?)
            .await?;
        Ok(())
    }

    async fn add_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        let pc = self.current()?;
        pc.add_ice_candidate(RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        })
        .await?;
        Ok(())
    }

    async fn send(&mut self, frame: Frame) -> Result<(), PeerError> {
        let dc = self.channel.read().await.clone();
        let dc = match dc {
            Some(dc) if dc.ready_state() == RTCDataChannelState::Open => dc,
            _ => return Err(PeerError::ChannelUnavailable),
        };

        let size = match &frame {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) => data.len(),
        };
        let limit = SCTP_MAX_MESSAGE_SIZE as usize;
        if size > limit {
            return Err(PeerError::MessageTooLarge { size, limit });
        }

        let result = match frame {
            Frame::Text(text) => dc.send_text(text).await,
            Frame::Binary(data) => dc.send(&data).await,
        };
        result.map(|_| ()).map_err(|e| {
            warn!(event = "channel_send_failure", peer = %self.peer_id, error = %e, "Send failed");
            PeerError::ChannelUnavailable
        })
    }

    async fn close(&mut self) {
        *self.channel.write().await = None;
        if let Some(pc) = self.peer_connection.take() {
            if let Err(e) = pc.close().await {
                warn!(event = "webrtc_close_failure", peer = %self.peer_id, error = %e);
            }
        }
    }
}

//! HTTP relay client.
//!
//! - `GET  {server}/poll[?id=]`  roster + pending signals
//! - `POST {server}/signal?id=`  `{type:"signal", to, sdp|candidate}`
//! - `POST {server}/leave?id=`   best-effort goodbye

use super::{Discovery, PollResponse};
use crate::core::config::RELAY_REQUEST_TIMEOUT;
use crate::core::protocol::{MessageEnvelope, SignalPayload};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::sync::RwLock;
use tracing::{debug, info};

pub struct HttpDiscovery {
    client: reqwest::Client,
    server: String,
    /// Learned from the first poll.
    id: RwLock<Option<String>>,
}

impl HttpDiscovery {
    pub fn new(server: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(RELAY_REQUEST_TIMEOUT)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
            id: RwLock::new(None),
        })
    }

    /// Our id, once the relay has assigned one.
    pub fn local_id(&self) -> Option<String> {
        self.id.read().ok().and_then(|id| id.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.server, path)
    }

    fn require_id(&self) -> Result<String> {
        self.local_id()
            .ok_or_else(|| anyhow!("no id assigned yet; poll the relay first"))
    }
}

#[async_trait]
impl Discovery for HttpDiscovery {
    async fn poll(&self) -> Result<PollResponse> {
        let mut request = self.client.get(self.url("poll"));
        if let Some(id) = self.local_id() {
            request = request.query(&[("id", id)]);
        }

        let poll: PollResponse = request
            .send()
            .await
            .context("polling relay")?
            .error_for_status()?
            .json()
            .await
            .context("decoding poll response")?;

        if let Ok(mut id) = self.id.write() {
            if id.as_deref() != Some(poll.id.as_str()) {
                info!(event = "relay_id_assigned", id = %poll.id, "Relay assigned local id");
                *id = Some(poll.id.clone());
            }
        }
        Ok(poll)
    }

    async fn relay(&self, to: &str, payload: SignalPayload) -> Result<()> {
        let id = self.require_id()?;
        let envelope = MessageEnvelope::signal_to(to, payload);
        self.client
            .post(self.url("signal"))
            .query(&[("id", id)])
            .json(&envelope)
            .send()
            .await
            .context("relaying signal")?
            .error_for_status()?;
        debug!(event = "signal_relayed", to = %to);
        Ok(())
    }

    async fn leave(&self) -> Result<()> {
        let Some(id) = self.local_id() else {
            return Ok(());
        };
        self.client
            .post(self.url("leave"))
            .query(&[("id", id)])
            .send()
            .await
            .context("leaving relay")?
            .error_for_status()?;
        info!(event = "relay_left", "Left relay");
        Ok(())
    }
}

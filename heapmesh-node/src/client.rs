use anyhow::Result;
use heapmesh_common::config::NodeConfig;
use heapmesh_common::peer::JoinRequest;
use std::sync::Arc;

const USER_AGENT: &str = concat!("heapmesh/", env!("CARGO_PKG_VERSION"));

/// Outbound transport to configured peers. Every call is bounded by the
/// configured request timeout.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    config: Arc<NodeConfig>,
}

pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

impl HttpClient {
    pub fn new(config: Arc<NodeConfig>) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(HttpClient { inner, config })
    }

    /// Non-2xx statuses are returned, not raised; only transport faults are errors.
    pub async fn post(&self, url: &str, content_type: &str, body: String) -> Result<(u16, String)> {
        let res = self
            .inner
            .post(url)
            .header("Content-Type", content_type)
            .body(body)
            .send()
            .await?;

        let status = res.status().as_u16();
        let body = res.text().await?;

        Ok((status, body))
    }

    /// Asks `peer` to add this node to its registry.
    pub async fn join(&self, peer: &str) -> Result<(u16, String)> {
        let body = JoinRequest {
            ip_address: self.config.address.to_string(),
            is_master: self.config.master,
        }
        .encode()?;

        self.post(
            &self.config.peer_url(peer, "/join"),
            "application/json",
            body,
        )
        .await
    }

    /// Heartbeat, sent as an empty `append_entries`.
    pub async fn poll(&self, peer: &str) -> Result<u16> {
        let (status, _) = self
            .post(
                &self.config.peer_url(peer, "/append_entries"),
                "application/json",
                String::new(),
            )
            .await?;

        Ok(status)
    }
}

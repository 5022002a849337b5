use crate::error::{Error, Result};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_STEP_TIME: Duration = Duration::from_secs(2);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Node settings, fixed at startup and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub address: IpAddr,
    pub port: u16,
    pub master: bool,
    /// Peers to join, as `ip`, `host`, or `host:port`.
    pub peers: Vec<String>,
    /// Upper bound of the jittered pause between state machine ticks.
    pub step_time: Duration,
    pub request_timeout: Duration,
    /// Handle connections without waiting for the previous one to finish.
    pub concurrent: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    address: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    master: bool,
    #[serde(default)]
    peers: Vec<String>,
    #[serde(default = "default_step_time")]
    step_time: u64,
    #[serde(default = "default_request_timeout")]
    request_timeout: u64,
    #[serde(default)]
    concurrent: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_step_time() -> u64 {
    DEFAULT_STEP_TIME.as_secs()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

impl NodeConfig {
    pub fn new(address: IpAddr, port: u16) -> Self {
        NodeConfig {
            address,
            port,
            master: false,
            peers: Vec::new(),
            step_time: DEFAULT_STEP_TIME,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            concurrent: false,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: ConfigFile =
            serde_json::from_str(raw).map_err(|e| Error::InvalidConfig(e.to_string()))?;

        let address = file
            .address
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("bad address {:?}", file.address)))?;

        NodeConfig {
            address,
            port: file.port,
            master: file.master,
            peers: file.peers,
            step_time: Duration::from_secs(file.step_time),
            request_timeout: Duration::from_secs(file.request_timeout),
            concurrent: file.concurrent,
        }
        .validate()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?;

        info!("loaded config from {}", path.display());

        Self::from_json(&raw)
    }

    pub fn validate(self) -> Result<Self> {
        if self.step_time.is_zero() {
            return Err(Error::InvalidConfig("step_time must be non-zero".to_owned()));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "request_timeout must be non-zero".to_owned(),
            ));
        }

        if let Some(peer) = self.peers.iter().find(|p| p.trim().is_empty()) {
            return Err(Error::InvalidConfig(format!("empty peer entry {:?}", peer)));
        }

        Ok(self)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// `host:port` for a configured peer, defaulting to this node's port.
    pub fn peer_endpoint(&self, peer: &str) -> String {
        if let Ok(addr) = peer.parse::<SocketAddr>() {
            return addr.to_string();
        }

        if let Ok(ip) = peer.parse::<IpAddr>() {
            return SocketAddr::new(ip, self.port).to_string();
        }

        match peer.rsplit_once(':') {
            Some((_, port)) if port.parse::<u16>().is_ok() => peer.to_owned(),
            _ => format!("{}:{}", peer, self.port),
        }
    }

    pub fn peer_url(&self, peer: &str, path: &str) -> String {
        format!("http://{}{}", self.peer_endpoint(peer), path)
    }
}

/// Host part of a configured peer, as it would appear in a registry entry.
pub fn peer_host(peer: &str) -> String {
    if let Ok(addr) = peer.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }

    if let Ok(ip) = peer.parse::<IpAddr>() {
        return ip.to_string();
    }

    match peer.rsplit_once(':') {
        Some((host, port)) if port.parse::<u16>().is_ok() => host.to_owned(),
        _ => peer.to_owned(),
    }
}

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

pub type PeerId = u64;

/// One cluster member as known by this node.
///
/// `id` is left empty by callers and assigned by the registry on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: Option<PeerId>,
    pub ip_address: String,
    pub first_seen: i64,
    pub last_seen: i64,
    pub is_master: bool,
}

impl PeerInfo {
    pub fn new(ip_address: IpAddr, seen: i64, is_master: bool) -> Self {
        PeerInfo {
            id: None,
            ip_address: ip_address.to_string(),
            first_seen: seen,
            last_seen: seen,
            is_master,
        }
    }

    pub fn with_id(mut self, id: PeerId) -> Self {
        self.id = Some(id);
        self
    }

    /// Builds the registry entry for an accepted join, stamped at `now`.
    pub fn from_join(req: &JoinRequest, now: i64) -> Result<Self> {
        let ip_address = parse_internet_address(&req.ip_address)?;

        Ok(PeerInfo::new(ip_address, now, req.is_master))
    }
}

/// Body of `POST /join`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinRequest {
    pub ip_address: String,
    pub is_master: bool,
}

impl JoinRequest {
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::BadPayload(e.to_string()))
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| Error::BadPayload(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResponse {
    pub status: String,
}

impl JoinResponse {
    pub fn joined() -> Self {
        JoinResponse {
            status: "JOINED".to_owned(),
        }
    }
}

/// Peer entry as listed by `GET /admin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedPeer {
    pub id: PeerId,
    pub ip_address: String,
    pub first_seen: i64,
    pub last_seen: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminResponse {
    pub status: String,
    pub master: bool,
    pub peers: Vec<ListedPeer>,
    pub diagnostics: serde_json::Map<String, serde_json::Value>,
}

pub fn parse_internet_address(raw: &str) -> Result<IpAddr> {
    raw.trim()
        .parse()
        .map_err(|_| Error::InvalidAddress(raw.to_owned()))
}

use crate::peer::{PeerId, PeerInfo};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Peers {
    by_id: BTreeMap<PeerId, PeerInfo>,
    next_id: PeerId,
}

/// Table of known peers. Reads and writes are serialized through a single lock.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<Peers>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `peer`, assigning the next id when it carries none.
    ///
    /// Fails on an id already present or an `ip_address` already present.
    pub fn insert(&self, mut peer: PeerInfo) -> bool {
        if peer.first_seen > peer.last_seen {
            return false;
        }

        let mut peers = self.write();

        if peers.by_id.values().any(|p| p.ip_address == peer.ip_address) {
            return false;
        }

        let id = match peer.id {
            Some(id) if peers.by_id.contains_key(&id) => return false,
            Some(id) => id,
            None => match (peers.next_id..=PeerId::MAX).find(|id| !peers.by_id.contains_key(id)) {
                Some(id) => id,
                None => return false,
            },
        };

        if let Some(next) = id.checked_add(1) {
            peers.next_id = peers.next_id.max(next);
        }
        peer.id = Some(id);
        debug!("registered peer {} as {}", peer.ip_address, id);
        peers.by_id.insert(id, peer);

        true
    }

    /// Moves `last_seen` forward for the peer at `ip_address`.
    pub fn touch(&self, ip_address: &str, at: i64) -> bool {
        let mut peers = self.write();

        match peers
            .by_id
            .values_mut()
            .find(|p| p.ip_address == ip_address)
        {
            Some(peer) => {
                peer.last_seen = peer.last_seen.max(at);
                true
            }
            None => false,
        }
    }

    /// Snapshot of every peer, ordered by id.
    pub fn all(&self) -> Vec<PeerInfo> {
        self.read().by_id.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find_by_address(&self, ip_address: &str) -> Option<PeerInfo> {
        self.read()
            .by_id
            .values()
            .find(|p| p.ip_address == ip_address)
            .cloned()
    }

    fn read(&self) -> RwLockReadGuard<'_, Peers> {
        self.peers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Peers> {
        self.peers.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// A registry mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Insert(PeerInfo),
    /// Confirmed contact with the peer at `ip_address`.
    Touch { ip_address: String, at: i64 },
}

impl PeerInfo {
    pub fn insert(self) -> Command {
        Command::Insert(self)
    }
}

/// Applies commands to the registry. Membership changes go through here so a
/// replicated log can take over application later.
pub trait Executor: Send + Sync {
    fn execute(&self, command: Command) -> bool;
}

/// Applies commands directly to the local registry.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    registry: Arc<PeerRegistry>,
}

impl LocalExecutor {
    pub fn new(registry: Arc<PeerRegistry>) -> Self {
        LocalExecutor { registry }
    }
}

impl Executor for LocalExecutor {
    fn execute(&self, command: Command) -> bool {
        match command {
            Command::Insert(peer) => self.registry.insert(peer),
            Command::Touch { ip_address, at } => self.registry.touch(&ip_address, at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn peer(last_octet: u8) -> PeerInfo {
        PeerInfo::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet)), 100, false)
    }

    #[test]
    fn insert_assigns_sequential_ids() {
        let registry = PeerRegistry::new();

        assert!(registry.insert(peer(2)));
        assert!(registry.insert(peer(3)));

        let ids: Vec<_> = registry.all().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![Some(0), Some(1)]);
    }

    #[test]
    fn same_id_yields_one_success_in_either_order() {
        for swap in [false, true] {
            let registry = PeerRegistry::new();
            let (a, b) = (peer(2).with_id(7), peer(3).with_id(7));
            let (first, second) = if swap { (b, a) } else { (a, b) };

            assert!(registry.insert(first));
            assert!(!registry.insert(second));
            assert_eq!(registry.len(), 1);
        }
    }

    #[test]
    fn duplicate_address_is_rejected() {
        let registry = PeerRegistry::new();

        assert!(registry.insert(peer(2)));
        assert!(!registry.insert(peer(2)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn generated_ids_skip_explicit_ones() {
        let registry = PeerRegistry::new();

        assert!(registry.insert(peer(2).with_id(0)));
        assert!(registry.insert(peer(3)));
        assert_eq!(registry.find_by_address("10.0.0.3").unwrap().id, Some(1));
    }

    #[test]
    fn largest_explicit_id_leaves_generated_ids_alone() {
        let registry = PeerRegistry::new();

        assert!(registry.insert(peer(2).with_id(PeerId::MAX)));
        assert!(registry.insert(peer(3)));
        assert!(!registry.insert(peer(4).with_id(PeerId::MAX)));

        assert_eq!(registry.find_by_address("10.0.0.3").unwrap().id, Some(0));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn touch_never_moves_last_seen_backwards() {
        let registry = PeerRegistry::new();
        registry.insert(peer(2));

        assert!(registry.touch("10.0.0.2", 150));
        assert!(registry.touch("10.0.0.2", 120));
        assert!(!registry.touch("10.0.0.9", 150));

        let p = registry.find_by_address("10.0.0.2").unwrap();
        assert_eq!((p.first_seen, p.last_seen), (100, 150));
    }

    #[test]
    fn executor_applies_commands() {
        let registry = Arc::new(PeerRegistry::new());
        let executor = LocalExecutor::new(registry.clone());

        assert!(executor.execute(peer(5).insert()));
        assert!(!executor.execute(peer(5).insert()));
        assert!(executor.execute(Command::Touch {
            ip_address: "10.0.0.5".to_owned(),
            at: 200,
        }));
        assert_eq!(registry.all()[0].last_seen, 200);
    }

    #[test]
    fn concurrent_inserts_keep_ids_unique() {
        let registry = Arc::new(PeerRegistry::new());

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.insert(peer(i)))
            })
            .collect();

        for h in handles {
            assert!(h.join().unwrap());
        }

        let mut ids: Vec<_> = registry.all().into_iter().filter_map(|p| p.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }
}

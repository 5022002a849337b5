use bytes::BytesMut;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of buffers for control-plane objects (request bytes, serialized
/// responses), kept apart from whatever allocator the hosting process exposes
/// to applications.
pub trait InternalAllocator: Send + Sync {
    fn buffer(&self, capacity: usize) -> BytesMut;

    /// Opaque handles describing the allocator, reported by `/admin`.
    fn diagnostics(&self) -> Map<String, Value>;
}

/// Default internal allocator backed by the process heap.
#[derive(Debug, Default)]
pub struct SystemArena {
    buffers: AtomicU64,
    bytes: AtomicU64,
}

impl SystemArena {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InternalAllocator for SystemArena {
    fn buffer(&self, capacity: usize) -> BytesMut {
        self.buffers.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(capacity as u64, Ordering::Relaxed);
        BytesMut::with_capacity(capacity)
    }

    fn diagnostics(&self) -> Map<String, Value> {
        let mut handles = Map::new();
        handles.insert(
            "internal_buffers".to_owned(),
            self.buffers.load(Ordering::Relaxed).into(),
        );
        handles.insert(
            "internal_bytes".to_owned(),
            self.bytes.load(Ordering::Relaxed).into(),
        );
        handles
    }
}

use crate::lifecycle::Lifecycle;
use heapmesh_common::arena::{InternalAllocator, SystemArena};
use heapmesh_common::config::NodeConfig;
use heapmesh_common::registry::{Executor, LocalExecutor, PeerRegistry};
use std::sync::Arc;

/// Process-scoped state shared by the server, the route handlers and the state machine.
pub struct Context {
    pub config: Arc<NodeConfig>,
    pub registry: Arc<PeerRegistry>,
    pub executor: Arc<dyn Executor>,
    pub arena: Arc<dyn InternalAllocator>,
    pub lifecycle: Lifecycle,
}

impl Context {
    pub fn new(config: NodeConfig) -> Self {
        let registry = Arc::new(PeerRegistry::new());

        Context {
            config: Arc::new(config),
            executor: Arc::new(LocalExecutor::new(registry.clone())),
            registry,
            arena: Arc::new(SystemArena::new()),
            lifecycle: Lifecycle::new(),
        }
    }

    pub fn with_arena(mut self, arena: Arc<dyn InternalAllocator>) -> Self {
        self.arena = arena;
        self
    }
}

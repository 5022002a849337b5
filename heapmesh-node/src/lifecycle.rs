use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug)]
struct Inner {
    alive: AtomicBool,
    notify: Notify,
}

/// Process-wide alive flag. Stopping it ends the accept loop and the state machine.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    inner: Arc<Inner>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Lifecycle {
            inner: Arc::new(Inner {
                alive: AtomicBool::new(true),
                notify: Notify::new(),
            }),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.inner.alive.store(false, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Resolves once `stop` has been called.
    pub async fn stopped(&self) {
        let notified = self.inner.notify.notified();

        if !self.is_alive() {
            return;
        }

        notified.await;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

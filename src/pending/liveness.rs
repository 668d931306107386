use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Revocable handle a background job checks before every state mutation.
///
/// A child handle is dead once it or its parent has been revoked, so one
/// revocation of the manager's scope stops every job started under it.
#[derive(Debug, Clone)]
pub struct Liveness {
    alive: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
            parent: None,
        }
    }

    pub fn child(&self) -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
            parent: Some(self.alive.clone()),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
            && self
                .parent
                .as_ref()
                .map_or(true, |p| p.load(Ordering::Acquire))
    }

    pub fn revoke(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

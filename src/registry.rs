//! Bookkeeping for spawned session tasks.
//!
//! Grounded on `examples/original_source/net/manager/manager.go`'s
//! `TunnelManager`: a mutex-protected list that tunnels register
//! themselves into. Here it holds `JoinHandle`s for spawned session tasks
//! rather than tunnel objects, since a tunnel in this design is just "the
//! Local or Remote listener", not a per-session entity.

use std::sync::Mutex;

use tokio::task::JoinHandle;

/// The only piece of shared mutable state beyond the immutable cipher
/// registry and a role's listening socket (§5). Mutated exactly once per
/// accepted connection, on spawn.
#[derive(Default)]
pub struct SessionRegistry {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry::default()
    }

    /// Registers a freshly spawned session task and opportunistically
    /// forgets about tasks that have already finished, so a long-running
    /// listener doesn't accumulate one `JoinHandle` per connection forever.
    pub fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock().expect("session registry mutex poisoned");
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Number of session tasks believed to still be running. Best-effort:
    /// a task may finish between this call and its caller reading it.
    pub fn active_count(&self) -> usize {
        let mut handles = self.handles.lock().expect("session registry mutex poisoned");
        handles.retain(|h| !h.is_finished());
        handles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tracks_and_reaps_finished_sessions() {
        let registry = SessionRegistry::new();
        let handle = tokio::spawn(async {});
        registry.track(handle);
        tokio::task::yield_now().await;
        // give the spawned no-op task a chance to complete before reaping
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(registry.active_count(), 0);
    }
}

// ── Host lifecycle ──
//
// The embedding host (CLI, service manager, home-automation runtime)
// reports its own state here. `Running` gates the first live-data
// connection; `Stopping` ends polling and reconnects.

use std::sync::Arc;

use strum::Display;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum HostState {
    Starting,
    Running,
    Stopping,
}

/// Cloneable handle to the host's state. Transitions only move forward.
#[derive(Clone)]
pub struct HostLifecycle {
    state: Arc<watch::Sender<HostState>>,
}

impl Default for HostLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl HostLifecycle {
    /// A host that is still starting.
    pub fn new() -> Self {
        let (state, _) = watch::channel(HostState::Starting);
        Self {
            state: Arc::new(state),
        }
    }

    /// A host that is already running.
    pub fn running() -> Self {
        let lifecycle = Self::new();
        lifecycle.set_running();
        lifecycle
    }

    pub fn state(&self) -> HostState {
        *self.state.borrow()
    }

    pub fn is_stopping(&self) -> bool {
        self.state() == HostState::Stopping
    }

    /// `Starting → Running`. Ignored once stopping.
    pub fn set_running(&self) {
        self.state.send_if_modified(|state| {
            if *state == HostState::Starting {
                *state = HostState::Running;
                true
            } else {
                false
            }
        });
    }

    pub fn set_stopping(&self) {
        self.state.send_if_modified(|state| {
            let changed = *state != HostState::Stopping;
            *state = HostState::Stopping;
            changed
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<HostState> {
        self.state.subscribe()
    }

    /// Wait until the host leaves `Starting`. Returns `true` if it is running.
    pub async fn wait_running(&self) -> bool {
        let mut rx = self.subscribe();
        match rx.wait_for(|s| *s != HostState::Starting).await {
            Ok(state) => *state == HostState::Running,
            Err(_) => false,
        }
    }

    /// Wait until the host is stopping.
    pub async fn wait_stopping(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|s| *s == HostState::Stopping).await;
    }
}

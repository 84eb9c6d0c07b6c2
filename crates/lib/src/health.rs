//! Availability of the remote workspace API.
//!
//! `AvailabilityTracker` is a two-state flag (initially offline). `HealthService` owns it and is
//! the only writer: `refresh()` runs the probe set and records the outcome.

use crate::llm::ChatBackend;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Offline,
    Online,
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Offline => f.write_str("offline"),
            Availability::Online => f.write_str("online"),
        }
    }
}

/// Process-wide online/offline flag.
#[derive(Debug, Default)]
pub struct AvailabilityTracker {
    online: AtomicBool,
}

impl AvailabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Availability {
        if self.online.load(Ordering::SeqCst) {
            Availability::Online
        } else {
            Availability::Offline
        }
    }

    fn set(&self, state: Availability) {
        self.online
            .store(state == Availability::Online, Ordering::SeqCst);
    }
}

/// Runs probes against a backend and keeps the tracker up to date.
pub struct HealthService<B: ChatBackend + ?Sized> {
    backend: Arc<B>,
    tracker: AvailabilityTracker,
}

impl<B: ChatBackend + ?Sized> HealthService<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            tracker: AvailabilityTracker::new(),
        }
    }

    pub fn state(&self) -> Availability {
        self.tracker.state()
    }

    /// Run the probe set once: success marks the api online, any failure marks it offline.
    pub async fn refresh(&self) -> Availability {
        let state = match self.backend.run_all_probes().await {
            Ok(()) => Availability::Online,
            Err(e) => {
                log::warn!("failed to test workspace api: {}", e);
                Availability::Offline
            }
        };
        let previous = self.tracker.state();
        self.tracker.set(state);
        if previous != state {
            log::info!("workspace api is now {}", state);
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatReply, WorkspaceError};
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::atomic::AtomicUsize;

    struct ScriptedProbes {
        ok: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatBackend for ScriptedProbes {
        async fn run_all_probes(&self) -> Result<(), WorkspaceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.ok.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(WorkspaceError::ServiceUnavailable(StatusCode::BAD_GATEWAY))
            }
        }

        async fn send_chat(&self, _: &str, _: &str) -> Result<ChatReply, WorkspaceError> {
            unreachable!("health service never chats")
        }
    }

    #[test]
    fn tracker_starts_offline() {
        let tracker = AvailabilityTracker::new();
        assert_eq!(tracker.state(), Availability::Offline);
        tracker.set(Availability::Online);
        assert_eq!(tracker.state(), Availability::Online);
    }

    #[tokio::test]
    async fn refresh_follows_probe_outcome() {
        let backend = Arc::new(ScriptedProbes {
            ok: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        });
        let health = HealthService::new(backend.clone());
        assert_eq!(health.state(), Availability::Offline);

        assert_eq!(health.refresh().await, Availability::Online);
        assert_eq!(health.state(), Availability::Online);

        backend.ok.store(false, Ordering::SeqCst);
        assert_eq!(health.refresh().await, Availability::Offline);
        assert_eq!(health.state(), Availability::Offline);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }
}

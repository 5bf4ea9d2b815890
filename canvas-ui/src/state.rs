//! Shared application state for the UI server.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use canvas::core::types::SessionKey;
use canvas::io::broadcast::{SnapshotBroadcaster, SnapshotEvent};
use canvas::io::config::CanvasConfig;
use canvas::io::persistence::Backend;
use canvas::session::{Engine, Session};
use tokio::sync::broadcast;

pub type CanvasEngine = Engine<Backend, ChannelBroadcaster>;

/// Session guarded for strictly sequential turns.
pub type SharedSession = Arc<tokio::sync::Mutex<Session>>;

/// Fans snapshots out to every connected SSE client.
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<SnapshotEvent>,
}

impl ChannelBroadcaster {
    pub fn new(tx: broadcast::Sender<SnapshotEvent>) -> Self {
        Self { tx }
    }
}

impl SnapshotBroadcaster for ChannelBroadcaster {
    fn emit(&self, event: &SnapshotEvent) -> Result<()> {
        // No subscribers is not a failure; the snapshot is simply unobserved.
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CanvasEngine>,
    /// Broadcast sender for snapshot events.
    pub event_tx: broadcast::Sender<SnapshotEvent>,
    /// SSE keep-alive interval.
    pub keep_alive: Duration,
    sessions: Arc<Mutex<HashMap<SessionKey, SharedSession>>>,
}

impl AppState {
    pub fn new(project_dir: &Path, config: &CanvasConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.server.broadcast_capacity);
        let engine = Engine::new(
            Backend::from_config(project_dir, config),
            ChannelBroadcaster::new(event_tx.clone()),
            config.guard.policy,
        );
        Self {
            engine: Arc::new(engine),
            event_tx,
            keep_alive: Duration::from_secs(config.server.keep_alive_secs),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Get the live session for `key`, opening it from persistence on first use.
    pub fn session(&self, key: &SessionKey) -> Result<SharedSession> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| anyhow!("session registry lock poisoned"))?;
        if let Some(session) = sessions.get(key) {
            return Ok(Arc::clone(session));
        }
        let session = Arc::new(tokio::sync::Mutex::new(self.engine.open_session(key)?));
        sessions.insert(key.clone(), Arc::clone(&session));
        Ok(session)
    }

    /// End the live session for `key`. The persisted document stays; the next
    /// request reopens from it. Returns false when the session was not open.
    pub fn close_session(&self, key: &SessionKey) -> Result<bool> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| anyhow!("session registry lock poisoned"))?;
        Ok(sessions.remove(key).is_some())
    }

    /// Already-open session for `key`, if any.
    pub fn open_session(&self, key: &SessionKey) -> Option<SharedSession> {
        let sessions = self.sessions.lock().ok()?;
        sessions.get(key).map(Arc::clone)
    }
}


#[cfg(test)]
mod tests {
    use super::test_state::in_memory;
    use canvas::test_support::session_key;

    #[test]
    fn session_registry_reuses_open_sessions() {
        let state = in_memory();
        let key = session_key("alpha");
        assert!(state.open_session(&key).is_none());

        let first = state.session(&key).expect("open");
        let second = state.session(&key).expect("reuse");
        assert!(std::sync::Arc::ptr_eq(&first, &second));
        assert!(state.open_session(&key).is_some());
    }

    #[test]
    fn closed_sessions_leave_the_registry() {
        let state = in_memory();
        let key = session_key("alpha");
        let first = state.session(&key).expect("open");

        assert!(state.close_session(&key).expect("close"));
        assert!(state.open_session(&key).is_none());
        assert!(!state.close_session(&key).expect("close again"));

        let reopened = state.session(&key).expect("reopen");
        assert!(!std::sync::Arc::ptr_eq(&first, &reopened));
    }
}

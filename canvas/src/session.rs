//! Session engine: one turn = reconcile incoming state, dispatch calls in
//! order, persist.
//!
//! A turn is all-or-nothing with respect to persistence: if the final write
//! fails, the in-memory store and last known good document are restored to
//! their pre-turn values and a resync snapshot is emitted so observers drop
//! the states broadcast during the failed turn.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::guard::{GuardPolicy, StateSource, reconcile};
use crate::core::types::{SessionKey, SharedState};
use crate::dispatch::{CallOutcome, Dispatcher, MutationCall};
use crate::io::broadcast::{SnapshotBroadcaster, SnapshotEvent};
use crate::io::persistence::StatePersistence;
use crate::store::StateStore;

/// Live state of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub key: SessionKey,
    pub store: StateStore,
    /// Most recent well-formed document; feeds the stale-state guard.
    pub last_good: Option<SharedState>,
}

/// Input of one turn: the state the host handed over plus the agent's calls.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TurnRequest {
    #[serde(default)]
    pub state: Option<Value>,
    #[serde(default)]
    pub calls: Vec<MutationCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResponse {
    pub state: SharedState,
    pub source: StateSource,
    pub revision: u64,
    pub outcomes: Vec<CallOutcome>,
}

/// Ties persistence, broadcast, and dispatch together.
#[derive(Debug)]
pub struct Engine<P, B> {
    persistence: P,
    broadcaster: B,
    dispatcher: Dispatcher,
    policy: GuardPolicy,
}

impl<P: StatePersistence, B: SnapshotBroadcaster> Engine<P, B> {
    pub fn new(persistence: P, broadcaster: B, policy: GuardPolicy) -> Self {
        Self {
            persistence,
            broadcaster,
            dispatcher: Dispatcher::new(),
            policy,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    pub fn broadcaster(&self) -> &B {
        &self.broadcaster
    }

    pub fn policy(&self) -> GuardPolicy {
        self.policy
    }

    /// Open `key`, seeding last known good from persistence.
    pub fn open_session(&self, key: &SessionKey) -> Result<Session> {
        let last_good = self
            .persistence
            .get(key)
            .with_context(|| format!("load session {key}"))?;
        debug!(session = %key, persisted = last_good.is_some(), "opened session");
        let doc = last_good.clone().unwrap_or_else(SharedState::initial);
        Ok(Session {
            key: key.clone(),
            store: StateStore::new(doc),
            last_good,
        })
    }

    /// Run one turn against `session`.
    #[instrument(skip_all, fields(session = %session.key, calls = request.calls.len()))]
    pub fn run_turn(&self, session: &mut Session, request: &TurnRequest) -> Result<TurnResponse> {
        let checkpoint = (session.store.get().clone(), session.last_good.clone());

        match self.turn(session, request) {
            Ok(response) => Ok(response),
            Err(err) => {
                self.rollback(session, checkpoint);
                Err(err)
            }
        }
    }

    fn turn(&self, session: &mut Session, request: &TurnRequest) -> Result<TurnResponse> {
        let reconciled = reconcile(request.state.as_ref(), session.last_good.as_ref(), self.policy);
        if let Some(reason) = &reconciled.rejected {
            match reconciled.source {
                StateSource::Cached => warn!(%reason, "using last known good state"),
                _ => warn!(%reason, "using initial template"),
            }
        }

        if reconciled.state != *session.store.get() {
            session.store.replace(reconciled.state.clone());
        }
        if reconciled.refreshes_last_good() {
            session.last_good = Some(reconciled.state.clone());
        }

        let mut outcomes = Vec::with_capacity(request.calls.len());
        for call in &request.calls {
            let outcome = self.dispatcher.dispatch(
                &session.key,
                &mut session.store,
                &self.broadcaster,
                call,
            )?;
            outcomes.push(outcome);
        }

        if session.store.is_dirty() {
            self.persist(session)?;
        }

        info!(
            source = ?reconciled.source,
            revision = session.store.revision(),
            applied = outcomes.iter().filter(|outcome| outcome.applied).count(),
            "turn complete"
        );
        Ok(TurnResponse {
            state: session.store.get().clone(),
            source: reconciled.source,
            revision: session.store.revision(),
            outcomes,
        })
    }

    /// Replace the session with the initial template, persist, and broadcast.
    #[instrument(skip_all, fields(session = %session.key))]
    pub fn reset_session(&self, session: &mut Session) -> Result<SnapshotEvent> {
        let checkpoint = (session.store.get().clone(), session.last_good.clone());
        session.store.replace(SharedState::initial());
        session.last_good = Some(SharedState::initial());

        let emitted = self.persist(session).and_then(|()| self.emit_current(session));
        match emitted {
            Ok(event) => {
                info!(revision = event.revision, "session reset");
                Ok(event)
            }
            Err(err) => {
                self.rollback(session, checkpoint);
                Err(err)
            }
        }
    }

    /// Reload the persisted document after an external write and broadcast it.
    ///
    /// Returns `None` when the persisted document matches memory.
    pub fn refresh_from_persistence(&self, session: &mut Session) -> Result<Option<SnapshotEvent>> {
        let Some(persisted) = self
            .persistence
            .get(&session.key)
            .with_context(|| format!("load session {}", session.key))?
        else {
            return Ok(None);
        };
        if persisted == *session.store.get() {
            return Ok(None);
        }
        session.store.replace(persisted.clone());
        session.store.mark_clean();
        session.last_good = Some(persisted);
        self.emit_current(session).map(Some)
    }

    /// Broadcast the current document without changing it.
    pub fn emit_current(&self, session: &Session) -> Result<SnapshotEvent> {
        let event = SnapshotEvent {
            session: session.key.clone(),
            revision: session.store.revision(),
            snapshot: session.store.get().clone(),
        };
        self.broadcaster
            .emit(&event)
            .with_context(|| format!("broadcast snapshot for {}", session.key))?;
        Ok(event)
    }

    fn persist(&self, session: &mut Session) -> Result<()> {
        let doc = session.store.get();
        self.persistence
            .set(&session.key, doc)
            .with_context(|| format!("persist session {}", session.key))?;
        session.last_good = Some(doc.clone());
        session.store.mark_clean();
        Ok(())
    }

    fn rollback(&self, session: &mut Session, checkpoint: (SharedState, Option<SharedState>)) {
        let (doc, last_good) = checkpoint;
        session.store.replace(doc);
        session.store.mark_clean();
        session.last_good = last_good;
        warn!(session = %session.key, revision = session.store.revision(), "turn rolled back");
        if let Err(err) = self.emit_current(session) {
            warn!(session = %session.key, "resync broadcast failed: {err:#}");
        }
    }
}

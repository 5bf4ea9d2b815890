//! Snapshot fan-out to observers.

use std::io::Write;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;

use crate::core::types::{SessionKey, SharedState};

/// Immutable copy of a session's document after one commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEvent {
    pub session: SessionKey,
    pub revision: u64,
    pub snapshot: SharedState,
}

/// Receives one event per committed change, in commit order.
pub trait SnapshotBroadcaster {
    fn emit(&self, event: &SnapshotEvent) -> Result<()>;
}

impl<B: SnapshotBroadcaster + ?Sized> SnapshotBroadcaster for &B {
    fn emit(&self, event: &SnapshotEvent) -> Result<()> {
        (**self).emit(event)
    }
}

impl<B: SnapshotBroadcaster + ?Sized> SnapshotBroadcaster for std::sync::Arc<B> {
    fn emit(&self, event: &SnapshotEvent) -> Result<()> {
        (**self).emit(event)
    }
}

/// Writes each event as one JSON line (used by the CLI on stdout).
#[derive(Debug)]
pub struct JsonLinesBroadcaster<W: Write> {
    out: Mutex<W>,
}

impl<W: Write> JsonLinesBroadcaster<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.out
            .into_inner()
            .map_err(|_| anyhow!("snapshot writer lock poisoned"))
    }
}

impl<W: Write> SnapshotBroadcaster for JsonLinesBroadcaster<W> {
    fn emit(&self, event: &SnapshotEvent) -> Result<()> {
        let line = serde_json::to_string(event).context("serialize snapshot")?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow!("snapshot writer lock poisoned"))?;
        writeln!(out, "{line}").context("write snapshot")?;
        out.flush().context("flush snapshot")
    }
}

/// Broadcaster that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBroadcaster;

impl SnapshotBroadcaster for NullBroadcaster {
    fn emit(&self, _event: &SnapshotEvent) -> Result<()> {
        Ok(())
    }
}

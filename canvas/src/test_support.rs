//! Test-only helpers for constructing documents, plans, and session doubles.

use std::sync::Mutex;

use anyhow::{Result, bail};
use serde_json::Value;

use crate::core::plan::{aggregate_status, initialize_plan};
use crate::core::types::{
    Item, ItemKind, Plan, PlanStatus, PlanStep, SessionKey, SharedState, StepStatus,
};
use crate::dispatch::MutationCall;
use crate::io::broadcast::{SnapshotBroadcaster, SnapshotEvent};
use crate::io::persistence::StatePersistence;

/// Create an item of `kind` with default data and a deterministic name.
pub fn item_of_kind(id: &str, kind: ItemKind) -> Item {
    Item::new(id, kind, format!("{kind} {id}"))
}

/// Create a document holding `count` note items (`0001`, `0002`, ...).
pub fn state_with_items(count: u64) -> SharedState {
    let mut state = SharedState::initial();
    state.global_title = "Board".to_string();
    for index in 1..=count {
        state
            .items
            .push(Item::new(format!("{index:04}"), ItemKind::Note, format!("Item {index}")));
    }
    state.items_created = count;
    state
}

/// Create a document whose plan was initialized from `titles`.
pub fn state_with_plan(titles: &[&str]) -> SharedState {
    let mut state = SharedState::initial();
    let titles: Vec<String> = titles.iter().map(|title| title.to_string()).collect();
    initialize_plan(&mut state.plan, &titles);
    state
}

/// Create a plan with explicit step statuses and a consistent aggregate.
pub fn plan_with(statuses: &[StepStatus]) -> Plan {
    let steps: Vec<PlanStep> = statuses
        .iter()
        .enumerate()
        .map(|(index, status)| PlanStep {
            title: format!("step {index}"),
            status: *status,
            note: None,
        })
        .collect();

    let status = match aggregate_status(&steps) {
        Some(status) => status,
        None if steps.is_empty() => PlanStatus::Idle,
        None => PlanStatus::InProgress,
    };
    let current_step_index = if steps.is_empty() {
        -1
    } else {
        statuses
            .iter()
            .position(|status| *status == StepStatus::InProgress)
            .unwrap_or(0) as i64
    };

    Plan {
        steps,
        current_step_index,
        status,
    }
}

pub fn session_key(raw: &str) -> SessionKey {
    SessionKey::new(raw).expect("valid session key")
}

/// Build a mutation call from a name and JSON arguments.
pub fn call(name: &str, args: Value) -> MutationCall {
    MutationCall {
        name: name.to_string(),
        args,
    }
}

/// Broadcaster that records every emitted snapshot.
#[derive(Debug, Default)]
pub struct RecordingBroadcaster {
    events: Mutex<Vec<SnapshotEvent>>,
}

impl RecordingBroadcaster {
    pub fn events(&self) -> Vec<SnapshotEvent> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn revisions(&self) -> Vec<u64> {
        self.events().iter().map(|event| event.revision).collect()
    }
}

impl SnapshotBroadcaster for RecordingBroadcaster {
    fn emit(&self, event: &SnapshotEvent) -> Result<()> {
        self.events.lock().expect("events lock").push(event.clone());
        Ok(())
    }
}

/// Persistence whose writes always fail; reads find nothing.
#[derive(Debug, Default)]
pub struct FailingPersistence;

impl StatePersistence for FailingPersistence {
    fn get(&self, _key: &SessionKey) -> Result<Option<SharedState>> {
        Ok(None)
    }

    fn set(&self, key: &SessionKey, _state: &SharedState) -> Result<()> {
        bail!("disk full while writing session {key}")
    }
}

//! Stale-state guard.
//!
//! The host runtime may hand a request an empty or default document instead of
//! the session's true state. The guard decides which document a turn operates
//! on: a well-formed incoming document wins, otherwise the last known good
//! state, otherwise the initial template. A missing or malformed candidate is
//! never an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::merge::{IncomingPlanFields, merge_snapshots};
use crate::core::types::SharedState;

/// How a well-formed incoming document is combined with the last known good one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardPolicy {
    /// The caller's document is authoritative and replaces memory.
    #[default]
    Adopt,
    /// The caller's document is merged onto the last known good one.
    Merge,
}

/// Where the reconciled document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateSource {
    Incoming,
    Merged,
    Cached,
    Template,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub state: SharedState,
    pub source: StateSource,
    /// Why the candidate was not used, when it was not.
    pub rejected: Option<String>,
}

impl Reconciled {
    /// True when the result should become the new last known good state.
    pub fn refreshes_last_good(&self) -> bool {
        matches!(self.source, StateSource::Incoming | StateSource::Merged)
    }
}

/// Pick the document to operate on.
pub fn reconcile(
    candidate: Option<&Value>,
    last_good: Option<&SharedState>,
    policy: GuardPolicy,
) -> Reconciled {
    match parse_candidate(candidate) {
        Ok(incoming) => match (policy, last_good) {
            (GuardPolicy::Merge, Some(previous)) => Reconciled {
                state: merge_snapshots(
                    previous,
                    &incoming,
                    candidate.map(IncomingPlanFields::of).unwrap_or_default(),
                ),
                source: StateSource::Merged,
                rejected: None,
            },
            _ => Reconciled {
                state: incoming,
                source: StateSource::Incoming,
                rejected: None,
            },
        },
        Err(reason) => match last_good {
            Some(previous) => Reconciled {
                state: previous.clone(),
                source: StateSource::Cached,
                rejected: Some(reason),
            },
            None => Reconciled {
                state: SharedState::initial(),
                source: StateSource::Template,
                rejected: Some(reason),
            },
        },
    }
}

/// Accept `candidate` only if it is an object with an `items` array that
/// deserializes into a [`SharedState`].
pub fn parse_candidate(candidate: Option<&Value>) -> Result<SharedState, String> {
    let value = match candidate {
        None | Some(Value::Null) => return Err("no incoming state".to_string()),
        Some(value) => value,
    };
    let Some(object) = value.as_object() else {
        return Err("incoming state is not an object".to_string());
    };
    if !matches!(object.get("items"), Some(Value::Array(_))) {
        return Err("incoming state has no items array".to_string());
    }
    serde_json::from_value(value.clone())
        .map_err(|err| format!("incoming state is invalid: {err}"))
}

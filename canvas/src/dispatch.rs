//! Mutation dispatch: parse a call, commit it atomically, broadcast once.
//!
//! Lookup order is built-in operations, then handlers registered by the
//! embedder, then an `unknown_operation` rejection. A rejected call commits
//! nothing and emits nothing.

use std::collections::HashMap;
use std::fmt;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::core::operation::{BUILTIN_NAMES, Operation, Refusal};
use crate::core::types::{Rejection, SessionKey, SharedState};
use crate::io::broadcast::{SnapshotBroadcaster, SnapshotEvent};
use crate::store::StateStore;

/// One mutation call as issued by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// What happened to one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallOutcome {
    pub name: String,
    pub applied: bool,
    pub result: Value,
}

/// Embedder-provided operation outside the built-in set.
///
/// Implementations mutate `state` only when they return `Ok`; the dispatcher
/// discards the working copy otherwise.
pub trait MutationHandler: Send + Sync {
    fn apply(&self, state: &mut SharedState, args: &Value) -> Result<Value, Rejection>;
}

#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Box<dyn MutationHandler>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Dispatcher").field("handlers", &names).finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`. Built-in names and duplicates are refused.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl MutationHandler + 'static,
    ) -> Result<()> {
        let name = name.into();
        if BUILTIN_NAMES.contains(&name.as_str()) {
            return Err(anyhow!("operation '{name}' is built in"));
        }
        if self.handlers.contains_key(&name) {
            return Err(anyhow!("operation '{name}' is already registered"));
        }
        self.handlers.insert(name, Box::new(handler));
        Ok(())
    }

    /// Apply one call to `store` and emit a snapshot if it committed.
    ///
    /// Rejections are returned as `applied: false` outcomes; `Err` is reserved
    /// for broadcast failures.
    #[instrument(skip_all, fields(session = %key, operation = %call.name))]
    pub fn dispatch<B: SnapshotBroadcaster + ?Sized>(
        &self,
        key: &SessionKey,
        store: &mut StateStore,
        broadcaster: &B,
        call: &MutationCall,
    ) -> Result<CallOutcome> {
        let applied = match Operation::parse(&call.name, &call.args) {
            Ok(operation) => store.apply_patch(|doc| operation.apply(doc)),
            Err(Rejection::UnknownOperation { name }) => match self.handlers.get(&name) {
                Some(handler) => store
                    .apply_patch(|doc| handler.apply(doc, &call.args))
                    .map_err(Refusal::from),
                None => Err(Refusal::from(Rejection::UnknownOperation { name })),
            },
            Err(rejection) => Err(Refusal::from(rejection)),
        };

        match applied {
            Ok(result) => {
                let event = SnapshotEvent {
                    session: key.clone(),
                    revision: store.revision(),
                    snapshot: store.get().clone(),
                };
                broadcaster
                    .emit(&event)
                    .with_context(|| format!("broadcast snapshot for {key}"))?;
                debug!(revision = event.revision, "mutation applied");
                Ok(CallOutcome {
                    name: call.name.clone(),
                    applied: true,
                    result,
                })
            }
            Err(refusal) => {
                info!(error = refusal.rejection.code(), "mutation rejected: {}", refusal.rejection);
                Ok(CallOutcome {
                    name: call.name.clone(),
                    applied: false,
                    result: refusal.into_result(),
                })
            }
        }
    }
}

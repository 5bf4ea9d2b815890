//! Server-Sent Events snapshot stream and session file watcher.

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use canvas::core::types::SessionKey;
use canvas::io::broadcast::SnapshotEvent;
use futures::stream::Stream;
use notify::{Event as NotifyEvent, EventKind, PollWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Only stream snapshots of this session; all sessions when absent.
    pub session: Option<String>,
}

/// SSE endpoint handler.
///
/// With `?session=<key>` the stream opens with that session's current
/// snapshot, then follows its commits.
pub async fn events_handler(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_tx.subscribe();
    let filter = query
        .session
        .as_deref()
        .and_then(|raw| match SessionKey::new(raw) {
            Ok(key) => Some(key),
            Err(err) => {
                warn!("{err}; streaming all sessions");
                None
            }
        });
    let keep_alive = state.keep_alive;

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("{}"));

        if let Some(key) = &filter {
            match state.session(key) {
                Ok(session) => {
                    let session = session.lock().await;
                    let initial = SnapshotEvent {
                        session: key.clone(),
                        revision: session.store.revision(),
                        snapshot: session.store.get().clone(),
                    };
                    drop(session);
                    if let Some(event) = snapshot_event(&initial) {
                        yield Ok(event);
                    }
                }
                Err(err) => warn!(session = %key, "open session failed: {err:#}"),
            }
        }

        loop {
            match rx.recv().await {
                Ok(snapshot) => {
                    if filter.as_ref().is_some_and(|key| *key != snapshot.session) {
                        continue;
                    }
                    if let Some(event) = snapshot_event(&snapshot) {
                        yield Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "SSE client lagged, some snapshots dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(keep_alive).text("ping"))
}

fn snapshot_event(snapshot: &SnapshotEvent) -> Option<Event> {
    let json = serde_json::to_string(snapshot).ok()?;
    Some(
        Event::default()
            .event("snapshot")
            .id(snapshot.revision.to_string())
            .data(json),
    )
}

/// Start the session file watcher in a background task.
///
/// Picks up session files rewritten outside this server (e.g. by the CLI) and
/// re-broadcasts the sessions that are currently open.
pub fn start_file_watcher(state: AppState) {
    tokio::spawn(async move {
        if let Err(e) = run_file_watcher(state).await {
            warn!(error = %e, "file watcher failed");
        }
    });
}

async fn run_file_watcher(state: AppState) -> anyhow::Result<()> {
    let Some(sessions_dir) = state.engine.persistence().dir().map(Path::to_path_buf) else {
        info!("memory persistence backend, file watcher disabled");
        return Ok(());
    };
    std::fs::create_dir_all(&sessions_dir)?;

    let (tx, mut rx) = mpsc::channel::<NotifyEvent>(100);
    let mut watcher = PollWatcher::new(
        move |res: Result<NotifyEvent, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.try_send(event);
            }
        },
        notify::Config::default().with_poll_interval(Duration::from_millis(100)),
    )?;
    watcher.watch(&sessions_dir, RecursiveMode::NonRecursive)?;
    info!(path = %sessions_dir.display(), "watching sessions directory");

    let mut pending_events: Vec<NotifyEvent> = Vec::new();
    let mut flush_tick = tokio::time::interval(Duration::from_millis(100));
    flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                pending_events.push(event);
            }
            _ = flush_tick.tick() => {
                if pending_events.is_empty() {
                    continue;
                }
                let changed = changed_sessions(&sessions_dir, &pending_events);
                pending_events.clear();
                refresh_sessions(&state, changed).await;
            }
        }
    }
}

/// Session keys whose files were created or modified, in key order.
fn changed_sessions(sessions_dir: &Path, events: &[NotifyEvent]) -> BTreeSet<SessionKey> {
    events
        .iter()
        .filter(|event| matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)))
        .flat_map(|event| event.paths.iter())
        .filter_map(|path| parse_session_path(sessions_dir, path))
        .collect()
}

async fn refresh_sessions(state: &AppState, keys: BTreeSet<SessionKey>) {
    for key in keys {
        let Some(session) = state.open_session(&key) else {
            continue;
        };
        let mut session = session.lock_owned().await;
        let engine = Arc::clone(&state.engine);
        let refreshed =
            tokio::task::spawn_blocking(move || engine.refresh_from_persistence(&mut session))
                .await;
        match refreshed {
            Ok(Ok(Some(event))) => {
                debug!(session = %key, revision = event.revision, "broadcast external change")
            }
            Ok(Ok(None)) => {}
            Ok(Err(err)) => warn!(session = %key, "refresh failed: {err:#}"),
            Err(err) => warn!(session = %key, "refresh task failed: {err}"),
        }
    }
}

/// `<sessions_dir>/<key>.json` → key. Temp files and nested paths are ignored.
fn parse_session_path(sessions_dir: &Path, path: &Path) -> Option<SessionKey> {
    if path.parent()? != sessions_dir {
        return None;
    }
    if path.extension()?.to_str()? != "json" {
        return None;
    }
    SessionKey::new(path.file_stem()?.to_str()?).ok()
}

//! Session-level scenarios driven through the public engine API.
//!
//! Each test plays a sequence of turns the way a host runtime would: some with
//! the real state handed over, some with missing or blank state, and checks
//! what observers and persistence see.

use std::sync::Arc;

use canvas::core::guard::{GuardPolicy, StateSource};
use canvas::core::types::{ItemData, PlanStatus, SharedState, StepStatus};
use canvas::io::persistence::{FileStore, StatePersistence};
use canvas::session::{Engine, TurnRequest};
use canvas::test_support::{RecordingBroadcaster, call, session_key};
use serde_json::json;

/// A plan driven to completion across turns that lose the host state.
///
/// Turn 1 hands over the real state and sets the plan; turns 2 and 3 arrive
/// with no state at all (the host dropped it) and must continue from the last
/// known good document rather than the template.
#[test]
fn plan_survives_turns_without_host_state() {
    let temp = tempfile::tempdir().expect("tempdir");
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let engine = Engine::new(
        FileStore::new(temp.path()),
        Arc::clone(&broadcaster),
        GuardPolicy::Adopt,
    );
    let key = session_key("thread-1");

    let mut session = engine.open_session(&key).expect("open");
    let first = engine
        .run_turn(
            &mut session,
            &TurnRequest {
                state: Some(serde_json::to_value(SharedState::initial()).expect("serialize")),
                calls: vec![call("set_plan", json!({"steps": ["research", "draft", "review"]}))],
            },
        )
        .expect("turn 1");
    assert_eq!(first.source, StateSource::Incoming);

    for (index, turn) in [(0, "turn 2"), (1, "turn 3")] {
        let mut session = engine.open_session(&key).expect("reopen");
        let response = engine
            .run_turn(
                &mut session,
                &TurnRequest {
                    state: None,
                    calls: vec![call(
                        "update_plan_progress",
                        json!({"step_index": index, "status": "completed", "note": turn}),
                    )],
                },
            )
            .expect(turn);
        assert_eq!(response.source, StateSource::Cached);
    }

    let mut session = engine.open_session(&key).expect("reopen");
    let last = engine
        .run_turn(
            &mut session,
            &TurnRequest {
                state: None,
                calls: vec![call("AdvanceStep", json!({"index": 2, "status": "completed"}))],
            },
        )
        .expect("turn 4");

    let plan = &last.state.plan;
    assert_eq!(plan.status, PlanStatus::Completed);
    assert_eq!(plan.current_step_index, 2);
    assert!(plan.steps.iter().all(|step| step.status == StepStatus::Completed));
    assert_eq!(plan.steps[1].note.as_deref(), Some("turn 3"));

    let persisted = engine.persistence().get(&key).expect("get").expect("persisted");
    assert_eq!(persisted, last.state);
    assert_eq!(broadcaster.events().len(), 4);
}

/// Canvas edits across item types, each followed by exactly one snapshot.
#[test]
fn canvas_edits_broadcast_in_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let engine = Engine::new(
        FileStore::new(temp.path()),
        Arc::clone(&broadcaster),
        GuardPolicy::Adopt,
    );
    let key = session_key("board");
    let mut session = engine.open_session(&key).expect("open");

    let response = engine
        .run_turn(
            &mut session,
            &TurnRequest {
                state: None,
                calls: vec![
                    call("setGlobalTitle", json!({"title": "Launch"})),
                    call("createItem", json!({"type": "project", "name": "Website"})),
                    call("setProjectField2", json!({"itemId": "0001", "value": "Option C"})),
                    call("addProjectChecklistItem", json!({"itemId": "0001", "text": "copy"})),
                    call(
                        "setProjectChecklistItem",
                        json!({"itemId": "0001", "checklistItemId": "1", "done": true}),
                    ),
                    call("setProjectField3", json!({"itemId": "0001", "date": "not-a-date"})),
                    call("createItem", json!({"type": "chart"})),
                    call(
                        "addChartField1",
                        json!({"itemId": "0002", "label": "Signups", "value": 35}),
                    ),
                    call("deleteItem", json!({"itemId": "0001"})),
                ],
            },
        )
        .expect("turn");

    let rejected: Vec<&str> = response
        .outcomes
        .iter()
        .filter(|outcome| !outcome.applied)
        .map(|outcome| outcome.name.as_str())
        .collect();
    assert_eq!(rejected, vec!["setProjectField3"]);

    let events = broadcaster.events();
    assert_eq!(events.len(), 8);
    assert!(events.windows(2).all(|pair| pair[0].revision + 1 == pair[1].revision));
    assert_eq!(events.last().expect("event").snapshot, response.state);

    let state = &response.state;
    assert_eq!(state.global_title, "Launch");
    assert_eq!(state.last_action, "deleted:0001");
    assert_eq!(state.items_created, 2);
    assert_eq!(state.items.len(), 1);
    let ItemData::Chart(chart) = &state.items[0].data else {
        panic!("expected chart");
    };
    assert_eq!(chart.field1[0].value, Some(35.0));
}

/// The merge policy layers a sparse host document onto the stored one.
#[test]
fn merge_policy_keeps_content_missing_from_host_state() {
    let temp = tempfile::tempdir().expect("tempdir");
    let engine = Engine::new(
        FileStore::new(temp.path()),
        RecordingBroadcaster::default(),
        GuardPolicy::Merge,
    );
    let key = session_key("merge");
    let mut session = engine.open_session(&key).expect("open");
    engine
        .run_turn(
            &mut session,
            &TurnRequest {
                state: None,
                calls: vec![
                    call("createItem", json!({"type": "note", "name": "Ideas"})),
                    call("setNoteField1", json!({"itemId": "0001", "value": "ship it"})),
                ],
            },
        )
        .expect("turn 1");

    let response = engine
        .run_turn(
            &mut session,
            &TurnRequest {
                state: Some(json!({
                    "items": [{"id": "0001", "type": "note", "name": "", "data": {"field1": ""}}],
                    "globalTitle": "From host",
                })),
                calls: Vec::new(),
            },
        )
        .expect("turn 2");

    assert_eq!(response.source, StateSource::Merged);
    assert_eq!(response.state.global_title, "From host");
    assert_eq!(response.state.items[0].name, "Ideas");
    let ItemData::Note(note) = &response.state.items[0].data else {
        panic!("expected note");
    };
    assert_eq!(note.field1, "ship it");
    assert_eq!(response.state.items_created, 1);
}

/// A host document that never mentions the plan does not reset it under merge.
#[test]
fn merge_policy_keeps_plan_missing_from_host_state() {
    let temp = tempfile::tempdir().expect("tempdir");
    let engine = Engine::new(
        FileStore::new(temp.path()),
        RecordingBroadcaster::default(),
        GuardPolicy::Merge,
    );
    let mut session = engine.open_session(&session_key("plan-merge")).expect("open");
    engine
        .run_turn(
            &mut session,
            &TurnRequest {
                state: None,
                calls: vec![call("set_plan", json!({"steps": ["a", "b"]}))],
            },
        )
        .expect("turn 1");

    let response = engine
        .run_turn(
            &mut session,
            &TurnRequest {
                state: Some(json!({"items": [{"id": "0001", "type": "note"}]})),
                calls: Vec::new(),
            },
        )
        .expect("turn 2");

    assert_eq!(response.source, StateSource::Merged);
    assert_eq!(response.state.plan.steps.len(), 2);
    assert_eq!(response.state.plan.status, PlanStatus::InProgress);
    assert_eq!(response.state.plan.steps[0].status, StepStatus::InProgress);
    assert_eq!(response.state.items.len(), 1);
}

/// Sessions never see each other's documents.
#[test]
fn sessions_are_isolated() {
    let temp = tempfile::tempdir().expect("tempdir");
    let engine = Engine::new(
        FileStore::new(temp.path()),
        RecordingBroadcaster::default(),
        GuardPolicy::Adopt,
    );

    for (name, count) in [("a", 1), ("b", 3)] {
        let mut session = engine.open_session(&session_key(name)).expect("open");
        let calls = (0..count)
            .map(|_| call("createItem", json!({"type": "entity"})))
            .collect();
        engine
            .run_turn(&mut session, &TurnRequest { state: None, calls })
            .expect("turn");
    }

    let a = engine.persistence().get(&session_key("a")).expect("get").expect("a");
    let b = engine.persistence().get(&session_key("b")).expect("get").expect("b");
    assert_eq!(a.items.len(), 1);
    assert_eq!(b.items.len(), 3);
    assert!(
        engine
            .broadcaster()
            .events()
            .iter()
            .all(|event| event.session.as_str() == "a" || event.session.as_str() == "b")
    );
}

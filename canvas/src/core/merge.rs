//! Snapshot merge used by the `merge` guard policy.
//!
//! Layers an incoming document onto a cached one without letting blanks in the
//! incoming document erase cached content: strings prefer non-empty incoming
//! values, collections keyed by id merge entry by entry in cached order, and
//! counters never go backwards. Plan fields follow the incoming document when
//! it carries them and are kept from the cache otherwise.

use std::collections::HashSet;

use serde_json::Value;

use crate::core::types::{
    ChartData, ChartMetric, ChecklistItem, EntityData, Item, ItemData, NoteData, Plan,
    ProjectData, SharedState,
};

/// Which plan keys the raw incoming document actually carried.
///
/// Deserialization fills missing plan keys with defaults, so presence has to be
/// read from the JSON before it becomes a [`SharedState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IncomingPlanFields {
    pub steps: bool,
    pub current_step_index: bool,
    pub status: bool,
}

impl IncomingPlanFields {
    pub const ALL: Self = Self {
        steps: true,
        current_step_index: true,
        status: true,
    };

    pub fn of(value: &Value) -> Self {
        Self {
            steps: value.get("planSteps").is_some_and(Value::is_array),
            current_step_index: value.get("currentStepIndex").is_some_and(Value::is_number),
            status: value.get("planStatus").is_some_and(Value::is_string),
        }
    }
}

/// Merge `incoming` onto `cached`. `plan_fields` names the plan keys the
/// incoming document carried.
pub fn merge_snapshots(
    cached: &SharedState,
    incoming: &SharedState,
    plan_fields: IncomingPlanFields,
) -> SharedState {
    let last_action = prefer_non_empty(&incoming.last_action, &cached.last_action);
    let items = if incoming.items.is_empty() {
        cached.items.clone()
    } else {
        merge_items(&cached.items, &incoming.items, &last_action)
    };

    SharedState {
        items,
        global_title: prefer_non_empty(&incoming.global_title, &cached.global_title),
        global_description: prefer_non_empty(
            &incoming.global_description,
            &cached.global_description,
        ),
        last_action,
        items_created: incoming.items_created.max(cached.items_created),
        plan: merge_plan(&cached.plan, &incoming.plan, plan_fields),
    }
}

fn merge_plan(cached: &Plan, incoming: &Plan, fields: IncomingPlanFields) -> Plan {
    Plan {
        steps: if fields.steps {
            incoming.steps.clone()
        } else {
            cached.steps.clone()
        },
        current_step_index: if fields.current_step_index {
            incoming.current_step_index
        } else {
            cached.current_step_index
        },
        status: if fields.status {
            incoming.status
        } else {
            cached.status
        },
    }
}

/// Merge item lists by id. The item named by a `deleted:<id>` last action is
/// dropped from both sides.
fn merge_items(cached: &[Item], incoming: &[Item], last_action: &str) -> Vec<Item> {
    let deleted = last_action
        .strip_prefix("deleted:")
        .filter(|id| !id.is_empty());
    let is_deleted = |item: &Item| deleted == Some(item.id.as_str());

    let mut merged = Vec::with_capacity(cached.len().max(incoming.len()));
    for old in cached.iter().filter(|item| !is_deleted(item)) {
        match incoming.iter().find(|item| item.id == old.id) {
            Some(new) => merged.push(merge_item(old, new)),
            None => merged.push(old.clone()),
        }
    }

    let known: HashSet<&str> = cached.iter().map(|item| item.id.as_str()).collect();
    let mut appended = HashSet::new();
    for new in incoming {
        if known.contains(new.id.as_str())
            || is_deleted(new)
            || !appended.insert(new.id.as_str())
        {
            continue;
        }
        merged.push(new.clone());
    }
    merged
}

/// Item kinds never change, so a kind mismatch keeps the cached data.
fn merge_item(cached: &Item, incoming: &Item) -> Item {
    let data = match (&cached.data, &incoming.data) {
        (ItemData::Project(old), ItemData::Project(new)) => {
            ItemData::Project(merge_project(old, new))
        }
        (ItemData::Entity(old), ItemData::Entity(new)) => {
            ItemData::Entity(merge_entity(old, new))
        }
        (ItemData::Note(old), ItemData::Note(new)) => ItemData::Note(merge_note(old, new)),
        (ItemData::Chart(old), ItemData::Chart(new)) => ItemData::Chart(merge_chart(old, new)),
        (old, _) => old.clone(),
    };
    Item {
        id: cached.id.clone(),
        name: prefer_non_empty(&incoming.name, &cached.name),
        subtitle: prefer_non_empty(&incoming.subtitle, &cached.subtitle),
        data,
    }
}

fn merge_project(cached: &ProjectData, incoming: &ProjectData) -> ProjectData {
    ProjectData {
        field1: prefer_non_empty(&incoming.field1, &cached.field1),
        field2: prefer_non_empty(&incoming.field2, &cached.field2),
        field3: prefer_non_empty(&incoming.field3, &cached.field3),
        field4: merge_by_id(
            &cached.field4,
            &incoming.field4,
            |entry| &entry.id,
            merge_checklist_entry,
        ),
        field4_id: cached.field4_id.max(incoming.field4_id),
    }
}

fn merge_checklist_entry(cached: &ChecklistItem, incoming: &ChecklistItem) -> ChecklistItem {
    ChecklistItem {
        id: incoming.id.clone(),
        text: prefer_non_empty(&incoming.text, &cached.text),
        done: incoming.done,
        proposed: incoming.proposed,
    }
}

fn merge_entity(cached: &EntityData, incoming: &EntityData) -> EntityData {
    EntityData {
        field1: prefer_non_empty(&incoming.field1, &cached.field1),
        field2: prefer_non_empty(&incoming.field2, &cached.field2),
        field3: prefer_non_empty_list(&incoming.field3, &cached.field3),
        field3_options: prefer_non_empty_list(&incoming.field3_options, &cached.field3_options),
    }
}

fn merge_note(cached: &NoteData, incoming: &NoteData) -> NoteData {
    NoteData {
        field1: prefer_non_empty(&incoming.field1, &cached.field1),
    }
}

fn merge_chart(cached: &ChartData, incoming: &ChartData) -> ChartData {
    ChartData {
        field1: merge_by_id(&cached.field1, &incoming.field1, |metric| &metric.id, merge_metric),
        field1_id: cached.field1_id.max(incoming.field1_id),
    }
}

fn merge_metric(cached: &ChartMetric, incoming: &ChartMetric) -> ChartMetric {
    ChartMetric {
        id: incoming.id.clone(),
        label: prefer_non_empty(&incoming.label, &cached.label),
        value: incoming.value,
    }
}

/// Merge two id-keyed lists, keeping cached order and appending new ids.
fn merge_by_id<T: Clone>(
    cached: &[T],
    incoming: &[T],
    id: impl Fn(&T) -> &String,
    merge: impl Fn(&T, &T) -> T,
) -> Vec<T> {
    let mut merged: Vec<T> = cached
        .iter()
        .map(|old| match incoming.iter().find(|new| id(new) == id(old)) {
            Some(new) => merge(old, new),
            None => old.clone(),
        })
        .collect();
    for new in incoming {
        if !cached.iter().any(|old| id(old) == id(new)) {
            merged.push(new.clone());
        }
    }
    merged
}

fn prefer_non_empty(incoming: &str, cached: &str) -> String {
    if incoming.trim().is_empty() {
        cached.to_string()
    } else {
        incoming.to_string()
    }
}

fn prefer_non_empty_list(incoming: &[String], cached: &[String]) -> Vec<String> {
    if incoming.is_empty() {
        cached.to_vec()
    } else {
        incoming.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ItemKind, PlanStatus, StepStatus};
    use crate::test_support::{state_with_items, state_with_plan};
    use serde_json::json;

    fn project(id: &str, data: ProjectData) -> Item {
        Item {
            data: ItemData::Project(data),
            ..Item::new(id, ItemKind::Project, "")
        }
    }

    /// Blank incoming strings never erase cached content.
    #[test]
    fn blanks_do_not_erase_cached_strings() {
        let cached = state_with_items(1);
        let mut incoming = cached.clone();
        incoming.global_title = "  ".to_string();
        incoming.items[0].name = String::new();
        incoming.items[0].subtitle = "new subtitle".to_string();

        let merged = merge_snapshots(&cached, &incoming, IncomingPlanFields::ALL);
        assert_eq!(merged.global_title, cached.global_title);
        assert_eq!(merged.items[0].name, cached.items[0].name);
        assert_eq!(merged.items[0].subtitle, "new subtitle");
    }

    /// Cached order is preserved and unknown incoming ids are appended.
    #[test]
    fn items_merge_in_cached_order() {
        let cached = state_with_items(2);
        let mut incoming = state_with_items(3);
        incoming.items.reverse();

        let merged = merge_snapshots(&cached, &incoming, IncomingPlanFields::ALL);
        let ids: Vec<&str> = merged.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["0001", "0002", "0003"]);
        assert_eq!(merged.items_created, 3);
    }

    /// An incoming document with no items keeps the cached items.
    #[test]
    fn empty_incoming_items_keep_cache() {
        let cached = state_with_items(2);
        let incoming = SharedState::initial();
        let merged = merge_snapshots(&cached, &incoming, IncomingPlanFields::ALL);
        assert_eq!(merged.items, cached.items);
        assert_eq!(merged.items_created, 2);
    }

    /// `deleted:<id>` drops that item even though the cache still has it.
    #[test]
    fn deleted_item_is_dropped() {
        let cached = state_with_items(3);
        let mut incoming = cached.clone();
        incoming.items.remove(1);
        incoming.last_action = "deleted:0002".to_string();

        let merged = merge_snapshots(&cached, &incoming, IncomingPlanFields::ALL);
        let ids: Vec<&str> = merged.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["0001", "0003"]);
    }

    /// Checklists merge entry by entry and the id counter never decreases.
    #[test]
    fn project_checklists_merge_by_id() {
        let entry = |id: &str, text: &str, done: bool| ChecklistItem {
            id: id.to_string(),
            text: text.to_string(),
            done,
            proposed: false,
        };
        let mut cached = SharedState::initial();
        cached.items.push(project(
            "0001",
            ProjectData {
                field1: "Launch".to_string(),
                field4: vec![entry("1", "draft", false), entry("2", "review", false)],
                field4_id: 2,
                ..ProjectData::default()
            },
        ));
        let mut incoming = SharedState::initial();
        incoming.items.push(project(
            "0001",
            ProjectData {
                field4: vec![entry("2", "", true), entry("3", "ship", false)],
                field4_id: 1,
                ..ProjectData::default()
            },
        ));

        let merged = merge_snapshots(&cached, &incoming, IncomingPlanFields::ALL);
        let ItemData::Project(data) = &merged.items[0].data else {
            panic!("expected project");
        };
        assert_eq!(data.field1, "Launch");
        assert_eq!(
            data.field4,
            vec![
                entry("1", "draft", false),
                entry("2", "review", true),
                entry("3", "ship", false)
            ]
        );
        assert_eq!(data.field4_id, 2);
    }

    /// Plan fields the incoming document carries win, even when empty.
    #[test]
    fn plan_follows_incoming() {
        let cached = state_with_plan(&["a", "b"]);
        let incoming = state_with_items(1);
        let merged = merge_snapshots(&cached, &incoming, IncomingPlanFields::ALL);
        assert!(merged.plan.steps.is_empty());
        assert_eq!(merged.plan.current_step_index, -1);

        let merged = merge_snapshots(&incoming, &cached, IncomingPlanFields::ALL);
        assert_eq!(merged.plan.steps[0].status, StepStatus::InProgress);
    }

    /// A document without plan keys keeps the cached plan.
    #[test]
    fn absent_plan_keys_keep_cached_plan() {
        let cached = state_with_plan(&["a", "b"]);
        let incoming = state_with_items(1);
        let raw = json!({"items": [{"id": "0001", "type": "note"}]});

        let merged = merge_snapshots(&cached, &incoming, IncomingPlanFields::of(&raw));
        assert_eq!(merged.plan, cached.plan);
        assert_eq!(merged.items.len(), 1);

        let raw = json!({"items": [], "planStatus": "completed"});
        let fields = IncomingPlanFields::of(&raw);
        assert_eq!(
            fields,
            IncomingPlanFields {
                steps: false,
                current_step_index: false,
                status: true,
            }
        );
        let mut incoming = SharedState::initial();
        incoming.plan.status = PlanStatus::Completed;
        let merged = merge_snapshots(&cached, &incoming, fields);
        assert_eq!(merged.plan.steps, cached.plan.steps);
        assert_eq!(merged.plan.current_step_index, cached.plan.current_step_index);
        assert_eq!(merged.plan.status, PlanStatus::Completed);
    }

    /// A kind mismatch for the same id keeps the cached data.
    #[test]
    fn kind_mismatch_keeps_cached_data() {
        let cached = state_with_items(1);
        let mut incoming = cached.clone();
        incoming.items[0].data = ItemData::default_for(ItemKind::Chart);
        let merged = merge_snapshots(&cached, &incoming, IncomingPlanFields::ALL);
        assert_eq!(merged.items[0].kind(), ItemKind::Note);
    }
}

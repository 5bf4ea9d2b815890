//! Canvas field mutations: item lifecycle, global fields, and per-type data.
//!
//! Each function validates its arguments against the current document and
//! either mutates it and returns a small JSON result, or returns a
//! [`Rejection`] without touching anything. Item-scoped mutations record
//! `"<operation>:<item id>"` as the document's `lastAction`.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::core::types::{
    ChartData, ChartMetric, ChecklistItem, EntityData, Item, ItemKind, ItemData, NoteData,
    ProjectData, Rejection, SELECT_OPTIONS, SharedState,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemArgs {
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemArgs {
    pub item_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemNameArgs {
    pub item_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSubtitleArgs {
    pub item_id: String,
    pub subtitle: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GlobalTitleArgs {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GlobalDescriptionArgs {
    pub description: String,
}

/// Shared by every "set text field to `value`" operation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValueArgs {
    pub item_id: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendNoteArgs {
    pub item_id: String,
    pub value: String,
    #[serde(default)]
    pub with_newline: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateArgs {
    pub item_id: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChecklistArgs {
    pub item_id: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Checklist entries are addressed by id, or by 0-based index.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ChecklistRef {
    Index(usize),
    Id(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetChecklistArgs {
    pub item_id: String,
    pub checklist_item_id: ChecklistRef,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub done: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveChecklistArgs {
    pub item_id: String,
    pub checklist_item_id: ChecklistRef,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagArgs {
    pub item_id: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMetricArgs {
    pub item_id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricLabelArgs {
    pub item_id: String,
    pub index: i64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValueArgs {
    pub item_id: String,
    pub index: i64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricArgs {
    pub item_id: String,
    pub index: i64,
}

// Item lifecycle

/// Create an item with the next zero-padded id (`0001`, `0002`, ...).
pub fn create_item(state: &mut SharedState, args: &CreateItemArgs) -> Result<Value, Rejection> {
    let mut next = next_counter(state.items_created, "itemsCreated")?;
    let mut id = format_item_id(next);
    // Documents adopted from a caller may hold ids ahead of the counter.
    while state.item(&id).is_some() {
        next = next_counter(next, "itemsCreated")?;
        id = format_item_id(next);
    }

    let name = args.name.clone().unwrap_or_default();
    state.items.push(Item::new(id.clone(), args.kind, name));
    state.items_created = next;
    state.last_action = format!("created:{id}");
    Ok(json!({ "id": id, "type": args.kind }))
}

pub fn delete_item(state: &mut SharedState, args: &ItemArgs) -> Result<Value, Rejection> {
    let position = state
        .items
        .iter()
        .position(|item| item.id == args.item_id)
        .ok_or_else(|| item_not_found(&args.item_id))?;
    state.items.remove(position);
    state.last_action = format!("deleted:{}", args.item_id);
    Ok(json!({ "itemId": args.item_id }))
}

pub fn set_item_name(state: &mut SharedState, args: &ItemNameArgs) -> Result<Value, Rejection> {
    item_mut(state, &args.item_id)?.name = args.name.clone();
    touch(state, "setItemName", &args.item_id);
    Ok(json!({ "itemId": args.item_id, "name": args.name }))
}

pub fn set_item_subtitle(
    state: &mut SharedState,
    args: &ItemSubtitleArgs,
) -> Result<Value, Rejection> {
    item_mut(state, &args.item_id)?.subtitle = args.subtitle.clone();
    touch(state, "setItemSubtitleOrDescription", &args.item_id);
    Ok(json!({ "itemId": args.item_id, "subtitle": args.subtitle }))
}

// Global fields

pub fn set_global_title(
    state: &mut SharedState,
    args: &GlobalTitleArgs,
) -> Result<Value, Rejection> {
    state.global_title = args.title.clone();
    state.last_action = "setGlobalTitle".to_string();
    Ok(json!({ "globalTitle": args.title }))
}

pub fn set_global_description(
    state: &mut SharedState,
    args: &GlobalDescriptionArgs,
) -> Result<Value, Rejection> {
    state.global_description = args.description.clone();
    state.last_action = "setGlobalDescription".to_string();
    Ok(json!({ "globalDescription": args.description }))
}

// Notes

pub fn set_note_text(state: &mut SharedState, args: &FieldValueArgs) -> Result<Value, Rejection> {
    note_mut(state, &args.item_id)?.field1 = args.value.clone();
    touch(state, "setNoteField1", &args.item_id);
    Ok(json!({ "itemId": args.item_id }))
}

/// Append to the note body; `withNewline` separates from existing text.
pub fn append_note_text(
    state: &mut SharedState,
    args: &AppendNoteArgs,
) -> Result<Value, Rejection> {
    let note = note_mut(state, &args.item_id)?;
    if args.with_newline.unwrap_or(false) && !note.field1.is_empty() {
        note.field1.push('\n');
    }
    note.field1.push_str(&args.value);
    let length = note.field1.chars().count();
    touch(state, "appendNoteField1", &args.item_id);
    Ok(json!({ "itemId": args.item_id, "length": length }))
}

pub fn clear_note_text(state: &mut SharedState, args: &ItemArgs) -> Result<Value, Rejection> {
    note_mut(state, &args.item_id)?.field1.clear();
    touch(state, "clearNoteField1", &args.item_id);
    Ok(json!({ "itemId": args.item_id }))
}

// Projects

pub fn set_project_text(
    state: &mut SharedState,
    args: &FieldValueArgs,
) -> Result<Value, Rejection> {
    project_mut(state, &args.item_id)?.field1 = args.value.clone();
    touch(state, "setProjectField1", &args.item_id);
    Ok(json!({ "itemId": args.item_id }))
}

pub fn set_project_select(
    state: &mut SharedState,
    args: &FieldValueArgs,
) -> Result<Value, Rejection> {
    let value = select_option(&args.value)?;
    project_mut(state, &args.item_id)?.field2 = value;
    touch(state, "setProjectField2", &args.item_id);
    Ok(json!({ "itemId": args.item_id, "value": args.value }))
}

pub fn set_project_date(state: &mut SharedState, args: &DateArgs) -> Result<Value, Rejection> {
    let date = parse_date(&args.date)?;
    project_mut(state, &args.item_id)?.field3 = date;
    touch(state, "setProjectField3", &args.item_id);
    Ok(json!({ "itemId": args.item_id, "date": args.date }))
}

pub fn clear_project_date(state: &mut SharedState, args: &ItemArgs) -> Result<Value, Rejection> {
    project_mut(state, &args.item_id)?.field3.clear();
    touch(state, "clearProjectField3", &args.item_id);
    Ok(json!({ "itemId": args.item_id }))
}

pub fn add_checklist_item(
    state: &mut SharedState,
    args: &AddChecklistArgs,
) -> Result<Value, Rejection> {
    let project = project_mut(state, &args.item_id)?;
    project.field4_id = next_counter(project.field4_id, "field4_id")?;
    let entry_id = project.field4_id.to_string();
    project.field4.push(ChecklistItem {
        id: entry_id.clone(),
        text: args.text.clone().unwrap_or_default(),
        done: false,
        proposed: false,
    });
    touch(state, "addProjectChecklistItem", &args.item_id);
    Ok(json!({ "itemId": args.item_id, "checklistItemId": entry_id }))
}

pub fn set_checklist_item(
    state: &mut SharedState,
    args: &SetChecklistArgs,
) -> Result<Value, Rejection> {
    let project = project_mut(state, &args.item_id)?;
    let slot = checklist_slot(project, &args.checklist_item_id)?;
    let entry = &mut project.field4[slot];
    if let Some(text) = &args.text {
        entry.text = text.clone();
    }
    if let Some(done) = args.done {
        entry.done = done;
    }
    let entry_id = entry.id.clone();
    touch(state, "setProjectChecklistItem", &args.item_id);
    Ok(json!({ "itemId": args.item_id, "checklistItemId": entry_id }))
}

pub fn remove_checklist_item(
    state: &mut SharedState,
    args: &RemoveChecklistArgs,
) -> Result<Value, Rejection> {
    let project = project_mut(state, &args.item_id)?;
    let slot = checklist_slot(project, &args.checklist_item_id)?;
    let removed = project.field4.remove(slot);
    touch(state, "removeProjectChecklistItem", &args.item_id);
    Ok(json!({ "itemId": args.item_id, "checklistItemId": removed.id }))
}

// Entities

pub fn set_entity_text(state: &mut SharedState, args: &FieldValueArgs) -> Result<Value, Rejection> {
    entity_mut(state, &args.item_id)?.field1 = args.value.clone();
    touch(state, "setEntityField1", &args.item_id);
    Ok(json!({ "itemId": args.item_id }))
}

pub fn set_entity_select(
    state: &mut SharedState,
    args: &FieldValueArgs,
) -> Result<Value, Rejection> {
    let value = select_option(&args.value)?;
    entity_mut(state, &args.item_id)?.field2 = value;
    touch(state, "setEntityField2", &args.item_id);
    Ok(json!({ "itemId": args.item_id, "value": args.value }))
}

/// Select a tag, registering it as an option if it is not offered yet.
pub fn add_entity_tag(state: &mut SharedState, args: &TagArgs) -> Result<Value, Rejection> {
    let tag = args.tag.trim();
    if tag.is_empty() {
        return Err(Rejection::InvalidValue {
            field: "tag",
            message: "must not be empty".to_string(),
        });
    }
    let entity = entity_mut(state, &args.item_id)?;
    if !entity.field3_options.iter().any(|option| option == tag) {
        entity.field3_options.push(tag.to_string());
    }
    let added = !entity.field3.iter().any(|selected| selected == tag);
    if added {
        entity.field3.push(tag.to_string());
    }
    touch(state, "addEntityField3", &args.item_id);
    Ok(json!({ "itemId": args.item_id, "tag": tag, "added": added }))
}

pub fn remove_entity_tag(state: &mut SharedState, args: &TagArgs) -> Result<Value, Rejection> {
    let entity = entity_mut(state, &args.item_id)?;
    let position = entity
        .field3
        .iter()
        .position(|selected| selected == args.tag.trim())
        .ok_or_else(|| Rejection::NotFound {
            what: "tag",
            id: args.tag.clone(),
        })?;
    entity.field3.remove(position);
    touch(state, "removeEntityField3", &args.item_id);
    Ok(json!({ "itemId": args.item_id, "tag": args.tag }))
}

// Charts

pub fn add_metric(state: &mut SharedState, args: &AddMetricArgs) -> Result<Value, Rejection> {
    let value = args.value.map(metric_value).transpose()?;
    let chart = chart_mut(state, &args.item_id)?;
    chart.field1_id = next_counter(chart.field1_id, "field1_id")?;
    let metric_id = chart.field1_id.to_string();
    chart.field1.push(ChartMetric {
        id: metric_id.clone(),
        label: args.label.clone().unwrap_or_default(),
        value,
    });
    let index = chart.field1.len() - 1;
    touch(state, "addChartField1", &args.item_id);
    Ok(json!({ "itemId": args.item_id, "metricId": metric_id, "index": index }))
}

pub fn set_metric_label(
    state: &mut SharedState,
    args: &MetricLabelArgs,
) -> Result<Value, Rejection> {
    metric_mut(state, &args.item_id, args.index)?.label = args.label.clone();
    touch(state, "setChartField1Label", &args.item_id);
    Ok(json!({ "itemId": args.item_id, "index": args.index }))
}

pub fn set_metric_value(
    state: &mut SharedState,
    args: &MetricValueArgs,
) -> Result<Value, Rejection> {
    let value = metric_value(args.value)?;
    metric_mut(state, &args.item_id, args.index)?.value = Some(value);
    touch(state, "setChartField1Value", &args.item_id);
    Ok(json!({ "itemId": args.item_id, "index": args.index, "value": value }))
}

pub fn clear_metric_value(state: &mut SharedState, args: &MetricArgs) -> Result<Value, Rejection> {
    metric_mut(state, &args.item_id, args.index)?.value = None;
    touch(state, "clearChartField1Value", &args.item_id);
    Ok(json!({ "itemId": args.item_id, "index": args.index }))
}

pub fn remove_metric(state: &mut SharedState, args: &MetricArgs) -> Result<Value, Rejection> {
    let chart = chart_mut(state, &args.item_id)?;
    let slot = index_slot("metric", args.index, chart.field1.len())?;
    let removed = chart.field1.remove(slot);
    touch(state, "removeChartField1", &args.item_id);
    Ok(json!({ "itemId": args.item_id, "metricId": removed.id }))
}

/// Format an item counter value as a zero-padded id.
pub fn format_item_id(counter: u64) -> String {
    format!("{counter:04}")
}

/// Check a select value: one of [`SELECT_OPTIONS`] or empty.
pub fn select_option(value: &str) -> Result<String, Rejection> {
    if value.is_empty() || SELECT_OPTIONS.contains(&value) {
        return Ok(value.to_string());
    }
    Err(Rejection::InvalidValue {
        field: "field2",
        message: format!("'{value}' is not one of {}", SELECT_OPTIONS.join(", ")),
    })
}

/// Check a `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Result<String, Rejection> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|_| value.to_string())
        .map_err(|err| Rejection::InvalidValue {
            field: "field3",
            message: format!("'{value}' is not a YYYY-MM-DD date: {err}"),
        })
}

/// Check a chart value lies in `0..=100`.
pub fn metric_value(value: f64) -> Result<f64, Rejection> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        return Ok(value);
    }
    Err(Rejection::InvalidValue {
        field: "value",
        message: format!("{value} is outside 0..=100"),
    })
}

fn next_counter(counter: u64, field: &'static str) -> Result<u64, Rejection> {
    counter.checked_add(1).ok_or_else(|| Rejection::InvalidValue {
        field,
        message: format!("counter {counter} is exhausted"),
    })
}

fn touch(state: &mut SharedState, operation: &str, item_id: &str) {
    state.last_action = format!("{operation}:{item_id}");
}

fn item_not_found(id: &str) -> Rejection {
    Rejection::NotFound {
        what: "item",
        id: id.to_string(),
    }
}

fn item_mut<'a>(state: &'a mut SharedState, id: &str) -> Result<&'a mut Item, Rejection> {
    state
        .items
        .iter_mut()
        .find(|item| item.id == id)
        .ok_or_else(|| item_not_found(id))
}

fn wrong_kind(id: &str, expected: ItemKind, actual: ItemKind) -> Rejection {
    Rejection::WrongItemType {
        id: id.to_string(),
        expected,
        actual,
    }
}

fn note_mut<'a>(state: &'a mut SharedState, id: &str) -> Result<&'a mut NoteData, Rejection> {
    match &mut item_mut(state, id)?.data {
        ItemData::Note(data) => Ok(data),
        other => Err(wrong_kind(id, ItemKind::Note, other.kind())),
    }
}

fn project_mut<'a>(state: &'a mut SharedState, id: &str) -> Result<&'a mut ProjectData, Rejection> {
    match &mut item_mut(state, id)?.data {
        ItemData::Project(data) => Ok(data),
        other => Err(wrong_kind(id, ItemKind::Project, other.kind())),
    }
}

fn entity_mut<'a>(state: &'a mut SharedState, id: &str) -> Result<&'a mut EntityData, Rejection> {
    match &mut item_mut(state, id)?.data {
        ItemData::Entity(data) => Ok(data),
        other => Err(wrong_kind(id, ItemKind::Entity, other.kind())),
    }
}

fn chart_mut<'a>(state: &'a mut SharedState, id: &str) -> Result<&'a mut ChartData, Rejection> {
    match &mut item_mut(state, id)?.data {
        ItemData::Chart(data) => Ok(data),
        other => Err(wrong_kind(id, ItemKind::Chart, other.kind())),
    }
}

fn metric_mut<'a>(
    state: &'a mut SharedState,
    id: &str,
    index: i64,
) -> Result<&'a mut ChartMetric, Rejection> {
    let chart = chart_mut(state, id)?;
    let slot = index_slot("metric", index, chart.field1.len())?;
    Ok(&mut chart.field1[slot])
}

fn index_slot(what: &'static str, index: i64, len: usize) -> Result<usize, Rejection> {
    usize::try_from(index)
        .ok()
        .filter(|slot| *slot < len)
        .ok_or(Rejection::OutOfRange { what, index, len })
}

fn checklist_slot(project: &ProjectData, target: &ChecklistRef) -> Result<usize, Rejection> {
    let len = project.field4.len();
    match target {
        ChecklistRef::Index(index) => index_slot("checklist", *index as i64, len),
        ChecklistRef::Id(id) => {
            if let Some(slot) = project.field4.iter().position(|entry| &entry.id == id) {
                return Ok(slot);
            }
            match id.trim().parse::<i64>() {
                Ok(index) => index_slot("checklist", index, len),
                Err(_) => Err(Rejection::NotFound {
                    what: "checklist item",
                    id: id.clone(),
                }),
            }
        }
    }
}

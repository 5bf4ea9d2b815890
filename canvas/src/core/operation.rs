//! Typed mutation operations.
//!
//! Calls arrive as a name plus loosely-typed JSON arguments. [`Operation::parse`]
//! turns them into a typed operation (or a [`Rejection`]) and
//! [`Operation::apply`] runs it against a document.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::core::canvas::{
    self, AddChecklistArgs, AddMetricArgs, AppendNoteArgs, CreateItemArgs, DateArgs,
    FieldValueArgs, GlobalDescriptionArgs, GlobalTitleArgs, ItemArgs, ItemNameArgs,
    ItemSubtitleArgs, MetricArgs, MetricLabelArgs, MetricValueArgs, RemoveChecklistArgs,
    SetChecklistArgs, TagArgs,
};
use crate::core::plan::{advance_step, complete_plan, initialize_plan};
use crate::core::types::{Rejection, SharedState, StepStatus};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InitializePlanArgs {
    #[serde(alias = "titles")]
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdvanceStepArgs {
    #[serde(alias = "step_index", alias = "stepIndex")]
    pub index: i64,
    pub status: StepStatus,
    #[serde(default)]
    pub note: Option<String>,
}

/// A parsed mutation, ready to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    InitializePlan(InitializePlanArgs),
    AdvanceStep(AdvanceStepArgs),
    CompletePlan,
    CreateItem(CreateItemArgs),
    DeleteItem(ItemArgs),
    SetItemName(ItemNameArgs),
    SetItemSubtitle(ItemSubtitleArgs),
    SetGlobalTitle(GlobalTitleArgs),
    SetGlobalDescription(GlobalDescriptionArgs),
    SetNoteText(FieldValueArgs),
    AppendNoteText(AppendNoteArgs),
    ClearNoteText(ItemArgs),
    SetProjectText(FieldValueArgs),
    SetProjectSelect(FieldValueArgs),
    SetProjectDate(DateArgs),
    ClearProjectDate(ItemArgs),
    AddChecklistItem(AddChecklistArgs),
    SetChecklistItem(SetChecklistArgs),
    RemoveChecklistItem(RemoveChecklistArgs),
    SetEntityText(FieldValueArgs),
    SetEntitySelect(FieldValueArgs),
    AddEntityTag(TagArgs),
    RemoveEntityTag(TagArgs),
    AddMetric(AddMetricArgs),
    SetMetricLabel(MetricLabelArgs),
    SetMetricValue(MetricValueArgs),
    ClearMetricValue(MetricArgs),
    RemoveMetric(MetricArgs),
}

/// Every name the built-in operations answer to, aliases included.
pub const BUILTIN_NAMES: &[&str] = &[
    "InitializePlan",
    "set_plan",
    "AdvanceStep",
    "update_plan_progress",
    "CompletePlan",
    "complete_plan",
    "createItem",
    "deleteItem",
    "setItemName",
    "setItemSubtitleOrDescription",
    "setGlobalTitle",
    "setGlobalDescription",
    "setNoteField1",
    "appendNoteField1",
    "clearNoteField1",
    "setProjectField1",
    "setProjectField2",
    "setProjectField3",
    "clearProjectField3",
    "addProjectChecklistItem",
    "setProjectChecklistItem",
    "removeProjectChecklistItem",
    "setEntityField1",
    "setEntityField2",
    "addEntityField3",
    "removeEntityField3",
    "addChartField1",
    "setChartField1Label",
    "setChartField1Value",
    "clearChartField1Value",
    "removeChartField1",
];

impl Operation {
    /// Parse a call. Null arguments are treated as an empty object.
    pub fn parse(name: &str, args: &Value) -> Result<Self, Rejection> {
        let args = match args {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };

        let operation = match name {
            "InitializePlan" | "set_plan" => Operation::InitializePlan(decode(name, args)?),
            "AdvanceStep" | "update_plan_progress" => Operation::AdvanceStep(decode(name, args)?),
            "CompletePlan" | "complete_plan" => Operation::CompletePlan,
            "createItem" => Operation::CreateItem(decode(name, args)?),
            "deleteItem" => Operation::DeleteItem(decode(name, args)?),
            "setItemName" => Operation::SetItemName(decode(name, args)?),
            "setItemSubtitleOrDescription" => Operation::SetItemSubtitle(decode(name, args)?),
            "setGlobalTitle" => Operation::SetGlobalTitle(decode(name, args)?),
            "setGlobalDescription" => Operation::SetGlobalDescription(decode(name, args)?),
            "setNoteField1" => Operation::SetNoteText(decode(name, args)?),
            "appendNoteField1" => Operation::AppendNoteText(decode(name, args)?),
            "clearNoteField1" => Operation::ClearNoteText(decode(name, args)?),
            "setProjectField1" => Operation::SetProjectText(decode(name, args)?),
            "setProjectField2" => Operation::SetProjectSelect(decode(name, args)?),
            "setProjectField3" => Operation::SetProjectDate(decode(name, args)?),
            "clearProjectField3" => Operation::ClearProjectDate(decode(name, args)?),
            "addProjectChecklistItem" => Operation::AddChecklistItem(decode(name, args)?),
            "setProjectChecklistItem" => Operation::SetChecklistItem(decode(name, args)?),
            "removeProjectChecklistItem" => Operation::RemoveChecklistItem(decode(name, args)?),
            "setEntityField1" => Operation::SetEntityText(decode(name, args)?),
            "setEntityField2" => Operation::SetEntitySelect(decode(name, args)?),
            "addEntityField3" => Operation::AddEntityTag(decode(name, args)?),
            "removeEntityField3" => Operation::RemoveEntityTag(decode(name, args)?),
            "addChartField1" => Operation::AddMetric(decode(name, args)?),
            "setChartField1Label" => Operation::SetMetricLabel(decode(name, args)?),
            "setChartField1Value" => Operation::SetMetricValue(decode(name, args)?),
            "clearChartField1Value" => Operation::ClearMetricValue(decode(name, args)?),
            "removeChartField1" => Operation::RemoveMetric(decode(name, args)?),
            _ => {
                return Err(Rejection::UnknownOperation {
                    name: name.to_string(),
                });
            }
        };
        Ok(operation)
    }

    /// Canonical operation name.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::InitializePlan(_) => "InitializePlan",
            Operation::AdvanceStep(_) => "AdvanceStep",
            Operation::CompletePlan => "CompletePlan",
            Operation::CreateItem(_) => "createItem",
            Operation::DeleteItem(_) => "deleteItem",
            Operation::SetItemName(_) => "setItemName",
            Operation::SetItemSubtitle(_) => "setItemSubtitleOrDescription",
            Operation::SetGlobalTitle(_) => "setGlobalTitle",
            Operation::SetGlobalDescription(_) => "setGlobalDescription",
            Operation::SetNoteText(_) => "setNoteField1",
            Operation::AppendNoteText(_) => "appendNoteField1",
            Operation::ClearNoteText(_) => "clearNoteField1",
            Operation::SetProjectText(_) => "setProjectField1",
            Operation::SetProjectSelect(_) => "setProjectField2",
            Operation::SetProjectDate(_) => "setProjectField3",
            Operation::ClearProjectDate(_) => "clearProjectField3",
            Operation::AddChecklistItem(_) => "addProjectChecklistItem",
            Operation::SetChecklistItem(_) => "setProjectChecklistItem",
            Operation::RemoveChecklistItem(_) => "removeProjectChecklistItem",
            Operation::SetEntityText(_) => "setEntityField1",
            Operation::SetEntitySelect(_) => "setEntityField2",
            Operation::AddEntityTag(_) => "addEntityField3",
            Operation::RemoveEntityTag(_) => "removeEntityField3",
            Operation::AddMetric(_) => "addChartField1",
            Operation::SetMetricLabel(_) => "setChartField1Label",
            Operation::SetMetricValue(_) => "setChartField1Value",
            Operation::ClearMetricValue(_) => "clearChartField1Value",
            Operation::RemoveMetric(_) => "removeChartField1",
        }
    }

    /// Apply to `state`. On refusal `state` is left exactly as it was.
    pub fn apply(&self, state: &mut SharedState) -> Result<Value, Refusal> {
        let result = match self {
            Operation::InitializePlan(args) => {
                to_value(&initialize_plan(&mut state.plan, &args.steps))
            }
            Operation::AdvanceStep(args) => {
                let report =
                    advance_step(&mut state.plan, args.index, args.status, args.note.clone());
                if !report.updated {
                    let len = state.plan.steps.len();
                    return Err(Refusal {
                        rejection: Rejection::OutOfRange {
                            what: "step",
                            index: args.index,
                            len,
                        },
                        details: object(to_value(&report)),
                    });
                }
                to_value(&report)
            }
            Operation::CompletePlan => to_value(&complete_plan(&mut state.plan)),
            Operation::CreateItem(args) => canvas::create_item(state, args)?,
            Operation::DeleteItem(args) => canvas::delete_item(state, args)?,
            Operation::SetItemName(args) => canvas::set_item_name(state, args)?,
            Operation::SetItemSubtitle(args) => canvas::set_item_subtitle(state, args)?,
            Operation::SetGlobalTitle(args) => canvas::set_global_title(state, args)?,
            Operation::SetGlobalDescription(args) => canvas::set_global_description(state, args)?,
            Operation::SetNoteText(args) => canvas::set_note_text(state, args)?,
            Operation::AppendNoteText(args) => canvas::append_note_text(state, args)?,
            Operation::ClearNoteText(args) => canvas::clear_note_text(state, args)?,
            Operation::SetProjectText(args) => canvas::set_project_text(state, args)?,
            Operation::SetProjectSelect(args) => canvas::set_project_select(state, args)?,
            Operation::SetProjectDate(args) => canvas::set_project_date(state, args)?,
            Operation::ClearProjectDate(args) => canvas::clear_project_date(state, args)?,
            Operation::AddChecklistItem(args) => canvas::add_checklist_item(state, args)?,
            Operation::SetChecklistItem(args) => canvas::set_checklist_item(state, args)?,
            Operation::RemoveChecklistItem(args) => canvas::remove_checklist_item(state, args)?,
            Operation::SetEntityText(args) => canvas::set_entity_text(state, args)?,
            Operation::SetEntitySelect(args) => canvas::set_entity_select(state, args)?,
            Operation::AddEntityTag(args) => canvas::add_entity_tag(state, args)?,
            Operation::RemoveEntityTag(args) => canvas::remove_entity_tag(state, args)?,
            Operation::AddMetric(args) => canvas::add_metric(state, args)?,
            Operation::SetMetricLabel(args) => canvas::set_metric_label(state, args)?,
            Operation::SetMetricValue(args) => canvas::set_metric_value(state, args)?,
            Operation::ClearMetricValue(args) => canvas::clear_metric_value(state, args)?,
            Operation::RemoveMetric(args) => canvas::remove_metric(state, args)?,
        };
        Ok(result)
    }
}

/// A refused call: the rejection plus any extra fields for the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Refusal {
    pub rejection: Rejection,
    pub details: Map<String, Value>,
}

impl From<Rejection> for Refusal {
    fn from(rejection: Rejection) -> Self {
        Self {
            rejection,
            details: Map::new(),
        }
    }
}

impl Refusal {
    /// Result object returned to the caller: details, rejection fields, and a
    /// human-readable `message`.
    pub fn into_result(self) -> Value {
        let mut result = self.details;
        for (key, value) in object(to_value(&self.rejection)) {
            result.insert(key, value);
        }
        result.insert("message".to_string(), json!(self.rejection.to_string()));
        Value::Object(result)
    }
}

fn decode<T: DeserializeOwned>(operation: &str, args: Value) -> Result<T, Rejection> {
    serde_json::from_value(args).map_err(|err| Rejection::InvalidArguments {
        operation: operation.to_string(),
        message: err.to_string(),
    })
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ItemKind, PlanStatus};
    use crate::test_support::state_with_plan;

    /// Agent-facing aliases resolve to the same operation.
    #[test]
    fn plan_aliases_parse_identically() {
        let canonical =
            Operation::parse("InitializePlan", &json!({"steps": ["a", "b"]})).expect("parse");
        let alias = Operation::parse("set_plan", &json!({"titles": ["a", "b"]})).expect("parse");
        assert_eq!(canonical, alias);

        let advance = Operation::parse(
            "update_plan_progress",
            &json!({"step_index": 1, "status": "completed", "note": "ok"}),
        )
        .expect("parse");
        assert_eq!(advance.name(), "AdvanceStep");

        assert_eq!(
            Operation::parse("complete_plan", &Value::Null).expect("parse"),
            Operation::CompletePlan
        );
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = Operation::parse("launchRocket", &json!({})).expect_err("unknown");
        assert_eq!(err.code(), "unknown_operation");
    }

    /// Missing or mistyped arguments become `invalid_arguments`.
    #[test]
    fn bad_arguments_are_rejected() {
        let err = Operation::parse("AdvanceStep", &json!({"index": 0, "status": "done"}))
            .expect_err("bad status");
        assert_eq!(err.code(), "invalid_arguments");

        let err = Operation::parse("createItem", &Value::Null).expect_err("missing type");
        assert!(matches!(
            err,
            Rejection::InvalidArguments { ref operation, .. } if operation == "createItem"
        ));
    }

    /// Every advertised name parses into an operation whose canonical name is advertised too.
    #[test]
    fn builtin_names_are_consistent() {
        for name in BUILTIN_NAMES {
            match Operation::parse(name, &json!({})) {
                Ok(operation) => assert!(BUILTIN_NAMES.contains(&operation.name())),
                Err(rejection) => assert_eq!(rejection.code(), "invalid_arguments", "{name}"),
            }
        }
    }

    /// Out-of-range progress is refused and reports `updated: false`.
    #[test]
    fn advance_out_of_range_is_refused_with_report() {
        let mut state = state_with_plan(&["a", "b", "c"]);
        let before = state.clone();
        let operation = Operation::parse("AdvanceStep", &json!({"index": 5, "status": "completed"}))
            .expect("parse");

        let refusal = operation.apply(&mut state).expect_err("out of range");
        assert_eq!(state, before);

        let result = refusal.into_result();
        assert_eq!(result["error"], "out_of_range");
        assert_eq!(result["updated"], false);
        assert_eq!(result["index"], 5);
        assert_eq!(result["len"], 3);
        assert!(result["message"].as_str().expect("message").contains("out of range"));
    }

    #[test]
    fn apply_runs_plan_and_canvas_operations() {
        let mut state = SharedState::initial();
        Operation::parse("set_plan", &json!({"steps": ["draft"]}))
            .and_then(|op| op.apply(&mut state).map_err(|refusal| refusal.rejection))
            .expect("initialize");
        let created = Operation::parse("createItem", &json!({"type": "chart", "name": "KPIs"}))
            .expect("parse")
            .apply(&mut state)
            .expect("create");
        Operation::CompletePlan.apply(&mut state).expect("complete");

        assert_eq!(created["id"], "0001");
        assert_eq!(state.items[0].kind(), ItemKind::Chart);
        assert_eq!(state.plan.status, PlanStatus::Completed);
    }
}

//! Semantic invariants not expressible via JSON Schema.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::core::plan::aggregate_status;
use crate::core::types::{ItemData, SELECT_OPTIONS, SharedState};

/// Check semantic invariants of a document:
/// - No duplicate item ids, checklist ids, or metric ids
/// - Plan status agrees with the step statuses whenever they determine one
/// - `currentStepIndex` is `-1` for an empty plan and in range otherwise
/// - Select, date, and chart values are well-formed
pub fn validate_invariants(state: &SharedState) -> Vec<String> {
    let mut errors = Vec::new();
    validate_plan(state, &mut errors);

    let mut seen = HashSet::new();
    for item in &state.items {
        if !seen.insert(item.id.as_str()) {
            errors.push(format!("duplicate item id '{}'", item.id));
        }
        validate_item_data(&item.id, &item.data, &mut errors);
    }
    errors
}

fn validate_plan(state: &SharedState, errors: &mut Vec<String>) {
    let plan = &state.plan;
    if let Some(expected) = aggregate_status(&plan.steps)
        && expected != plan.status
    {
        errors.push(format!(
            "planStatus '{}' disagrees with step statuses (expected '{}')",
            plan.status.as_str(),
            expected.as_str()
        ));
    }

    if plan.steps.is_empty() {
        if plan.current_step_index != -1 {
            errors.push(format!(
                "currentStepIndex {} must be -1 without plan steps",
                plan.current_step_index
            ));
        }
    } else if plan.current_step_index < 0 || plan.current_step_index >= plan.steps.len() as i64 {
        errors.push(format!(
            "currentStepIndex {} out of range (len={})",
            plan.current_step_index,
            plan.steps.len()
        ));
    }
}

fn validate_item_data(id: &str, data: &ItemData, errors: &mut Vec<String>) {
    match data {
        ItemData::Project(project) => {
            check_select(id, &project.field2, errors);
            if !project.field3.is_empty()
                && NaiveDate::parse_from_str(&project.field3, "%Y-%m-%d").is_err()
            {
                errors.push(format!("{id}: field3 '{}' is not a YYYY-MM-DD date", project.field3));
            }
            check_unique_ids(
                id,
                "checklist",
                project.field4.iter().map(|entry| entry.id.as_str()),
                errors,
            );
        }
        ItemData::Entity(entity) => check_select(id, &entity.field2, errors),
        ItemData::Note(_) => {}
        ItemData::Chart(chart) => {
            for metric in &chart.field1 {
                if let Some(value) = metric.value
                    && !(0.0..=100.0).contains(&value)
                {
                    errors.push(format!(
                        "{id}: metric '{}' value {value} outside 0..=100",
                        metric.id
                    ));
                }
            }
            check_unique_ids(
                id,
                "metric",
                chart.field1.iter().map(|metric| metric.id.as_str()),
                errors,
            );
        }
    }
}

fn check_select(id: &str, value: &str, errors: &mut Vec<String>) {
    if !value.is_empty() && !SELECT_OPTIONS.contains(&value) {
        errors.push(format!("{id}: field2 '{value}' is not a select option"));
    }
}

fn check_unique_ids<'a>(
    id: &str,
    what: &str,
    ids: impl Iterator<Item = &'a str>,
    errors: &mut Vec<String>,
) {
    let mut seen = HashSet::new();
    for entry in ids {
        if !seen.insert(entry) {
            errors.push(format!("{id}: duplicate {what} id '{entry}'"));
        }
    }
}

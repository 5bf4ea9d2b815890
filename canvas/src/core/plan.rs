//! Plan progress state machine.
//!
//! The aggregate plan status is recomputed from the step statuses after every
//! step mutation instead of being tracked incrementally. Priority is
//! `failed` > `in_progress` > `completed`; anything else leaves it unchanged.

use serde::Serialize;

use crate::core::types::{Plan, PlanStatus, PlanStep, StepStatus};

/// Result of [`initialize_plan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitializeReport {
    pub initialized: bool,
    pub steps: Vec<String>,
}

/// Result of [`advance_step`]. `updated == false` means nothing changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvanceReport {
    pub updated: bool,
    pub index: i64,
    pub status: StepStatus,
    pub note: Option<String>,
}

/// Result of [`complete_plan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompleteReport {
    pub completed: bool,
}

/// Replace `plan` with a fresh one built from `titles`.
///
/// The first step (if any) starts `in_progress`; an empty title list yields an
/// idle plan with `current_step_index == -1`.
pub fn initialize_plan(plan: &mut Plan, titles: &[String]) -> InitializeReport {
    let mut steps: Vec<PlanStep> = titles.iter().map(PlanStep::pending).collect();
    match steps.first_mut() {
        Some(first) => {
            first.status = StepStatus::InProgress;
            plan.current_step_index = 0;
            plan.status = PlanStatus::InProgress;
        }
        None => {
            plan.current_step_index = -1;
            plan.status = PlanStatus::Idle;
        }
    }
    plan.steps = steps;

    InitializeReport {
        initialized: true,
        steps: titles.to_vec(),
    }
}

/// Set the status (and optionally the note) of the step at `index`.
///
/// Out-of-range indices, negative ones included, leave `plan` untouched and
/// report `updated: false`. An empty note counts as no note.
pub fn advance_step(
    plan: &mut Plan,
    index: i64,
    status: StepStatus,
    note: Option<String>,
) -> AdvanceReport {
    let mut report = AdvanceReport {
        updated: false,
        index,
        status,
        note,
    };

    let Some(slot) = step_slot(plan, index) else {
        return report;
    };

    let step = &mut plan.steps[slot];
    if let Some(text) = report.note.as_deref().filter(|text| !text.is_empty()) {
        step.note = Some(text.to_string());
    }
    step.status = status;

    if status == StepStatus::InProgress {
        plan.current_step_index = index;
        plan.status = PlanStatus::InProgress;
    }

    match aggregate_status(&plan.steps) {
        Some(PlanStatus::Completed) => {
            plan.status = PlanStatus::Completed;
            plan.current_step_index = last_index(&plan.steps);
        }
        Some(derived) => plan.status = derived,
        None => {}
    }

    report.updated = true;
    report
}

/// Force every step to `completed` regardless of its current status.
pub fn complete_plan(plan: &mut Plan) -> CompleteReport {
    for step in &mut plan.steps {
        step.status = StepStatus::Completed;
    }
    plan.status = PlanStatus::Completed;
    plan.current_step_index = last_index(&plan.steps);
    CompleteReport { completed: true }
}

/// Aggregate status implied by `steps`, or `None` when the steps do not
/// determine one (mixed pending/blocked/completed, or no steps at all).
pub fn aggregate_status(steps: &[PlanStep]) -> Option<PlanStatus> {
    if steps.iter().any(|step| step.status == StepStatus::Failed) {
        return Some(PlanStatus::Failed);
    }
    if steps.iter().any(|step| step.status == StepStatus::InProgress) {
        return Some(PlanStatus::InProgress);
    }
    if !steps.is_empty() && steps.iter().all(|step| step.status == StepStatus::Completed) {
        return Some(PlanStatus::Completed);
    }
    None
}

fn step_slot(plan: &Plan, index: i64) -> Option<usize> {
    let slot = usize::try_from(index).ok()?;
    (slot < plan.steps.len()).then_some(slot)
}

fn last_index(steps: &[PlanStep]) -> i64 {
    steps.len() as i64 - 1
}

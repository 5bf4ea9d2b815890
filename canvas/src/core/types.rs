//! Shared document types exchanged between the agent, the store, and the UI.
//!
//! Field names follow the wire format the canvas client consumes: `camelCase`
//! keys, and the plan flattened into `planSteps`/`currentStepIndex`/`planStatus`.
//! Every field defaults when missing so partial documents still deserialize.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Values accepted by the `field2` select on projects and entities.
pub const SELECT_OPTIONS: [&str; 3] = ["Option A", "Option B", "Option C"];

/// Canonical shared document for one session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SharedState {
    pub items: Vec<Item>,
    pub global_title: String,
    pub global_description: String,
    pub last_action: String,
    pub items_created: u64,
    #[serde(flatten)]
    pub plan: Plan,
}

impl SharedState {
    /// The fixed initial template every new session starts from.
    pub fn initial() -> Self {
        Self::default()
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }
}

/// Ordered checklist tracking multi-step task progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plan {
    #[serde(rename = "planSteps")]
    pub steps: Vec<PlanStep>,
    /// Most recently activated step, or `-1` when no plan exists.
    #[serde(rename = "currentStepIndex")]
    pub current_step_index: i64,
    #[serde(rename = "planStatus")]
    pub status: PlanStatus,
}

impl Default for Plan {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            current_step_index: -1,
            status: PlanStatus::Idle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub title: String,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl PlanStep {
    pub fn pending(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: StepStatus::Pending,
            note: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Blocked,
    Failed,
}

impl StepStatus {
    pub const ALL: [StepStatus; 5] = [
        StepStatus::Pending,
        StepStatus::InProgress,
        StepStatus::Completed,
        StepStatus::Blocked,
        StepStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Blocked => "blocked",
            StepStatus::Failed => "failed",
        }
    }
}

/// Aggregate plan status. `Idle` serializes as the empty string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    #[serde(rename = "")]
    Idle,
    InProgress,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::Idle => "",
            PlanStatus::InProgress => "in_progress",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Project,
    Entity,
    Note,
    Chart,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Project => "project",
            ItemKind::Entity => "entity",
            ItemKind::Note => "note",
            ItemKind::Chart => "chart",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canvas card. The item kind is carried by its `data` variant, so it cannot
/// change without replacing the data wholesale.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawItem")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub subtitle: String,
    pub data: ItemData,
}

impl Item {
    pub fn new(id: impl Into<String>, kind: ItemKind, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            subtitle: String::new(),
            data: ItemData::default_for(kind),
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.data.kind()
    }
}

impl Serialize for Item {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut item = serializer.serialize_struct("Item", 5)?;
        item.serialize_field("id", &self.id)?;
        item.serialize_field("type", &self.kind())?;
        item.serialize_field("name", &self.name)?;
        item.serialize_field("subtitle", &self.subtitle)?;
        item.serialize_field("data", &self.data)?;
        item.end()
    }
}

/// Wire shape of an item before `data` is interpreted by `type`.
#[derive(Deserialize)]
struct RawItem {
    id: String,
    #[serde(rename = "type")]
    kind: ItemKind,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    subtitle: Option<String>,
    #[serde(default)]
    data: Value,
}

impl TryFrom<RawItem> for Item {
    type Error = String;

    fn try_from(raw: RawItem) -> Result<Self, Self::Error> {
        let data = ItemData::from_value(raw.kind, raw.data)
            .map_err(|err| format!("item '{}' has invalid {} data: {}", raw.id, raw.kind, err))?;
        Ok(Item {
            id: raw.id,
            name: raw.name.unwrap_or_default(),
            subtitle: raw.subtitle.unwrap_or_default(),
            data,
        })
    }
}

/// Type-specific item payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ItemData {
    Project(ProjectData),
    Entity(EntityData),
    Note(NoteData),
    Chart(ChartData),
}

impl ItemData {
    pub fn default_for(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Project => ItemData::Project(ProjectData::default()),
            ItemKind::Entity => ItemData::Entity(EntityData::default()),
            ItemKind::Note => ItemData::Note(NoteData::default()),
            ItemKind::Chart => ItemData::Chart(ChartData::default()),
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            ItemData::Project(_) => ItemKind::Project,
            ItemData::Entity(_) => ItemKind::Entity,
            ItemData::Note(_) => ItemKind::Note,
            ItemData::Chart(_) => ItemKind::Chart,
        }
    }

    fn from_value(kind: ItemKind, value: Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Self::default_for(kind));
        }
        Ok(match kind {
            ItemKind::Project => ItemData::Project(serde_json::from_value(value)?),
            ItemKind::Entity => ItemData::Entity(serde_json::from_value(value)?),
            ItemKind::Note => ItemData::Note(serde_json::from_value(value)?),
            ItemKind::Chart => ItemData::Chart(serde_json::from_value(value)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectData {
    /// Free text.
    pub field1: String,
    /// One of [`SELECT_OPTIONS`] or empty.
    pub field2: String,
    /// `YYYY-MM-DD` or empty.
    pub field3: String,
    pub field4: Vec<ChecklistItem>,
    /// Last issued checklist id.
    pub field4_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecklistItem {
    pub id: String,
    pub text: String,
    pub done: bool,
    pub proposed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityData {
    pub field1: String,
    pub field2: String,
    /// Selected tags.
    pub field3: Vec<String>,
    /// Tags offered for selection.
    pub field3_options: Vec<String>,
}

impl Default for EntityData {
    fn default() -> Self {
        Self {
            field1: String::new(),
            field2: String::new(),
            field3: Vec::new(),
            field3_options: vec![
                "Tag 1".to_string(),
                "Tag 2".to_string(),
                "Tag 3".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteData {
    pub field1: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartData {
    pub field1: Vec<ChartMetric>,
    /// Last issued metric id.
    pub field1_id: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartMetric {
    pub id: String,
    pub label: String,
    /// `0..=100`, or `None` (serialized as `""`) when cleared.
    #[serde(with = "metric_value")]
    pub value: Option<f64>,
}

mod metric_value {
    use super::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Number(f64),
        Text(String),
        Null(()),
    }

    pub fn serialize<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(number) => serializer.serialize_f64(*number),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<f64>, D::Error> {
        match Wire::deserialize(deserializer)? {
            Wire::Number(number) => Ok(Some(number)),
            Wire::Text(text) if text.trim().is_empty() => Ok(None),
            Wire::Text(text) => text
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("invalid metric value '{text}'"))),
            Wire::Null(()) => Ok(None),
        }
    }
}

static SESSION_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,127}$").unwrap());

/// Identifier of one session. Restricted to characters that are safe as a file
/// stem and as a URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(raw: &str) -> Result<Self, String> {
        if !SESSION_KEY_RE.is_match(raw) || raw.contains("..") {
            return Err(format!("invalid session key '{raw}'"));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a mutation call was refused. Refusals never mutate the document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum Rejection {
    UnknownOperation {
        name: String,
    },
    InvalidArguments {
        operation: String,
        message: String,
    },
    NotFound {
        what: &'static str,
        id: String,
    },
    WrongItemType {
        id: String,
        expected: ItemKind,
        actual: ItemKind,
    },
    OutOfRange {
        what: &'static str,
        index: i64,
        len: usize,
    },
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

impl Rejection {
    /// Stable machine-readable code, matching the serialized `error` tag.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::UnknownOperation { .. } => "unknown_operation",
            Rejection::InvalidArguments { .. } => "invalid_arguments",
            Rejection::NotFound { .. } => "not_found",
            Rejection::WrongItemType { .. } => "wrong_item_type",
            Rejection::OutOfRange { .. } => "out_of_range",
            Rejection::InvalidValue { .. } => "invalid_value",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::UnknownOperation { name } => write!(f, "unknown operation '{name}'"),
            Rejection::InvalidArguments { operation, message } => {
                write!(f, "invalid arguments for {operation}: {message}")
            }
            Rejection::NotFound { what, id } => write!(f, "{what} '{id}' not found"),
            Rejection::WrongItemType {
                id,
                expected,
                actual,
            } => write!(f, "item '{id}' is a {actual}, expected a {expected}"),
            Rejection::OutOfRange { what, index, len } => {
                write!(f, "{what} index {index} out of range (len={len})")
            }
            Rejection::InvalidValue { field, message } => write!(f, "{field}: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// The initial template serializes to the flat wire format the client expects.
    #[test]
    fn initial_state_wire_format_is_stable() {
        let value = serde_json::to_value(SharedState::initial()).expect("serialize");
        assert_eq!(
            value,
            json!({
                "items": [],
                "globalTitle": "",
                "globalDescription": "",
                "lastAction": "",
                "itemsCreated": 0,
                "planSteps": [],
                "currentStepIndex": -1,
                "planStatus": "",
            })
        );
    }

    /// Missing keys fall back to template values.
    #[test]
    fn partial_document_uses_defaults() {
        let state: SharedState =
            serde_json::from_value(json!({"items": [], "globalTitle": "Board"})).expect("parse");
        assert_eq!(state.global_title, "Board");
        assert_eq!(state.plan.current_step_index, -1);
        assert_eq!(state.plan.status, PlanStatus::Idle);
    }

    /// Item data is interpreted according to the declared type.
    #[test]
    fn item_data_follows_type() {
        let item: Item = serde_json::from_value(json!({
            "id": "0001",
            "type": "chart",
            "name": "Growth",
            "data": {"field1": [{"id": "1", "label": "Q1", "value": ""}], "field1_id": 1}
        }))
        .expect("parse item");

        assert_eq!(item.kind(), ItemKind::Chart);
        let ItemData::Chart(chart) = &item.data else {
            panic!("expected chart data");
        };
        assert_eq!(chart.field1[0].value, None);
        assert_eq!(item.subtitle, "");

        let back = serde_json::to_value(&item).expect("serialize");
        assert_eq!(back["type"], "chart");
        assert_eq!(back["data"]["field1"][0]["value"], "");
    }

    /// Data that does not fit the declared type is rejected.
    #[test]
    fn item_with_mismatched_data_fails() {
        let err = serde_json::from_value::<Item>(json!({
            "id": "0001",
            "type": "note",
            "data": {"field1": ["not", "text"]}
        }))
        .expect_err("mismatched data");
        assert!(err.to_string().contains("invalid note data"));
    }

    /// Missing item data yields the per-type default.
    #[test]
    fn item_without_data_gets_defaults() {
        let item: Item =
            serde_json::from_value(json!({"id": "0002", "type": "entity"})).expect("parse item");
        let ItemData::Entity(entity) = &item.data else {
            panic!("expected entity data");
        };
        assert_eq!(entity.field3_options, vec!["Tag 1", "Tag 2", "Tag 3"]);
    }

    #[test]
    fn session_key_rejects_path_like_values() {
        assert!(SessionKey::new("thread-42").is_ok());
        assert!(SessionKey::new("a.b_c").is_ok());
        assert!(SessionKey::new("../etc").is_err());
        assert!(SessionKey::new("a/b").is_err());
        assert!(SessionKey::new("").is_err());
        assert!(SessionKey::new("x..y").is_err());
    }

    #[test]
    fn rejection_serializes_with_error_code() {
        let rejection = Rejection::OutOfRange {
            what: "step",
            index: 5,
            len: 3,
        };
        let value = serde_json::to_value(&rejection).expect("serialize");
        assert_eq!(value["error"], rejection.code());
        assert_eq!(rejection.to_string(), "step index 5 out of range (len=3)");
    }
}

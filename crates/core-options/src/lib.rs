//! Canonical option model and normalization.
//!
//! Every option a control touches, whether supplied as a static list or
//! decoded from a remote JSON body, passes through [`normalize_option`] and
//! comes out as an [`OptionItem`] with a guaranteed non-empty `id` and
//! `label`. Normalization is total: malformed or missing fields degrade
//! through fallback chains, never into an error. Source records are cloned,
//! never mutated.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod envelope;
pub mod set;

pub use envelope::unwrap_envelope;
pub use set::{GroupedOptions, OptionSet, match_span};

/// Stable identifier for an option within a control's option set.
///
/// Always a non-empty string after normalization. Ids taken from source
/// records are stringified; records without a usable id receive a freshly
/// generated ULID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionId(String);

impl OptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Mint a process-unique id for records that arrive without one.
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl std::fmt::Display for OptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OptionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for OptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Field-name overrides applied during normalization.
///
/// Callers whose records use different key names (`{"uuid": ..,
/// "displayName": ..}`) remap them here instead of reshaping their data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMap {
    #[serde(default = "FieldMap::default_id_field")]
    pub id_field: String,
    #[serde(default = "FieldMap::default_label_field")]
    pub label_field: String,
    #[serde(default = "FieldMap::default_value_field")]
    pub value_field: String,
    #[serde(default = "FieldMap::default_group_field")]
    pub group_field: String,
}

impl FieldMap {
    fn default_id_field() -> String {
        "id".to_string()
    }
    fn default_label_field() -> String {
        "label".to_string()
    }
    fn default_value_field() -> String {
        "value".to_string()
    }
    fn default_group_field() -> String {
        "group".to_string()
    }
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            id_field: Self::default_id_field(),
            label_field: Self::default_label_field(),
            value_field: Self::default_value_field(),
            group_field: Self::default_group_field(),
        }
    }
}

/// Canonical option shape shared by every control.
///
/// Invariants:
/// - `id` and `label` are non-empty.
/// - `value` defaults to the id when the source record carries none.
/// - `original` retains a clone of the pre-normalization record for caller
///   introspection; display metadata passes through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionItem {
    pub id: OptionId,
    pub label: String,
    pub value: Value,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "badgeColor")]
    pub badge_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, rename = "_original")]
    pub original: Value,
    #[serde(default, rename = "_isNew")]
    pub is_new: bool,
}

impl OptionItem {
    /// Synthesize the option produced by the create-new affordance: label and
    /// value are the typed text, id is freshly generated.
    pub fn created(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            id: OptionId::generate(),
            value: Value::String(label.clone()),
            label,
            disabled: false,
            icon: None,
            image: None,
            description: None,
            badge: None,
            badge_color: None,
            group: None,
            meta: None,
            original: Value::Null,
            is_new: true,
        }
    }
}

/// Map one source record into the canonical shape. Total over all JSON
/// values: objects walk the fallback chains, non-objects stringify into the
/// label/value slots, and anything unusable bottoms out at a generated id.
pub fn normalize_option(raw: &Value, fields: &FieldMap) -> OptionItem {
    let id = string_field(raw, &fields.id_field)
        .or_else(|| string_field(raw, "id"))
        .or_else(|| scalar_to_string(raw))
        .map(OptionId::new)
        .unwrap_or_else(OptionId::generate);

    let value = non_null_field(raw, &fields.value_field)
        .or_else(|| non_null_field(raw, "value"))
        .unwrap_or_else(|| Value::String(id.as_str().to_string()));

    let label = string_field(raw, &fields.label_field)
        .or_else(|| string_field(raw, "label"))
        .or_else(|| string_field(raw, "name"))
        .or_else(|| string_field(raw, "text"))
        .or_else(|| scalar_to_string(&value))
        .unwrap_or_else(|| id.as_str().to_string());

    let group = string_field(raw, &fields.group_field).or_else(|| string_field(raw, "group"));

    OptionItem {
        id,
        label,
        value,
        disabled: raw
            .get("disabled")
            .map(is_truthy)
            .unwrap_or(false),
        icon: string_field(raw, "icon"),
        image: string_field(raw, "image"),
        description: string_field(raw, "description"),
        badge: string_field(raw, "badge"),
        badge_color: string_field(raw, "badgeColor"),
        group,
        meta: raw.get("meta").filter(|m| !m.is_null()).cloned(),
        original: raw.clone(),
        is_new: raw
            .get("_isNew")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}

/// Normalize a batch of records in order.
pub fn normalize_all(raw: &[Value], fields: &FieldMap) -> Vec<OptionItem> {
    raw.iter().map(|r| normalize_option(r, fields)).collect()
}

/// Non-empty string rendition of an object field, stringifying scalars.
fn string_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(scalar_to_string)
}

fn non_null_field(raw: &Value, key: &str) -> Option<Value> {
    raw.get(key).filter(|v| !v.is_null()).cloned()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}

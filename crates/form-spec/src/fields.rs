use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FormError;
use crate::index::{ControlKind, QuestionEntry, SchemaIndex};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Select { value: String, options: Vec<String> },
    Checkbox { checked: bool, value: String },
}

impl FieldValue {
    pub fn kind_label(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Select { .. } => "select",
            FieldValue::Checkbox { .. } => "checkbox",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub value: FieldValue,
    pub hidden: bool,
    /// Created at fill-time by dropdown mirroring rather than by the schema.
    pub materialized: bool,
}

/// Live values of every named control of one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldStore {
    fields: BTreeMap<String, Field>,
}

impl FieldStore {
    /// Fresh store holding every control of `index` at its default value.
    pub fn from_index(index: &SchemaIndex) -> Self {
        let mut fields = BTreeMap::new();
        for control in index.controls() {
            let default = control.default_value.clone().unwrap_or_default();
            let value = match &control.kind {
                ControlKind::Text | ControlKind::Amount { .. } | ControlKind::Mirror { .. } => {
                    FieldValue::Text(default)
                }
                ControlKind::Select { options, .. } => FieldValue::Select {
                    value: find_option(options, &default).unwrap_or_default(),
                    options: options.clone(),
                },
                ControlKind::Checkbox { value, .. } => FieldValue::Checkbox {
                    checked: parse_flag(&default),
                    value: value.clone(),
                },
            };
            fields.insert(
                control.name.clone(),
                Field {
                    value,
                    hidden: control.hidden,
                    materialized: false,
                },
            );
        }
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Textual value: the text, the selected option, or a checked box's value.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|field| match &field.value {
            FieldValue::Text(text) => text.as_str(),
            FieldValue::Select { value, .. } => value.as_str(),
            FieldValue::Checkbox { checked, value } => {
                if *checked {
                    value.as_str()
                } else {
                    ""
                }
            }
        })
    }

    /// Textual answer of a whole question: its non-empty control texts
    /// joined by ` - `.
    pub fn answer_text(&self, question: &QuestionEntry) -> String {
        question
            .answer_controls
            .iter()
            .filter_map(|control| self.text(control))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" - ")
    }

    /// Values of the checked option controls of a question.
    pub fn checked_values<'a>(&'a self, question: &'a QuestionEntry) -> impl Iterator<Item = &'a str> {
        question
            .answer_controls
            .iter()
            .filter(|control| self.is_checked(control) == Some(true))
            .filter_map(|control| self.text(control))
    }

    pub fn is_checked(&self, name: &str) -> Option<bool> {
        match self.fields.get(name).map(|field| &field.value) {
            Some(FieldValue::Checkbox { checked, .. }) => Some(*checked),
            _ => None,
        }
    }

    pub fn is_hidden(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(|field| field.hidden)
    }

    pub fn options(&self, name: &str) -> Option<&[String]> {
        match self.fields.get(name).map(|field| &field.value) {
            Some(FieldValue::Select { options, .. }) => Some(options.as_slice()),
            _ => None,
        }
    }

    /// Option of `name` matching `candidate` case-insensitively.
    pub fn find_option(&self, name: &str, candidate: &str) -> Option<String> {
        self.options(name)
            .and_then(|options| find_option(options, candidate))
    }

    /// Writes a text or select control. Returns whether the value changed.
    pub fn set_text(&mut self, name: &str, value: &str) -> Result<bool, FormError> {
        let field = self
            .fields
            .get_mut(name)
            .ok_or_else(|| FormError::UnknownControl(name.to_string()))?;
        match &mut field.value {
            FieldValue::Text(current) => Ok(replace(current, value.to_string())),
            FieldValue::Select {
                value: current,
                options,
            } => {
                let next = if value.is_empty() {
                    String::new()
                } else {
                    find_option(options, value).ok_or_else(|| FormError::UnknownOption {
                        control: name.to_string(),
                        value: value.to_string(),
                    })?
                };
                Ok(replace(current, next))
            }
            FieldValue::Checkbox { .. } => Err(FormError::KindMismatch {
                control: name.to_string(),
                actual: "checkbox",
            }),
        }
    }

    /// Checks or unchecks a checkbox. Returns whether the state changed.
    pub fn set_checked(&mut self, name: &str, checked: bool) -> Result<bool, FormError> {
        let field = self
            .fields
            .get_mut(name)
            .ok_or_else(|| FormError::UnknownControl(name.to_string()))?;
        match &mut field.value {
            FieldValue::Checkbox { checked: current, .. } => Ok(replace(current, checked)),
            other => Err(FormError::KindMismatch {
                control: name.to_string(),
                actual: other.kind_label(),
            }),
        }
    }

    pub fn set_hidden(&mut self, name: &str, hidden: bool) -> bool {
        match self.fields.get_mut(name) {
            Some(field) => replace(&mut field.hidden, hidden),
            None => false,
        }
    }

    /// Empties a control of any kind. Returns whether anything changed.
    pub fn clear(&mut self, name: &str) -> bool {
        match self.fields.get_mut(name).map(|field| &mut field.value) {
            Some(FieldValue::Text(text)) => replace(text, String::new()),
            Some(FieldValue::Select { value, .. }) => replace(value, String::new()),
            Some(FieldValue::Checkbox { checked, .. }) => replace(checked, false),
            None => false,
        }
    }

    /// Inserts a hidden, checked option standing for a dropdown selection.
    /// Refuses to overwrite a schema-defined control.
    pub fn materialize(&mut self, name: &str, value: &str) -> bool {
        if self.fields.get(name).is_some_and(|field| !field.materialized) {
            return false;
        }
        self.fields.insert(
            name.to_string(),
            Field {
                value: FieldValue::Checkbox {
                    checked: true,
                    value: value.to_string(),
                },
                hidden: true,
                materialized: true,
            },
        );
        true
    }

    /// Removes a previously materialized option; schema controls stay.
    pub fn dematerialize(&mut self, name: &str) -> bool {
        if self.fields.get(name).is_some_and(|field| field.materialized) {
            self.fields.remove(name);
            true
        } else {
            false
        }
    }

    /// Writes a raw snapshot value without running any propagation.
    /// Returns `false` for unknown controls or values that do not fit.
    pub fn apply_raw(&mut self, name: &str, raw: &str) -> bool {
        match self.fields.get(name).map(|field| &field.value) {
            Some(FieldValue::Checkbox { .. }) => self.set_checked(name, parse_flag(raw)).is_ok(),
            Some(_) => self.set_text(name, raw).is_ok(),
            None => false,
        }
    }

    /// Flat name -> value map; checkboxes export as `"true"` / `"false"`.
    pub fn snapshot(&self) -> FieldSnapshot {
        let values = self
            .fields
            .iter()
            .map(|(name, field)| {
                let value = match &field.value {
                    FieldValue::Text(text) => text.clone(),
                    FieldValue::Select { value, .. } => value.clone(),
                    FieldValue::Checkbox { checked, .. } => checked.to_string(),
                };
                (name.clone(), value)
            })
            .collect();
        FieldSnapshot { values }
    }
}

fn replace<T: PartialEq>(slot: &mut T, next: T) -> bool {
    if *slot == next {
        false
    } else {
        *slot = next;
        true
    }
}

fn find_option(options: &[String], candidate: &str) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }
    options
        .iter()
        .find(|option| option.as_str() == candidate)
        .or_else(|| {
            options
                .iter()
                .find(|option| option.eq_ignore_ascii_case(candidate))
        })
        .cloned()
}

/// Case-insensitive comparison of a recorded answer with an expected one.
pub fn answers_match(actual: &str, expected: &str) -> bool {
    actual.trim().to_lowercase() == expected.trim().to_lowercase()
}

/// Loose boolean used for checkbox values coming from text.
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "y" | "on" | "1" | "checked"
    )
}

/// Numeric reading of a text value; tolerates currency symbols, thousands
/// separators and surrounding whitespace.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|ch| !matches!(ch, '$' | ',' | ' ' | '\u{a0}'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Flat key -> value map exchanged with the persistence collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSnapshot {
    pub values: BTreeMap<String, String>,
}

impl FieldSnapshot {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, FormError> {
        Ok(serde_cbor::to_vec(self)?)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, FormError> {
        Ok(serde_cbor::from_slice(bytes)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, FormError> {
        serde_json::to_string_pretty(self).map_err(FormError::SnapshotJson)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::FormSchema;
    use serde_json::json;

    fn store() -> FieldStore {
        let schema: FormSchema = serde_json::from_value(json!({
            "id": "f", "title": "F",
            "sections": [{ "id": 1, "name": "One", "questions": [
                { "id": "q1", "type": "money", "text": "Income", "default_value": "100" },
                { "id": "q2", "type": "dropdown", "text": "Color", "options": [{ "label": "Red" }, { "label": "Blue" }] },
                { "id": "q3", "type": "checkbox-group", "text": "Pets", "options": [{ "label": "Dog" }] }
            ]}]
        }))
        .expect("schema");
        FieldStore::from_index(&SchemaIndex::build(schema).expect("index"))
    }

    #[test]
    fn selects_accept_only_declared_options() {
        let mut fields = store();
        assert!(fields.set_text("color", "red").expect("known option"));
        assert_eq!(fields.text("color"), Some("Red"));
        assert!(matches!(
            fields.set_text("color", "Green"),
            Err(FormError::UnknownOption { .. })
        ));
        assert!(!fields.set_text("color", "Red").expect("same value"));
    }

    #[test]
    fn checkbox_text_reflects_checked_state() {
        let mut fields = store();
        assert_eq!(fields.text("pets_dog"), Some(""));
        assert!(fields.set_checked("pets_dog", true).expect("checkbox"));
        assert_eq!(fields.text("pets_dog"), Some("Dog"));
        assert!(matches!(
            fields.set_text("pets_dog", "x"),
            Err(FormError::KindMismatch { .. })
        ));
    }

    #[test]
    fn materialized_options_never_replace_schema_controls() {
        let mut fields = store();
        assert!(!fields.materialize("pets_dog", "Dog"));
        assert!(fields.materialize("color_red", "Red"));
        assert_eq!(fields.is_checked("color_red"), Some(true));
        assert!(fields.dematerialize("color_red"));
        assert!(!fields.dematerialize("pets_dog"));
    }

    #[test]
    fn snapshot_round_trips_through_cbor() {
        let mut fields = store();
        fields.set_checked("pets_dog", true).expect("checkbox");
        let snapshot = fields.snapshot();
        assert_eq!(snapshot.get("income"), Some("100"));
        assert_eq!(snapshot.get("pets_dog"), Some("true"));

        let bytes = snapshot.to_cbor().expect("encode");
        assert_eq!(FieldSnapshot::from_cbor(&bytes).expect("decode"), snapshot);
    }

    #[test]
    fn parse_numeric_tolerates_formatting() {
        assert_eq!(parse_numeric("$1,050.25"), Some(1050.25));
        assert_eq!(parse_numeric(" 42 "), Some(42.0));
        assert_eq!(parse_numeric("abc"), None);
        assert_eq!(parse_numeric(""), None);
    }
}

//! Cross-field propagation that runs before visibility on every change.
//!
//! Three mechanisms share one worklist: dropdown mirroring, exclusive
//! ("none of the above") options with their amount sub-fields, and linked
//! select pairs. Links are single-hop: only the control the user changed
//! copies its value across its channels. Controls written by a link still get
//! mirroring and exclusion, but their own links do not fire. Each channel
//! fires at most once per user action; the in-flight set is cleared when the
//! worklist drains.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::fields::FieldStore;
use crate::index::{ControlKind, LinkChannel, SchemaIndex};
use crate::slug::slugify;

/// A linked value that could not be copied because the other side does not
/// offer it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncWarning {
    pub source: String,
    pub target: String,
    pub value: String,
}

impl fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' is not an option of '{}' (linked from '{}')",
            self.value, self.target, self.source
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct Synchronizer {
    /// Select control -> the option control materialized for its value.
    materialized: BTreeMap<String, String>,
    in_flight: BTreeSet<LinkChannel>,
    warnings: Vec<SyncWarning>,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> &[SyncWarning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<SyncWarning> {
        std::mem::take(&mut self.warnings)
    }

    pub fn materialized(&self, select: &str) -> Option<&str> {
        self.materialized.get(select).map(String::as_str)
    }

    /// Propagates a change on `origin`. Returns every control whose value or
    /// presence changed, `origin` first.
    pub fn propagate(&mut self, index: &SchemaIndex, fields: &mut FieldStore, origin: &str) -> Vec<String> {
        let mut touched = vec![origin.to_string()];
        let mut queue = VecDeque::from([origin.to_string()]);

        while let Some(control) = queue.pop_front() {
            let mut changed = Vec::new();
            match index.control(&control).map(|spec| &spec.kind) {
                Some(ControlKind::Select {
                    mirror: Some(mirror),
                    ..
                }) => changed.extend(self.mirror_dropdown(fields, &control, mirror)),
                Some(ControlKind::Checkbox {
                    amount, exclusive, ..
                }) => {
                    changed.extend(enforce_exclusive(index, fields, &control, *exclusive));
                    changed.extend(sync_amount(fields, &control, amount.as_deref()));
                }
                _ => {}
            }
            if control == origin {
                changed.extend(self.follow_links(index, fields, &control));
            }

            for name in changed {
                if !touched.contains(&name) {
                    touched.push(name.clone());
                }
                queue.push_back(name);
            }
        }

        self.in_flight.clear();
        touched
    }

    /// Re-derives every dropdown mirror from the current selections, e.g.
    /// after a snapshot was applied without propagation.
    pub fn remirror(&mut self, index: &SchemaIndex, fields: &mut FieldStore) -> Vec<String> {
        let mut touched = Vec::new();
        for control in index.controls() {
            if let ControlKind::Select {
                mirror: Some(mirror),
                ..
            } = &control.kind
            {
                touched.extend(self.mirror_dropdown(fields, &control.name, mirror));
            }
        }
        touched
    }

    /// Copies the selection into the mirror text control and keeps exactly
    /// one materialized option `<select>_<slugify(value)>`.
    fn mirror_dropdown(&mut self, fields: &mut FieldStore, select: &str, mirror: &str) -> Vec<String> {
        let mut changed = Vec::new();
        let value = fields.text(select).unwrap_or_default().to_string();

        if fields.set_text(mirror, &value).unwrap_or(false) {
            changed.push(mirror.to_string());
        }

        let slug = slugify(&value);
        let wanted = (!slug.is_empty()).then(|| format!("{select}_{slug}"));
        let previous = self.materialized.get(select).cloned();
        if previous == wanted && wanted.as_deref().is_some_and(|name| fields.contains(name)) {
            return changed;
        }

        if let Some(previous) = previous {
            self.materialized.remove(select);
            if fields.dematerialize(&previous) {
                changed.push(previous);
            }
        }
        if let Some(name) = wanted {
            let owner = self
                .materialized
                .iter()
                .find(|(other, option)| other.as_str() != select && **option == name)
                .map(|(other, _)| other.clone());
            if let Some(owner) = owner {
                debug!(select = %select, option = %name, owner = %owner, "materialized option already owned by another dropdown");
            } else if fields.materialize(&name, &value) {
                self.materialized.insert(select.to_string(), name.clone());
                changed.push(name);
            } else {
                debug!(select = %select, option = %name, "materialized option collides with a schema control");
            }
        }
        changed
    }

    fn follow_links(&mut self, index: &SchemaIndex, fields: &mut FieldStore, control: &str) -> Vec<String> {
        let mut changed = Vec::new();
        let value = fields.text(control).unwrap_or_default().to_string();
        for channel in index.links_for(control) {
            if self.in_flight.contains(channel) {
                continue;
            }
            self.in_flight.insert(channel.clone());
            if value.is_empty() {
                continue;
            }
            let other = channel.other(control);
            match fields.find_option(other, &value) {
                Some(option) => {
                    if fields.set_text(other, &option).unwrap_or(false) {
                        debug!(from = %control, to = %other, value = %option, "linked value copied");
                        changed.push(other.to_string());
                    }
                }
                None => {
                    let warning = SyncWarning {
                        source: control.to_string(),
                        target: other.to_string(),
                        value: value.clone(),
                    };
                    warn!(%warning, "linked value skipped");
                    self.warnings.push(warning);
                }
            }
        }
        changed
    }
}

/// Checking the exclusive option unchecks its siblings; checking a sibling
/// unchecks the exclusive option.
fn enforce_exclusive(index: &SchemaIndex, fields: &mut FieldStore, control: &str, exclusive: bool) -> Vec<String> {
    if fields.is_checked(control) != Some(true) {
        return Vec::new();
    }
    let Some(question) = index
        .control(control)
        .and_then(|spec| spec.question_id.as_deref())
        .and_then(|id| index.question(id))
    else {
        return Vec::new();
    };

    let mut changed = Vec::new();
    for sibling in question.answer_controls.iter().filter(|name| name.as_str() != control) {
        let sibling_exclusive = matches!(
            index.control(sibling).map(|spec| &spec.kind),
            Some(ControlKind::Checkbox { exclusive: true, .. })
        );
        if (exclusive || sibling_exclusive) && fields.set_checked(sibling, false).unwrap_or(false) {
            changed.push(sibling.clone());
        }
    }
    changed
}

/// Amount sub-fields are shown while their option is checked and cleared
/// when it is unchecked.
fn sync_amount(fields: &mut FieldStore, control: &str, amount: Option<&str>) -> Vec<String> {
    let Some(amount) = amount else {
        return Vec::new();
    };
    let checked = fields.is_checked(control) == Some(true);
    fields.set_hidden(amount, !checked);
    if !checked && fields.clear(amount) {
        vec![amount.to_string()]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValue;
    use crate::spec::FormSchema;
    use serde_json::json;

    fn index() -> SchemaIndex {
        let schema: FormSchema = serde_json::from_value(json!({
            "id": "f", "title": "F",
            "sections": [{ "id": 1, "name": "One", "questions": [
                { "id": "home", "type": "dropdown", "text": "Home state",
                  "options": [{ "label": "CA" }, { "label": "NY" }, { "label": "TX" }] },
                { "id": "mail", "type": "dropdown", "text": "Mailing state",
                  "options": [{ "label": "CA" }, { "label": "NY" }] },
                { "id": "work", "type": "single-choice", "text": "Work state",
                  "options": [{ "label": "CA" }, { "label": "NY" }, { "label": "TX" }] },
                { "id": "income", "type": "checkbox-group", "text": "Income", "options": [
                    { "label": "Wages", "amount": true },
                    { "label": "Pension", "amount": true },
                    { "label": "None of the above", "exclusive": true }
                ]}
            ]}],
            "linking": [
                { "a": "home", "b": "mail" },
                { "a": "mail", "b": "work" }
            ]
        }))
        .expect("schema");
        SchemaIndex::build(schema).expect("index")
    }

    #[test]
    fn dropdown_mirrors_into_hidden_controls() {
        let index = index();
        let mut fields = FieldStore::from_index(&index);
        let mut sync = Synchronizer::new();

        fields.set_text("home_state", "NY").expect("option");
        let touched = sync.propagate(&index, &mut fields, "home_state");
        assert_eq!(fields.text("home_state_selected"), Some("NY"));
        assert_eq!(fields.is_checked("home_state_ny"), Some(true));
        assert!(fields.is_hidden("home_state_ny"));
        assert!(touched.contains(&"home_state_ny".to_string()));

        fields.set_text("home_state", "CA").expect("option");
        sync.propagate(&index, &mut fields, "home_state");
        assert!(!fields.contains("home_state_ny"));
        assert_eq!(fields.is_checked("home_state_ca"), Some(true));
        assert_eq!(sync.materialized("home_state"), Some("home_state_ca"));
    }

    #[test]
    fn linked_pairs_hop_once_per_action() {
        let index = index();
        let mut fields = FieldStore::from_index(&index);
        let mut sync = Synchronizer::new();

        fields.set_text("home_state", "NY").expect("option");
        sync.propagate(&index, &mut fields, "home_state");
        assert_eq!(fields.text("mailing_state"), Some("NY"));
        assert_eq!(fields.text("work_state"), Some(""));
        assert_eq!(fields.is_checked("mailing_state_ny"), Some(true));
        assert!(sync.warnings().is_empty());

        let before = fields.clone();
        sync.propagate(&index, &mut fields, "home_state");
        assert_eq!(fields, before);
    }

    #[test]
    fn control_in_two_channels_copies_to_both_sides() {
        let index = index();
        let mut fields = FieldStore::from_index(&index);
        let mut sync = Synchronizer::new();

        fields.set_text("mailing_state", "CA").expect("option");
        let touched = sync.propagate(&index, &mut fields, "mailing_state");
        assert_eq!(fields.text("home_state"), Some("CA"));
        assert_eq!(fields.text("work_state"), Some("CA"));
        assert_eq!(fields.is_checked("home_state_ca"), Some(true));
        assert_eq!(touched[0], "mailing_state");
        assert!(touched.contains(&"home_state_ca".to_string()));
    }

    #[test]
    fn missing_option_leaves_other_side_and_warns() {
        let index = index();
        let mut fields = FieldStore::from_index(&index);
        let mut sync = Synchronizer::new();

        fields.set_text("home_state", "TX").expect("option");
        sync.propagate(&index, &mut fields, "home_state");
        assert_eq!(fields.text("mailing_state"), Some(""));
        assert_eq!(fields.text("work_state"), Some(""));
        assert_eq!(
            sync.take_warnings(),
            vec![SyncWarning {
                source: "home_state".into(),
                target: "mailing_state".into(),
                value: "TX".into()
            }]
        );
    }

    #[test]
    fn exclusive_option_clears_siblings_and_amounts() {
        let index = index();
        let mut fields = FieldStore::from_index(&index);
        let mut sync = Synchronizer::new();

        fields.set_checked("income_wages", true).expect("checkbox");
        sync.propagate(&index, &mut fields, "income_wages");
        assert!(!fields.is_hidden("income_wages_amount"));
        fields.set_text("income_wages_amount", "1200").expect("amount");

        fields.set_checked("income_none_of_the_above", true).expect("checkbox");
        let touched = sync.propagate(&index, &mut fields, "income_none_of_the_above");
        assert_eq!(fields.is_checked("income_wages"), Some(false));
        assert_eq!(fields.text("income_wages_amount"), Some(""));
        assert!(fields.is_hidden("income_wages_amount"));
        assert!(touched.contains(&"income_wages".to_string()));

        fields.set_checked("income_pension", true).expect("checkbox");
        sync.propagate(&index, &mut fields, "income_pension");
        assert_eq!(fields.is_checked("income_none_of_the_above"), Some(false));
        assert_eq!(fields.is_checked("income_pension"), Some(true));
    }

    #[test]
    fn colliding_materialized_names_keep_the_first_owner() {
        let schema: FormSchema = serde_json::from_value(json!({
            "id": "f", "title": "F",
            "sections": [{ "id": 1, "name": "One", "questions": [
                { "id": "first", "type": "dropdown", "text": "A",
                  "options": [{ "label": "B c" }, { "label": "Other" }] },
                { "id": "second", "type": "dropdown", "text": "A b",
                  "options": [{ "label": "C" }, { "label": "D" }] }
            ]}]
        }))
        .expect("schema");
        let index = SchemaIndex::build(schema).expect("index");
        let mut fields = FieldStore::from_index(&index);
        let mut sync = Synchronizer::new();

        fields.set_text("a", "B c").expect("option");
        sync.propagate(&index, &mut fields, "a");
        assert_eq!(sync.materialized("a"), Some("a_b_c"));

        fields.set_text("a_b", "C").expect("option");
        sync.propagate(&index, &mut fields, "a_b");
        assert_eq!(sync.materialized("a_b"), None);
        assert_eq!(sync.materialized("a"), Some("a_b_c"));
        assert_eq!(fields.get("a_b_c").map(|field| &field.value), Some(&FieldValue::Checkbox {
            checked: true,
            value: "B c".into()
        }));

        fields.set_text("a_b", "").expect("clear");
        sync.propagate(&index, &mut fields, "a_b");
        assert!(fields.contains("a_b_c"));
        assert_eq!(sync.materialized("a"), Some("a_b_c"));

        fields.set_text("a_b", "D").expect("option");
        sync.propagate(&index, &mut fields, "a_b");
        assert_eq!(sync.materialized("a_b"), Some("a_b_d"));
        assert!(fields.contains("a_b_c"));
    }
}

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::fields::{FieldStore, answers_match};
use crate::index::{SchemaIndex, VisibilityRule};
use crate::spec::{Condition, QuestionType};

pub type VisibilityMap = BTreeMap<String, bool>;

/// Expected answers that match any non-empty value.
pub const WILDCARDS: [&str; 3] = ["any text", "any amount", "any date"];

pub fn is_wildcard(answer: &str) -> bool {
    WILDCARDS
        .iter()
        .any(|wildcard| answer.trim().eq_ignore_ascii_case(wildcard))
}

/// A question whose visibility flipped after a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisibilityChange {
    pub question_id: String,
    pub visible: bool,
}

/// Visibility state of the questions that carry a rule. Questions without a
/// rule are always visible and never stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibilityEvaluator {
    state: VisibilityMap,
}

impl VisibilityEvaluator {
    pub fn initialize(index: &SchemaIndex, fields: &FieldStore) -> Self {
        Self {
            state: resolve_visibility(index, fields),
        }
    }

    pub fn is_visible(&self, question_id: &str) -> bool {
        self.state.get(question_id).copied().unwrap_or(true)
    }

    pub fn map(&self) -> &VisibilityMap {
        &self.state
    }

    /// Re-runs only the rules that read `control` and reports toggles.
    pub fn notify(
        &mut self,
        index: &SchemaIndex,
        fields: &FieldStore,
        control: &str,
    ) -> Vec<VisibilityChange> {
        let rules = index.visibility_rules();
        let mut changes = Vec::new();
        for &rule_index in index.dependents_of(control) {
            let Some(rule) = rules.get(rule_index) else {
                continue;
            };
            if let Some(change) = self.store(rule, evaluate_rule(index, fields, rule)) {
                changes.push(change);
            }
        }
        if !changes.is_empty() {
            debug!(control = %control, toggled = changes.len(), "visibility updated");
        }
        changes
    }

    /// Re-evaluates every rule, e.g. after rehydrating a snapshot.
    pub fn refresh_all(&mut self, index: &SchemaIndex, fields: &FieldStore) -> Vec<VisibilityChange> {
        index
            .visibility_rules()
            .iter()
            .filter_map(|rule| self.store(rule, evaluate_rule(index, fields, rule)))
            .collect()
    }

    fn store(&mut self, rule: &VisibilityRule, visible: bool) -> Option<VisibilityChange> {
        let previous = self.state.insert(rule.question_id.clone(), visible);
        (previous != Some(visible)).then(|| VisibilityChange {
            question_id: rule.question_id.clone(),
            visible,
        })
    }
}

/// Computes visibility of every rule-bearing question from scratch.
pub fn resolve_visibility(index: &SchemaIndex, fields: &FieldStore) -> VisibilityMap {
    index
        .visibility_rules()
        .iter()
        .map(|rule| (rule.question_id.clone(), evaluate_rule(index, fields, rule)))
        .collect()
}

/// Visibility of one question; questions without a rule are visible.
pub fn evaluate(index: &SchemaIndex, fields: &FieldStore, question_id: &str) -> bool {
    index
        .visibility_rule(question_id)
        .map(|rule| evaluate_rule(index, fields, rule))
        .unwrap_or(true)
}

/// OR over the rule's conditions. Conditions whose source cannot be found do
/// not count; a rule made only of those is visible.
pub fn evaluate_rule(index: &SchemaIndex, fields: &FieldStore, rule: &VisibilityRule) -> bool {
    let mut resolvable = false;
    for condition in &rule.conditions {
        match condition_matches(index, fields, condition) {
            Some(true) => return true,
            Some(false) => resolvable = true,
            None => {}
        }
    }
    !resolvable
}

/// `None` when the source question has no live control.
pub fn condition_matches(
    index: &SchemaIndex,
    fields: &FieldStore,
    condition: &Condition,
) -> Option<bool> {
    let source = index.resolve_question(&condition.question)?;
    if !source
        .answer_controls
        .iter()
        .any(|control| fields.contains(control))
    {
        return None;
    }

    let expected = condition.answer.as_str();
    let wildcard = is_wildcard(expected);
    let matched = if source.kind == QuestionType::CheckboxGroup {
        fields
            .checked_values(source)
            .any(|value| wildcard || answers_match(value, expected))
    } else {
        let answer = fields.answer_text(source);
        if wildcard {
            !answer.trim().is_empty()
        } else {
            answers_match(&answer, expected)
        }
    };
    Some(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::FormSchema;
    use serde_json::json;

    fn index() -> SchemaIndex {
        let schema: FormSchema = serde_json::from_value(json!({
            "id": "f", "title": "F",
            "sections": [{ "id": 1, "name": "One", "questions": [
                { "id": "color", "type": "dropdown", "text": "Color",
                  "options": [{ "label": "Red" }, { "label": "Blue" }] },
                { "id": "notes", "type": "paragraph", "text": "Notes" },
                { "id": "pets", "type": "checkbox-group", "text": "Pets",
                  "options": [{ "label": "Dog" }, { "label": "Cat" }] },
                { "id": "shade", "type": "short-text", "text": "Shade",
                  "logic": { "conditions": [{ "question": "color", "answer": "red" }] } },
                { "id": "summary", "type": "short-text", "text": "Summary",
                  "logic": { "conditions": [{ "question": "notes", "answer": "Any Text" }] } },
                { "id": "vet", "type": "short-text", "text": "Vet",
                  "logic": { "conditions": [
                      { "question": "pets", "answer": "cat" },
                      { "question": "missing", "answer": "x" }
                  ] } },
                { "id": "ghost", "type": "short-text", "text": "Ghost",
                  "logic": { "conditions": [{ "question": "nowhere", "answer": "x" }] } }
            ]}]
        }))
        .expect("schema");
        SchemaIndex::build(schema).expect("index")
    }

    #[test]
    fn literal_answers_match_case_insensitively() {
        let index = index();
        let mut fields = FieldStore::from_index(&index);
        let mut evaluator = VisibilityEvaluator::initialize(&index, &fields);
        assert!(!evaluator.is_visible("shade"));

        fields.set_text("color", "Red").expect("option");
        let changes = evaluator.notify(&index, &fields, "color");
        assert_eq!(
            changes,
            vec![VisibilityChange {
                question_id: "shade".into(),
                visible: true
            }]
        );

        fields.set_text("color", "Blue").expect("option");
        evaluator.notify(&index, &fields, "color");
        assert!(!evaluator.is_visible("shade"));
    }

    #[test]
    fn wildcard_tracks_presence() {
        let index = index();
        let mut fields = FieldStore::from_index(&index);
        let mut evaluator = VisibilityEvaluator::initialize(&index, &fields);
        assert!(!evaluator.is_visible("summary"));

        fields.set_text("notes", "hello").expect("text");
        evaluator.notify(&index, &fields, "notes");
        assert!(evaluator.is_visible("summary"));

        fields.set_text("notes", "   ").expect("text");
        evaluator.notify(&index, &fields, "notes");
        assert!(!evaluator.is_visible("summary"));
    }

    #[test]
    fn checkbox_sources_match_any_checked_option() {
        let index = index();
        let mut fields = FieldStore::from_index(&index);
        let mut evaluator = VisibilityEvaluator::initialize(&index, &fields);
        assert!(!evaluator.is_visible("vet"));

        fields.set_checked("pets_dog", true).expect("checkbox");
        assert!(evaluator.notify(&index, &fields, "pets_dog").is_empty());
        fields.set_checked("pets_cat", true).expect("checkbox");
        evaluator.notify(&index, &fields, "pets_cat");
        assert!(evaluator.is_visible("vet"));
    }

    #[test]
    fn unresolvable_rules_are_inert() {
        let index = index();
        let fields = FieldStore::from_index(&index);
        assert!(evaluate(&index, &fields, "ghost"));
        assert!(evaluate(&index, &fields, "notes"));
    }

    #[test]
    fn notify_ignores_controls_without_dependents() {
        let index = index();
        let fields = FieldStore::from_index(&index);
        let mut evaluator = VisibilityEvaluator::initialize(&index, &fields);
        let before = evaluator.clone();
        assert!(evaluator.notify(&index, &fields, "shade").is_empty());
        assert_eq!(evaluator, before);
    }
}

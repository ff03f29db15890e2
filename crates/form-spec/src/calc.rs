use tracing::{debug, warn};

use crate::expr::{ArithOp, fold};
use crate::fields::{FieldStore, parse_flag};
use crate::index::{CalculationTarget, SchemaIndex};
use crate::resolve::TermResolver;
use crate::spec::{CalculationRule, Outcome, Term};

/// Left-to-right value of a rule's terms. A term without an operator after
/// the first one adds.
pub fn fold_terms(
    terms: &[Term],
    index: &SchemaIndex,
    fields: &FieldStore,
    resolver: &TermResolver,
) -> f64 {
    let mut values = terms
        .iter()
        .map(|term| (term.op, resolver.value(&term.field, fields, index)));
    let Some((_, first)) = values.next() else {
        return 0.0;
    };
    fold(
        first,
        values.map(|(op, value)| (op.unwrap_or(ArithOp::Add), value)),
    )
}

/// The accumulator when the rule's comparison holds.
pub fn evaluate_rule(
    rule: &CalculationRule,
    index: &SchemaIndex,
    fields: &FieldStore,
    resolver: &TermResolver,
) -> Option<f64> {
    if rule.terms.is_empty() {
        return None;
    }
    let total = fold_terms(&rule.terms, index, fields, resolver);
    rule.compare.holds(total, rule.threshold).then_some(total)
}

/// Winning outcome for one target: the last rule whose comparison holds.
pub fn decide<'r>(
    target: &'r CalculationTarget,
    index: &SchemaIndex,
    fields: &FieldStore,
    resolver: &TermResolver,
) -> Option<(&'r Outcome, f64)> {
    target
        .rules
        .iter()
        .filter_map(|rule| evaluate_rule(rule, index, fields, resolver).map(|total| (&rule.outcome, total)))
        .last()
}

/// Refreshes every derived field in declaration order and returns the
/// targets whose value changed. Targets no rule matches keep their value.
pub fn run_all(index: &SchemaIndex, fields: &mut FieldStore, resolver: &TermResolver) -> Vec<String> {
    let mut changed = Vec::new();
    for target in index.calculation_targets() {
        if !fields.contains(&target.target) {
            debug!(target = %target.target, "calculation target is not a live control; skipped");
            continue;
        }
        let Some((outcome, total)) = decide(target, index, fields, resolver) else {
            continue;
        };
        if apply_outcome(fields, &target.target, outcome, total) {
            changed.push(target.target.clone());
        }
    }
    if !changed.is_empty() {
        debug!(targets = ?changed, "derived fields recalculated");
    }
    changed
}

/// Writes `outcome` into `target`. Checkbox targets take checked/unchecked
/// outcomes directly and read text outcomes as a flag.
pub fn apply_outcome(fields: &mut FieldStore, target: &str, outcome: &Outcome, total: f64) -> bool {
    let result = if fields.is_checked(target).is_some() {
        let checked = match outcome {
            Outcome::Checked => true,
            Outcome::Unchecked => false,
            Outcome::Text { .. } => parse_flag(&outcome.render(total)),
        };
        fields.set_checked(target, checked)
    } else {
        fields.set_text(target, &outcome.render(total))
    };
    match result {
        Ok(changed) => changed,
        Err(err) => {
            warn!(target = %target, error = %err, "calculation outcome not applied");
            false
        }
    }
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
                { "id": "income", "type": "money", "text": "Income" },
                { "id": "bonus", "type": "money", "text": "Bonus" },
                { "id": "tax", "type": "money", "text": "Tax" },
                { "id": "band", "type": "dropdown", "text": "Band",
                  "options": [{ "label": "Low" }, { "label": "High" }] }
            ]}],
            "hidden_fields": [
                { "name": "net_total", "hidden_logic": [
                    { "terms": [{ "field": "income" }, { "op": "+", "field": "bonus" }, { "op": "−", "field": "tax" }],
                      "compare": ">", "threshold": 1000, "outcome": { "kind": "text", "value": "##total##" } }
                ]},
                { "name": "qualifies", "kind": "checkbox", "hidden_logic": [
                    { "terms": [{ "field": "income" }], "compare": ">", "threshold": 0, "outcome": { "kind": "checked" } },
                    { "terms": [{ "field": "income" }], "compare": ">", "threshold": 5000, "outcome": { "kind": "unchecked" } }
                ]},
                { "name": "ratio", "hidden_logic": [
                    { "terms": [{ "field": "income" }, { "op": "/", "field": "tax" }],
                      "compare": "=", "threshold": 0, "outcome": { "kind": "text", "value": "undefined" } }
                ]}
            ]
        }))
        .expect("schema");
        SchemaIndex::build(schema).expect("index")
    }

    fn fill(fields: &mut FieldStore, income: &str, bonus: &str, tax: &str) {
        fields.set_text("income", income).expect("income");
        fields.set_text("bonus", bonus).expect("bonus");
        fields.set_text("tax", tax).expect("tax");
    }

    #[test]
    fn threshold_rule_fills_total_marker() {
        let index = index();
        let mut fields = FieldStore::from_index(&index);
        fill(&mut fields, "800", "300", "50");
        let changed = run_all(&index, &mut fields, &TermResolver::default());
        assert!(changed.contains(&"net_total".to_string()));
        assert_eq!(fields.text("net_total"), Some("1050.00"));
    }

    #[test]
    fn no_matching_rule_keeps_prior_value() {
        let index = index();
        let resolver = TermResolver::default();
        let mut fields = FieldStore::from_index(&index);
        fill(&mut fields, "800", "300", "50");
        run_all(&index, &mut fields, &resolver);

        fields.set_text("income", "100").expect("income");
        run_all(&index, &mut fields, &resolver);
        assert_eq!(fields.text("net_total"), Some("1050.00"));
    }

    #[test]
    fn last_matching_rule_wins() {
        let index = index();
        let resolver = TermResolver::default();
        let mut fields = FieldStore::from_index(&index);
        fields.set_text("income", "200").expect("income");
        run_all(&index, &mut fields, &resolver);
        assert_eq!(fields.is_checked("qualifies"), Some(true));

        fields.set_text("income", "9000").expect("income");
        run_all(&index, &mut fields, &resolver);
        assert_eq!(fields.is_checked("qualifies"), Some(false));
    }

    #[test]
    fn division_by_zero_reads_as_zero() {
        let index = index();
        let mut fields = FieldStore::from_index(&index);
        fill(&mut fields, "800", "0", "0");
        run_all(&index, &mut fields, &TermResolver::default());
        assert_eq!(fields.text("ratio"), Some("undefined"));
    }

    #[test]
    fn select_targets_reject_unknown_options() {
        let index = index();
        let mut fields = FieldStore::from_index(&index);
        let outcome = Outcome::Text {
            value: "Medium".into(),
        };
        assert!(!apply_outcome(&mut fields, "band", &outcome, 0.0));
        let outcome = Outcome::Text { value: "high".into() };
        assert!(apply_outcome(&mut fields, "band", &outcome, 0.0));
        assert_eq!(fields.text("band"), Some("High"));
    }
}

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::slug::SlugRegistry;
use crate::spec::{CalculationRule, Destination, FormSchema, QuestionSpec, QuestionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaIssue {
    pub code: String,
    pub severity: Severity,
    pub question_id: Option<String>,
    pub path: Option<String>,
    pub message: String,
}

/// Lint report over a schema. Warnings describe things the engine tolerates
/// at fill-time (inert references, skipped rules); errors stop indexing or
/// make part of the form unreachable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub valid: bool,
    pub issues: Vec<SchemaIssue>,
}

impl SchemaReport {
    pub fn errors(&self) -> impl Iterator<Item = &SchemaIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &SchemaIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Warning)
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.issues.iter().any(|issue| issue.code == code)
    }
}

pub fn validate_schema(schema: &FormSchema) -> SchemaReport {
    let mut issues = Vec::new();
    check_sections(schema, &mut issues);

    let mut slugs = SlugRegistry::new();
    let mut position = BTreeMap::new();
    let mut seen = BTreeSet::new();
    let mut ordered: Vec<(u32, &QuestionSpec)> = schema
        .questions()
        .map(|(section, question)| (section.id, question))
        .collect();
    ordered.sort_by_key(|(section, _)| *section);

    for (order, &(_, question)) in ordered.iter().enumerate() {
        if !seen.insert(question.id.as_str()) {
            issues.push(issue(
                Severity::Error,
                "duplicate_question",
                Some(question),
                None,
                format!("question id '{}' is declared more than once", question.id),
            ));
            continue;
        }
        slugs.assign(&question.id, &question.text);
        position.insert(question.id.clone(), order);
    }

    let lookup = |reference: &str| find_question(schema, &slugs, reference);
    let section_count = u32::try_from(schema.sections.len()).unwrap_or(u32::MAX);

    for (order, &(section_id, question)) in ordered.iter().enumerate() {
        check_options(question, &mut issues);

        if let Some(logic) = &question.logic {
            for (slot, condition) in logic.conditions.iter().enumerate() {
                let path = Some(format!("/{}/logic/conditions/{}", question.id, slot));
                match lookup(condition.question.as_str()) {
                    None => issues.push(issue(
                        Severity::Error,
                        "unknown_visibility_source",
                        Some(question),
                        path,
                        format!("visibility source '{}' does not exist", condition.question),
                    )),
                    Some(source) if position.get(&source.id).is_some_and(|at| *at > order) => {
                        issues.push(issue(
                            Severity::Warning,
                            "forward_reference",
                            Some(question),
                            path,
                            format!("visibility source '{}' is declared later in the form", source.id),
                        ))
                    }
                    Some(_) => {}
                }
            }
        }

        for (slot, jump) in question.jump.iter().enumerate() {
            let path = Some(format!("/{}/jump/{}", question.id, slot));
            match jump.target.destination() {
                None => issues.push(issue(
                    Severity::Error,
                    "unknown_jump_target",
                    Some(question),
                    path.clone(),
                    format!("jump target {:?} is neither a section number nor 'end'", jump.target),
                )),
                Some(Destination::Section(target)) if target == 0 || target > section_count => {
                    issues.push(issue(
                        Severity::Error,
                        "jump_target_out_of_range",
                        Some(question),
                        path.clone(),
                        format!("jump target section {} is outside 1..={}", target, section_count),
                    ))
                }
                Some(Destination::Section(target)) if target == section_id => issues.push(issue(
                    Severity::Warning,
                    "jump_to_own_section",
                    Some(question),
                    path.clone(),
                    format!("jump from section {} targets itself", section_id),
                )),
                Some(_) => {}
            }
            let choices = question.choice_labels();
            if !choices.is_empty()
                && !choices
                    .iter()
                    .any(|choice| choice.eq_ignore_ascii_case(jump.trigger.trim()))
            {
                issues.push(issue(
                    Severity::Warning,
                    "unknown_jump_trigger",
                    Some(question),
                    path,
                    format!("jump trigger '{}' is not one of the question's options", jump.trigger),
                ));
            }
        }

        for (slot, rule) in question.pdf_logic.iter().enumerate() {
            let path = format!("/{}/pdf_logic/{}", question.id, slot);
            if rule.target.is_none() {
                issues.push(issue(
                    Severity::Warning,
                    "calculation_without_target",
                    Some(question),
                    Some(path.clone()),
                    "calculation rule names no target and will be skipped".to_string(),
                ));
            }
            check_calculation(rule, Some(question), path, &mut issues);
        }
    }

    for hidden in &schema.hidden_fields {
        if hidden.name.trim().is_empty() {
            issues.push(issue(
                Severity::Error,
                "unnamed_hidden_field",
                None,
                Some("/hidden_fields".to_string()),
                "hidden field without a name".to_string(),
            ));
        }
        for (slot, rule) in hidden.hidden_logic.iter().enumerate() {
            let path = format!("/hidden_fields/{}/hidden_logic/{}", hidden.name, slot);
            check_calculation(rule, None, path, &mut issues);
        }
    }

    for (slot, pair) in schema.linking.iter().enumerate() {
        for side in [&pair.a, &pair.b] {
            let is_select = lookup(side.as_str()).is_some_and(|question| question.kind.is_select());
            if !is_select {
                issues.push(issue(
                    Severity::Error,
                    "invalid_link",
                    None,
                    Some(format!("/linking/{}", slot)),
                    format!("linked control '{}' is not a select question", side),
                ));
            }
        }
    }

    SchemaReport {
        valid: !issues.iter().any(|issue| issue.severity == Severity::Error),
        issues,
    }
}

/// Question by id, falling back to its slug.
fn find_question<'s>(
    schema: &'s FormSchema,
    slugs: &SlugRegistry,
    reference: &str,
) -> Option<&'s QuestionSpec> {
    schema.question(reference).or_else(|| {
        slugs
            .question_for(reference)
            .and_then(|id| schema.question(id))
    })
}

fn check_sections(schema: &FormSchema, issues: &mut Vec<SchemaIssue>) {
    if schema.sections.is_empty() {
        issues.push(issue(
            Severity::Error,
            "no_sections",
            None,
            Some("/sections".to_string()),
            "form has no sections".to_string(),
        ));
        return;
    }
    let ids: BTreeSet<u32> = schema.sections.iter().map(|section| section.id).collect();
    let expected: BTreeSet<u32> = (1..=u32::try_from(schema.sections.len()).unwrap_or(u32::MAX)).collect();
    if ids != expected {
        issues.push(issue(
            Severity::Error,
            "section_numbering",
            None,
            Some("/sections".to_string()),
            format!(
                "section ids must run 1..={} without gaps or repeats",
                schema.sections.len()
            ),
        ));
    }
}

fn check_options(question: &QuestionSpec, issues: &mut Vec<SchemaIssue>) {
    let path = Some(format!("/{}/options", question.id));
    if question.kind.has_options() && question.options.is_empty() {
        issues.push(issue(
            Severity::Warning,
            "missing_options",
            Some(question),
            path.clone(),
            format!("{} question has no options", question.kind.label()),
        ));
    }
    if question.kind != QuestionType::CheckboxGroup
        && question.options.iter().any(|option| option.exclusive)
    {
        issues.push(issue(
            Severity::Warning,
            "exclusive_outside_checkbox_group",
            Some(question),
            path.clone(),
            "only checkbox-group options can be exclusive".to_string(),
        ));
    }
    if question.kind != QuestionType::CheckboxGroup
        && question.options.iter().any(|option| option.amount)
    {
        issues.push(issue(
            Severity::Warning,
            "amount_outside_checkbox_group",
            Some(question),
            path,
            "only checkbox-group options can carry an amount".to_string(),
        ));
    }
    if question.kind == QuestionType::NumberedDropdown {
        match question.range {
            None => issues.push(issue(
                Severity::Warning,
                "missing_range",
                Some(question),
                Some(format!("/{}/range", question.id)),
                "numbered dropdown has no range".to_string(),
            )),
            Some(range) if range.min > range.max => issues.push(issue(
                Severity::Error,
                "invalid_range",
                Some(question),
                Some(format!("/{}/range", question.id)),
                format!("range {}..={} is empty", range.min, range.max),
            )),
            Some(_) => {}
        }
    }
}

fn check_calculation(
    rule: &CalculationRule,
    question: Option<&QuestionSpec>,
    path: String,
    issues: &mut Vec<SchemaIssue>,
) {
    if rule.terms.is_empty() {
        issues.push(issue(
            Severity::Warning,
            "empty_calculation",
            question,
            Some(path),
            "calculation rule has no terms and will be skipped".to_string(),
        ));
    }
}

fn issue(
    severity: Severity,
    code: &str,
    question: Option<&QuestionSpec>,
    path: Option<String>,
    message: String,
) -> SchemaIssue {
    SchemaIssue {
        code: code.to_string(),
        severity,
        question_id: question.map(|question| question.id.clone()),
        path,
        message,
    }
}

//! Per-schema lookup tables.
//!
//! [`SchemaIndex`] is built once from a [`FormSchema`] and then shared
//! read-only by every session filling that schema. It owns the slug of every
//! question, the generated control layout, the rule tables of the four rule
//! families, and the visibility dependency graph (`source control -> rules`).

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::error::FormError;
use crate::slug::SlugRegistry;
use crate::spec::{
    CalculationRule, Condition, FormSchema, HiddenFieldSpec, JumpTarget, QuestionSpec,
    QuestionType, SectionSpec, TargetKind,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ControlKind {
    Text,
    Select {
        options: Vec<String>,
        mirror: Option<String>,
    },
    Checkbox {
        value: String,
        amount: Option<String>,
        exclusive: bool,
    },
    /// Numeric sub-field of a checkbox option.
    Amount { parent: String },
    /// Hidden export copy of a dropdown's selected value.
    Mirror { select: String },
}

impl ControlKind {
    pub fn label(&self) -> &'static str {
        match self {
            ControlKind::Text => "text",
            ControlKind::Select { .. } => "select",
            ControlKind::Checkbox { .. } => "checkbox",
            ControlKind::Amount { .. } => "amount",
            ControlKind::Mirror { .. } => "mirror",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlSpec {
    pub name: String,
    /// `None` for form-level hidden fields.
    pub question_id: Option<String>,
    pub label: String,
    pub kind: ControlKind,
    pub hidden: bool,
    pub default_value: Option<String>,
}

impl ControlSpec {
    /// Controls that carry a question's answer (not sub-fields or mirrors).
    pub fn is_answer(&self) -> bool {
        self.question_id.is_some()
            && matches!(
                self.kind,
                ControlKind::Text | ControlKind::Select { .. } | ControlKind::Checkbox { .. }
            )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionEntry {
    pub id: String,
    pub slug: String,
    pub kind: QuestionType,
    pub section_id: u32,
    /// Answer controls in option order.
    pub answer_controls: Vec<String>,
    /// Every generated control the question owns.
    pub control_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityRule {
    pub question_id: String,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JumpRule {
    pub section_id: u32,
    pub question_id: String,
    pub question_type: QuestionType,
    pub trigger: String,
    pub target: JumpTarget,
}

/// All calculation rules writing one target, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationTarget {
    pub target: String,
    pub rules: Vec<CalculationRule>,
}

/// Unordered pair of linked select controls; the unit of the sync guard.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkChannel {
    low: String,
    high: String,
}

impl LinkChannel {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self {
                low: a.to_string(),
                high: b.to_string(),
            }
        } else {
            Self {
                low: b.to_string(),
                high: a.to_string(),
            }
        }
    }

    pub fn contains(&self, control: &str) -> bool {
        self.low == control || self.high == control
    }

    /// The side opposite `control`.
    pub fn other(&self, control: &str) -> &str {
        if self.low == control {
            &self.high
        } else {
            &self.low
        }
    }

    pub fn sides(&self) -> (&str, &str) {
        (&self.low, &self.high)
    }
}

#[derive(Debug, Clone)]
pub struct SchemaIndex {
    schema: FormSchema,
    section_count: u32,
    slugs: SlugRegistry,
    question_order: Vec<String>,
    questions: BTreeMap<String, QuestionEntry>,
    control_order: Vec<String>,
    controls: BTreeMap<String, ControlSpec>,
    visibility_rules: Vec<VisibilityRule>,
    dependents: BTreeMap<String, Vec<usize>>,
    jumps: BTreeMap<u32, Vec<JumpRule>>,
    calculations: Vec<CalculationTarget>,
    links: Vec<LinkChannel>,
}

impl SchemaIndex {
    pub fn from_json(json: &str) -> Result<Self, FormError> {
        Self::build(FormSchema::from_json(json)?)
    }

    pub fn build(mut schema: FormSchema) -> Result<Self, FormError> {
        let section_count = check_sections(&schema)?;
        schema.sections.sort_by_key(|section| section.id);

        let mut index = SchemaIndex {
            schema: FormSchema::default(),
            section_count,
            slugs: SlugRegistry::new(),
            question_order: Vec::new(),
            questions: BTreeMap::new(),
            control_order: Vec::new(),
            controls: BTreeMap::new(),
            visibility_rules: Vec::new(),
            dependents: BTreeMap::new(),
            jumps: BTreeMap::new(),
            calculations: Vec::new(),
            links: Vec::new(),
        };

        let mut seen = BTreeSet::new();
        for (_, question) in schema.questions() {
            if !seen.insert(question.id.clone()) {
                return Err(FormError::DuplicateQuestion(question.id.clone()));
            }
            index.slugs.assign(&question.id, &question.text);
        }

        for (section, question) in schema.questions() {
            index.register_question(section.id, question);
        }
        for hidden in &schema.hidden_fields {
            index.register_hidden_field(hidden);
        }
        for (section, question) in schema.questions() {
            index.register_visibility(question);
            index.register_jumps(section.id, question);
        }
        for hidden in &schema.hidden_fields {
            for rule in &hidden.hidden_logic {
                let target = rule.target.clone().unwrap_or_else(|| hidden.name.clone());
                index.register_calculation(&target, rule);
            }
        }
        for (_, question) in schema.questions() {
            for rule in &question.pdf_logic {
                match rule.target.clone() {
                    Some(target) => index.register_calculation(&target, rule),
                    None => warn!(question = %question.id, "calculation rule without target skipped"),
                }
            }
        }
        for pair in &schema.linking {
            index.register_link(&pair.a, &pair.b);
        }

        debug!(
            form = %schema.id,
            sections = section_count,
            questions = index.question_order.len(),
            controls = index.control_order.len(),
            "schema index built"
        );
        index.schema = schema;
        Ok(index)
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    pub fn section_count(&self) -> u32 {
        self.section_count
    }

    pub fn section(&self, id: u32) -> Option<&SectionSpec> {
        self.schema.sections.iter().find(|section| section.id == id)
    }

    pub fn slugs(&self) -> &SlugRegistry {
        &self.slugs
    }

    pub fn question(&self, id: &str) -> Option<&QuestionEntry> {
        self.questions.get(id)
    }

    pub fn question_spec(&self, id: &str) -> Option<&QuestionSpec> {
        self.schema.question(id)
    }

    /// Looks a question up by author id, falling back to its slug.
    pub fn resolve_question(&self, reference: &str) -> Option<&QuestionEntry> {
        self.questions.get(reference).or_else(|| {
            self.slugs
                .question_for(reference)
                .and_then(|id| self.questions.get(id))
        })
    }

    pub fn questions(&self) -> impl Iterator<Item = &QuestionEntry> {
        self.question_order
            .iter()
            .filter_map(|id| self.questions.get(id))
    }

    pub fn control(&self, name: &str) -> Option<&ControlSpec> {
        self.controls.get(name)
    }

    pub fn controls(&self) -> impl Iterator<Item = &ControlSpec> {
        self.control_order
            .iter()
            .filter_map(|name| self.controls.get(name))
    }

    pub fn visibility_rules(&self) -> &[VisibilityRule] {
        &self.visibility_rules
    }

    pub fn visibility_rule(&self, question_id: &str) -> Option<&VisibilityRule> {
        self.visibility_rules
            .iter()
            .find(|rule| rule.question_id == question_id)
    }

    /// Indices into [`Self::visibility_rules`] of rules reading `control`.
    pub fn dependents_of(&self, control: &str) -> &[usize] {
        self.dependents
            .get(control)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Source controls of the dependency graph.
    pub fn dependency_sources(&self) -> impl Iterator<Item = &str> {
        self.dependents.keys().map(String::as_str)
    }

    pub fn jump_rules(&self, section_id: u32) -> &[JumpRule] {
        self.jumps
            .get(&section_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn calculation_targets(&self) -> &[CalculationTarget] {
        &self.calculations
    }

    pub fn links(&self) -> &[LinkChannel] {
        &self.links
    }

    pub fn links_for<'a>(&'a self, control: &'a str) -> impl Iterator<Item = &'a LinkChannel> {
        self.links
            .iter()
            .filter(move |channel| channel.contains(control))
    }

    fn unique_control_name(&self, candidate: String) -> String {
        if !self.controls.contains_key(&candidate) {
            return candidate;
        }
        let mut counter = 2;
        loop {
            let next = format!("{candidate}_{counter}");
            if !self.controls.contains_key(&next) {
                warn!(control = %candidate, renamed = %next, "control name collision");
                return next;
            }
            counter += 1;
        }
    }

    fn insert_control(&mut self, entry: Option<&mut QuestionEntry>, spec: ControlSpec) -> String {
        let name = spec.name.clone();
        if let Some(entry) = entry {
            if spec.is_answer() {
                entry.answer_controls.push(name.clone());
            }
            entry.control_names.push(name.clone());
        }
        self.control_order.push(name.clone());
        self.controls.insert(name.clone(), spec);
        name
    }

    fn register_question(&mut self, section_id: u32, question: &QuestionSpec) {
        let slug = self
            .slugs
            .get(&question.id)
            .map(str::to_string)
            .unwrap_or_else(|| crate::slug::fallback_slug(&question.id));
        let mut entry = QuestionEntry {
            id: question.id.clone(),
            slug: slug.clone(),
            kind: question.kind,
            section_id,
            answer_controls: Vec::new(),
            control_names: Vec::new(),
        };
        let owner = Some(question.id.clone());

        match question.kind {
            QuestionType::ShortText
            | QuestionType::Paragraph
            | QuestionType::Money
            | QuestionType::Date
            | QuestionType::Email
            | QuestionType::Phone => {
                let name = self.unique_control_name(slug.clone());
                self.insert_control(
                    Some(&mut entry),
                    ControlSpec {
                        name,
                        question_id: owner,
                        label: question.text.clone(),
                        kind: ControlKind::Text,
                        hidden: false,
                        default_value: question.default_value.clone(),
                    },
                );
            }
            QuestionType::DateRange => {
                for part in ["start", "end"] {
                    let candidate = self.slugs.control_name(&question.id, "", part);
                    let name = self.unique_control_name(candidate);
                    self.insert_control(
                        Some(&mut entry),
                        ControlSpec {
                            name,
                            question_id: owner.clone(),
                            label: part.to_string(),
                            kind: ControlKind::Text,
                            hidden: false,
                            default_value: None,
                        },
                    );
                }
            }
            QuestionType::SingleChoice | QuestionType::Dropdown | QuestionType::NumberedDropdown => {
                let name = self.unique_control_name(slug.clone());
                let mirror = question
                    .kind
                    .is_dropdown()
                    .then(|| self.unique_control_name(format!("{slug}_selected")));
                let select = self.insert_control(
                    Some(&mut entry),
                    ControlSpec {
                        name,
                        question_id: owner.clone(),
                        label: question.text.clone(),
                        kind: ControlKind::Select {
                            options: question.choice_labels(),
                            mirror: mirror.clone(),
                        },
                        hidden: false,
                        default_value: question.default_value.clone(),
                    },
                );
                if let Some(mirror) = mirror {
                    self.insert_control(
                        Some(&mut entry),
                        ControlSpec {
                            name: mirror,
                            question_id: owner,
                            label: question.text.clone(),
                            kind: ControlKind::Mirror { select },
                            hidden: true,
                            default_value: None,
                        },
                    );
                }
            }
            QuestionType::CheckboxGroup => {
                for option in &question.options {
                    let hint = option.name.as_deref().unwrap_or_default();
                    let candidate = self.slugs.control_name(&question.id, hint, &option.label);
                    let name = self.unique_control_name(candidate);
                    let amount = option
                        .amount
                        .then(|| self.unique_control_name(format!("{name}_amount")));
                    let checked_by_default = question
                        .default_value
                        .as_deref()
                        .is_some_and(|default| default.eq_ignore_ascii_case(&option.label));
                    let parent = self.insert_control(
                        Some(&mut entry),
                        ControlSpec {
                            name,
                            question_id: owner.clone(),
                            label: option.label.clone(),
                            kind: ControlKind::Checkbox {
                                value: option.label.clone(),
                                amount: amount.clone(),
                                exclusive: option.exclusive,
                            },
                            hidden: false,
                            default_value: checked_by_default.then(|| "true".to_string()),
                        },
                    );
                    if let Some(amount) = amount {
                        self.insert_control(
                            Some(&mut entry),
                            ControlSpec {
                                name: amount,
                                question_id: owner.clone(),
                                label: format!("{} amount", option.label),
                                kind: ControlKind::Amount { parent },
                                hidden: !checked_by_default,
                                default_value: None,
                            },
                        );
                    }
                }
            }
            QuestionType::RepeatedTextboxSet => {
                for option in &question.options {
                    let hint = option.name.as_deref().unwrap_or_default();
                    let candidate = self.slugs.control_name(&question.id, hint, &option.label);
                    let name = self.unique_control_name(candidate);
                    self.insert_control(
                        Some(&mut entry),
                        ControlSpec {
                            name,
                            question_id: owner.clone(),
                            label: option.label.clone(),
                            kind: ControlKind::Text,
                            hidden: false,
                            default_value: None,
                        },
                    );
                }
            }
        }

        self.question_order.push(question.id.clone());
        self.questions.insert(question.id.clone(), entry);
    }

    fn register_hidden_field(&mut self, hidden: &HiddenFieldSpec) {
        if hidden.name.trim().is_empty() {
            warn!("hidden field without a name skipped");
            return;
        }
        if self.controls.contains_key(&hidden.name) {
            warn!(field = %hidden.name, "hidden field shadows an existing control; skipped");
            return;
        }
        let kind = match hidden.kind {
            TargetKind::Text => ControlKind::Text,
            TargetKind::Checkbox => ControlKind::Checkbox {
                value: hidden.name.clone(),
                amount: None,
                exclusive: false,
            },
        };
        self.insert_control(
            None,
            ControlSpec {
                name: hidden.name.clone(),
                question_id: None,
                label: hidden.name.clone(),
                kind,
                hidden: true,
                default_value: hidden.default_value.clone(),
            },
        );
    }

    fn register_visibility(&mut self, question: &QuestionSpec) {
        let Some(logic) = &question.logic else {
            return;
        };
        if logic.conditions.is_empty() {
            return;
        }

        let rule_index = self.visibility_rules.len();
        self.visibility_rules.push(VisibilityRule {
            question_id: question.id.clone(),
            conditions: logic.conditions.clone(),
        });

        for condition in &logic.conditions {
            let sources = match self.resolve_question(&condition.question) {
                Some(source) => source.answer_controls.clone(),
                None => {
                    debug!(
                        question = %question.id,
                        source = %condition.question,
                        "visibility source does not resolve; condition is inert"
                    );
                    continue;
                }
            };
            for source in sources {
                let dependents = self.dependents.entry(source).or_default();
                if !dependents.contains(&rule_index) {
                    dependents.push(rule_index);
                }
            }
        }
    }

    fn register_jumps(&mut self, section_id: u32, question: &QuestionSpec) {
        for jump in &question.jump {
            self.jumps.entry(section_id).or_default().push(JumpRule {
                section_id,
                question_id: question.id.clone(),
                question_type: question.kind,
                trigger: jump.trigger.clone(),
                target: jump.target.clone(),
            });
        }
    }

    fn register_calculation(&mut self, target: &str, rule: &CalculationRule) {
        if rule.terms.is_empty() {
            warn!(target = %target, "calculation rule without terms skipped");
            return;
        }
        let mut rule = rule.clone();
        rule.target = Some(target.to_string());

        match self
            .calculations
            .iter_mut()
            .find(|existing| existing.target == target)
        {
            Some(existing) => existing.rules.push(rule),
            None => self.calculations.push(CalculationTarget {
                target: target.to_string(),
                rules: vec![rule],
            }),
        }
    }

    /// Control name of a select referenced directly or through its question.
    fn resolve_select(&self, reference: &str) -> Option<String> {
        let is_select = |name: &str| {
            matches!(
                self.controls.get(name).map(|spec| &spec.kind),
                Some(ControlKind::Select { .. })
            )
        };
        if is_select(reference) {
            return Some(reference.to_string());
        }
        self.resolve_question(reference)
            .and_then(|question| question.answer_controls.first())
            .filter(|name| is_select(name.as_str()))
            .cloned()
    }

    fn register_link(&mut self, a: &str, b: &str) {
        let (Some(a), Some(b)) = (self.resolve_select(a), self.resolve_select(b)) else {
            warn!(a = %a, b = %b, "linked pair does not name two select controls; skipped");
            return;
        };
        if a == b {
            return;
        }
        let channel = LinkChannel::new(&a, &b);
        if !self.links.contains(&channel) {
            self.links.push(channel);
        }
    }
}

/// Ensures section ids are exactly `1..=N`; returns `N`.
fn check_sections(schema: &FormSchema) -> Result<u32, FormError> {
    if schema.sections.is_empty() {
        return Err(FormError::NoSections(schema.id.clone()));
    }
    let mut ids: Vec<u32> = schema.sections.iter().map(|section| section.id).collect();
    ids.sort_unstable();
    let expected = u32::try_from(ids.len()).unwrap_or(u32::MAX);
    let dense = ids
        .iter()
        .zip(1..=expected)
        .all(|(found, wanted)| *found == wanted);
    if !dense {
        return Err(FormError::SectionNumbering {
            expected,
            found: schema.sections.iter().map(|section| section.id).collect(),
        });
    }
    Ok(expected)
}

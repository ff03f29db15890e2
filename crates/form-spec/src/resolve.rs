//! Numeric lookup of calculation terms and inline expression operands.
//!
//! Field references reach the engine either as final generated names or as
//! author-time shorthands. [`TermResolver`] tries an ordered list of locator
//! tiers; the first tier that finds a live control decides which control is
//! read, and a reference no tier can place reads as `0`.

use std::sync::LazyLock;

use regex::Regex;

use crate::fields::{FieldStore, parse_numeric};
use crate::index::{ControlKind, SchemaIndex};
use crate::slug::slugify;

/// Maps a reference to the name of a live control.
pub type Locator = fn(&str, &FieldStore, &SchemaIndex) -> Option<String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub tier: &'static str,
    pub control: String,
}

#[derive(Debug, Clone)]
pub struct TermResolver {
    tiers: Vec<(&'static str, Locator)>,
}

impl Default for TermResolver {
    fn default() -> Self {
        Self {
            tiers: vec![
                ("direct", locate_direct as Locator),
                ("name", locate_by_name as Locator),
                ("shorthand", locate_shorthand as Locator),
            ],
        }
    }
}

impl TermResolver {
    /// Resolver with a custom tier list, tried in the given order.
    pub fn with_tiers(tiers: Vec<(&'static str, Locator)>) -> Self {
        Self { tiers }
    }

    pub fn tier_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tiers.iter().map(|(name, _)| *name)
    }

    pub fn locate(&self, reference: &str, fields: &FieldStore, index: &SchemaIndex) -> Option<Located> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        self.tiers.iter().find_map(|&(tier, locator)| {
            locator(reference, fields, index).map(|control| Located { tier, control })
        })
    }

    /// Numeric value of `reference`; `0` when nothing resolves.
    pub fn value(&self, reference: &str, fields: &FieldStore, index: &SchemaIndex) -> f64 {
        self.locate(reference, fields, index)
            .map(|located| read_numeric(&located.control, fields, index))
            .unwrap_or(0.0)
    }

    /// Controls whose change can alter the value of `reference`.
    pub fn watched_controls(
        &self,
        reference: &str,
        fields: &FieldStore,
        index: &SchemaIndex,
    ) -> Vec<String> {
        let mut watched = vec![reference.trim().to_string()];
        if let Some(located) = self.locate(reference, fields, index) {
            if let Some(ControlKind::Checkbox {
                amount: Some(amount),
                ..
            }) = index.control(&located.control).map(|spec| &spec.kind)
            {
                watched.push(amount.clone());
            }
            watched.push(located.control);
        }
        watched
    }
}

/// Reads a control as a number. Checkboxes read their amount sub-field while
/// checked (when they have one), otherwise `1` / `0`. Non-numeric text is `0`.
pub fn read_numeric(control: &str, fields: &FieldStore, index: &SchemaIndex) -> f64 {
    if let Some(checked) = fields.is_checked(control) {
        if !checked {
            return 0.0;
        }
        let amount = match index.control(control).map(|spec| &spec.kind) {
            Some(ControlKind::Checkbox {
                amount: Some(amount),
                ..
            }) => Some(amount.as_str()),
            _ => None,
        };
        return match amount {
            Some(amount) => fields.text(amount).and_then(parse_numeric).unwrap_or(0.0),
            None => 1.0,
        };
    }
    fields.text(control).and_then(parse_numeric).unwrap_or(0.0)
}

/// Tier 1: the reference is a live control name.
pub fn locate_direct(reference: &str, fields: &FieldStore, _index: &SchemaIndex) -> Option<String> {
    fields.contains(reference).then(|| reference.to_string())
}

/// Tier 2: the reference is display text, a question id or slug, or a
/// control name in different case.
pub fn locate_by_name(reference: &str, fields: &FieldStore, index: &SchemaIndex) -> Option<String> {
    let slug = slugify(reference);
    if !slug.is_empty() && fields.contains(&slug) {
        return Some(slug);
    }
    if let Some(control) = index
        .resolve_question(reference)
        .or_else(|| index.resolve_question(&slug))
        .and_then(|question| question.answer_controls.first())
        .filter(|control| fields.contains(control))
    {
        return Some(control.clone());
    }
    fields
        .names()
        .find(|name| name.eq_ignore_ascii_case(reference))
        .map(str::to_string)
}

static SHORTHAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^question[_-]?(?P<question>[a-z0-9]+)(?:[_-]entry[_-]?(?P<entry>\d+))?(?:[_-]field[_-]?(?P<field>\d+))?$",
    )
    .expect("static pattern is valid")
});

/// Tier 3: legacy `question<id>[_entry<n>][_field<m>]` shorthand.
///
/// `entry` picks the n-th answer control of the question (1-based, default 1);
/// `field` 1 is the control itself and 2 its amount sub-field.
pub fn locate_shorthand(reference: &str, fields: &FieldStore, index: &SchemaIndex) -> Option<String> {
    let caps = SHORTHAND.captures(reference)?;
    let question = index.resolve_question(&caps["question"])?;
    let entry = caps
        .name("entry")
        .and_then(|entry| entry.as_str().parse::<usize>().ok())
        .unwrap_or(1);
    let field = caps
        .name("field")
        .and_then(|field| field.as_str().parse::<usize>().ok())
        .unwrap_or(1);

    let control = question.answer_controls.get(entry.checked_sub(1)?)?;
    let chosen = match field {
        1 => control.clone(),
        2 => match index.control(control).map(|spec| &spec.kind) {
            Some(ControlKind::Checkbox {
                amount: Some(amount),
                ..
            }) => amount.clone(),
            _ => return None,
        },
        _ => return None,
    };
    fields.contains(&chosen).then_some(chosen)
}

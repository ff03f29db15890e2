use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::expr::ArithOp;

/// One `(source question, expected answer)` pair of a visibility rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Condition {
    pub question: String,
    pub answer: String,
}

/// Conditions combined by logical OR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct VisibilityLogic {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Destination of a jump: a section number or a marker such as `"end"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum JumpTarget {
    Section(u32),
    Marker(String),
}

/// Where a jump lands once its target has been interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Section(u32),
    End,
}

impl JumpTarget {
    /// `None` for markers that are neither `end` nor a number.
    pub fn destination(&self) -> Option<Destination> {
        match self {
            JumpTarget::Section(id) => Some(Destination::Section(*id)),
            JumpTarget::Marker(marker) => {
                let marker = marker.trim();
                if marker.eq_ignore_ascii_case("end") {
                    Some(Destination::End)
                } else {
                    marker.parse::<u32>().ok().map(Destination::Section)
                }
            }
        }
    }
}

/// A jump declared on a question: when its answer equals `trigger`, advancing
/// from the question's section goes to `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JumpSpec {
    pub trigger: String,
    pub target: JumpTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Checkbox,
    #[default]
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Term {
    /// Absent on the first term.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<ArithOp>,
    pub field: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum CompareOp {
    #[serde(rename = "=", alias = "==")]
    Eq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
}

impl CompareOp {
    pub const EPSILON: f64 = 1e-6;

    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            CompareOp::Eq => (value - threshold).abs() < Self::EPSILON,
            CompareOp::Lt => value < threshold,
            CompareOp::Gt => value > threshold,
        }
    }
}

/// Value written to the target when a rule's comparison holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Checked,
    Unchecked,
    /// Literal text; `##total##` is replaced by the accumulator with two decimals.
    Text { value: String },
}

impl Outcome {
    pub const TOTAL_MARKER: &'static str = "##total##";

    /// Text form of the outcome for a given accumulator.
    pub fn render(&self, total: f64) -> String {
        match self {
            Outcome::Checked => "true".to_string(),
            Outcome::Unchecked => "false".to_string(),
            Outcome::Text { value } => value.replace(Self::TOTAL_MARKER, &format!("{total:.2}")),
        }
    }
}

/// Derived-field rule: fold the terms, compare against the threshold, and on
/// success write the outcome into `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CalculationRule {
    /// Implied by the enclosing hidden field when omitted there.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub target_kind: TargetKind,
    #[serde(default)]
    pub terms: Vec<Term>,
    pub compare: CompareOp,
    pub threshold: f64,
    pub outcome: Outcome,
}

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::spec::rules::{CalculationRule, JumpSpec, VisibilityLogic};

/// Supported question kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    ShortText,
    Paragraph,
    Money,
    Date,
    DateRange,
    Email,
    Phone,
    SingleChoice,
    Dropdown,
    CheckboxGroup,
    RepeatedTextboxSet,
    NumberedDropdown,
}

impl QuestionType {
    pub fn label(self) -> &'static str {
        match self {
            QuestionType::ShortText => "short-text",
            QuestionType::Paragraph => "paragraph",
            QuestionType::Money => "money",
            QuestionType::Date => "date",
            QuestionType::DateRange => "date-range",
            QuestionType::Email => "email",
            QuestionType::Phone => "phone",
            QuestionType::SingleChoice => "single-choice",
            QuestionType::Dropdown => "dropdown",
            QuestionType::CheckboxGroup => "checkbox-group",
            QuestionType::RepeatedTextboxSet => "repeated-textbox-set",
            QuestionType::NumberedDropdown => "numbered-dropdown",
        }
    }

    /// Kinds rendered as a single select control.
    pub fn is_select(self) -> bool {
        matches!(
            self,
            QuestionType::SingleChoice | QuestionType::Dropdown | QuestionType::NumberedDropdown
        )
    }

    /// Select kinds that mirror their value into hidden export fields.
    pub fn is_dropdown(self) -> bool {
        matches!(self, QuestionType::Dropdown | QuestionType::NumberedDropdown)
    }

    pub fn has_options(self) -> bool {
        matches!(
            self,
            QuestionType::SingleChoice
                | QuestionType::Dropdown
                | QuestionType::CheckboxGroup
                | QuestionType::RepeatedTextboxSet
        )
    }
}

/// One selectable option (or one textbox of a repeated set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OptionSpec {
    pub label: String,
    /// Raw control name chosen at authoring time; empty means derive from the label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The "none of the above" option of a checkbox group.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub exclusive: bool,
    /// Attaches a numeric amount sub-field shown while the option is checked.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub amount: bool,
}

/// Inclusive bounds of a numbered dropdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NumberRange {
    pub min: i64,
    pub max: i64,
}

impl NumberRange {
    pub fn labels(&self) -> Vec<String> {
        (self.min..=self.max).map(|value| value.to_string()).collect()
    }
}

/// Definition for a single question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuestionSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<NumberRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<VisibilityLogic>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jump: Vec<JumpSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pdf_logic: Vec<CalculationRule>,
}

impl QuestionSpec {
    /// Option labels offered by a select control of this question.
    pub fn choice_labels(&self) -> Vec<String> {
        match (self.kind, self.range) {
            (QuestionType::NumberedDropdown, Some(range)) => range.labels(),
            _ => self
                .options
                .iter()
                .map(|option| option.label.clone())
                .collect(),
        }
    }
}

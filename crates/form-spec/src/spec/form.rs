use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::FormError;
use crate::spec::question::QuestionSpec;
use crate::spec::rules::{CalculationRule, TargetKind};

/// A numbered group of questions shown together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SectionSpec {
    /// 1-based, dense across the form.
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub questions: Vec<QuestionSpec>,
}

/// A form-level control that is never filled by the user; its value comes
/// from its calculation rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HiddenFieldSpec {
    pub name: String,
    #[serde(default)]
    pub kind: TargetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden_logic: Vec<CalculationRule>,
}

/// Two dropdown-like controls kept in sync by value. Either side may name a
/// generated control or the id of a choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LinkedPair {
    pub a: String,
    pub b: String,
}

/// Top-level questionnaire definition as produced by the authoring step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct FormSchema {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sections: Vec<SectionSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden_fields: Vec<HiddenFieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linking: Vec<LinkedPair>,
}

impl FormSchema {
    pub fn from_json(json: &str) -> Result<Self, FormError> {
        serde_json::from_str(json).map_err(FormError::SchemaParse)
    }

    pub fn questions(&self) -> impl Iterator<Item = (&SectionSpec, &QuestionSpec)> {
        self.sections.iter().flat_map(|section| {
            section
                .questions
                .iter()
                .map(move |question| (section, question))
        })
    }

    pub fn question(&self, id: &str) -> Option<&QuestionSpec> {
        self.questions()
            .map(|(_, question)| question)
            .find(|question| question.id == id)
    }
}

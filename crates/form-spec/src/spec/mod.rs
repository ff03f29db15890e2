pub mod form;
pub mod question;
pub mod rules;

pub use form::{FormSchema, HiddenFieldSpec, LinkedPair, SectionSpec};
pub use question::{NumberRange, OptionSpec, QuestionSpec, QuestionType};
pub use rules::{
    CalculationRule, CompareOp, Condition, Destination, JumpSpec, JumpTarget, Outcome, TargetKind,
    Term, VisibilityLogic,
};

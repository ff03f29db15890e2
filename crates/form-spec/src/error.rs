use thiserror::Error;

/// Hard failures at the engine boundary. Everything inside the fill-time
/// pipeline degrades locally instead of returning one of these.
#[derive(Debug, Error)]
pub enum FormError {
    #[error("failed to parse form schema: {0}")]
    SchemaParse(#[source] serde_json::Error),
    #[error("form '{0}' has no sections")]
    NoSections(String),
    #[error("section ids must run 1..={expected} without gaps, found {found:?}")]
    SectionNumbering { expected: u32, found: Vec<u32> },
    #[error("question id '{0}' is declared more than once")]
    DuplicateQuestion(String),
    #[error("unknown control '{0}'")]
    UnknownControl(String),
    #[error("control '{control}' is a {actual} control")]
    KindMismatch {
        control: String,
        actual: &'static str,
    },
    #[error("'{value}' is not an option of '{control}'")]
    UnknownOption { control: String, value: String },
    #[error("snapshot cbor codec failed: {0}")]
    SnapshotCbor(#[from] serde_cbor::Error),
    #[error("snapshot json codec failed: {0}")]
    SnapshotJson(#[source] serde_json::Error),
}

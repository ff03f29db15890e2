#![allow(missing_docs)]

pub mod calc;
pub mod error;
pub mod expr;
pub mod fields;
pub mod index;
pub mod navigation;
pub mod render;
pub mod resolve;
pub mod session;
pub mod slug;
pub mod spec;
pub mod sync;
pub mod validate;
pub mod visibility;

pub use error::FormError;
pub use expr::{ArithOp, substitute};
pub use fields::{FieldSnapshot, FieldStore, FieldValue};
pub use index::{ControlKind, ControlSpec, LinkChannel, QuestionEntry, SchemaIndex};
pub use navigation::{Finalizer, NavigationState, Position, Transition};
pub use render::{
    RenderControl, RenderPayload, RenderProgress, RenderQuestion, RenderStatus,
    build_render_payload, render_json_ui, render_text,
};
pub use resolve::{Locator, TermResolver};
pub use session::{ChangeReport, FormSession};
pub use slug::{SlugRegistry, slugify};
pub use spec::{FormSchema, QuestionSpec, QuestionType, SectionSpec};
pub use sync::{SyncWarning, Synchronizer};
pub use validate::{SchemaIssue, SchemaReport, Severity, validate_schema};
pub use visibility::{VisibilityChange, VisibilityEvaluator, VisibilityMap, resolve_visibility};

use std::cell::Cell;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use form_spec::{
    FieldSnapshot, FormError, FormSchema, FormSession, NavigationState, SchemaIndex,
    build_render_payload, render_json_ui as form_render_json_ui, render_text as form_render_text,
    validate_schema as form_validate_schema,
};

const DEFAULT_SCHEMA: &str = include_str!("../../form-spec/tests/fixtures/household.json");

#[derive(Debug, Error)]
enum ComponentError {
    #[error("failed to parse config/{0}")]
    ConfigParse(#[source] serde_json::Error),
    #[error("failed to parse session state: {0}")]
    StateParse(#[source] serde_json::Error),
    #[error("form '{0}' is not available")]
    FormUnavailable(String),
    #[error("json encode error: {0}")]
    JsonEncode(#[source] serde_json::Error),
    #[error(transparent)]
    Form(#[from] FormError),
}

#[derive(Debug, Deserialize, Serialize, Default)]
struct ComponentConfig {
    #[serde(default)]
    form_schema_json: Option<String>,
}

/// Everything a host persists between calls.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SessionState {
    #[serde(default)]
    pub values: FieldSnapshot,
    #[serde(default)]
    pub navigation: NavigationState,
}

fn load_schema(config_json: &str) -> Result<FormSchema, ComponentError> {
    let config = if config_json.trim().is_empty() {
        ComponentConfig::default()
    } else {
        serde_json::from_str(config_json).map_err(ComponentError::ConfigParse)?
    };

    let schema_json = config.form_schema_json.as_deref().unwrap_or(DEFAULT_SCHEMA);

    serde_json::from_str(schema_json).map_err(ComponentError::ConfigParse)
}

fn ensure_form(form_id: &str, config_json: &str) -> Result<SchemaIndex, ComponentError> {
    let schema = load_schema(config_json)?;
    if schema.id != form_id {
        Err(ComponentError::FormUnavailable(form_id.to_string()))
    } else {
        Ok(SchemaIndex::build(schema)?)
    }
}

fn parse_state(state_json: &str) -> Result<SessionState, ComponentError> {
    if state_json.trim().is_empty() {
        return Ok(SessionState::default());
    }
    serde_json::from_str(state_json).map_err(ComponentError::StateParse)
}

fn session_state(session: &FormSession<'_>) -> Result<Value, ComponentError> {
    let state = SessionState {
        values: session.snapshot(),
        navigation: session.navigation().clone(),
    };
    serde_json::to_value(state).map_err(ComponentError::JsonEncode)
}

/// Runs `action` on a session restored from `state_json` and reports whether
/// the finalizer fired.
fn with_session<T>(
    index: &SchemaIndex,
    state_json: &str,
    action: impl FnOnce(&mut FormSession<'_>) -> Result<T, ComponentError>,
) -> Result<(T, Value, bool), ComponentError> {
    let state = parse_state(state_json)?;
    let finalized = Cell::new(false);
    let mut session = FormSession::with_finalizer(index, || finalized.set(true));
    let skipped = session.resume(&state.values, state.navigation);
    if skipped > 0 {
        debug!(skipped, "state entries did not match the schema");
    }
    let output = action(&mut session)?;
    let state = session_state(&session)?;
    let ui = form_render_json_ui(&build_render_payload(&session));
    Ok((output, json!({ "state": state, "ui": ui }), finalized.get()))
}

fn respond(result: Result<Value, ComponentError>) -> String {
    match result {
        Ok(value) => serde_json::to_string(&value).unwrap_or_else(|error| {
            json!({"error": format!("json encode: {}", error)}).to_string()
        }),
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

fn respond_string(result: Result<String, ComponentError>) -> String {
    match result {
        Ok(value) => value,
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

fn merge(mut envelope: Value, key: &str, value: Value) -> Value {
    if let Some(map) = envelope.as_object_mut() {
        map.insert(key.to_string(), value);
    }
    envelope
}

pub fn describe(form_id: &str, config_json: &str) -> String {
    respond(load_schema(config_json).and_then(|schema| {
        if schema.id != form_id {
            Err(ComponentError::FormUnavailable(form_id.to_string()))
        } else {
            serde_json::to_value(schema).map_err(ComponentError::JsonEncode)
        }
    }))
}

/// Fresh session: defaults applied, calculations run once, section 1 shown.
pub fn start(form_id: &str, config_json: &str) -> String {
    respond(ensure_form(form_id, config_json).and_then(|index| {
        let (_, envelope, _) = with_session(&index, "", |_| Ok(()))?;
        Ok(envelope)
    }))
}

/// Applies one value change. `value_json` is a JSON string, number or bool.
pub fn apply_change(
    form_id: &str,
    config_json: &str,
    state_json: &str,
    control: &str,
    value_json: &str,
) -> String {
    respond(ensure_form(form_id, config_json).and_then(|index| {
        let value: Value = serde_json::from_str(value_json).map_err(ComponentError::ConfigParse)?;
        let ((report, warnings), envelope, _) = with_session(&index, state_json, |session| {
            let report = match &value {
                Value::Bool(flag) => session.set_value(control, &flag.to_string())?,
                Value::String(text) => session.set_value(control, text)?,
                Value::Null => session.set_value(control, "")?,
                other => session.set_value(control, &other.to_string())?,
            };
            let warnings = session
                .take_warnings()
                .iter()
                .map(|warning| warning.to_string())
                .collect::<Vec<_>>();
            Ok((report, warnings))
        })?;
        let report = serde_json::to_value(report).map_err(ComponentError::JsonEncode)?;
        Ok(merge(
            merge(envelope, "report", report),
            "warnings",
            json!(warnings),
        ))
    }))
}

pub fn advance(form_id: &str, config_json: &str, state_json: &str) -> String {
    respond(ensure_form(form_id, config_json).and_then(|index| {
        let (transition, envelope, finalized) =
            with_session(&index, state_json, |session| Ok(session.advance()))?;
        let transition = serde_json::to_value(transition).map_err(ComponentError::JsonEncode)?;
        Ok(merge(
            merge(envelope, "transition", transition),
            "finalized",
            Value::Bool(finalized),
        ))
    }))
}

pub fn retreat(form_id: &str, config_json: &str, state_json: &str) -> String {
    respond(ensure_form(form_id, config_json).and_then(|index| {
        let (transition, envelope, _) =
            with_session(&index, state_json, |session| Ok(session.retreat()))?;
        let transition = serde_json::to_value(transition).map_err(ComponentError::JsonEncode)?;
        Ok(merge(envelope, "transition", transition))
    }))
}

/// Explicit submission: finalizes and returns the flat values for export.
pub fn submit(form_id: &str, config_json: &str, state_json: &str) -> String {
    respond(ensure_form(form_id, config_json).and_then(|index| {
        let (values, _, finalized) = with_session(&index, state_json, |session| {
            session.submit();
            Ok(session.snapshot())
        })?;
        Ok(json!({
            "status": if finalized { "submitted" } else { "pending" },
            "values": values,
        }))
    }))
}

pub fn render_text(form_id: &str, config_json: &str, state_json: &str) -> String {
    respond_string(ensure_form(form_id, config_json).and_then(|index| {
        let (text, _, _) = with_session(&index, state_json, |session| {
            Ok(form_render_text(&build_render_payload(session)))
        })?;
        Ok(text)
    }))
}

pub fn render_json_ui(form_id: &str, config_json: &str, state_json: &str) -> String {
    respond(ensure_form(form_id, config_json).and_then(|index| {
        let (ui, _, _) = with_session(&index, state_json, |session| {
            Ok(form_render_json_ui(&build_render_payload(session)))
        })?;
        Ok(ui)
    }))
}

/// Lint report for the configured schema; works on schemas that fail to index.
pub fn validate_schema(config_json: &str) -> String {
    respond(load_schema(config_json).and_then(|schema| {
        serde_json::to_value(form_validate_schema(&schema)).map_err(ComponentError::JsonEncode)
    }))
}

use serde_json::{Map, Value, json};

use crate::index::ControlKind;
use crate::navigation::Position;
use crate::session::FormSession;
use crate::spec::QuestionType;

/// Status labels returned by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// A section is being filled.
    InProgress,
    /// The form reached its end.
    Complete,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::InProgress => "in_progress",
            RenderStatus::Complete => "complete",
        }
    }
}

/// Current section out of the section count.
#[derive(Debug, Clone, Copy)]
pub struct RenderProgress {
    pub section: Option<u32>,
    pub total: u32,
}

/// One generated control of a question.
#[derive(Debug, Clone)]
pub struct RenderControl {
    pub name: String,
    pub label: String,
    pub kind: &'static str,
    pub hidden: bool,
    pub value: String,
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct RenderQuestion {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub kind: QuestionType,
    pub visible: bool,
    pub controls: Vec<RenderControl>,
}

/// Collected payload used by both text and JSON renderers.
#[derive(Debug, Clone)]
pub struct RenderPayload {
    pub form_id: String,
    pub form_title: String,
    pub status: RenderStatus,
    pub section_title: Option<String>,
    pub progress: RenderProgress,
    pub help: Option<String>,
    pub questions: Vec<RenderQuestion>,
    pub warnings: Vec<String>,
}

/// Build the renderer payload for the session's current section.
pub fn build_render_payload(session: &FormSession<'_>) -> RenderPayload {
    let index = session.index();
    let schema = index.schema();
    let position = session.current_section();
    let section = position.section().and_then(|id| index.section(id));

    let questions = section
        .map(|section| {
            section
                .questions
                .iter()
                .filter_map(|question| {
                    let entry = index.question(&question.id)?;
                    let controls = entry
                        .control_names
                        .iter()
                        .filter_map(|name| {
                            let spec = index.control(name)?;
                            Some(RenderControl {
                                name: name.clone(),
                                label: spec.label.clone(),
                                kind: spec.kind.label(),
                                hidden: session.fields().is_hidden(name),
                                value: session.value(name).unwrap_or_default().to_string(),
                                options: match &spec.kind {
                                    ControlKind::Select { options, .. } => Some(options.clone()),
                                    _ => None,
                                },
                            })
                        })
                        .collect();
                    Some(RenderQuestion {
                        id: question.id.clone(),
                        slug: entry.slug.clone(),
                        title: session.substitute(&question.text),
                        description: question
                            .description
                            .as_deref()
                            .map(|text| session.substitute(text)),
                        kind: question.kind,
                        visible: session.is_visible(&question.id),
                        controls,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let status = match position {
        Position::End => RenderStatus::Complete,
        Position::Section(_) => RenderStatus::InProgress,
    };

    RenderPayload {
        form_id: schema.id.clone(),
        form_title: session.substitute(&schema.title),
        status,
        section_title: section.map(|section| session.substitute(&section.name)),
        progress: RenderProgress {
            section: position.section(),
            total: index.section_count(),
        },
        help: schema.description.clone(),
        questions,
        warnings: session
            .warnings()
            .iter()
            .map(|warning| warning.to_string())
            .collect(),
    }
}

/// Render the payload as a structured JSON-friendly value.
pub fn render_json_ui(payload: &RenderPayload) -> Value {
    let questions = payload
        .questions
        .iter()
        .map(|question| {
            let controls = question
                .controls
                .iter()
                .map(|control| {
                    let mut map = Map::new();
                    map.insert("name".into(), Value::String(control.name.clone()));
                    map.insert("label".into(), Value::String(control.label.clone()));
                    map.insert("kind".into(), Value::String(control.kind.to_string()));
                    map.insert("hidden".into(), Value::Bool(control.hidden));
                    map.insert("value".into(), Value::String(control.value.clone()));
                    if let Some(options) = &control.options {
                        map.insert(
                            "options".into(),
                            Value::Array(options.iter().cloned().map(Value::String).collect()),
                        );
                    }
                    Value::Object(map)
                })
                .collect::<Vec<_>>();

            let mut map = Map::new();
            map.insert("id".into(), Value::String(question.id.clone()));
            map.insert("slug".into(), Value::String(question.slug.clone()));
            map.insert("title".into(), Value::String(question.title.clone()));
            map.insert(
                "description".into(),
                question
                    .description
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );
            map.insert("type".into(), Value::String(question.kind.label().to_string()));
            map.insert("visible".into(), Value::Bool(question.visible));
            map.insert("controls".into(), Value::Array(controls));
            Value::Object(map)
        })
        .collect::<Vec<_>>();

    json!({
        "form_id": payload.form_id,
        "form_title": payload.form_title,
        "status": payload.status.as_str(),
        "section_title": payload.section_title,
        "progress": {
            "section": payload.progress.section,
            "total": payload.progress.total,
        },
        "help": payload.help,
        "questions": questions,
        "warnings": payload.warnings,
    })
}

/// Render the payload as human-friendly text.
pub fn render_text(payload: &RenderPayload) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Form: {} ({})", payload.form_title, payload.form_id));
    match payload.progress.section {
        Some(section) => lines.push(format!(
            "Status: {} (section {}/{})",
            payload.status.as_str(),
            section,
            payload.progress.total
        )),
        None => lines.push(format!("Status: {}", payload.status.as_str())),
    }
    if let Some(help) = &payload.help {
        lines.push(format!("Help: {}", help));
    }

    let Some(section_title) = &payload.section_title else {
        lines.push("The form is complete.".to_string());
        return lines.join("\n");
    };

    lines.push(format!("Section: {}", section_title));
    for question in payload.questions.iter().filter(|question| question.visible) {
        lines.push(format!(" - {} [{}]", question.title, question.kind.label()));
        if let Some(description) = &question.description {
            lines.push(format!("   {}", description));
        }
        for control in question.controls.iter().filter(|control| !control.hidden) {
            let mut entry = format!("   * {}", control.name);
            if !control.value.is_empty() {
                entry.push_str(&format!(" = {}", control.value));
            }
            if let Some(options) = &control.options {
                entry.push_str(&format!(" ({})", options.join(" | ")));
            }
            lines.push(entry);
        }
    }
    for warning in &payload.warnings {
        lines.push(format!("Warning: {}", warning));
    }

    lines.join("\n")
}

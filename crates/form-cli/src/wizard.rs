use std::collections::BTreeSet;
use std::fmt::Write;

use form_spec::FieldSnapshot;
use serde_json::Value;

/// Controls which bits of state the wizard prints.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    /// Clean output: section headings and prompts only.
    Clean,
    /// Verbose output: full section rendering, descriptions, option lists.
    Verbose,
}

impl Verbosity {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Clean
        }
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose)
    }
}

/// Prints headings, prompts and the final values for the text shell.
pub struct WizardPresenter {
    verbosity: Verbosity,
    header_printed: bool,
    show_values_json: bool,
}

impl WizardPresenter {
    pub fn new(verbosity: Verbosity, show_values_json: bool) -> Self {
        Self {
            verbosity,
            header_printed: false,
            show_values_json,
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn show_header(&mut self, payload: &WizardPayload) {
        if self.header_printed {
            return;
        }
        println!("Form: {}", payload.form_title);
        if self.verbosity.is_verbose()
            && let Some(help) = &payload.help
        {
            println!("Help: {}", help);
        }
        self.header_printed = true;
    }

    pub fn show_section(&self, payload: &WizardPayload) {
        let title = payload.section_title.as_deref().unwrap_or_default();
        match payload.section {
            Some(section) => println!("== Section {}/{}: {}", section, payload.total, title),
            None => println!("== {}", title),
        }
        if payload.prompt_count() == 0 {
            println!("Nothing to answer in this section.");
        }
    }

    pub fn show_prompt(&self, prompt: &PromptContext<'_>) {
        let control = prompt.control;
        let mut line = if control.label == prompt.question_title {
            control.label.clone()
        } else {
            format!("{}: {}", prompt.question_title, control.label)
        };
        if let Some(hint) = control.hint() {
            line.push(' ');
            line.push_str(&hint);
        }
        if !control.value.is_empty() {
            line.push_str(&format!(" [{}]", control.value));
        }
        println!("{}", line);
        if self.verbosity.is_verbose() {
            if let Some(description) = prompt.description {
                println!("{}", description);
            }
            if let Some(options) = &control.options {
                println!("Choices: {}", options.join(", "));
            }
        }
    }

    pub fn show_warnings(&self, warnings: &[String]) {
        for warning in warnings {
            eprintln!("Warning: {}", warning);
        }
    }

    pub fn show_completion(&self, values: &FieldSnapshot) {
        println!("Form complete.");
        match values.to_cbor() {
            Ok(bytes) => {
                println!("Values (CBOR hex): {}", encode_hex(&bytes));
            }
            Err(err) => {
                eprintln!("Failed to serialize values to CBOR: {}", err);
            }
        }
        if self.show_values_json {
            match values.to_json_pretty() {
                Ok(pretty) => println!("{}", pretty),
                Err(err) => {
                    eprintln!("Failed to serialize values to JSON: {}", err);
                }
            }
        }
    }
}

/// Render payload extracted from the component output.
pub struct WizardPayload {
    pub form_title: String,
    pub help: Option<String>,
    pub complete: bool,
    pub section: Option<u64>,
    pub section_title: Option<String>,
    pub total: u64,
    pub questions: Vec<WizardQuestion>,
}

impl WizardPayload {
    pub fn from_json(json: &Value) -> Result<Self, String> {
        let form_title = json
            .get("form_title")
            .and_then(Value::as_str)
            .ok_or_else(|| "wizard payload missing form_title".to_string())?
            .to_string();
        let help = json
            .get("help")
            .and_then(Value::as_str)
            .map(|value| value.to_string());
        let complete = json.get("status").and_then(Value::as_str) == Some("complete");
        let progress = json
            .get("progress")
            .and_then(Value::as_object)
            .ok_or_else(|| "wizard payload missing progress".to_string())?;
        let section = progress.get("section").and_then(Value::as_u64);
        let total = progress.get("total").and_then(Value::as_u64).unwrap_or(0);
        let questions = json
            .get("questions")
            .and_then(Value::as_array)
            .ok_or_else(|| "wizard payload missing questions".to_string())?
            .iter()
            .map(WizardQuestion::from_json)
            .collect::<Result<_, _>>()?;
        Ok(Self {
            form_title,
            help,
            complete,
            section,
            section_title: json
                .get("section_title")
                .and_then(Value::as_str)
                .map(str::to_string),
            total,
            questions,
        })
    }

    fn prompts(&self) -> impl Iterator<Item = PromptContext<'_>> {
        self.questions
            .iter()
            .filter(|question| question.visible)
            .flat_map(|question| {
                question
                    .controls
                    .iter()
                    .filter(|control| !control.hidden && control.is_prompted())
                    .map(move |control| PromptContext {
                        question_title: &question.title,
                        description: question.description.as_deref(),
                        control,
                    })
            })
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts().count()
    }

    /// First visible control of the section not yet handled in this pass.
    pub fn next_prompt(&self, handled: &BTreeSet<String>) -> Option<PromptContext<'_>> {
        self.prompts()
            .find(|prompt| !handled.contains(&prompt.control.name))
    }
}

pub struct WizardQuestion {
    pub title: String,
    pub description: Option<String>,
    pub visible: bool,
    pub controls: Vec<WizardControl>,
}

impl WizardQuestion {
    fn from_json(value: &Value) -> Result<Self, String> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| "question missing id".to_string())?;
        let controls = value
            .get("controls")
            .and_then(Value::as_array)
            .map(|controls| {
                controls
                    .iter()
                    .map(WizardControl::from_json)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();
        Ok(Self {
            title: value
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or(id)
                .to_string(),
            description: value
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            visible: value.get("visible").and_then(Value::as_bool).unwrap_or(true),
            controls,
        })
    }
}

/// One generated control as the wizard sees it.
pub struct WizardControl {
    pub name: String,
    pub label: String,
    pub kind: ControlInput,
    pub hidden: bool,
    pub value: String,
    pub options: Option<Vec<String>>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControlInput {
    Text,
    Select,
    Checkbox,
    Amount,
    Mirror,
}

impl ControlInput {
    fn from_label(label: &str) -> Self {
        match label {
            "select" => ControlInput::Select,
            "checkbox" => ControlInput::Checkbox,
            "amount" => ControlInput::Amount,
            "mirror" => ControlInput::Mirror,
            _ => ControlInput::Text,
        }
    }
}

impl WizardControl {
    fn from_json(value: &Value) -> Result<Self, String> {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| "control missing name".to_string())?
            .to_string();
        let options = value.get("options").and_then(Value::as_array).map(|options| {
            options
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        });
        Ok(Self {
            label: value
                .get("label")
                .and_then(Value::as_str)
                .unwrap_or(&name)
                .to_string(),
            kind: ControlInput::from_label(
                value.get("kind").and_then(Value::as_str).unwrap_or("text"),
            ),
            hidden: value.get("hidden").and_then(Value::as_bool).unwrap_or(false),
            value: value
                .get("value")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            name,
            options,
        })
    }

    fn is_prompted(&self) -> bool {
        self.kind != ControlInput::Mirror
    }

    fn hint(&self) -> Option<String> {
        match self.kind {
            ControlInput::Checkbox => Some("(y/n)".into()),
            ControlInput::Amount => Some("(amount)".into()),
            ControlInput::Select => self
                .options
                .as_ref()
                .map(|options| format!("({})", options.join(" / "))),
            ControlInput::Text | ControlInput::Mirror => None,
        }
    }
}

pub struct PromptContext<'a> {
    pub question_title: &'a str,
    pub description: Option<&'a str>,
    pub control: &'a WizardControl,
}

/// Parsed line for one prompt.
#[derive(Debug, PartialEq)]
pub enum WizardInput {
    /// Blank line: keep the current value.
    Keep,
    Back,
    Exit,
    Answer(Value),
}

/// Interprets one input line for `control`.
pub fn parse_input(control: &WizardControl, line: &str) -> Result<WizardInput, String> {
    let trimmed = line.trim();
    match trimmed.to_lowercase().as_str() {
        "" => return Ok(WizardInput::Keep),
        "back" => return Ok(WizardInput::Back),
        "exit" | "quit" => return Ok(WizardInput::Exit),
        _ => {}
    }

    match control.kind {
        ControlInput::Checkbox => match trimmed.to_lowercase().as_str() {
            "y" | "yes" | "true" | "1" | "x" => Ok(WizardInput::Answer(Value::Bool(true))),
            "n" | "no" | "false" | "0" => Ok(WizardInput::Answer(Value::Bool(false))),
            other => Err(format!("'{}' is not yes or no", other)),
        },
        ControlInput::Select => {
            let options = control.options.as_deref().unwrap_or_default();
            if let Some(option) = options
                .iter()
                .find(|option| option.trim().eq_ignore_ascii_case(trimmed))
            {
                return Ok(WizardInput::Answer(Value::String(option.clone())));
            }
            trimmed
                .parse::<usize>()
                .ok()
                .and_then(|position| position.checked_sub(1))
                .and_then(|position| options.get(position))
                .map(|option| WizardInput::Answer(Value::String(option.clone())))
                .ok_or_else(|| format!("'{}' is not one of: {}", trimmed, options.join(", ")))
        }
        ControlInput::Text | ControlInput::Amount | ControlInput::Mirror => {
            Ok(WizardInput::Answer(Value::String(trimmed.to_string())))
        }
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut encoded, "{:02x}", byte);
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn select() -> WizardControl {
        WizardControl {
            name: "favorite_color".into(),
            label: "Favorite color".into(),
            kind: ControlInput::Select,
            hidden: false,
            value: String::new(),
            options: Some(vec!["Red".into(), "Blue".into()]),
        }
    }

    #[test]
    fn select_input_accepts_labels_and_positions() {
        let control = select();
        assert_eq!(
            parse_input(&control, " blue ").unwrap(),
            WizardInput::Answer(json!("Blue"))
        );
        assert_eq!(
            parse_input(&control, "1").unwrap(),
            WizardInput::Answer(json!("Red"))
        );
        assert!(parse_input(&control, "3").is_err());
        assert!(parse_input(&control, "green").is_err());
    }

    #[test]
    fn commands_win_over_answers() {
        let control = select();
        assert_eq!(parse_input(&control, "").unwrap(), WizardInput::Keep);
        assert_eq!(parse_input(&control, "BACK").unwrap(), WizardInput::Back);
        assert_eq!(parse_input(&control, "exit").unwrap(), WizardInput::Exit);
    }

    #[test]
    fn checkbox_input_is_a_flag() {
        let control = WizardControl {
            kind: ControlInput::Checkbox,
            options: None,
            ..select()
        };
        assert_eq!(
            parse_input(&control, "Y").unwrap(),
            WizardInput::Answer(json!(true))
        );
        assert_eq!(
            parse_input(&control, "no").unwrap(),
            WizardInput::Answer(json!(false))
        );
        assert!(parse_input(&control, "maybe").is_err());
    }

    #[test]
    fn payload_skips_hidden_and_mirror_controls() {
        let payload = WizardPayload::from_json(&json!({
            "form_title": "Household",
            "status": "in_progress",
            "section_title": "About you",
            "progress": { "section": 1, "total": 4 },
            "questions": [
                { "id": "color", "title": "Favorite color", "visible": true, "controls": [
                    { "name": "favorite_color", "label": "Favorite color", "kind": "select",
                      "hidden": false, "value": "", "options": ["Red", "Blue"] },
                    { "name": "favorite_color_selected", "label": "Favorite color", "kind": "mirror",
                      "hidden": true, "value": "" }
                ]},
                { "id": "shade", "title": "Shade of red", "visible": false, "controls": [
                    { "name": "shade_of_red", "label": "Shade of red", "kind": "text",
                      "hidden": false, "value": "" }
                ]}
            ]
        }))
        .unwrap();

        assert_eq!(payload.prompt_count(), 1);
        let mut handled = BTreeSet::new();
        let prompt = payload.next_prompt(&handled).unwrap();
        assert_eq!(prompt.control.name, "favorite_color");
        handled.insert("favorite_color".to_string());
        assert!(payload.next_prompt(&handled).is_none());
    }

    #[test]
    fn encode_hex_is_lowercase() {
        assert_eq!(encode_hex(&[0x0a, 0xff]), "0aff");
    }
}

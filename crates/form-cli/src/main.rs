mod wizard;

use clap::{Parser, Subcommand, ValueEnum};
use component_form::{
    advance as form_advance, apply_change, render_json_ui, render_text as form_render_text,
    retreat as form_retreat, start as form_start, submit as form_submit,
};
use form_spec::{FieldSnapshot, FormSchema, SchemaIndex, SchemaReport, Severity, validate_schema};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use wizard::{Verbosity, WizardInput, WizardPayload, WizardPresenter, parse_input};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const LOG_ENV: &str = "FORM_WIZARD_LOG";

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Text-based questionnaire wizard CLI",
    long_about = "Fills sectioned questionnaires section by section and checks schemas, backed by the form component"
)]
struct Cli {
    /// Show verbose output and debug logging.
    #[arg(long, global = true, alias = "debug")]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RenderMode {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Fill a form interactively in a text shell.
    Wizard {
        /// Path to the form schema JSON.
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
        /// Optional JSON file of control values to start from.
        #[arg(long, value_name = "VALUES")]
        values: Option<PathBuf>,
        /// Also emit the final values as JSON.
        #[arg(long)]
        values_json: bool,
        /// How each section is shown when it is entered.
        #[arg(long, value_enum, default_value_t = RenderMode::Text)]
        format: RenderMode,
    },
    /// Lint a form schema and report errors and warnings.
    Validate {
        /// Path to the form schema JSON.
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
    },
    /// List the generated control names of every question.
    Controls {
        /// Path to the form schema JSON.
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
    },
    /// Print the JSON Schema of the form schema format.
    JsonSchema,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Wizard {
            schema,
            values,
            values_json,
            format,
        } => run_wizard(schema, values, cli.verbose, values_json, format),
        Command::Validate { schema } => run_validate(schema),
        Command::Controls { schema } => run_controls(schema),
        Command::JsonSchema => run_json_schema(),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run_wizard(
    schema_path: PathBuf,
    values_path: Option<PathBuf>,
    verbose: bool,
    values_json: bool,
    format: RenderMode,
) -> CliResult<()> {
    let schema_json = fs::read_to_string(&schema_path)?;
    let schema = FormSchema::from_json(&schema_json)?;
    let form_id = schema.id.as_str();
    let config_json = json!({ "form_schema_json": schema_json }).to_string();

    let mut state = match values_path {
        Some(path) => {
            let values: FieldSnapshot = serde_json::from_str(&fs::read_to_string(path)?)?;
            json!({ "values": values })
        }
        None => take_state(parse_component_result(&form_start(form_id, &config_json))?)?,
    };

    let mut presenter = WizardPresenter::new(Verbosity::from_verbose(verbose), values_json);
    let mut handled = BTreeSet::new();
    let mut shown_section = None;

    loop {
        let state_json = state.to_string();
        let ui = parse_component_result(&render_json_ui(form_id, &config_json, &state_json))?;
        let payload =
            WizardPayload::from_json(&ui).map_err(|err| format!("wizard UI error: {}", err))?;
        presenter.show_header(&payload);

        if payload.complete {
            let values: FieldSnapshot = serde_json::from_value(state["values"].take())?;
            presenter.show_completion(&values);
            return Ok(());
        }

        if shown_section != payload.section {
            shown_section = payload.section;
            handled.clear();
            presenter.show_section(&payload);
            print_render_output(format, &presenter, form_id, &config_json, &state_json, &ui)?;
        }

        let Some(prompt) = payload.next_prompt(&handled) else {
            let response = parse_component_result(&form_advance(form_id, &config_json, &state_json))?;
            if response["transition"]["kind"] == "unchanged" {
                debug!(section = ?payload.section, "no further section; submitting");
                let submitted =
                    parse_component_result(&form_submit(form_id, &config_json, &state_json))?;
                let values: FieldSnapshot = serde_json::from_value(submitted["values"].clone())?;
                presenter.show_completion(&values);
                return Ok(());
            }
            state = take_state(response)?;
            continue;
        };

        presenter.show_prompt(&prompt);
        let control_name = prompt.control.name.clone();
        let input = match parse_input(prompt.control, &read_line("> ")?) {
            Ok(input) => input,
            Err(message) => {
                eprintln!("Invalid answer: {}", message);
                continue;
            }
        };

        match input {
            WizardInput::Keep => {
                handled.insert(control_name);
            }
            WizardInput::Back => {
                let response =
                    parse_component_result(&form_retreat(form_id, &config_json, &state_json))?;
                if response["transition"]["kind"] == "unchanged" {
                    println!("Already at the first section.");
                }
                state = take_state(response)?;
                shown_section = None;
            }
            WizardInput::Exit => return Err("wizard aborted by user".into()),
            WizardInput::Answer(value) => {
                let value_json = serde_json::to_string(&value)?;
                let response = parse_component_result(&apply_change(
                    form_id,
                    &config_json,
                    &state_json,
                    &control_name,
                    &value_json,
                ))?;
                let warnings = response["warnings"]
                    .as_array()
                    .map(|warnings| {
                        warnings
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                presenter.show_warnings(&warnings);
                state = take_state(response)?;
                handled.insert(control_name);
            }
        }
    }
}

fn print_render_output(
    format: RenderMode,
    presenter: &WizardPresenter,
    form_id: &str,
    config_json: &str,
    state_json: &str,
    ui: &Value,
) -> CliResult<()> {
    match format {
        RenderMode::Json => println!("{}", serde_json::to_string_pretty(ui)?),
        RenderMode::Text if presenter.verbosity().is_verbose() => {
            println!("{}", form_render_text(form_id, config_json, state_json));
        }
        RenderMode::Text => {}
    }
    Ok(())
}

fn read_line(prompt: &str) -> CliResult<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Err("input closed before the form was complete".into());
    }
    Ok(line)
}

fn take_state(mut response: Value) -> CliResult<Value> {
    match response.get_mut("state") {
        Some(state) => Ok(state.take()),
        None => Err("component response is missing state".into()),
    }
}

fn parse_component_result(response: &str) -> CliResult<Value> {
    let value: Value = serde_json::from_str(response)?;
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        Err(error.into())
    } else {
        Ok(value)
    }
}

fn run_validate(schema_path: PathBuf) -> CliResult<()> {
    let schema_json = fs::read_to_string(schema_path)?;
    let schema = FormSchema::from_json(&schema_json)?;
    let report = validate_schema(&schema);
    println!(
        "Validation result: {}",
        if report.valid { "valid" } else { "invalid" }
    );
    describe_report(&report);

    if report.valid {
        Ok(())
    } else {
        Err("validation failed".into())
    }
}

fn describe_report(report: &SchemaReport) {
    for issue in &report.issues {
        let severity = match issue.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        let location = issue
            .question_id
            .as_deref()
            .or(issue.path.as_deref())
            .unwrap_or("<form>");
        println!(
            "  [{}] {} {} - {}",
            severity, issue.code, location, issue.message
        );
    }
}

fn run_controls(schema_path: PathBuf) -> CliResult<()> {
    let schema_json = fs::read_to_string(schema_path)?;
    let index = SchemaIndex::from_json(&schema_json)?;
    for question in index.questions() {
        println!(
            "{} [{}] section {}: {}",
            question.id,
            question.kind.label(),
            question.section_id,
            question.control_names.join(", ")
        );
    }
    let hidden = index
        .controls()
        .filter(|control| control.question_id.is_none())
        .map(|control| control.name.as_str())
        .collect::<Vec<_>>();
    if !hidden.is_empty() {
        println!("hidden fields: {}", hidden.join(", "));
    }
    Ok(())
}

fn run_json_schema() -> CliResult<()> {
    let schema = schemars::schema_for!(FormSchema);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_component_result_surfaces_errors() {
        assert!(parse_component_result(r#"{"error":"form 'x' is not available"}"#).is_err());
        let value = parse_component_result(r#"{"state":{}}"#).unwrap();
        assert!(value["state"].is_object());
    }

    #[test]
    fn take_state_requires_state() {
        assert_eq!(
            take_state(json!({ "state": { "values": {} } })).unwrap(),
            json!({ "values": {} })
        );
        assert!(take_state(json!({ "ui": {} })).is_err());
    }
}

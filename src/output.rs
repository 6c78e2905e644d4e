//! Rendering of command results for people and scripts.
//!
//! Every command builds a [`HumanOutput`] and a serializable payload. With
//! `--json` the payload is wrapped in a `lvlup.v1` envelope; otherwise the
//! human block is printed unless `--quiet` is set.

use serde::Serialize;

use crate::error::{Error, Result};

pub const SCHEMA_VERSION: &str = "lvlup.v1";

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

/// Human-readable block: a header, `key: value` fields, free lines, then
/// notes and warnings.
#[derive(Debug, Clone)]
pub struct HumanOutput {
    header: String,
    fields: Vec<(String, String)>,
    lines: Vec<String>,
    notes: Vec<String>,
    warnings: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            fields: Vec::new(),
            lines: Vec::new(),
            notes: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn push_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.push((key.into(), value.into()));
    }

    /// A task row or other body line, printed verbatim after `- `.
    pub fn push_line(&mut self, value: impl Into<String>) {
        self.lines.push(value.into());
    }

    /// Information the caller should act on that is not a failure.
    pub fn push_note(&mut self, value: impl Into<String>) {
        self.notes.push(value.into());
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn render(&self) -> String {
        let mut out = vec![self.header.clone()];
        if !self.fields.is_empty() {
            out.push(String::new());
            out.extend(self.fields.iter().map(|(key, value)| format!("{key}: {value}")));
        }
        if !self.lines.is_empty() {
            out.push(String::new());
            out.extend(self.lines.iter().map(|line| format!("- {line}")));
        }
        for note in &self.notes {
            out.push(format!("note: {note}"));
        }
        for warning in &self.warnings {
            out.push(format!("warning: {warning}"));
        }
        out.join("\n")
    }
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Body<'a, T: Serialize> {
    Data(&'a T),
    Error(ErrorBody<'a>),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: String,
    code: i32,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a str>,
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    status: &'static str,
    #[serde(flatten)]
    body: Body<'a, T>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    notes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

fn print_json<T: Serialize>(envelope: &Envelope<'_, T>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(())
}

pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        return print_json(&Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "success",
            body: Body::Data(data),
            notes: human.map(|h| h.notes.clone()).unwrap_or_default(),
            warnings: human.map(|h| h.warnings.clone()).unwrap_or_default(),
        });
    }

    if let (false, Some(human)) = (options.quiet, human) {
        println!("{}", human.render());
    }
    Ok(())
}

pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let hint = error_hint(err);
    if json {
        return print_json::<()>(&Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "error",
            body: Body::Error(ErrorBody {
                message: err.to_string(),
                code: err.exit_code(),
                kind: error_kind(err),
                details: err.details(),
                hint,
            }),
            notes: Vec::new(),
            warnings: Vec::new(),
        });
    }

    eprintln!("error: {err}");
    if let Some(hint) = hint {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

pub fn infer_command_name_from_args() -> String {
    infer_command_name(std::env::args().skip(1))
}

/// First positional argument, skipping global flags and their values.
fn infer_command_name<I: IntoIterator<Item = String>>(args: I) -> String {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if matches!(arg.as_str(), "--db" | "--config" | "--events") {
            args.next();
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        return arg;
    }
    "lvlup".to_string()
}

fn error_kind(err: &Error) -> &'static str {
    match err.exit_code() {
        2 => "user_error",
        3 => "blocked",
        _ => "operation_failed",
    }
}

fn error_hint(err: &Error) -> Option<&'static str> {
    match err {
        Error::TaskNotFound(_) | Error::ParentNotFound(_) => Some("lvlup list"),
        Error::CyclicHierarchy { .. } | Error::HierarchyTooDeep { .. } => {
            Some("lvlup list --tree")
        }
        Error::DueDateInPast(_) => Some("pick a due date in the future"),
        Error::SchedulingDenied { .. } => Some("set [reminders] enabled = true in lvlup.toml"),
        Error::InvalidConfig(_) | Error::TomlParse(_) => Some("fix lvlup.toml then retry"),
        _ => None,
    }
}

//! lvlup command implementations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::info;

use crate::analytics::{TaskStats, Widget};
use crate::app::App;
use crate::cli::View;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{EventDestination, EventSink, WriteEvent};
use crate::hierarchy::{build_forest, filter_by_completion, flatten, node_count, HierarchicalTask};
use crate::notify::LogSink;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::scheduler::{ReminderState, SyncReport};
use crate::service::WriteOutcome;
use crate::task::{Priority, Task};

/// Timers armed by a one-shot command end with the process.
const WATCH_NOTE: &str = "reminders fire only while `lvlup watch` is running";

pub struct CommonOptions {
    pub db: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub events: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

pub struct AddOptions {
    pub title: String,
    pub description: Option<String>,
    pub due: Option<String>,
    pub priority: Option<String>,
    pub parent: Option<i64>,
    pub recurring: bool,
    pub common: CommonOptions,
}

pub struct EditOptions {
    pub id: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub due: Option<String>,
    pub clear_due: bool,
    pub priority: Option<String>,
    pub parent: Option<i64>,
    pub clear_parent: bool,
    pub recurring: Option<bool>,
    pub common: CommonOptions,
}

pub struct ListOptions {
    pub tree: bool,
    pub view: View,
    pub common: CommonOptions,
}

pub struct ShowOptions {
    pub id: i64,
    pub common: CommonOptions,
}

pub struct DoneOptions {
    pub id: i64,
    pub common: CommonOptions,
}

pub struct RmOptions {
    pub id: i64,
    pub common: CommonOptions,
}

pub struct StatsOptions {
    pub widget: Widget,
    pub common: CommonOptions,
}

pub struct WatchOptions {
    pub timeout: Option<u64>,
    pub common: CommonOptions,
}

struct Context {
    app: App,
    config: Config,
}

fn load_context(common: &CommonOptions) -> Result<Context> {
    let config = Config::resolve(common.config.as_deref())?;
    let app = App::open_default(&config, common.db.as_deref())?;
    Ok(Context { app, config })
}

impl CommonOptions {
    fn output(&self) -> OutputOptions {
        OutputOptions {
            json: self.json,
            quiet: self.quiet,
        }
    }

    /// Output options for write commands, where `--events -` owns stdout.
    fn write_output(&self, events_to_stdout: bool) -> OutputOptions {
        OutputOptions {
            json: self.json && !events_to_stdout,
            quiet: self.quiet || events_to_stdout,
        }
    }
}

pub fn run_add(options: AddOptions) -> Result<()> {
    let ctx = load_context(&options.common)?;
    let (mut event_sink, events_to_stdout) = open_event_sink(options.common.events.as_deref())?;

    let mut task = Task::new(options.title);
    task.description = options.description;
    task.due_date = options.due.as_deref().map(parse_due).transpose()?;
    if let Some(priority) = options.priority.as_deref() {
        task.priority = priority.parse::<Priority>()?;
    }
    task.parent_id = options.parent;
    task.is_recurring = options.recurring;

    let outcome = ctx.app.service().upsert(task)?;
    let event_warning = emit_write_event(&mut event_sink, &outcome.event);

    let mut human = HumanOutput::new("Task added");
    push_write_summary(&mut human, &outcome);
    push_write_warnings(&mut human, &outcome, event_warning);

    emit_success(
        options.common.write_output(events_to_stdout),
        "add",
        &outcome,
        Some(&human),
    )
}

pub fn run_edit(options: EditOptions) -> Result<()> {
    let ctx = load_context(&options.common)?;
    let (mut event_sink, events_to_stdout) = open_event_sink(options.common.events.as_deref())?;

    let mut task = ctx
        .app
        .repository()
        .find(options.id)?
        .ok_or(Error::TaskNotFound(options.id))?;
    if let Some(title) = options.title {
        task.title = title;
    }
    if let Some(description) = options.description {
        task.description = Some(description);
    }
    if options.clear_due {
        task.due_date = None;
    } else if let Some(due) = options.due.as_deref() {
        task.due_date = Some(parse_due(due)?);
    }
    if let Some(priority) = options.priority.as_deref() {
        task.priority = priority.parse::<Priority>()?;
    }
    if options.clear_parent {
        task.parent_id = None;
    } else if let Some(parent) = options.parent {
        task.parent_id = Some(parent);
    }
    if let Some(recurring) = options.recurring {
        task.is_recurring = recurring;
    }

    let outcome = ctx.app.service().upsert(task)?;
    let event_warning = emit_write_event(&mut event_sink, &outcome.event);

    let mut human = HumanOutput::new("Task updated");
    push_write_summary(&mut human, &outcome);
    push_write_warnings(&mut human, &outcome, event_warning);

    emit_success(
        options.common.write_output(events_to_stdout),
        "edit",
        &outcome,
        Some(&human),
    )
}

#[derive(Serialize)]
struct FlatEntry<'a> {
    #[serde(flatten)]
    task: &'a Task,
    depth: usize,
}

#[derive(Serialize)]
struct TaskListOutput<'a> {
    view: &'static str,
    total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    tasks: Option<Vec<FlatEntry<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    forest: Option<&'a [HierarchicalTask]>,
}

pub fn run_list(options: ListOptions) -> Result<()> {
    let ctx = load_context(&options.common)?;
    let tasks = ctx.app.repository().snapshot()?;
    let forest = build_forest(&tasks)?;
    let forest = match options.view {
        View::All => forest,
        View::Ongoing => filter_by_completion(&forest, false),
        View::Done => filter_by_completion(&forest, true),
    };
    let rows = flatten(&forest);
    let view = view_name(options.view);

    let mut human = HumanOutput::new("Tasks");
    human.push_field("View", view);
    human.push_field("Total", node_count(&forest).to_string());
    for (task, depth) in &rows {
        let indent = if options.tree { "  ".repeat(*depth) } else { String::new() };
        human.push_line(format!("{indent}{}", task_line(task)));
    }
    if rows.is_empty() {
        human.push_note("no tasks yet; add one with `lvlup add \"<title>\"`");
    }

    let output = if options.tree {
        TaskListOutput {
            view,
            total: node_count(&forest),
            tasks: None,
            forest: Some(&forest),
        }
    } else {
        TaskListOutput {
            view,
            total: rows.len(),
            tasks: Some(
                rows.iter()
                    .map(|(task, depth)| FlatEntry { task, depth: *depth })
                    .collect(),
            ),
            forest: None,
        }
    };

    emit_success(options.common.output(), "list", &output, Some(&human))
}

#[derive(Serialize)]
struct TaskShowOutput<'a> {
    task: &'a Task,
    sub_tasks: Vec<i64>,
}

pub fn run_show(options: ShowOptions) -> Result<()> {
    let ctx = load_context(&options.common)?;
    let tasks = ctx.app.repository().snapshot()?;
    let task = tasks
        .iter()
        .find(|task| task.id == options.id)
        .ok_or(Error::TaskNotFound(options.id))?;
    let sub_tasks: Vec<i64> = tasks
        .iter()
        .filter(|candidate| candidate.parent_id == Some(task.id))
        .map(|candidate| candidate.id)
        .collect();

    let mut human = HumanOutput::new(format!("Task #{}", task.id));
    human.push_field("Title", task.title.clone());
    human.push_field("Priority", task.priority.to_string());
    human.push_field("Completed", if task.is_completed { "yes" } else { "no" });
    human.push_field("Due", format_due(task.due_date));
    if let Some(parent) = task.parent_id {
        human.push_field("Parent", format!("#{parent}"));
    }
    if task.is_recurring {
        human.push_field("Recurring", "yes");
    }
    if let Some(description) = task.description.as_ref() {
        human.push_line(description.clone());
    }
    for id in &sub_tasks {
        if let Some(child) = tasks.iter().find(|candidate| candidate.id == *id) {
            human.push_line(format!("subtask {}", task_line(child)));
        }
    }

    emit_success(
        options.common.output(),
        "show",
        &TaskShowOutput { task, sub_tasks },
        Some(&human),
    )
}

pub fn run_done(options: DoneOptions) -> Result<()> {
    let ctx = load_context(&options.common)?;
    let (mut event_sink, events_to_stdout) = open_event_sink(options.common.events.as_deref())?;

    let outcome = ctx.app.service().toggle_completion(options.id)?;
    let event_warning = emit_write_event(&mut event_sink, &outcome.event);

    let header = if outcome.task.is_completed {
        "Task completed"
    } else {
        "Task reopened"
    };
    let mut human = HumanOutput::new(header);
    push_write_summary(&mut human, &outcome);
    push_write_warnings(&mut human, &outcome, event_warning);

    emit_success(
        options.common.write_output(events_to_stdout),
        "done",
        &outcome,
        Some(&human),
    )
}

pub fn run_rm(options: RmOptions) -> Result<()> {
    let ctx = load_context(&options.common)?;
    let (mut event_sink, events_to_stdout) = open_event_sink(options.common.events.as_deref())?;

    let outcome = ctx.app.service().delete(options.id)?;
    let event_warning = emit_write_event(&mut event_sink, &outcome.event);

    let mut human = HumanOutput::new("Task deleted");
    human.push_field("ID", outcome.task.id.to_string());
    human.push_field("Title", outcome.task.title.clone());
    if outcome.removed.len() > 1 {
        human.push_field("Subtasks removed", (outcome.removed.len() - 1).to_string());
    }
    push_write_warnings(&mut human, &outcome, event_warning);

    emit_success(
        options.common.write_output(events_to_stdout),
        "rm",
        &outcome,
        Some(&human),
    )
}

#[derive(Serialize)]
struct StatsOutput {
    #[serde(flatten)]
    stats: TaskStats,
    widget: &'static str,
    lines: Vec<String>,
}

pub fn run_stats(options: StatsOptions) -> Result<()> {
    let ctx = load_context(&options.common)?;
    let stats = ctx.app.stats()?;
    let widget = options.widget;
    let lines = widget.render(&stats);

    let mut human = HumanOutput::new("Task stats");
    for line in &lines {
        human.push_line(line.clone());
    }

    emit_success(
        options.common.output(),
        "stats",
        &StatsOutput {
            stats,
            widget: widget.as_str(),
            lines,
        },
        Some(&human),
    )
}

#[derive(Serialize)]
struct WatchOutput {
    syncs: u64,
    delivered: usize,
    last_sync: SyncReport,
}

pub async fn run_watch(options: WatchOptions) -> Result<()> {
    let config = Config::resolve(options.common.config.as_deref())?;
    if !config.reminders.enabled {
        return Err(Error::SchedulingDenied {
            task_id: 0,
            reason: "reminders are disabled in lvlup.toml".to_string(),
        });
    }
    let sink = Arc::new(if options.common.json || options.common.quiet {
        LogSink::silent()
    } else {
        LogSink::new()
    });
    let app = App::open(&config, options.common.db.as_deref(), sink.clone())?;
    let ctx = Context { app, config };

    let stop = async {
        match options.timeout {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    };
    tokio::pin!(stop);

    let mut ticker = tokio::time::interval(ctx.config.watch.resync_interval());
    let mut syncs = 0u64;
    let mut last_sync = SyncReport::default();

    if !options.common.quiet && !options.common.json {
        println!("Watching for due tasks (Ctrl-C to stop)");
    }
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let tasks = ctx.app.repository().snapshot()?;
                last_sync = ctx.app.scheduler().sync(&tasks);
                syncs += 1;
                info!(
                    pending = ctx.app.scheduler().scheduled_ids().len(),
                    "watch resynced"
                );
            }
        }
    }

    let delivered = sink.shown().len();
    let mut human = HumanOutput::new("Stopped watching");
    human.push_field("Reminders delivered", delivered.to_string());
    human.push_field(
        "Still pending",
        ctx.app.scheduler().scheduled_ids().len().to_string(),
    );
    if !last_sync.denied.is_empty() {
        human.push_warning(format!(
            "reminders refused for tasks {}",
            join_ids(&last_sync.denied)
        ));
    }

    emit_success(
        options.common.output(),
        "watch",
        &WatchOutput {
            syncs,
            delivered,
            last_sync,
        },
        Some(&human),
    )
}

/// Parse a due date given on the command line.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM` in local time, or `YYYY-MM-DD` for
/// local midnight.
pub(crate) fn parse_due(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "invalid due date '{trimmed}' (expected RFC 3339, YYYY-MM-DD HH:MM or YYYY-MM-DD)"
            ))
        })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| Error::InvalidArgument(format!("due date '{trimmed}' does not exist locally")))
}

fn format_due(due: Option<DateTime<Utc>>) -> String {
    due.map(|due| due.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "none".to_string())
}

fn task_line(task: &Task) -> String {
    let check = if task.is_completed { "x" } else { " " };
    let mut line = format!("[{check}] #{} {} ({})", task.id, task.title, task.priority);
    if task.due_date.is_some() {
        line.push_str(&format!(" due {}", format_due(task.due_date)));
    }
    line
}

fn view_name(view: View) -> &'static str {
    match view {
        View::All => "all",
        View::Ongoing => "ongoing",
        View::Done => "done",
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| format!("#{id}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn push_write_summary(human: &mut HumanOutput, outcome: &WriteOutcome) {
    let task = &outcome.task;
    human.push_field("ID", task.id.to_string());
    human.push_field("Title", task.title.clone());
    human.push_field("Priority", task.priority.to_string());
    if let Some(parent) = task.parent_id {
        human.push_field("Parent", format!("#{parent}"));
    }
    if task.due_date.is_some() {
        human.push_field("Due", format_due(task.due_date));
    }
    if let ReminderState::Scheduled { .. } = outcome.reminder {
        human.push_field("Reminder", "scheduled");
        human.push_note(WATCH_NOTE);
    }
}

fn push_write_warnings(human: &mut HumanOutput, outcome: &WriteOutcome, event_warning: Option<String>) {
    if let Some(warning) = outcome.warning.as_ref() {
        human.push_warning(warning.clone());
    }
    if let Some(warning) = event_warning {
        human.push_warning(warning);
    }
}

fn open_event_sink(events: Option<&str>) -> Result<(Option<EventSink>, bool)> {
    let destination = EventDestination::parse(events);
    let sink = destination.as_ref().map(|dest| dest.open()).transpose()?;
    let events_to_stdout = matches!(destination, Some(EventDestination::Stdout));
    Ok((sink, events_to_stdout))
}

fn emit_write_event(sink: &mut Option<EventSink>, event: &WriteEvent) -> Option<String> {
    let sink = sink.as_mut()?;
    if let Err(err) = sink.emit(event) {
        return Some(format!("event output failed: {err}"));
    }
    None
}

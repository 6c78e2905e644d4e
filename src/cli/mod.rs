//! Command-line interface for lvlup
//!
//! This module defines the CLI structure using clap derive macros.
//! Command implementations live in the `task` submodule.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::analytics::Widget;
use crate::error::{Error, Result};

mod task;

/// Command-line arguments for `lvlup`
#[derive(Parser, Debug)]
#[command(name = "lvlup")]
#[command(author, version, long_about = None)]
#[command(about = "lvlup - a to-do list with nested subtasks and due-date reminders")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the task database
    #[arg(long, global = true, env = "LVLUP_DB")]
    pub db: Option<PathBuf>,

    /// Path to lvlup.toml (defaults to the platform config directory)
    #[arg(long, global = true, env = "LVLUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Mirror write events as JSON lines to a file, or "-" for stdout
    #[arg(long, global = true)]
    pub events: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which tasks `list` shows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum View {
    #[default]
    All,
    Ongoing,
    Done,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a task
    Add {
        /// Task title
        title: String,

        /// Longer description
        #[arg(long, short = 'd')]
        description: Option<String>,

        /// Due date: RFC 3339, "YYYY-MM-DD HH:MM" or "YYYY-MM-DD" (local time)
        #[arg(long)]
        due: Option<String>,

        /// Priority: low, medium, high
        #[arg(long, short = 'p')]
        priority: Option<String>,

        /// Make this a subtask of the given task id
        #[arg(long)]
        parent: Option<i64>,

        /// Mark as recurring
        #[arg(long)]
        recurring: bool,
    },

    /// Edit a task; unspecified fields keep their value
    Edit {
        /// Task id
        id: i64,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, short = 'd')]
        description: Option<String>,

        /// New due date
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,

        /// Remove the due date
        #[arg(long)]
        clear_due: bool,

        #[arg(long, short = 'p')]
        priority: Option<String>,

        /// New parent task id
        #[arg(long, conflicts_with = "clear_parent")]
        parent: Option<i64>,

        /// Make this a top-level task
        #[arg(long)]
        clear_parent: bool,

        /// Set or clear the recurring flag
        #[arg(long)]
        recurring: Option<bool>,
    },

    /// List tasks
    List {
        /// Show subtasks nested under their parents
        #[arg(long)]
        tree: bool,

        /// all, ongoing or done; ancestors of matches are kept
        #[arg(long, value_enum, default_value_t = View::All)]
        view: View,
    },

    /// Show one task
    Show {
        /// Task id
        id: i64,
    },

    /// Toggle a task between done and not done
    Done {
        /// Task id
        id: i64,
    },

    /// Delete a task and its subtasks
    Rm {
        /// Task id
        id: i64,
    },

    /// Completion statistics
    Stats {
        /// Widget layout to render: simple or detailed
        #[arg(long, default_value = "simple")]
        widget: Widget,
    },

    /// Deliver due-date reminders until interrupted
    Watch {
        /// Stop after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| Error::OperationFailed(format!("failed to start runtime: {err}")))?;
        runtime.block_on(self.dispatch())
    }

    async fn dispatch(self) -> Result<()> {
        let common = task::CommonOptions {
            db: self.db,
            config: self.config,
            events: self.events,
            json: self.json,
            quiet: self.quiet,
        };

        match self.command {
            Commands::Add {
                title,
                description,
                due,
                priority,
                parent,
                recurring,
            } => task::run_add(task::AddOptions {
                title,
                description,
                due,
                priority,
                parent,
                recurring,
                common,
            }),
            Commands::Edit {
                id,
                title,
                description,
                due,
                clear_due,
                priority,
                parent,
                clear_parent,
                recurring,
            } => task::run_edit(task::EditOptions {
                id,
                title,
                description,
                due,
                clear_due,
                priority,
                parent,
                clear_parent,
                recurring,
                common,
            }),
            Commands::List { tree, view } => task::run_list(task::ListOptions { tree, view, common }),
            Commands::Show { id } => task::run_show(task::ShowOptions { id, common }),
            Commands::Done { id } => task::run_done(task::DoneOptions { id, common }),
            Commands::Rm { id } => task::run_rm(task::RmOptions { id, common }),
            Commands::Stats { widget } => task::run_stats(task::StatsOptions { widget, common }),
            Commands::Watch { timeout } => {
                task::run_watch(task::WatchOptions { timeout, common }).await
            }
        }
    }
}

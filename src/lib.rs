//! lvlup - to-do list library
//!
//! The core of the lvlup CLI: a local task store with push-updating reads,
//! a parent/child hierarchy projection, due-date reminders and completion
//! analytics.
//!
//! # Core Concepts
//!
//! - **Tasks**: the only persisted entity; optionally nested under a parent
//! - **Live queries**: store reads re-pushed to subscribers after each write
//! - **Hierarchy**: the flat list rebuilt as a forest, filterable by completion
//!   without losing a match's ancestors
//! - **Reminders**: one scheduled alert per incomplete task with a future due date
//!
//! # Module Organization
//!
//! - `task`: Task model and editing validation
//! - `store`: SQLite task store and change feed
//! - `live`: Live queries with grace-period teardown
//! - `repository`: Pass-through seam handing out live queries
//! - `hierarchy`: Forest building and the ancestor-preserving filter
//! - `scheduler`: Reminder state machine and alarm backends
//! - `notify`: Reminder payloads and rendered alerts
//! - `analytics`: Completion stats and widget rendering
//! - `events`: Write-event bus and JSONL mirroring
//! - `service`: Validated write path
//! - `app`: Composition root
//! - `config`: Configuration loading from `lvlup.toml`
//! - `output`: Human and JSON output for the CLI
//! - `cli`: Command-line interface using clap
//! - `error`: Error types and result aliases

pub mod analytics;
pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod hierarchy;
pub mod live;
pub mod notify;
pub mod output;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod task;

pub use error::{Error, Result};

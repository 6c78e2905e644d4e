//! Write events.
//!
//! After each successful write the service publishes a [`WriteEvent`] on the
//! in-process [`EventBus`]; anything that renders derived data (widgets, the
//! watch loop) subscribes on its own. The same events can be mirrored as JSON
//! lines to stdout or a file for external integrations.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use ulid::Ulid;

use crate::error::{Error, Result};

pub const EVENT_SCHEMA_VERSION: &str = "lvlup.event.v1";

const BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    Upserted,
    Deleted,
    CompletionToggled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteEvent {
    pub event_id: String,
    pub kind: WriteKind,
    pub task_id: i64,
    pub timestamp: DateTime<Utc>,
}

impl WriteEvent {
    pub fn new(kind: WriteKind, task_id: i64) -> Self {
        Self {
            event_id: Ulid::new().to_string(),
            kind,
            task_id,
            timestamp: Utc::now(),
        }
    }
}

/// Fan-out of write events to any number of in-process subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WriteEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Returns how many subscribers received the event.
    pub fn publish(&self, event: WriteEvent) -> usize {
        debug!(kind = ?event.kind, task_id = event.task_id, "publishing write event");
        // No subscribers is not an error.
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WriteEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDestination {
    Stdout,
    File(PathBuf),
}

impl EventDestination {
    /// `-` means stdout; blank means no mirroring.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed == "-" {
                return Some(EventDestination::Stdout);
            }
            Some(EventDestination::File(PathBuf::from(trimmed)))
        })
    }

    pub fn open(&self) -> Result<EventSink> {
        match self {
            EventDestination::Stdout => Ok(EventSink::stdout()),
            EventDestination::File(path) => EventSink::file(path),
        }
    }
}

#[derive(Serialize)]
struct EventRecord<'a> {
    schema_version: &'static str,
    #[serde(flatten)]
    event: &'a WriteEvent,
}

/// Event sink that writes JSONL output to a destination.
pub struct EventSink {
    writer: Box<dyn Write + Send>,
}

impl EventSink {
    pub fn stdout() -> Self {
        Self {
            writer: Box::new(std::io::stdout()),
        }
    }

    /// Append to a file, creating it if necessary.
    pub fn file(path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Box::new(file),
        })
    }

    /// Write a single event as JSONL.
    pub fn emit(&mut self, event: &WriteEvent) -> Result<()> {
        let record = EventRecord {
            schema_version: EVENT_SCHEMA_VERSION,
            event,
        };
        let serialized = serde_json::to_vec(&record)?;
        self.writer.write_all(&serialized)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush().map_err(Error::Io)?;
        Ok(())
    }
}

//! Reminder payloads and the alerts rendered from them.
//!
//! A [`Reminder`] is what the scheduler registers and gets back at the due
//! instant. A [`NotificationSink`] turns it into something the user sees; the
//! alert is keyed by task id, so delivering twice for the same task replaces
//! the earlier alert instead of stacking a second one.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::task::Task;

pub const DEFAULT_CHANNEL_ID: &str = "task_reminder_channel";
pub const DEFAULT_CHANNEL_NAME: &str = "Task Reminders";

/// Payload carried by a scheduled reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub task_id: i64,
    pub title: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub due_date: DateTime<Utc>,
}

impl Reminder {
    /// `None` when the task has no due date.
    pub fn for_task(task: &Task) -> Option<Self> {
        Some(Self {
            task_id: task.id,
            title: task.title.clone(),
            due_date: task.due_date?,
        })
    }
}

/// A rendered, user-visible alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: i64,
    pub channel_id: String,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn from_reminder(reminder: &Reminder, channel_id: &str) -> Self {
        let due_time = reminder
            .due_date
            .with_timezone(&Local)
            .format("%I:%M %p")
            .to_string();
        Self {
            id: reminder.task_id,
            channel_id: channel_id.to_string(),
            title: format!("Task Due: {}", reminder.title),
            body: format!("Your task is due at {due_time}. Time to level up!"),
        }
    }
}

/// Where fired reminders end up.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: Notification);
}

/// Logs each alert and prints it to stdout; keeps the latest per task id.
pub struct LogSink {
    echo: bool,
    shown: Mutex<HashMap<i64, Notification>>,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink {
    pub fn new() -> Self {
        Self {
            echo: true,
            shown: Mutex::new(HashMap::new()),
        }
    }

    /// Log only; nothing on stdout.
    pub fn silent() -> Self {
        Self {
            echo: false,
            ..Self::new()
        }
    }

    /// Alerts currently shown, one per task.
    pub fn shown(&self) -> Vec<Notification> {
        let mut shown: Vec<Notification> = self
            .shown
            .lock()
            .map(|shown| shown.values().cloned().collect())
            .unwrap_or_default();
        shown.sort_by_key(|notification| notification.id);
        shown
    }
}

impl NotificationSink for LogSink {
    fn deliver(&self, notification: Notification) {
        info!(task_id = notification.id, title = %notification.title, "reminder delivered");
        if self.echo {
            println!("{}: {}", notification.title, notification.body);
        }
        if let Ok(mut shown) = self.shown.lock() {
            shown.insert(notification.id, notification);
        }
    }
}

/// Forwards alerts over an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn deliver(&self, notification: Notification) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(notification);
    }
}

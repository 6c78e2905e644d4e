//! Task model.
//!
//! A [`Task`] is the only persisted entity. Due dates travel as epoch
//! milliseconds on every wire (database column, JSON output, reminder
//! payload).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Id carried by a task that has not been written yet.
pub const UNSAVED_ID: i64 = 0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    /// Stored rank; higher sorts first in the task list.
    pub fn rank(self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
        }
    }

    pub fn from_rank(rank: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|priority| priority.rank() == rank)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|priority| priority.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "unknown priority '{trimmed}' (expected low|medium|high)"
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
}

impl Task {
    /// A fresh, unsaved task with default fields.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: UNSAVED_ID,
            title: title.into(),
            description: None,
            due_date: None,
            priority: Priority::default(),
            is_completed: false,
            is_recurring: false,
            parent_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn completed(mut self, is_completed: bool) -> Self {
        self.is_completed = is_completed;
        self
    }

    pub fn is_saved(&self) -> bool {
        self.id != UNSAVED_ID
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Due date as epoch milliseconds.
    pub fn due_millis(&self) -> Option<i64> {
        self.due_date.map(|due| due.timestamp_millis())
    }

    /// Copy with completion flipped.
    pub fn toggled(&self) -> Self {
        let mut next = self.clone();
        next.is_completed = !next.is_completed;
        next
    }

    /// Trim the title and drop a blank description, the shape the store keeps.
    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.description = self
            .description
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        self
    }
}

/// Checks the editing rules: a non-blank title, and a due date that is not
/// in the past unless it is unchanged from the stored copy.
pub fn validate_for_save(task: &Task, stored: Option<&Task>, now: DateTime<Utc>) -> Result<()> {
    if task.title.trim().is_empty() {
        return Err(Error::EmptyTitle);
    }

    if let Some(due) = task.due_date {
        let unchanged = stored.and_then(|previous| previous.due_date) == Some(due);
        if due < now && !unchanged {
            return Err(Error::DueDateInPast(due.to_rfc3339()));
        }
    }

    Ok(())
}

/// Millisecond helper used by the store and payload codecs.
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
}

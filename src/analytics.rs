//! Completion statistics and the home-screen widget renderings built on them.

use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::events::WriteEvent;
use crate::store::TaskStore;
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    /// `completed / total`, 0.0 for an empty list.
    pub completion_rate: f32,
}

impl TaskStats {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let total = tasks.len();
        let completed = tasks.iter().filter(|task| task.is_completed).count();
        let completion_rate = if total > 0 {
            completed as f32 / total as f32
        } else {
            0.0
        };
        Self {
            total,
            completed,
            pending: total - completed,
            completion_rate,
        }
    }

    /// Whole percent, truncated.
    pub fn percent(&self) -> u32 {
        (self.completion_rate * 100.0) as u32
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Widget {
    #[default]
    Simple,
    Detailed,
}

impl Widget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Widget::Simple => "simple",
            Widget::Detailed => "detailed",
        }
    }

    pub fn render(&self, stats: &TaskStats) -> Vec<String> {
        let headline = format!("{}%", stats.percent());
        match self {
            Widget::Simple => vec![headline],
            Widget::Detailed => vec![
                headline,
                format!("Total Tasks: {}", stats.total),
                format!("Completed: {}", stats.completed),
                format!("Pending: {}", stats.pending),
            ],
        }
    }
}

impl FromStr for Widget {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Widget::Simple),
            "detailed" => Ok(Widget::Detailed),
            other => Err(Error::InvalidArgument(format!(
                "unknown widget '{other}' (expected simple or detailed)"
            ))),
        }
    }
}

/// Re-renders a widget after every write event.
pub struct WidgetRefresher {
    widget: Widget,
    store: Arc<dyn TaskStore>,
    events: broadcast::Receiver<WriteEvent>,
    cancel: CancellationToken,
}

impl WidgetRefresher {
    pub fn new(
        widget: Widget,
        store: Arc<dyn TaskStore>,
        events: broadcast::Receiver<WriteEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            widget,
            store,
            events,
            cancel,
        }
    }

    /// Render once up front, then once per write until cancelled or the bus
    /// closes.
    pub async fn run<F>(mut self, mut on_render: F)
    where
        F: FnMut(Vec<String>) + Send,
    {
        self.render_into(&mut on_render);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(widget = self.widget.as_str(), "widget refresher stopped");
                    break;
                }
                event = self.events.recv() => match event {
                    Ok(event) => {
                        debug!(widget = self.widget.as_str(), task_id = event.task_id, "refreshing widget");
                        self.render_into(&mut on_render);
                    }
                    Err(RecvError::Lagged(_)) => self.render_into(&mut on_render),
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }

    fn render_into<F: FnMut(Vec<String>)>(&self, on_render: &mut F) {
        match self.store.tasks() {
            Ok(tasks) => {
                let stats = TaskStats::from_tasks(&tasks);
                info!(
                    widget = self.widget.as_str(),
                    total = stats.total,
                    completed = stats.completed,
                    "widget updated"
                );
                on_render(self.widget.render(&stats));
            }
            Err(err) => warn!(error = %err, "widget refresh failed"),
        }
    }
}

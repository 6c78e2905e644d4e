//! Due-date reminders.
//!
//! Each task is either [`ReminderState::Scheduled`] or
//! [`ReminderState::Unscheduled`] (the initial state). A task is scheduled
//! when it has a due date strictly after "now" and is not completed; every
//! other write leaves it unscheduled. Registration is keyed by task id, so
//! scheduling again replaces the previous reminder.
//!
//! The actual wake-up is delegated to an [`AlarmBackend`]. The shipped
//! [`TokioAlarmBackend`] sleeps one Tokio task per reminder and hands the
//! rendered alert to a [`NotificationSink`] when it fires. Reminders live as
//! long as the process; nothing is re-armed after a restart except by an
//! explicit [`AlarmScheduler::sync`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::notify::{Notification, NotificationSink, Reminder};
use crate::task::Task;

/// Wall-clock source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut current) = self.now.lock() {
            *current = now;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut current) = self.now.lock() {
            *current += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
            .lock()
            .map(|now| *now)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReminderState {
    Unscheduled,
    Scheduled {
        #[serde(with = "chrono::serde::ts_milliseconds")]
        due_date: DateTime<Utc>,
    },
}

impl ReminderState {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, ReminderState::Scheduled { .. })
    }
}

/// Platform wake-up service.
pub trait AlarmBackend: Send + Sync {
    /// Arm a one-shot wake-up for `reminder`, replacing any earlier one for
    /// the same task. Refusals come back as [`Error::SchedulingDenied`].
    fn register(&self, reminder: &Reminder) -> Result<()>;

    /// Disarm the wake-up for `task_id`; a no-op when none is armed.
    fn cancel(&self, task_id: i64);
}

struct Timer {
    generation: u64,
    token: CancellationToken,
}

/// One sleeping Tokio task per reminder.
pub struct TokioAlarmBackend {
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    channel_id: String,
    permitted: AtomicBool,
    generation: AtomicU64,
    timers: Arc<Mutex<HashMap<i64, Timer>>>,
}

impl TokioAlarmBackend {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            clock,
            channel_id: channel_id.into(),
            permitted: AtomicBool::new(true),
            generation: AtomicU64::new(0),
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Grant or revoke permission to arm wake-ups.
    pub fn set_permitted(&self, permitted: bool) {
        self.permitted.store(permitted, Ordering::SeqCst);
    }

    /// Number of armed timers.
    pub fn armed(&self) -> usize {
        self.timers.lock().map(|timers| timers.len()).unwrap_or(0)
    }
}

impl AlarmBackend for TokioAlarmBackend {
    fn register(&self, reminder: &Reminder) -> Result<()> {
        if !self.permitted.load(Ordering::SeqCst) {
            return Err(Error::SchedulingDenied {
                task_id: reminder.task_id,
                reason: "reminders are disabled".to_string(),
            });
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::SchedulingDenied {
                task_id: reminder.task_id,
                reason: "no async runtime to arm the reminder".to_string(),
            }
        })?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();

        {
            let mut timers = self
                .timers
                .lock()
                .map_err(|_| Error::OperationFailed("alarm registry lock poisoned".to_string()))?;
            if let Some(previous) = timers.insert(
                reminder.task_id,
                Timer {
                    generation,
                    token: token.clone(),
                },
            ) {
                previous.token.cancel();
            }
        }

        let sink = Arc::clone(&self.sink);
        let clock = Arc::clone(&self.clock);
        let timers = Arc::clone(&self.timers);
        let due_date = reminder.due_date;
        let notification = Notification::from_reminder(reminder, &self.channel_id);
        let task_id = reminder.task_id;
        runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(task_id, "reminder timer cancelled");
                }
                _ = sleep_until_due(clock.as_ref(), due_date) => {
                    let still_current = match timers.lock() {
                        Ok(mut timers) => match timers.get(&task_id) {
                            Some(timer) if timer.generation == generation => {
                                timers.remove(&task_id);
                                true
                            }
                            _ => false,
                        },
                        Err(_) => false,
                    };
                    if still_current {
                        sink.deliver(notification);
                    }
                }
            }
        });

        Ok(())
    }

    fn cancel(&self, task_id: i64) {
        if let Ok(mut timers) = self.timers.lock() {
            if let Some(timer) = timers.remove(&task_id) {
                timer.token.cancel();
            }
        }
    }
}

/// Longest single timer sleep; far-off reminders wake up and re-check.
const MAX_SLEEP: std::time::Duration = std::time::Duration::from_secs(60 * 60 * 24 * 7);

async fn sleep_until_due(clock: &dyn Clock, due_date: DateTime<Utc>) {
    loop {
        let remaining = (due_date - clock.now()).to_std().unwrap_or_default();
        if remaining.is_zero() {
            return;
        }
        tokio::time::sleep(remaining.min(MAX_SLEEP)).await;
    }
}

/// Outcome of [`AlarmScheduler::sync`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub scheduled: Vec<i64>,
    pub denied: Vec<i64>,
    pub released: Vec<i64>,
}

/// Per-task reminder state machine.
pub struct AlarmScheduler {
    backend: Arc<dyn AlarmBackend>,
    clock: Arc<dyn Clock>,
    scheduled: Mutex<HashMap<i64, DateTime<Utc>>>,
}

impl AlarmScheduler {
    pub fn new(backend: Arc<dyn AlarmBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            scheduled: Mutex::new(HashMap::new()),
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Apply the scheduling rule after a task was written.
    pub fn on_upsert(&self, task: &Task) -> Result<ReminderState> {
        self.apply(task)
    }

    /// Cancel before the task goes away.
    pub fn on_delete(&self, task_id: i64) -> ReminderState {
        self.unschedule(task_id);
        ReminderState::Unscheduled
    }

    /// Re-evaluate after the completion flag flipped; `task` is the new state.
    pub fn on_toggle(&self, task: &Task) -> Result<ReminderState> {
        debug!(
            task_id = task.id,
            completed = task.is_completed,
            "completion toggled"
        );
        self.apply(task)
    }

    /// Current state; a reminder whose due instant has passed counts as
    /// unscheduled.
    pub fn state(&self, task_id: i64) -> ReminderState {
        let now = self.clock.now();
        self.scheduled
            .lock()
            .ok()
            .and_then(|scheduled| scheduled.get(&task_id).copied())
            .filter(|due| *due > now)
            .map(|due_date| ReminderState::Scheduled { due_date })
            .unwrap_or(ReminderState::Unscheduled)
    }

    /// Ids with a pending reminder, ascending.
    pub fn scheduled_ids(&self) -> Vec<i64> {
        let now = self.clock.now();
        let mut ids: Vec<i64> = self
            .scheduled
            .lock()
            .map(|scheduled| {
                scheduled
                    .iter()
                    .filter(|(_, due)| **due > now)
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Bring registrations in line with `tasks`: arm every eligible task and
    /// release reminders for tasks that are gone or no longer eligible.
    pub fn sync(&self, tasks: &[Task]) -> SyncReport {
        let mut report = SyncReport::default();
        let present: std::collections::HashSet<i64> = tasks.iter().map(|task| task.id).collect();

        let stale: Vec<i64> = self
            .scheduled
            .lock()
            .map(|scheduled| {
                scheduled
                    .keys()
                    .filter(|id| !present.contains(id))
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        for id in stale {
            self.unschedule(id);
            report.released.push(id);
        }

        for task in tasks {
            let was_scheduled = self.state(task.id).is_scheduled();
            match self.apply(task) {
                Ok(ReminderState::Scheduled { .. }) => report.scheduled.push(task.id),
                Ok(ReminderState::Unscheduled) if was_scheduled => report.released.push(task.id),
                Ok(ReminderState::Unscheduled) => {}
                Err(_) => report.denied.push(task.id),
            }
        }

        info!(
            scheduled = report.scheduled.len(),
            denied = report.denied.len(),
            released = report.released.len(),
            "reminders synced"
        );
        report
    }

    fn apply(&self, task: &Task) -> Result<ReminderState> {
        let now = self.clock.now();
        let reminder = match Reminder::for_task(task) {
            Some(reminder) if !task.is_completed && reminder.due_date > now => reminder,
            _ => {
                self.unschedule(task.id);
                return Ok(ReminderState::Unscheduled);
            }
        };

        if let Err(err) = self.backend.register(&reminder) {
            warn!(task_id = task.id, error = %err, "reminder registration failed");
            self.forget(task.id);
            return Err(err);
        }

        if let Ok(mut scheduled) = self.scheduled.lock() {
            scheduled.insert(task.id, reminder.due_date);
        }
        info!(task_id = task.id, due = %reminder.due_date, "reminder scheduled");
        Ok(ReminderState::Scheduled {
            due_date: reminder.due_date,
        })
    }

    fn unschedule(&self, task_id: i64) {
        self.backend.cancel(task_id);
        if self.forget(task_id) {
            info!(task_id, "reminder cancelled");
        }
    }

    fn forget(&self, task_id: i64) -> bool {
        self.scheduled
            .lock()
            .map(|mut scheduled| scheduled.remove(&task_id).is_some())
            .unwrap_or(false)
    }
}

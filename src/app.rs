//! Composition root.
//!
//! Wires store, repository, scheduler and service together by hand, in that
//! order. Front ends hold an [`App`] and nothing else.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::analytics::TaskStats;
use crate::config::Config;
use crate::error::Result;
use crate::events::EventBus;
use crate::hierarchy::{build_forest, HierarchicalTask};
use crate::live::LiveQuery;
use crate::notify::{LogSink, NotificationSink};
use crate::repository::TaskRepository;
use crate::scheduler::{AlarmBackend, AlarmScheduler, Clock, SystemClock, TokioAlarmBackend};
use crate::service::TaskService;
use crate::store::{SqliteTaskStore, TaskStore};

#[derive(Clone)]
pub struct App {
    service: TaskService,
    forest: LiveQuery<Vec<HierarchicalTask>>,
}

impl App {
    /// Open the configured database with the Tokio alarm backend delivering
    /// to `sink`.
    pub fn open(config: &Config, db_override: Option<&Path>, sink: Arc<dyn NotificationSink>) -> Result<Self> {
        let path = match db_override {
            Some(path) => path.to_path_buf(),
            None => config.database_path()?,
        };
        debug!(path = %path.display(), "opening task database");
        let store = Arc::new(SqliteTaskStore::open(&path)?);

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let backend = TokioAlarmBackend::new(sink, Arc::clone(&clock), config.reminders.channel_id.clone());
        backend.set_permitted(config.reminders.enabled);

        Ok(Self::with_store(
            store,
            Arc::new(backend),
            clock,
            config.live.grace_period(),
        ))
    }

    /// Open with the default log/stdout notification sink.
    pub fn open_default(config: &Config, db_override: Option<&Path>) -> Result<Self> {
        Self::open(config, db_override, Arc::new(LogSink::new()))
    }

    /// Build from explicit parts.
    pub fn with_store(
        store: Arc<dyn TaskStore>,
        backend: Arc<dyn AlarmBackend>,
        clock: Arc<dyn Clock>,
        grace: Duration,
    ) -> Self {
        let repository = TaskRepository::new(Arc::clone(&store), grace);
        let scheduler = Arc::new(AlarmScheduler::new(backend, clock));
        let service = TaskService::new(repository, scheduler, EventBus::new());
        let forest = LiveQuery::new("forest", store, grace, |store| build_forest(&store.tasks()?));
        Self { service, forest }
    }

    pub fn service(&self) -> &TaskService {
        &self.service
    }

    pub fn repository(&self) -> &TaskRepository {
        self.service.repository()
    }

    pub fn scheduler(&self) -> &Arc<AlarmScheduler> {
        self.service.scheduler()
    }

    pub fn bus(&self) -> &EventBus {
        self.service.bus()
    }

    /// The nested task list, rebuilt after every write.
    pub fn forest(&self) -> LiveQuery<Vec<HierarchicalTask>> {
        self.forest.clone()
    }

    pub fn stats(&self) -> Result<TaskStats> {
        Ok(TaskStats::from_tasks(&self.repository().snapshot()?))
    }
}

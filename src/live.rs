//! Push-updating queries over the task store.
//!
//! A [`LiveQuery`] re-runs its query after every committed store write and
//! pushes the fresh snapshot to all attached [`Feed`]s. The background task
//! that does this is started by the first `subscribe()`, and stopped once the
//! last feed has been gone for the grace period. The next `subscribe()`
//! starts it again.
//!
//! Must be used from inside a Tokio runtime.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::store::{StoreChange, TaskStore};

/// Default delay between the last feed detaching and teardown.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

type QueryFn<T> = dyn Fn(&dyn TaskStore) -> Result<T> + Send + Sync;
type ActiveSlot<T> = Mutex<Option<Arc<watch::Sender<Arc<T>>>>>;

struct Shared<T> {
    label: &'static str,
    store: Arc<dyn TaskStore>,
    query: Box<QueryFn<T>>,
    grace: Duration,
    active: ActiveSlot<T>,
}

/// A store query whose result is re-pushed after each write.
pub struct LiveQuery<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for LiveQuery<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + Sync + 'static> LiveQuery<T> {
    pub fn new<F>(label: &'static str, store: Arc<dyn TaskStore>, grace: Duration, query: F) -> Self
    where
        F: Fn(&dyn TaskStore) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                label,
                store,
                query: Box::new(query),
                grace,
                active: Mutex::new(None),
            }),
        }
    }

    /// Attach a feed, starting the background query if it is not running.
    ///
    /// The feed starts out holding a snapshot that is current as of the call.
    pub fn subscribe(&self) -> Result<Feed<T>> {
        let shared = &self.shared;
        let mut active = shared
            .active
            .lock()
            .map_err(|_| Error::OperationFailed("live query lock poisoned".to_string()))?;

        if let Some(sender) = active.as_ref() {
            return Ok(Feed {
                rx: sender.subscribe(),
            });
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::OperationFailed("live queries require a Tokio runtime".to_string())
        })?;

        // Subscribe before the first read so no write can slip between them.
        let changes = shared.store.subscribe();
        let initial = (shared.query)(shared.store.as_ref())?;
        let (sender, rx) = watch::channel(Arc::new(initial));
        let sender = Arc::new(sender);
        *active = Some(Arc::clone(&sender));
        drop(active);

        debug!(query = shared.label, "live query started");
        runtime.spawn(pump(Arc::clone(shared), sender, changes));
        Ok(Feed { rx })
    }

    /// Whether the background query is currently running.
    pub fn is_active(&self) -> bool {
        self.shared
            .active
            .lock()
            .map(|active| active.is_some())
            .unwrap_or(false)
    }

    /// Run the query once without attaching.
    pub fn fetch(&self) -> Result<T> {
        (self.shared.query)(self.shared.store.as_ref())
    }
}

async fn pump<T: Send + Sync + 'static>(
    shared: Arc<Shared<T>>,
    sender: Arc<watch::Sender<Arc<T>>>,
    mut changes: broadcast::Receiver<StoreChange>,
) {
    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(change) => {
                    debug!(query = shared.label, ?change, "store changed");
                    refresh(&shared, &sender);
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(query = shared.label, skipped, "change feed lagged; re-querying");
                    refresh(&shared, &sender);
                }
                Err(RecvError::Closed) => {
                    clear_active(&shared);
                    break;
                }
            },
            _ = sender.closed() => {
                tokio::time::sleep(shared.grace).await;
                let torn_down = match shared.active.lock() {
                    Ok(mut active) => {
                        if sender.receiver_count() == 0 {
                            *active = None;
                            true
                        } else {
                            false
                        }
                    }
                    Err(_) => true,
                };
                if torn_down {
                    debug!(query = shared.label, "live query torn down after grace period");
                    break;
                }
                // Feeds re-attached during the grace period; catch up on
                // any write that landed while we slept.
                refresh(&shared, &sender);
            }
        }
    }
}

fn refresh<T>(shared: &Shared<T>, sender: &watch::Sender<Arc<T>>) {
    match (shared.query)(shared.store.as_ref()) {
        Ok(snapshot) => {
            sender.send_replace(Arc::new(snapshot));
        }
        Err(err) => {
            warn!(query = shared.label, error = %err, "live query refresh failed; keeping previous snapshot");
        }
    }
}

fn clear_active<T>(shared: &Shared<T>) {
    if let Ok(mut active) = shared.active.lock() {
        *active = None;
    }
}

/// One subscriber's view of a live query.
pub struct Feed<T> {
    rx: watch::Receiver<Arc<T>>,
}

impl<T> Feed<T> {
    /// Latest snapshot.
    pub fn current(&self) -> Arc<T> {
        Arc::clone(&self.rx.borrow())
    }

    /// Wait for the next snapshot. `None` once the query has been torn down.
    pub async fn next(&mut self) -> Option<Arc<T>> {
        self.rx.changed().await.ok()?;
        Some(Arc::clone(&self.rx.borrow_and_update()))
    }
}

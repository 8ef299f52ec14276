//! Notification handler table and bounded dispatch

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::value::RawValue;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Callback invoked with a notification's raw params (`None` when absent)
pub type NotificationHandler = Arc<dyn Fn(Option<Box<RawValue>>) + Send + Sync>;

/// Outcome of handing a notification to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The notification was queued for its handler
    Spawned,
    /// No handler is registered for the method
    NoHandler,
}

/// Routes notifications to registered handlers off the receive loop
///
/// Handlers run on the blocking pool, at most `max_concurrent` at once.
/// Notifications beyond that wait for a free slot. A panicking handler is
/// caught and logged; it never reaches the receive loop.
pub struct NotificationDispatcher {
    handlers: RwLock<HashMap<String, NotificationHandler>>,
    permits: Arc<Semaphore>,
}

impl NotificationDispatcher {
    /// Create a dispatcher allowing `max_concurrent` handlers in flight
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Install or replace the handler for `method`
    pub fn register(&self, method: impl Into<String>, handler: NotificationHandler) {
        let method = method.into();
        if self.handlers.write().insert(method.clone(), handler).is_some() {
            debug!(method = %method, "Replaced notification handler");
        }
    }

    /// Remove the handler for `method`
    pub fn unregister(&self, method: &str) -> bool {
        self.handlers.write().remove(method).is_some()
    }

    /// Whether a handler is registered for `method`
    pub fn contains(&self, method: &str) -> bool {
        self.handlers.read().contains_key(method)
    }

    /// Queue the handler for `method` and return without waiting for it
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, method: &str, params: Option<Box<RawValue>>) -> Dispatch {
        let Some(handler) = self.handlers.read().get(method).cloned() else {
            return Dispatch::NoHandler;
        };

        let permits = self.permits.clone();
        let method = method.to_string();
        tokio::spawn(async move {
            let Ok(permit) = permits.acquire_owned().await else {
                return;
            };
            let worker = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(params))) {
                    warn!(
                        method = %method,
                        panic = %panic_message(payload.as_ref()),
                        "Notification handler panicked"
                    );
                }
            });
            if let Err(join_err) = worker.await {
                warn!(error = %join_err, "Notification worker cancelled");
            }
        });

        Dispatch::Spawned
    }

    /// Handler slots currently free
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

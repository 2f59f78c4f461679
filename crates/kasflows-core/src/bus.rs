//! Single-handler event bus.
//!
//! Each event name maps to at most one handler. Dispatch runs the handler
//! synchronously on the caller's task; failures are contained here.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info};

/// A callback bound to one event name.
pub trait EventHandler: Send + Sync {
    fn handle(&self, payload: &Value) -> anyhow::Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&Value) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, payload: &Value) -> anyhow::Result<()> {
        self(payload)
    }
}

/// What happened to a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler ran to completion.
    Handled,
    /// The handler returned an error or panicked. Logged, not retried.
    Failed,
    /// No handler was registered; the payload was dropped.
    NoHandler,
}

/// Maps event names to their current handler.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Arc<dyn EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure for `event`, replacing any previous handler.
    pub fn on<F>(&self, event: &str, handler: F)
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(event, Arc::new(handler));
    }

    /// Register a handler object for `event`, replacing any previous one.
    pub fn register(&self, event: &str, handler: Arc<dyn EventHandler>) {
        let replaced = self
            .handlers
            .write()
            .insert(event.to_string(), handler)
            .is_some();
        info!(event = %event, replaced, "handler registered");
    }

    /// Remove the handler for `event`. Returns true if one was registered.
    pub fn off(&self, event: &str) -> bool {
        let removed = self.handlers.write().remove(event).is_some();
        if removed {
            info!(event = %event, "handler removed");
        }
        removed
    }

    /// Whether a handler is registered for `event`.
    pub fn has_handler(&self, event: &str) -> bool {
        self.handlers.read().contains_key(event)
    }

    /// Invoke the handler for `event` with `payload`, if any.
    ///
    /// The handler runs after the table lock is released, so it may register
    /// or remove handlers itself.
    pub fn dispatch(&self, event: &str, payload: &Value) -> DispatchOutcome {
        let handler = self.handlers.read().get(event).cloned();

        let Some(handler) = handler else {
            debug!(event = %event, "no handler for event, ignoring");
            return DispatchOutcome::NoHandler;
        };

        match catch_unwind(AssertUnwindSafe(|| handler.handle(payload))) {
            Ok(Ok(())) => {
                debug!(event = %event, "event dispatched");
                DispatchOutcome::Handled
            }
            Ok(Err(e)) => {
                error!(event = %event, error = %e, "event handler failed");
                DispatchOutcome::Failed
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(event = %event, reason = %reason, "event handler panicked");
                DispatchOutcome::Failed
            }
        }
    }
}

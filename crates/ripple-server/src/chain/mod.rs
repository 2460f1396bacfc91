//! Priority-ordered request handler chain.
//!
//! Each inbound request is owned by exactly one strategy: the first
//! enabled handler (ascending priority, insertion order breaking ties)
//! whose [`RequestHandler::supports`] predicate matches. Predicates are
//! capability checks over method, headers, and path shape; they must be
//! pure so the chain can probe several handlers per request.
//!
//! Dispatch takes a snapshot of the entry list under a read lock, so
//! in-flight requests are unaffected by concurrent reconfiguration
//! (`add` / `remove` / `set_enabled`).

pub mod strategies;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use parking_lot::RwLock;
use ripple_core::errors::{Result, RippleError};
use tracing::{debug, warn};

use crate::request::{ServerRequest, ServerResponse};

/// One request-handling strategy.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Stable handler name, used for chain configuration and logs.
    fn name(&self) -> &str;

    /// Dispatch priority; lower numbers are consulted first.
    fn priority(&self) -> i32 {
        100
    }

    /// Whether this handler owns the request. Must be pure.
    fn supports(&self, request: &ServerRequest) -> bool;

    /// Process the request.
    async fn handle(&self, request: ServerRequest) -> Result<ServerResponse>;
}

/// Observation callbacks around dispatch.
///
/// External collaborators, not required for correctness: every method has
/// a no-op default.
pub trait ChainObserver: Send + Sync {
    /// A request entered the chain.
    fn on_request(&self, _request: &ServerRequest) {}
    /// A handler was selected for a request.
    fn on_selected(&self, _handler: &str, _request: &ServerRequest) {}
    /// The selected handler produced a response.
    fn on_response(&self, _handler: &str, _status: u16, _latency: Duration) {}
    /// The selected handler failed.
    fn on_error(&self, _handler: &str, _error: &RippleError) {}
}

/// Observer that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl ChainObserver for NoopObserver {}

/// Observer that logs via `tracing` and records facade metrics.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl ChainObserver for TracingObserver {
    fn on_request(&self, request: &ServerRequest) {
        counter!("chain_requests_total").increment(1);
        debug!(method = %request.method, path = %request.path, "request entered chain");
    }

    fn on_selected(&self, handler: &str, request: &ServerRequest) {
        debug!(handler, method = %request.method, path = %request.path, "handler selected");
    }

    fn on_response(&self, handler: &str, status: u16, latency: Duration) {
        counter!("chain_responses_total", "handler" => handler.to_owned()).increment(1);
        histogram!("chain_request_duration_seconds", "handler" => handler.to_owned())
            .record(latency.as_secs_f64());
        debug!(handler, status, latency_ms = latency.as_millis() as u64, "handler responded");
    }

    fn on_error(&self, handler: &str, error: &RippleError) {
        counter!("chain_errors_total", "handler" => handler.to_owned()).increment(1);
        warn!(handler, code = error.code(), error = %error, "handler failed");
    }
}

#[derive(Clone)]
struct ChainEntry {
    handler: Arc<dyn RequestHandler>,
    name: String,
    priority: i32,
    enabled: bool,
}

/// The ordered strategy pipeline.
pub struct HandlerChain {
    entries: RwLock<Vec<ChainEntry>>,
    observer: Arc<dyn ChainObserver>,
}

impl Default for HandlerChain {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerChain {
    /// An empty chain with the logging observer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_observer(Arc::new(TracingObserver))
    }

    /// An empty chain with a custom observer.
    #[must_use]
    pub fn with_observer(observer: Arc<dyn ChainObserver>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            observer,
        }
    }

    /// Add a handler (enabled). The entry list stays sorted by ascending
    /// priority; the sort is stable, so insertion order breaks ties.
    pub fn add(&self, handler: Arc<dyn RequestHandler>) {
        let entry = ChainEntry {
            name: handler.name().to_owned(),
            priority: handler.priority(),
            enabled: true,
            handler,
        };
        let mut entries = self.entries.write();
        entries.push(entry);
        entries.sort_by_key(|e| e.priority);
    }

    /// Remove a handler by name. Returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.name != name);
        entries.len() != before
    }

    /// Enable or disable a handler by name. Returns whether it existed.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut entries = self.entries.write();
        let mut found = false;
        for entry in entries.iter_mut().filter(|e| e.name == name) {
            entry.enabled = enabled;
            found = true;
        }
        found
    }

    /// Handler names in dispatch order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.read().iter().map(|e| e.name.clone()).collect()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Dispatch one request to the first matching enabled handler.
    ///
    /// Handler execution errors propagate unmodified — the chain never
    /// retries. An unroutable request fails with the stable
    /// `no handler for METHOD PATH` error; a chain whose handlers are all
    /// disabled fails with the distinct `no enabled handler` error.
    pub async fn handle(&self, request: ServerRequest) -> Result<ServerResponse> {
        self.observer.on_request(&request);

        // Snapshot under the read lock; dispatch proceeds lock-free.
        let snapshot: Vec<ChainEntry> = self.entries.read().clone();

        if !snapshot.is_empty() && snapshot.iter().all(|e| !e.enabled) {
            return Err(RippleError::NoEnabledHandler);
        }

        let method = request.method.clone();
        let path = request.path.clone();

        for entry in snapshot.iter().filter(|e| e.enabled) {
            if !entry.handler.supports(&request) {
                continue;
            }
            self.observer.on_selected(&entry.name, &request);
            let started = Instant::now();
            return match entry.handler.handle(request).await {
                Ok(response) => {
                    self.observer
                        .on_response(&entry.name, response.status, started.elapsed());
                    Ok(response)
                }
                Err(err) => {
                    self.observer.on_error(&entry.name, &err);
                    Err(err)
                }
            };
        }

        Err(RippleError::NoHandler { method, path })
    }
}

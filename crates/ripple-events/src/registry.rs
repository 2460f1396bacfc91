//! Thread-safe storage of event handlers.
//!
//! Handlers are keyed by event id, optionally namespaced by a route id so
//! two routes can own an event called `"inc"` without colliding. Lookups
//! check the route-scoped key first and fall back to the global scope.
//! Re-registration under an existing key replaces the previous handler
//! (last write wins); a route teardown removes every handler it owns.
//!
//! Reads take a shared lock and never block on other reads; registration
//! takes the exclusive lock for the minimum critical section.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use ripple_core::errors::{Result, RippleError};
use ripple_core::event::{EventRequest, EventResponse};

/// One named event handler.
///
/// The request is consumed: each [`EventRequest`] is handed to exactly one
/// handler invocation.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process the event and produce a response.
    async fn handle(&self, request: EventRequest) -> Result<EventResponse>;
}

/// Adapter so plain async closures can register as handlers.
struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(EventRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<EventResponse>> + Send,
{
    async fn handle(&self, request: EventRequest) -> Result<EventResponse> {
        (self.0)(request).await
    }
}

/// Wrap an async closure as a registrable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(EventRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<EventResponse>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Read side of the registry, as seen by the event service.
///
/// Split from [`EventRegistry`] so tests can substitute a spy and assert
/// on lookup behavior.
pub trait HandlerRegistry: Send + Sync {
    /// Resolve a handler for the event, preferring the route scope.
    fn resolve(&self, route: Option<&str>, event_id: &str) -> Option<Arc<dyn EventHandler>>;
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct HandlerKey {
    route: Option<String>,
    event: String,
}

/// Thread-safe event-id → handler map.
#[derive(Default)]
pub struct EventRegistry {
    handlers: RwLock<HashMap<HandlerKey, Arc<dyn EventHandler>>>,
}

impl EventRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler in the global scope. Last write wins.
    pub fn register(&self, event_id: impl Into<String>, handler: Arc<dyn EventHandler>) -> Result<()> {
        self.register_key(None, event_id.into(), handler)
    }

    /// Register a handler scoped to a route. Last write wins.
    pub fn register_scoped(
        &self,
        route_id: impl Into<String>,
        event_id: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        self.register_key(Some(route_id.into()), event_id.into(), handler)
    }

    fn register_key(
        &self,
        route: Option<String>,
        event: String,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        if event.is_empty() {
            return Err(RippleError::validation("event id must not be empty"));
        }
        if let Some(route_id) = &route {
            if route_id.is_empty() {
                return Err(RippleError::validation("route id must not be empty"));
            }
        }
        let mut handlers = self.handlers.write();
        let _ = handlers.insert(HandlerKey { route, event }, handler);
        Ok(())
    }

    /// Look up a global-scope handler.
    #[must_use]
    pub fn get(&self, event_id: &str) -> Option<Arc<dyn EventHandler>> {
        self.resolve(None, event_id)
    }

    /// Remove a global-scope handler. Returns whether it existed.
    pub fn remove(&self, event_id: &str) -> bool {
        let key = HandlerKey {
            route: None,
            event: event_id.to_owned(),
        };
        self.handlers.write().remove(&key).is_some()
    }

    /// Remove every handler owned by a route (route teardown).
    ///
    /// Returns how many handlers were removed.
    pub fn remove_route(&self, route_id: &str) -> usize {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|key, _| key.route.as_deref() != Some(route_id));
        before - handlers.len()
    }

    /// Sorted list of registered event ids (route-scoped ids are prefixed
    /// `route:event`).
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let handlers = self.handlers.read();
        let mut ids: Vec<String> = handlers
            .keys()
            .map(|key| match &key.route {
                Some(route) => format!("{route}:{}", key.event),
                None => key.event.clone(),
            })
            .collect();
        ids.sort();
        ids
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl HandlerRegistry for EventRegistry {
    fn resolve(&self, route: Option<&str>, event_id: &str) -> Option<Arc<dyn EventHandler>> {
        let handlers = self.handlers.read();
        if let Some(route_id) = route {
            let scoped = HandlerKey {
                route: Some(route_id.to_owned()),
                event: event_id.to_owned(),
            };
            if let Some(handler) = handlers.get(&scoped) {
                return Some(Arc::clone(handler));
            }
        }
        let global = HandlerKey {
            route: None,
            event: event_id.to_owned(),
        };
        handlers.get(&global).map(Arc::clone)
    }
}

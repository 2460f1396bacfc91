//! Connection registry and lifecycle hooks.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use tokio::sync::RwLock;
use tracing::debug;

use super::connection::ClientConnection;

/// Per-connection lifecycle callbacks exposed to embedders.
///
/// `on_connect` fires once the connection is upgraded and registered;
/// `on_disconnect` fires once it is deregistered. Both default to no-ops.
pub trait LifecycleHooks: Send + Sync {
    /// A connection finished upgrading.
    fn on_connect(&self, _connection_id: &str) {}
    /// A connection closed.
    fn on_disconnect(&self, _connection_id: &str) {}
}

/// Hooks that do nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHooks;

impl LifecycleHooks for NoopHooks {}

/// Registry of live connections.
pub struct ConnectionHub {
    /// Connected clients indexed by connection id.
    connections: RwLock<HashMap<String, Arc<ClientConnection>>>,
    /// Atomic counter so count queries skip the read lock.
    active_count: AtomicUsize,
    hooks: Arc<dyn LifecycleHooks>,
}

impl ConnectionHub {
    /// An empty hub with no-op hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::with_hooks(Arc::new(NoopHooks))
    }

    /// An empty hub with embedder hooks.
    #[must_use]
    pub fn with_hooks(hooks: Arc<dyn LifecycleHooks>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
            hooks,
        }
    }

    /// Register a connection and fire `on_connect`.
    pub async fn add(&self, connection: Arc<ClientConnection>) {
        let id = connection.id.clone();
        let mut connections = self.connections.write().await;
        if connections.insert(id.clone(), connection).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
        drop(connections);
        counter!("ws_connections_total").increment(1);
        gauge!("ws_connections_active").set(self.connection_count() as f64);
        debug!(conn_id = %id, "connection registered");
        self.hooks.on_connect(&id);
    }

    /// Deregister a connection and fire `on_disconnect`.
    pub async fn remove(&self, connection_id: &str) {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(connection_id);
        if removed.is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
        drop(connections);
        if let Some(connection) = removed {
            let uptime = (Utc::now() - connection.connected_at())
                .num_milliseconds()
                .max(0) as f64
                / 1000.0;
            counter!("ws_disconnections_total").increment(1);
            histogram!("ws_connection_duration_seconds").record(uptime);
            gauge!("ws_connections_active").set(self.connection_count() as f64);
            debug!(conn_id = %connection_id, uptime_s = uptime, "connection deregistered");
            self.hooks.on_disconnect(connection_id);
        }
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Look up a connection by id.
    pub async fn get(&self, connection_id: &str) -> Option<Arc<ClientConnection>> {
        self.connections.read().await.get(connection_id).cloned()
    }

    /// Connections currently bound to a topic.
    pub async fn topic_connections(&self, topic: &str) -> Vec<Arc<ClientConnection>> {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|c| c.topic().as_deref() == Some(topic))
            .cloned()
            .collect()
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

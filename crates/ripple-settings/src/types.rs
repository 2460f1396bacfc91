//! Settings type definitions and compiled defaults.

use serde::{Deserialize, Serialize};

/// Root settings document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RippleSettings {
    /// HTTP/WebSocket server.
    pub server: ServerSettings,
    /// Publish/subscribe bus.
    pub bus: BusSettings,
    /// Browser-side conventions.
    pub ui: UiSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// HTTP/WebSocket server settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Heartbeat ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Consecutive missed pongs before a connection is considered dead.
    pub heartbeat_max_missed: u32,
    /// Per-connection outbound queue capacity (messages).
    pub outbound_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 4590,
            heartbeat_interval_ms: 15_000,
            heartbeat_max_missed: 3,
            outbound_queue_capacity: 64,
        }
    }
}

/// Bus settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusSettings {
    /// Per-topic broadcast channel capacity (messages).
    pub topic_capacity: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self { topic_capacity: 256 }
    }
}

/// Browser-side selector conventions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UiSettings {
    /// Selector of the error-display target.
    pub error_selector: String,
    /// Selector of the main content target.
    pub content_selector: String,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            error_selector: "#ripple-error".into(),
            content_selector: "#ripple-content".into(),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Emit one JSON object per line instead of pretty output.
    pub json: bool,
    /// `RUST_LOG`-style filter directive.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            json: false,
            filter: "info".into(),
        }
    }
}

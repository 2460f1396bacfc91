//! Settings loading: defaults ← file ← environment.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::Result;
use crate::types::RippleSettings;

/// Environment overrides: variable name → JSON pointer into the document.
const ENV_OVERRIDES: &[(&str, &str, EnvKind)] = &[
    ("RIPPLE_SERVER_HOST", "/server/host", EnvKind::String),
    ("RIPPLE_SERVER_PORT", "/server/port", EnvKind::Number),
    (
        "RIPPLE_SERVER_HEARTBEAT_INTERVAL_MS",
        "/server/heartbeatIntervalMs",
        EnvKind::Number,
    ),
    (
        "RIPPLE_SERVER_OUTBOUND_QUEUE_CAPACITY",
        "/server/outboundQueueCapacity",
        EnvKind::Number,
    ),
    ("RIPPLE_BUS_TOPIC_CAPACITY", "/bus/topicCapacity", EnvKind::Number),
    ("RIPPLE_UI_ERROR_SELECTOR", "/ui/errorSelector", EnvKind::String),
    (
        "RIPPLE_UI_CONTENT_SELECTOR",
        "/ui/contentSelector",
        EnvKind::String,
    ),
    ("RIPPLE_LOG_FILTER", "/logging/filter", EnvKind::String),
    ("RIPPLE_LOG_JSON", "/logging/json", EnvKind::Bool),
];

#[derive(Clone, Copy)]
enum EnvKind {
    String,
    Number,
    Bool,
}

/// Default settings file location: `~/.ripple/settings.json`.
#[must_use]
pub fn settings_path() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from);
    home.join(".ripple").join("settings.json")
}

/// Deep-merge `overlay` onto `base`: objects merge recursively, every
/// other value type replaces.
#[must_use]
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Load from the default path with env overrides applied.
///
/// A missing file is not an error: defaults apply, env still overrides.
pub fn load_settings() -> Result<RippleSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from a specific path with env overrides applied.
pub fn load_settings_from_path(path: &Path) -> Result<RippleSettings> {
    let defaults = serde_json::to_value(RippleSettings::default())?;

    let merged = if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        let file_value: Value = serde_json::from_str(&raw)?;
        deep_merge(defaults, file_value)
    } else {
        defaults
    };

    let with_env = apply_env_overrides(merged);
    Ok(serde_json::from_value(with_env)?)
}

/// Apply `RIPPLE_*` env overrides (highest priority).
fn apply_env_overrides(mut document: Value) -> Value {
    for (var, pointer, kind) in ENV_OVERRIDES {
        let Ok(raw) = std::env::var(var) else {
            continue;
        };
        let value = match kind {
            EnvKind::String => Value::String(raw),
            EnvKind::Number => match raw.parse::<u64>() {
                Ok(n) => Value::from(n),
                Err(_) => {
                    tracing::warn!(var = *var, value = %raw, "ignoring non-numeric env override");
                    continue;
                }
            },
            EnvKind::Bool => match raw.as_str() {
                "1" | "true" | "yes" => Value::Bool(true),
                "0" | "false" | "no" => Value::Bool(false),
                _ => {
                    tracing::warn!(var = *var, value = %raw, "ignoring non-boolean env override");
                    continue;
                }
            },
        };
        if let Some(slot) = document.pointer_mut(pointer) {
            *slot = value;
        }
    }
    document
}

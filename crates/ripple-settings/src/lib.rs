//! # ripple-settings
//!
//! Configuration management with layered sources for the Ripple server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`RippleSettings::default()`]
//! 2. **User file** — `~/.ripple/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `RIPPLE_*` overrides (highest priority)
//!
//! The global singleton is reloadable: [`reload_settings_from_path`] swaps
//! the cached value so all subsequent [`get_settings`] calls return fresh
//! data.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::path::Path;
use std::sync::{Arc, RwLock};

/// Global settings singleton.
///
/// `RwLock<Option<Arc<..>>>` instead of `OnceLock` so the cached value can
/// be swapped after a reload. Reads are cheap (shared lock + `Arc::clone`);
/// writes only happen on reload.
static SETTINGS: RwLock<Option<Arc<RippleSettings>>> = RwLock::new(None);

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.ripple/settings.json` with env
/// var overrides. On subsequent calls, returns the cached value. If
/// loading fails, returns compiled defaults.
pub fn get_settings() -> Arc<RippleSettings> {
    // Fast path: read lock
    {
        let guard = SETTINGS.read().expect("settings lock poisoned");
        if let Some(ref s) = *guard {
            return Arc::clone(s);
        }
    }

    // Slow path: first access, take write lock
    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    // Double-check after acquiring write lock
    if let Some(ref s) = *guard {
        return Arc::clone(s);
    }

    let settings = Arc::new(match load_settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            RippleSettings::default()
        }
    });
    *guard = Some(Arc::clone(&settings));
    settings
}

/// Initialize the global settings with a specific value.
///
/// Replaces any previously cached settings. Useful for tests and server
/// startup where the settings path is known.
pub fn init_settings(settings: RippleSettings) {
    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    *guard = Some(Arc::new(settings));
}

/// Reload settings from a specific file path.
///
/// Reads the file, deep-merges over defaults, applies env overrides, and
/// atomically swaps the global cache.
pub fn reload_settings_from_path(path: &Path) {
    let new = Arc::new(match load_settings_from_path(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, ?path, "failed to reload settings, falling back to defaults");
            RippleSettings::default()
        }
    });
    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    *guard = Some(new);
    tracing::info!(?path, "settings reloaded from disk");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Tests that mutate the global SETTINGS static must hold this lock
    /// to avoid racing with each other.
    static SETTINGS_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn init_then_get_returns_same_value() {
        let _guard = SETTINGS_MUTEX.lock().unwrap();
        let mut custom = RippleSettings::default();
        custom.server.port = 7777;
        init_settings(custom);
        assert_eq!(get_settings().server.port, 7777);
    }

    #[test]
    fn reload_swaps_the_cache() {
        let _guard = SETTINGS_MUTEX.lock().unwrap();
        init_settings(RippleSettings::default());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"server": {{"port": 9191}}}}"#).unwrap();

        reload_settings_from_path(&path);
        assert_eq!(get_settings().server.port, 9191);

        // Put defaults back for other tests.
        init_settings(RippleSettings::default());
    }

    #[test]
    fn reload_of_bad_file_falls_back_to_defaults() {
        let _guard = SETTINGS_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "oops").unwrap();

        reload_settings_from_path(&path);
        assert_eq!(get_settings().server.port, RippleSettings::default().server.port);
    }
}

//! # Configuration
//!
//! A minimal string key/value store. Pipelines read typed values from an
//! immutable [`ConfigSnapshot`], so configuration can be layered however
//! the embedding application likes.
//!
//! ```rust
//! use raster_core::RasterConfig;
//! let mut config = RasterConfig::new();
//!
//! config.set("render.timeout_secs", "120");
//! config.set("thumbnail.on_import", "true");
//!
//! let snap = config.snapshot();
//! assert_eq!(snap.get_u64("render.timeout_secs"), Some(120));
//! assert_eq!(snap.get_bool("thumbnail.on_import"), Some(true));
//! ```
//!
//! ## Environment overrides
//!
//! [`RasterConfig::load_env`] maps prefixed variables onto dotted keys:
//!
//! ```bash
//! export RASTER__RENDER__EXECUTABLE=/usr/bin/python3   # render.executable
//! ```

use std::collections::HashMap;
use std::time::Duration;

/// Default prefix for [`RasterConfig::load_env`].
pub const ENV_PREFIX: &str = "RASTER__";

#[derive(Debug, Default, Clone)]
pub struct RasterConfig {
    values: HashMap<String, String>,
}

impl RasterConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Builder-style `set`.
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Overlay `(name, value)` pairs whose name starts with `prefix`.
    ///
    /// `RASTER__RENDER__TIMEOUT_SECS` → `render.timeout_secs`
    pub fn load_vars<I>(&mut self, prefix: &str, vars: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut loaded = 0;
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                self.set(normalized, value);
                loaded += 1;
            }
        }
        loaded
    }

    /// Overlay the process environment.
    pub fn load_env(&mut self, prefix: &str) -> usize {
        self.load_vars(prefix, std::env::vars())
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    map: HashMap<String, String>,
}

impl ConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.trim().parse::<usize>().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.trim().parse::<bool>().ok())
    }

    /// Whole seconds. `0` means "no limit" and yields `None`.
    pub fn get_duration_secs(&self, key: &str) -> Option<Duration> {
        self.get_u64(key)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

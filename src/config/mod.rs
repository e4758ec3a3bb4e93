//! Runtime configuration
//!
//! The effective configuration is a flat, ordered set of `KEY=VALUE`
//! settings layered from built-in defaults, the persisted `.env` file, the
//! live process environment, and explicit overrides.

pub mod defaults;
pub mod envfile;
pub mod keys;
pub mod store;

pub use defaults::default_settings;
pub use envfile::{generate_api_key, parse_env_content, render_env_content};
pub use store::{ConfigStore, ENV_FILE, API_KEY_LENGTH};

use std::path::PathBuf;

use indexmap::IndexMap;
use thiserror::Error;

/// Errors reading or writing the persisted configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Ordered key/value settings with exactly one value per key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    values: IndexMap<String, String>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Value for `key`, or the empty string when unset
    pub fn value(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    /// Set a value, keeping the key's original position if already present
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Case-insensitive boolean reading of a flag setting
    pub fn flag(&self, key: &str) -> bool {
        self.value(key).eq_ignore_ascii_case("true")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut config = Configuration::new();
        for (k, v) in iter {
            config.set(k, v);
        }
        config
    }
}

//! Layered configuration resolution and persistence

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info};

use super::envfile::{generate_api_key, parse_env_content, render_env_content};
use super::{keys, ConfigError, Configuration};
use crate::system::Workspace;

/// Persisted configuration file, relative to the workspace root
pub const ENV_FILE: &str = ".env";

/// Length of a generated API secret
pub const API_KEY_LENGTH: usize = 64;

/// Resolves the effective configuration and keeps `.env` in sync with it.
///
/// Precedence, lowest first: defaults, persisted file, live environment,
/// explicit overrides. Only keys from the defaults table are taken from the
/// persisted file and the live environment.
pub struct ConfigStore {
    workspace: Arc<dyn Workspace>,
    path: PathBuf,
    defaults: Configuration,
    env: HashMap<String, String>,
}

impl ConfigStore {
    pub fn new(workspace: Arc<dyn Workspace>, defaults: Configuration) -> Self {
        Self {
            workspace,
            path: PathBuf::from(ENV_FILE),
            defaults,
            env: HashMap::new(),
        }
    }

    /// Use `env` as the live-environment layer
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Merge every layer, repair a missing secret, and persist the result.
    pub fn resolve(&self, overrides: &IndexMap<String, String>) -> Result<Configuration, ConfigError> {
        let mut config = self.defaults.clone();

        for (key, value) in self.load_persisted()? {
            if config.contains_key(&key) {
                config.set(key, value);
            }
        }

        for key in self.defaults.keys() {
            if let Some(value) = self.env.get(key) {
                // An empty variable does not blank out a value from a lower layer
                if !value.is_empty() || config.value(key).is_empty() {
                    config.set(key, value.clone());
                }
            }
        }

        for (key, value) in overrides {
            config.set(key.clone(), value.clone());
        }

        if config.value(keys::API_KEY).is_empty() {
            info!("No {} configured, generating one", keys::API_KEY);
            config.set(keys::API_KEY, generate_api_key(API_KEY_LENGTH));
        }

        self.persist(&config)?;
        Ok(config)
    }

    /// Overwrite the persisted file with `config`
    pub fn persist(&self, config: &Configuration) -> Result<(), ConfigError> {
        self.workspace
            .write(&self.path, &render_env_content(config))
            .map_err(|source| ConfigError::Persist {
                path: self.workspace.locate(&self.path),
                source,
            })?;
        debug!("Persisted {} settings to {}", config.len(), self.path.display());
        Ok(())
    }

    fn load_persisted(&self) -> Result<IndexMap<String, String>, ConfigError> {
        let content = self
            .workspace
            .read(&self.path)
            .map_err(|source| ConfigError::Read {
                path: self.workspace.locate(&self.path),
                source,
            })?;
        Ok(content.map(|c| parse_env_content(&c)).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_settings;
    use crate::system::testing::MemoryWorkspace;

    fn store_with(ws: Arc<MemoryWorkspace>) -> ConfigStore {
        let defaults = default_settings("203.0.113.7", std::path::Path::new("/srv"), Some("UTC"));
        ConfigStore::new(ws, defaults)
    }

    fn overrides(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_generates_and_persists_secret() {
        let ws = Arc::new(MemoryWorkspace::new());
        let config = store_with(ws.clone()).resolve(&IndexMap::new()).unwrap();

        let key = config.value(keys::API_KEY);
        assert_eq!(key.len(), API_KEY_LENGTH);

        let persisted = ws.contents(ENV_FILE).unwrap();
        assert!(persisted.contains(&format!("AGIXT_API_KEY=\"{}\"", key)));
        assert_eq!(persisted.lines().count(), config.len());
    }

    #[test]
    fn test_secret_survives_reresolution() {
        let ws = Arc::new(MemoryWorkspace::new());
        let store = store_with(ws.clone());

        let first = store.resolve(&IndexMap::new()).unwrap();
        let second = store.resolve(&IndexMap::new()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_secret_never_empty_even_when_overridden_empty() {
        let ws = Arc::new(MemoryWorkspace::new());
        let config = store_with(ws)
            .resolve(&overrides(&[(keys::API_KEY, "")]))
            .unwrap();
        assert!(!config.value(keys::API_KEY).is_empty());
    }

    #[test]
    fn test_precedence() {
        let ws = Arc::new(
            MemoryWorkspace::new().with_file(
                ENV_FILE,
                "AGIXT_AGENT=\"FromFile\"\nAGIXT_BRANCH=\"dev\"\nLLM_MAX_TOKENS=\"1024\"\n",
            ),
        );
        let env: HashMap<String, String> = [
            ("AGIXT_BRANCH".to_string(), "nightly".to_string()),
            ("LLM_MAX_TOKENS".to_string(), "2048".to_string()),
        ]
        .into_iter()
        .collect();

        let config = store_with(ws)
            .with_env(env)
            .resolve(&overrides(&[("LLM_MAX_TOKENS", "4096")]))
            .unwrap();

        assert_eq!(config.get(keys::AGENT), Some("FromFile"));
        assert_eq!(config.get(keys::BRANCH), Some("nightly"));
        assert_eq!(config.get(keys::LLM_MAX_TOKENS), Some("4096"));
        assert_eq!(config.get(keys::URI), Some("http://localhost:7437"));
    }

    #[test]
    fn test_unknown_keys_ignored_from_file_and_env() {
        let ws = Arc::new(MemoryWorkspace::new().with_file(ENV_FILE, "STALE_KEY=\"x\"\n"));
        let env: HashMap<String, String> =
            [("PATH".to_string(), "/usr/bin".to_string())].into_iter().collect();

        let config = store_with(ws).with_env(env).resolve(&IndexMap::new()).unwrap();

        assert!(!config.contains_key("STALE_KEY"));
        assert!(!config.contains_key("PATH"));
        assert_eq!(config.len(), 13);
    }

    #[test]
    fn test_overrides_may_add_keys() {
        let ws = Arc::new(MemoryWorkspace::new());
        let config = store_with(ws)
            .resolve(&overrides(&[(keys::SIDECAR_API_KEY, "abc")]))
            .unwrap();
        assert_eq!(config.get(keys::SIDECAR_API_KEY), Some("abc"));
    }

    #[test]
    fn test_empty_env_does_not_blank_persisted_secret() {
        let ws = Arc::new(MemoryWorkspace::new().with_file(ENV_FILE, "AGIXT_API_KEY=\"keep-me\"\n"));
        let env: HashMap<String, String> =
            [(keys::API_KEY.to_string(), String::new())].into_iter().collect();

        let config = store_with(ws).with_env(env).resolve(&IndexMap::new()).unwrap();
        assert_eq!(config.get(keys::API_KEY), Some("keep-me"));
    }

    #[test]
    fn test_unwritable_file_is_fatal() {
        let ws = Arc::new(MemoryWorkspace::new());
        ws.set_read_only(true);

        let result = store_with(ws).resolve(&IndexMap::new());
        assert!(matches!(result, Err(ConfigError::Persist { .. })));
    }

    #[test]
    fn test_disk_round_trip() {
        use crate::system::DiskWorkspace;

        let dir = tempfile::TempDir::new().unwrap();
        let ws: Arc<dyn Workspace> = Arc::new(DiskWorkspace::new(dir.path()));
        let defaults = default_settings("localhost", dir.path(), None);

        let first = ConfigStore::new(ws.clone(), defaults.clone())
            .resolve(&overrides(&[(keys::AGENT, "Custom")]))
            .unwrap();
        let second = ConfigStore::new(ws, defaults).resolve(&IndexMap::new()).unwrap();

        assert_eq!(second.get(keys::AGENT), Some("Custom"));
        assert_eq!(first.get(keys::API_KEY), second.get(keys::API_KEY));
        assert!(dir.path().join(ENV_FILE).exists());
    }
}

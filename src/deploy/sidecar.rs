//! Hand-off between the main configuration and the inference sidecar

use std::path::Path;

use indexmap::IndexMap;

use crate::config::{keys, Configuration};

/// Checkout directory of the sidecar, relative to the workspace root
pub const SIDECAR_DIR: &str = "ezlocalai";
pub const SIDECAR_REPO: &str = "https://github.com/DevXT-LLC/ezlocalai";

/// Settings copied from the main configuration into the sidecar's `.env`
const SHARED_KEYS: [&str; 6] = [
    keys::SIDECAR_URI,
    keys::DEFAULT_MODEL,
    keys::VISION_MODEL,
    keys::LLM_MAX_TOKENS,
    keys::WHISPER_MODEL,
    keys::GPU_LAYERS,
];

pub fn env_path() -> std::path::PathBuf {
    Path::new(SIDECAR_DIR).join(".env")
}

/// Clone on first use, pull afterwards
pub fn checkout_command(already_present: bool) -> String {
    if already_present {
        format!("cd {} && git pull", SIDECAR_DIR)
    } else {
        format!("git clone {} {}", SIDECAR_REPO, SIDECAR_DIR)
    }
}

/// Settings the sidecar needs, with the computed offload tier.
///
/// The sidecar shares the main API secret.
pub fn handoff_overrides(config: &Configuration, tier: i32) -> IndexMap<String, String> {
    let mut out = IndexMap::new();
    out.insert(
        keys::SIDECAR_API_KEY.to_string(),
        config.value(keys::API_KEY).to_string(),
    );
    for key in SHARED_KEYS {
        out.insert(key.to_string(), config.value(key).to_string());
    }
    out.insert(keys::GPU_LAYERS.to_string(), tier.to_string());
    out
}

/// Replace the value of every line whose key is in `updates`.
///
/// Other lines, comments and ordering are kept as-is. Keys absent from
/// `content` are not added.
pub fn rewrite_sidecar_env(content: &str, updates: &IndexMap<String, String>) -> String {
    let mut out = String::with_capacity(content.len());
    for line in content.lines() {
        let key = line.split('=').next().unwrap_or_default();
        match updates.get(key) {
            Some(value) if line.contains('=') => {
                out.push_str(&format!("{}={}\n", key, value));
            }
            _ => {
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    out
}

/// Fresh sidecar `.env` when the checkout ships none
pub fn render_sidecar_env(updates: &IndexMap<String, String>) -> String {
    updates
        .iter()
        .map(|(k, v)| format!("{}={}\n", k, v))
        .collect()
}

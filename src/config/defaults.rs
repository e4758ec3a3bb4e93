use std::path::Path;

use super::keys;
use super::Configuration;

/// Port the sidecar's OpenAI-compatible API listens on
pub const SIDECAR_API_PORT: u16 = 8091;

/// Layer-count sentinel meaning "pick from free GPU memory"
pub const AUTO_GPU_LAYERS: &str = "-1";

/// The fixed table of documented settings.
///
/// `public_address` feeds the sidecar URI, `cwd` the working directory, and
/// `timezone` (usually the process `TZ`) the container timezone.
pub fn default_settings(public_address: &str, cwd: &Path, timezone: Option<&str>) -> Configuration {
    let workspace = cwd.join("WORKSPACE").to_string_lossy().replace('\\', "/");

    [
        (keys::API_KEY, String::new()),
        (keys::URI, "http://localhost:7437".to_string()),
        (keys::AGENT, "AGiXT".to_string()),
        (keys::BRANCH, "stable".to_string()),
        (keys::WORKING_DIRECTORY, workspace),
        (keys::TZ, timezone.filter(|tz| !tz.is_empty()).unwrap_or("UTC").to_string()),
        (keys::AUTO_UPDATE, "true".to_string()),
        (
            keys::SIDECAR_URI,
            format!("http://{}:{}/v1/", public_address, SIDECAR_API_PORT),
        ),
        (
            keys::DEFAULT_MODEL,
            "QuantFactory/dolphin-2.9.2-qwen2-7b-GGUF".to_string(),
        ),
        (keys::VISION_MODEL, "deepseek-ai/deepseek-vl-1.3b-chat".to_string()),
        (keys::LLM_MAX_TOKENS, "32768".to_string()),
        (keys::WHISPER_MODEL, "base.en".to_string()),
        (keys::GPU_LAYERS, AUTO_GPU_LAYERS.to_string()),
    ]
    .into_iter()
    .collect()
}

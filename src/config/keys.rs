//! Setting names shared with the compose files and the sidecar's `.env`

pub const API_KEY: &str = "AGIXT_API_KEY";
pub const URI: &str = "AGIXT_URI";
pub const AGENT: &str = "AGIXT_AGENT";
pub const BRANCH: &str = "AGIXT_BRANCH";
pub const WORKING_DIRECTORY: &str = "WORKING_DIRECTORY";
pub const TZ: &str = "TZ";
pub const AUTO_UPDATE: &str = "AGIXT_AUTO_UPDATE";
pub const SIDECAR_URI: &str = "EZLOCALAI_URI";
pub const DEFAULT_MODEL: &str = "DEFAULT_MODEL";
pub const VISION_MODEL: &str = "VISION_MODEL";
pub const LLM_MAX_TOKENS: &str = "LLM_MAX_TOKENS";
pub const WHISPER_MODEL: &str = "WHISPER_MODEL";
pub const GPU_LAYERS: &str = "GPU_LAYERS";

/// Secret handed to the sidecar; mirrors [`API_KEY`]
pub const SIDECAR_API_KEY: &str = "EZLOCALAI_API_KEY";

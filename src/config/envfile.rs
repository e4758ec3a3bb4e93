//! `.env` format handling and secret generation

use indexmap::IndexMap;
use rand::distr::Alphanumeric;
use rand::Rng;

use super::Configuration;

// ============================================================================
// SBIO: Pure functions (no I/O)
// ============================================================================

/// Parse `.env` content into ordered key-value pairs.
/// Handles KEY=VALUE format, # comments, quoted values. Later duplicates win.
pub fn parse_env_content(content: &str) -> IndexMap<String, String> {
    let mut result = IndexMap::new();

    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Find the first = sign
        if let Some(pos) = line.find('=') {
            let key = line[..pos].trim().to_string();
            let mut value = line[pos + 1..].trim().to_string();

            // Remove surrounding quotes if present
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = value[1..value.len() - 1].to_string();
            }

            if !key.is_empty() {
                result.insert(key, value);
            }
        }
    }

    result
}

/// Render one `KEY="VALUE"` line per setting
pub fn render_env_content(config: &Configuration) -> String {
    let mut out = String::new();
    for (key, value) in config.iter() {
        out.push_str(&format!("{}=\"{}\"\n", key, value));
    }
    out
}

/// Random alphanumeric secret of `length` characters
pub fn generate_api_key(length: usize) -> String {
    let mut rng = rand::rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric) as char)
        .take(length)
        .collect()
}

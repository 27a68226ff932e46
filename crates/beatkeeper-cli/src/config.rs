//! Config file location, loading and saving

use std::path::{Path, PathBuf};

use anyhow::Context;
use beatkeeper_core::MetronomeConfig;
use tracing::{debug, warn};

pub(crate) fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("beatkeeper")
        .join("config.toml")
}

/// Parse a config file body. Unrecognized names fall back per field;
/// a file that is not valid TOML falls back to defaults entirely.
pub(crate) fn parse_config(text: &str) -> MetronomeConfig {
    toml::from_str(text).unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring malformed config");
        MetronomeConfig::default()
    })
}

pub(crate) fn load_config(path: &Path) -> MetronomeConfig {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_config(&text),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "No config file, using defaults");
            MetronomeConfig::default()
        }
    }
}

pub(crate) fn save_config(path: &Path, config: &MetronomeConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let text = toml::to_string_pretty(config)?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub mod chat;
pub mod import;
pub mod init;
pub mod serve;

use anyhow::Context;
use settlr_config::AppConfig;
use std::path::{Path, PathBuf};

/// Where the config lives: `--config` if given, else `~/.settlr/config.toml`.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    let path = config_path(explicit);
    AppConfig::load_with_overrides(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Fail early with setup instructions when no API key is configured.
pub fn require_api_key(config: &AppConfig, explicit: Option<&Path>) -> anyhow::Result<()> {
    if config.has_api_key() {
        return Ok(());
    }
    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Set SETTLR_API_KEY or ANTHROPIC_API_KEY, or add api_key to");
    eprintln!("    {}", config_path(explicit).display());
    eprintln!();
    anyhow::bail!("No API key found. See above for setup instructions.")
}

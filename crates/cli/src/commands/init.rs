//! `settlr init`: write a default config file.

use super::config_path;
use anyhow::Context;
use settlr_config::AppConfig;
use std::path::Path;

pub fn run(explicit: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = config_path(explicit);
    if write_default(&path, force)? {
        println!("Created config at: {}", path.display());
        println!();
        println!("Next steps:");
        println!("   1. Add your Anthropic API key to {}", path.display());
        println!("   2. Run: settlr import boundaries <file.json>");
        println!("   3. Run: settlr serve");
    } else {
        println!("Config already exists at: {}", path.display());
        println!("   Edit it manually or re-run with --force.");
    }
    Ok(())
}

/// Write the default config to `path`. Returns false if a file was already
/// there and `force` is off.
fn write_default(path: &Path, force: bool) -> anyhow::Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}

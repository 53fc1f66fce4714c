//! `settlr serve`: start the HTTP gateway.

use super::{load_config, require_api_key};
use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    port: Option<u16>,
    host: Option<String>,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    require_api_key(&config, config_path)?;

    if let Some(port) = port {
        config.gateway.port = port;
    }
    if let Some(host) = host {
        config.gateway.host = host;
    }

    println!("Settlr gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Database:  {}", config.database.url);
    println!("   Model:     {}", config.model);

    settlr_gateway::start(config)
        .await
        .map_err(|e| anyhow::anyhow!(e))
}

//! Settlr CLI: the main entry point.
//!
//! Commands:
//! - `serve`   start the HTTP gateway
//! - `chat`    talk to the assistant in the terminal
//! - `import`  load area boundaries or rental listings from JSON
//! - `init`    write a default config file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "settlr",
    about = "Settlr: find where you'd like to live in London",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to use instead of ~/.settlr/config.toml
    #[arg(short, long, global = true, env = "SETTLR_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// Chat in the terminal
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,

        /// Start focused on one of the conversation's regions
        #[arg(long)]
        region: Option<i64>,
    },

    /// Load reference data into the database
    Import {
        #[command(subcommand)]
        kind: commands::import::ImportKind,
    },

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port, host } => commands::serve::run(config_path, port, host).await,
        Commands::Chat {
            message,
            conversation,
            region,
        } => commands::chat::run(config_path, message, conversation, region).await,
        Commands::Import { kind } => commands::import::run(config_path, kind).await,
        Commands::Init { force } => commands::init::run(config_path, force),
    }
}

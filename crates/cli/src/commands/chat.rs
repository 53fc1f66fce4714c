//! `settlr chat`: interactive or single-message chat in the terminal.
//!
//! Runs the same loop as the gateway against the same database. There is no
//! map here, so tool notifications are dropped; `/regions` lists what the
//! conversation has resolved and `/region <id>` focuses on one.

use super::{load_config, require_api_key};
use anyhow::Context;
use settlr_agent::{AgentLoop, AgentSettings, SystemPrompt, TurnEvent};
use settlr_core::message::ConversationId;
use settlr_core::notify::NoopNotifier;
use settlr_core::store::{GeoStore, HistoryStore};
use settlr_core::turn::TurnContext;
use settlr_store::SqliteStore;
use settlr_tools::{ToolDeps, ToolSettings, default_toolset};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    config_path: Option<&Path>,
    message: Option<String>,
    conversation: Option<String>,
    region: Option<i64>,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    require_api_key(&config, config_path)?;

    let provider = settlr_providers::build_from_config(&config)?;
    let store = Arc::new(
        SqliteStore::new(&config.database.url)
            .await
            .with_context(|| format!("Failed to open database {}", config.database.url))?,
    );
    let prompt = SystemPrompt::load(config.agent.system_prompt_path.as_deref())
        .context("Failed to read the system prompt file")?;

    let tools = default_toolset(ToolDeps {
        provider: provider.clone(),
        store: store.clone(),
        notifier: Arc::new(NoopNotifier),
        settings: ToolSettings::from_config(&config),
    });
    let agent = AgentLoop::new(
        provider,
        store.clone(),
        tools,
        prompt,
        AgentSettings::from_config(&config),
    );

    let mut session = Session {
        agent,
        store,
        conversation_id: conversation.map(ConversationId).unwrap_or_default(),
        region,
    };

    if let Some(message) = message {
        return session.turn(&message).await;
    }

    println!();
    println!("  Settlr: interactive mode");
    println!();
    println!("  Model:         {}", config.model);
    println!("  Conversation:  {}", session.conversation_id);
    println!();
    println!("  Type your message and press Enter. Commands:");
    println!("    /regions        list this conversation's regions");
    println!("    /region <id>    focus on a region (/region none to clear)");
    println!("    exit            quit");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => break,
            "/regions" => session.list_regions().await?,
            _ if line.starts_with("/region") => session.focus(line["/region".len()..].trim()).await?,
            _ => {
                if let Err(e) = session.turn(line).await {
                    eprintln!("  [Error] {e:#}");
                }
            }
        }
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

struct Session {
    agent: AgentLoop,
    store: Arc<SqliteStore>,
    conversation_id: ConversationId,
    region: Option<i64>,
}

impl Session {
    async fn turn(&self, text: &str) -> anyhow::Result<()> {
        self.store
            .record_user_message(&self.conversation_id, text)
            .await
            .context("Failed to store your message")?;

        let ctx = TurnContext::new(self.conversation_id.clone(), text).with_region(self.region);
        let mut events = self.agent.run_stream(ctx);

        println!();
        print!("  Settlr > ");
        while let Some(event) = events.recv().await {
            match event {
                TurnEvent::Fragment { text } => {
                    print!("{text}");
                    std::io::stdout().flush()?;
                }
                TurnEvent::ToolStarted { name, .. } => eprint!("[{name}...] "),
                TurnEvent::ToolFinished {
                    success: false,
                    name,
                    ..
                } => eprint!("[{name} failed] "),
                TurnEvent::ToolFinished { .. } => {}
                TurnEvent::Done {
                    persisted: false, ..
                } => eprintln!("\n  [Warning] the reply could not be saved"),
                TurnEvent::Done { .. } => {}
                TurnEvent::Error { message } => print!("{message}"),
            }
        }
        println!();
        println!();
        Ok(())
    }

    async fn list_regions(&self) -> anyhow::Result<()> {
        let regions = self.store.regions(&self.conversation_id).await?;
        if regions.is_empty() {
            println!("  No regions yet. Ask about an area first.");
        }
        for region in regions {
            let marker = if self.region == Some(region.id) { "*" } else { " " };
            println!("  {marker} {:>4}  {}", region.id, region.name);
        }
        Ok(())
    }

    async fn focus(&mut self, arg: &str) -> anyhow::Result<()> {
        if arg.is_empty() || arg == "none" {
            self.region = None;
            println!("  No region focused.");
            return Ok(());
        }
        let Ok(region_id) = arg.parse::<i64>() else {
            println!("  Usage: /region <id> or /region none");
            return Ok(());
        };
        match self.store.get_region(region_id).await? {
            Some(region) if region.conversation_id == self.conversation_id => {
                self.region = Some(region.id);
                println!("  Focused on {} ({}).", region.name, region.id);
            }
            _ => println!("  Region {region_id} is not part of this conversation."),
        }
        Ok(())
    }
}

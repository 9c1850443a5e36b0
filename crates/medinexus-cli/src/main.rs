use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use medinexus_core::sequencer::SessionConfig;
use medinexus_core::{
    AgentRegistry, ConversationTurn, Dispatcher, GeminiGateway, LlmGateway, Router, Sequencer,
    SubmitError, TurnPhase, TurnReport,
};

mod config;

use config::MedinexusConfig;

#[derive(Parser)]
#[command(name = "medinexus")]
#[command(version)]
#[command(about = "MediNexus hospital assistant: routes requests to specialist agents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive conversation
    Chat,

    /// Send a single request and print the answer
    Ask {
        /// The message to send
        message: String,
    },

    /// List the hub and specialist agents
    Agents,

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat => cmd_chat(&cli.config).await,
        Commands::Ask { message } => cmd_ask(&cli.config, &message).await,
        Commands::Agents => cmd_agents(),
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
    }
}

/// Wire the registry, gateway, router and dispatcher into a session
fn build_sequencer(cfg: &MedinexusConfig, session: SessionConfig) -> Result<Sequencer> {
    let registry = Arc::new(AgentRegistry::builtin());
    let gateway: Arc<dyn LlmGateway> = Arc::new(
        GeminiGateway::new(cfg.gemini_config(), cfg.credentials())
            .context("Failed to initialize Gemini gateway")?,
    );
    info!(
        "Using {} model {}",
        gateway.provider_name(),
        gateway.model()
    );

    let router = Router::new(registry.clone(), gateway.clone()).with_config(cfg.router_config());
    let dispatcher =
        Dispatcher::new(registry.clone(), gateway).with_config(cfg.dispatcher_config());

    Ok(Sequencer::new(
        registry,
        Arc::new(router),
        Arc::new(dispatcher),
        session,
    ))
}

async fn cmd_chat(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = MedinexusConfig::load(config_path)?;
    let sequencer = Arc::new(build_sequencer(&cfg, cfg.session_config())?);
    let registry = AgentRegistry::builtin();

    for turn in sequencer.transcript().await {
        print_turn(&registry, &turn);
    }

    // Show progress while a turn is in flight
    let mut status = sequencer.subscribe_status();
    let progress = tokio::spawn({
        let registry = registry.clone();
        async move {
            while status.changed().await.is_ok() {
                let current = *status.borrow_and_update();
                let name = &registry.lookup(current.active_agent).name;
                match current.phase {
                    TurnPhase::Routing => eprintln!("  ({} is analyzing your request...)", name),
                    TurnPhase::Generating => eprintln!("  ({} is typing...)", name),
                    TurnPhase::Delegating | TurnPhase::Idle => {}
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"\nyou> ").await?;
        stdout.flush().await?;

        let Some(line) = unless_interrupted(lines.next_line(), signal::ctrl_c())
            .await
            .transpose()
            .context("Failed to read from stdin")?
            .flatten()
        else {
            break;
        };

        let text = line.trim();
        if text == "/quit" || text == "/exit" {
            break;
        }

        // The session finishes an interrupted turn on its own
        let Some(outcome) = unless_interrupted(sequencer.submit(text), signal::ctrl_c()).await
        else {
            break;
        };
        match outcome {
            Ok(report) => print_report(&registry, &report),
            Err(SubmitError::Blank) => continue,
            Err(e) => warn!("{}", e),
        }
    }

    progress.abort();
    println!("Goodbye.");
    Ok(())
}

/// Run `work` unless `interrupt` resolves first
async fn unless_interrupted<T>(
    work: impl Future<Output = T>,
    interrupt: impl Future,
) -> Option<T> {
    tokio::select! {
        out = work => Some(out),
        _ = interrupt => {
            info!("Received Ctrl+C, leaving chat");
            None
        }
    }
}

async fn cmd_ask(config_path: &Option<PathBuf>, message: &str) -> Result<()> {
    let cfg = MedinexusConfig::load(config_path)?;
    let session = SessionConfig {
        greeting: None,
        ..cfg.session_config()
    };
    let sequencer = build_sequencer(&cfg, session)?;
    let registry = AgentRegistry::builtin();

    let report = sequencer.submit(message).await?;
    if let Some(decision) = &report.decision {
        info!(
            "Routed to {}{}: {}",
            decision.target,
            if decision.fallback { " (fallback)" } else { "" },
            decision.reasoning
        );
    }
    print_report(&registry, &report);

    if report.reply.is_error {
        anyhow::bail!("Request failed: no API credential configured");
    }
    Ok(())
}

fn cmd_agents() -> Result<()> {
    let registry = AgentRegistry::builtin();
    for profile in registry.profiles() {
        let tools: Vec<String> = profile.tools.iter().map(ToString::to_string).collect();
        println!("{:<16} {} ({})", profile.id, profile.name, profile.role);
        println!("{:<16} {}", "", profile.description);
        if !tools.is_empty() {
            println!("{:<16} tools: {}", "", tools.join(", "));
        }
    }
    Ok(())
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config)
            .await
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("MediNexus initialized at {}", config_dir.display());
    println!(
        "Set GEMINI_API_KEY or edit {} to configure your API key.",
        config_path.display()
    );
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = MedinexusConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.masked())?);
    Ok(())
}

fn print_report(registry: &AgentRegistry, report: &TurnReport) {
    if let Some(notice) = &report.notice {
        print_turn(registry, notice);
    }
    print_turn(registry, &report.reply);
}

fn print_turn(registry: &AgentRegistry, turn: &ConversationTurn) {
    match turn.agent {
        Some(agent) => {
            let profile = registry.lookup(agent);
            println!("\n[{} · {}]", profile.name, profile.role);
            println!("{}", turn.text);
            if let Some(url) = &turn.citation {
                println!("Source: {}", url);
            }
        }
        None => println!("\n» {}", turn.text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_interrupt_cuts_pending_work() {
        let out = unless_interrupted(std::future::pending::<()>(), async {}).await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_work_completes_without_interrupt() {
        let out = unless_interrupted(async { 42 }, std::future::pending::<()>()).await;
        assert_eq!(out, Some(42));
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::{pin_mut, StreamExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tandem_agent::{
    CapabilityRegistry, ConcatSummarizer, Script, ScriptedTransport, SessionManager, Workers,
};
use tandem_core::config::AppConfig;
use tandem_core::event::EventBus;
use tandem_core::types::{FlowEvent, TaskEvent};

#[derive(Parser)]
#[command(name = "tandem", version, about = "Multi-agent workflow orchestrator")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "tandem.toml", env = "TANDEM_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the parsed configuration
    Config,
    /// Drive a session against recorded worker responses
    Replay {
        /// JSON script of worker responses, keyed by worker id
        #[arg(long)]
        script: PathBuf,
        /// External context id for the session
        #[arg(long, default_value = "replay")]
        context: String,
        /// Print workflow lifecycle events to stderr
        #[arg(long)]
        flow: bool,
        /// One query per turn
        #[arg(required = true)]
        queries: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Replay {
            script,
            context,
            flow,
            queries,
        } => {
            replay(&config, &script, &context, flow, &queries).await?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        info!(path = %path.display(), "Loading config");
        Ok(AppConfig::load(path)?)
    } else {
        warn!(path = %path.display(), "No config file found, using defaults");
        Ok(AppConfig::default())
    }
}

async fn replay(
    config: &AppConfig,
    script: &Path,
    context_id: &str,
    flow: bool,
    queries: &[String],
) -> anyhow::Result<()> {
    let transport = Arc::new(ScriptedTransport::new(Script::load(script)?));
    let registry = Arc::new(CapabilityRegistry::from_config(config));
    let workers = Workers::new(registry, transport.clone(), config.workflow.planner_key.clone());
    let event_bus = Arc::new(EventBus::from_config(&config.events));

    let printer = flow.then(|| {
        let mut rx = event_bus.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                print_flow_event(&event);
            }
        })
    });

    let sessions = SessionManager::new(
        workers,
        Arc::new(ConcatSummarizer::new()),
        config.workflow.clone(),
    )
    .with_event_bus(event_bus.clone());

    for (turn, query) in queries.iter().enumerate() {
        let task_id = uuid::Uuid::new_v4().to_string();
        info!(turn = turn + 1, task_id = %task_id, "Sending query");
        let events = sessions.handle(query.clone(), task_id, context_id.to_string());
        pin_mut!(events);
        while let Some(event) = events.next().await {
            let event: TaskEvent = event?;
            println!("{}", serde_json::to_string(&event)?);
        }
    }

    // Dropping the last sender closes the printer's channel.
    drop(sessions);
    drop(event_bus);
    if let Some(handle) = printer {
        handle.await.ok();
    }

    info!(calls = transport.calls().len(), "Replay finished");
    Ok(())
}

fn print_flow_event(event: &FlowEvent) {
    match event {
        FlowEvent::NodeStarted { node_id } => eprintln!("[node {}: started]", node_id),
        FlowEvent::NodePaused { node_id, .. } => eprintln!("[node {}: paused]", node_id),
        FlowEvent::NodeCompleted { node_id } => eprintln!("[node {}: completed]", node_id),
        FlowEvent::GraphExpanded { after, added } => {
            eprintln!("[graph: {} task(s) added after {}]", added.len(), after)
        }
        FlowEvent::GraphCompleted { results } => {
            eprintln!("[graph: completed with {} result(s)]", results)
        }
    }
}

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use agora_consensus::{ConsensusValidator, LocalPool, SingleRoundStrategy};
use agora_core::{AgentCard, Capability, EventBus};
use agora_gateway::{start_server, GatewayState};
use agora_payments::{InstantRail, KeyedHashSigner, MandateManager, Signer, TransactionManager};
use agora_protocol::Dispatcher;
use agora_registry::{AgentRegistry, CapabilityMatcher};
use agora_tasks::TaskExecutor;

use config::Config;

#[derive(Parser)]
#[command(name = "agora")]
#[command(about = "Agora agent-to-agent protocol node with payments")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Agora protocol node
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show current node status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();

    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => {
            let config = Config {
                port: port.unwrap_or(config.port),
                ..config
            };
            run_server(config).await?;
        }
        Commands::Status => {
            let client = reqwest::Client::new();
            match client
                .get(format!("http://localhost:{}/api/metrics", config.port))
                .send()
                .await
            {
                Ok(resp) => {
                    let body: serde_json::Value = resp.json().await?;
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Err(_) => {
                    println!("Agora is not running on port {}", config.port);
                }
            }
        }
    }

    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    info!(
        port = config.port,
        bind = %config.bind_address,
        validators = config.validators.len(),
        "Starting Agora node"
    );

    // All managers are constructed exactly once here and passed by
    // reference; no module-level singletons.
    let events = EventBus::new();

    let registry = Arc::new(AgentRegistry::new());
    let matcher = Arc::new(CapabilityMatcher::new(Arc::clone(&registry)));
    let tasks = Arc::new(TaskExecutor::new(events.clone()));

    let signer: Arc<dyn Signer> = Arc::new(KeyedHashSigner::new(config.signing_key.as_bytes()));
    let mandates = Arc::new(MandateManager::new(
        Arc::clone(&signer),
        config.credential_issuer.clone(),
        events.clone(),
    ));

    let strategy =
        SingleRoundStrategy::new(Arc::new(LocalPool)).with_threshold(config.consensus_threshold);
    let consensus = Arc::new(
        ConsensusValidator::new(Arc::new(strategy), config.validators.clone())
            .with_quorum(config.consensus_quorum)
            .with_low_trust_auto_approve(config.low_trust_auto_approve),
    );
    if config.validators.len() < config.consensus_quorum {
        info!(
            auto_approve = config.low_trust_auto_approve,
            "Validator pool below quorum; consensus gate will be skipped"
        );
    }

    let transactions = Arc::new(TransactionManager::new(
        Arc::clone(&mandates),
        consensus,
        Arc::new(InstantRail),
        signer,
        events.clone(),
    ));

    let self_card = AgentCard::new(config.agent_id.clone(), config.agent_name.clone())
        .with_description("Agora protocol node")
        .with_capability(
            Capability::new("payment.execute", "payment.execute").with_protocol("ap2/1.0"),
        );
    registry.register(self_card.clone()).await;

    let dispatcher = Arc::new(Dispatcher::new(
        matcher,
        Arc::clone(&tasks),
        Arc::clone(&transactions),
        self_card,
    ));

    // Background sweeps: mandate expiry, task timeouts, terminal-task gc.
    {
        let mandates = Arc::clone(&mandates);
        let mut ticker = tokio::time::interval(Duration::from_secs(config.expiry_sweep_secs));
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                mandates.sweep_expired().await;
            }
        });
    }
    {
        let tasks = Arc::clone(&tasks);
        let interval = Duration::from_secs(config.timeout_sweep_secs);
        let retention = config.task_retention_secs;
        let mut ticker = tokio::time::interval(interval);
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                tasks.sweep_timeouts().await;
                tasks.gc(retention).await;
            }
        });
    }

    info!("All components started");

    let addr = format!("{}:{}", config.bind_address, config.port).parse()?;
    start_server(
        addr,
        GatewayState {
            dispatcher,
            transactions,
        },
    )
    .await
}

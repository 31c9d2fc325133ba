//! Storage Miner Chain Client
//!
//! Connects a storage miner to its ledger node:
//! - `register` stakes and registers the miner account unless it already
//!   holds a peer id
//! - `status` prints node health and the miner's account state
//! - `run` keeps a monitored node connection open until interrupted

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sminer_core::SigningIdentity;
use sminer_core::MinerInfo;
use sminer_node::chain::{constants, Connector, Enrollment, HealthMonitor};
use sminer_node::{
    init_metrics, install_exporter, ConnectionManager, Correlation, MinerChainClient, MinerConfig,
    WsConnector, WsRpcClient,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sminer-node")]
#[command(about = "Storage miner chain client")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "sminer.toml")]
    config: PathBuf,

    /// Node WebSocket URL (overrides config file)
    #[arg(long)]
    rpc_url: Option<String>,

    /// Inclusion timeout in seconds (overrides config file)
    #[arg(long)]
    inclusion_timeout: Option<u64>,

    /// Prometheus metrics port (overrides config file)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register the miner on chain
    Register,
    /// Show node health and account state
    Status,
    /// Keep a monitored connection open until Ctrl-C
    Run,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn connect(config: &MinerConfig) -> anyhow::Result<(WsConnector, ConnectionManager<WsRpcClient>)> {
    let connector = WsConnector {
        url: config.chain.rpc_url.clone(),
        request_timeout: config.request_timeout(),
    };
    let initial = connector
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", config.chain.rpc_url))?;
    Ok((connector, ConnectionManager::start(initial)))
}

fn print_peer_id(miner: Option<&MinerInfo>) {
    match miner {
        Some(miner) if miner.is_registered() => println!("Peer id:   {}", miner.peer_id),
        Some(_) => println!("Peer id:   not yet assigned"),
        None => println!("Peer id:   no miner record"),
    }
}

async fn register(client: &MinerChainClient<WsRpcClient>, config: &MinerConfig) -> anyhow::Result<()> {
    let request = config.register_request()?;
    let (correlation, miner) = match client.ensure_registered(&request).await? {
        Enrollment::Existing(miner) => {
            println!("Already registered: {}", client.account_ss58());
            print_peer_id(Some(&miner));
            return Ok(());
        }
        Enrollment::Submitted { correlation, miner } => (correlation, miner),
    };

    match correlation {
        Correlation::Matched { value, block } => {
            println!(
                "Registered {} with {} staked (block {})",
                value.account.to_ss58(config.chain.ss58_prefix),
                value.staking,
                block
            );
            print_peer_id(miner.as_ref());
            Ok(())
        }
        Correlation::NotFound { block } => {
            anyhow::bail!("registration included in {} but no Registered event for this account", block)
        }
        Correlation::DecodeFailed { block, reason } => {
            anyhow::bail!("registration included in {} but events could not be read: {}", block, reason)
        }
    }
}

async fn status(client: &MinerChainClient<WsRpcClient>) -> anyhow::Result<()> {
    let health = client.node_health().await?;
    println!("Account:   {}", client.account_ss58());
    println!("Peers:     {}", health.peers);
    println!("Syncing:   {}", health.is_syncing);

    match client.account_state().await {
        Ok(state) => {
            println!("Nonce:     {}", state.nonce);
            println!(
                "Runtime:   spec {} / tx {}",
                state.spec_version, state.transaction_version
            );
            println!("Genesis:   {}", state.genesis_hash);
        }
        Err(e) => println!("Account:   unavailable ({})", e),
    }

    match client.miner_info().await {
        Ok(miner) => print_peer_id(miner.as_ref()),
        Err(e) => println!("Peer id:   unavailable ({})", e),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose);

    info!("Storage miner chain client starting...");

    // Priority: CLI args > environment > config file > defaults
    let config = MinerConfig::load_or_default(&cli.config)?
        .with_env_overrides()
        .with_overrides(cli.rpc_url, cli.inclusion_timeout, cli.metrics_port);
    config.validate()?;

    if let Some(addr) = config.metrics_addr() {
        install_exporter(addr).context("Failed to start metrics exporter")?;
    }
    init_metrics();

    let identity: SigningIdentity = config.identity()?;
    let (connector, connections) = connect(&config).await?;
    let client = MinerChainClient::new(connections.clone(), identity, config.chain_client_config());

    match cli.command {
        Command::Register => {
            if let Err(e) = register(&client, &config).await {
                error!(error = %e, "Registration failed");
                std::process::exit(constants::EXIT_REGISTRATION_FAILED);
            }
        }
        Command::Status => status(&client).await?,
        Command::Run => {
            let monitor = HealthMonitor::new(&connections, connector, config.health_settings()).await;
            let monitor_task = tokio::spawn(monitor.run());

            info!(account = %client.account_ss58(), url = %config.chain.rpc_url, "Miner connected");

            tokio::signal::ctrl_c().await?;
            warn!("Shutdown signal received");
            monitor_task.abort();
        }
    }

    info!("Storage miner chain client stopped");
    Ok(())
}

//! agentnet - Entry Point
//!
//! Starts the agent network and serves it over HTTP/WebSocket.

use agentnet::{
    AgentNetwork, ChatCompletionsClient, Config, HttpLedger, IdentityLedger, InMemoryLedger, Server,
};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");
    let json_flag = args.iter().any(|a| a == "--json-logs");

    if help_mode {
        println!("agentnet v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: agentnet [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --json-logs        Log as JSON");
        println!("  --help, -h         Show this help");
        println!();
        println!("Environment variables:");
        println!("  AGENTNET_HOST              Bind host (default: 0.0.0.0)");
        println!("  AGENTNET_PORT              Bind port (default: 3000)");
        println!("  AGENTNET_BOOTSTRAP_AGENTS  Agents created at startup");
        println!("  AGENTNET_STATIC_DIR        Frontend directory");
        println!("  ORACLE_API_URL             Chat-completions endpoint");
        println!("  ORACLE_API_KEY             Oracle bearer token");
        println!("  ORACLE_MODEL               Oracle model name");
        println!("  LEDGER_URL                 Identity ledger (in-memory when unset)");
        println!("  LEDGER_SIGNERS             Comma-separated signer identities");
        return Ok(());
    }

    let config = Config::from_env()?;

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    if json_flag || config.json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("agentnet v{}", env!("CARGO_PKG_VERSION"));

    let oracle = ChatCompletionsClient::new(config.oracle.clone())?;
    if !oracle.is_available() {
        warn!("ORACLE_API_KEY not set, agents will answer with apologies");
    }

    let ledger: Arc<dyn IdentityLedger> = match &config.ledger_url {
        Some(url) => {
            info!("Using identity ledger at {}", url);
            Arc::new(HttpLedger::new(url.clone(), config.oracle.timeout)?)
        }
        None => Arc::new(InMemoryLedger::new()),
    };

    let network = Arc::new(AgentNetwork::new(
        Arc::new(oracle),
        ledger,
        config.signers.clone(),
        config.rules.clone(),
        config.timings.clone(),
    ));
    network.initialize().await?;

    for id in &config.bootstrap_agents {
        if let Err(e) = network.create_agent(id).await {
            warn!("Bootstrap agent {} not created: {}", id, e);
        }
    }

    let server = Server::new(network, config.bind_addr, config.static_dir.clone());
    server.run().await?;

    Ok(())
}

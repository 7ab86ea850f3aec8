use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

mod cli;
mod client;
mod config;

use cli::Cli;
use cli::commands::{Commands, ProviderKind};
use config::Config;

use toolgate::cache::{DefinitionCache, spawn_refresher};
use toolgate::domain::ProviderEndpoint;
use toolgate::gateway::{GatewayHandler, Orchestrator};
use toolgate::ipc::{RequestHandler, RpcClient, RpcServer};
use toolgate::llm::{ModelBridge, OllamaClient, OllamaConfig};
use toolgate::providers::{self, ProviderHandler, SqliteStore};
use toolgate::tools::{RpcTransport, ToolRouter};

fn setup_logging(cli: &Cli, config: &Config) -> Result<()> {
    let level = if cli.is_verbose() {
        "debug".to_string()
    } else {
        config.log_level.clone().unwrap_or_else(|| "info".to_string())
    };

    // RUST_LOG wins over the configured level
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));

    if let Some(log_file) = &config.log_file {
        if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("Failed to create log directory")?;
        }
        let target = Box::new(
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)
                .context("Failed to open log file")?,
        );
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.init();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

async fn serve<H: RequestHandler + 'static>(listen: &str, handler: H, name: &str) -> Result<()> {
    let server = RpcServer::bind(listen)
        .await
        .context(format!("Failed to start {} server", name))?;
    let addr = server.local_addr()?;
    info!("{} listening on {}", name, addr);
    println!("{} {} {}", name.green().bold(), "listening on".cyan(), addr);

    server.run(Arc::new(handler), shutdown_signal()).await?;
    Ok(())
}

async fn run_gateway(config: &Config) -> Result<()> {
    let endpoints: Vec<Arc<ProviderEndpoint>> = config
        .providers
        .iter()
        .map(|p| Arc::new(ProviderEndpoint::new(p.id.clone(), p.address.clone())))
        .collect();
    let call_timeout = config.gateway.call_timeout();
    let transport = Arc::new(RpcTransport::new(call_timeout));

    let cache = Arc::new(DefinitionCache::new(endpoints.clone(), transport.clone()));
    let initial = cache.refresh_all().await;
    let tool_count: usize = initial.iter().map(|s| s.tools.len()).sum();
    info!("Initial catalog: {} tools from {} providers", tool_count, initial.len());
    let refresher = spawn_refresher(Arc::clone(&cache), config.gateway.refresh_interval());

    let model = OllamaClient::new(OllamaConfig {
        base_url: config.model.base_url.clone(),
        model: config.model.model.clone(),
        timeout: Duration::from_millis(config.model.timeout_ms),
    })?;
    info!("Using model '{}' at {}", config.model.model, config.model.base_url);

    let router = ToolRouter::new(transport, endpoints).with_call_timeout(call_timeout);
    let orchestrator = Orchestrator::new(cache, router, ModelBridge::new(Arc::new(model)))
        .with_rephrase(config.gateway.rephrase);

    let result = serve(&config.gateway.listen, GatewayHandler::new(Arc::new(orchestrator)), "gateway").await;
    refresher.abort();
    result
}

async fn run_provider(kind: ProviderKind, config: &Config) -> Result<()> {
    match kind {
        ProviderKind::Datetime => {
            let registry = providers::datetime::registry()?;
            serve(&config.datetime.listen, ProviderHandler::new(registry), "datetime provider").await
        }
        ProviderKind::Sqlite => {
            let store = SqliteStore::open(&config.sqlite.db_path)
                .context(format!("Failed to open database {}", config.sqlite.db_path.display()))?;
            let registry = providers::sqlite::registry(Arc::new(store))?;
            serve(&config.sqlite.listen, ProviderHandler::new(registry), "sqlite provider").await
        }
    }
}

async fn run_ask(prompt: Option<&str>, config: &Config) -> Result<()> {
    let rpc = RpcClient::new(config.client.gateway.clone(), Duration::from_millis(config.client.timeout_ms));
    match prompt {
        Some(p) => client::ask_once(&rpc, p).await,
        None => client::run_interactive(&rpc).await,
    }
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        Commands::Gateway => run_gateway(config).await,
        Commands::Provider { kind } => run_provider(*kind, config).await,
        Commands::Ask { prompt } => run_ask(prompt.as_deref(), config).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.apply_env(|name| std::env::var(name).ok());

    setup_logging(&cli, &config).context("Failed to setup logging")?;
    for (level, message) in config.take_notices() {
        log::log!(level, "{}", message);
    }
    info!("Starting with config from: {:?}", cli.config);

    config.validate().context("Invalid configuration")?;

    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}

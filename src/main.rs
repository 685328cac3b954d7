use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lsp_types::Position;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fusion_bridge::config::{BridgeConfig, PROJECT_CONFIG_PATH};
use fusion_bridge::lsp::diagnostics::poll_once;
use fusion_bridge::lsp::engine::{MemoryDocument, MemoryEngine};
use fusion_bridge::lsp::{Capability, LanguageProviders, ProviderLease, ProviderRegistry, TextModel};
use fusion_bridge::service::ServiceClient;

#[derive(Parser)]
#[command(
    name = "fusion-bridge",
    about = "Drive the code-intelligence bridge from the command line."
)]
struct Cli {
    /// Config file (defaults to .fusion/bridge.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Service base URL, overriding config and environment
    #[arg(long)]
    service_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

/// Positions are 1-based, as editors show them.
#[derive(Subcommand)]
enum Command {
    /// Initialize the service and push configured paths
    Initialize,
    /// Open a file and print its diagnostics
    Check { file: PathBuf },
    Complete { file: PathBuf, line: u32, column: u32 },
    Hover { file: PathBuf, line: u32, column: u32 },
    Signature { file: PathBuf, line: u32, column: u32 },
    Definition { file: PathBuf, line: u32, column: u32 },
}

fn position(line: u32, column: u32) -> Position {
    Position::new(line.saturating_sub(1), column.saturating_sub(1))
}

fn load_config(cli: &Cli) -> Result<BridgeConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_PATH));
    let mut config =
        BridgeConfig::load_from(&path).with_context(|| format!("loading {}", path.display()))?;
    config.apply_env(|key| std::env::var(key).ok());
    if let Some(url) = &cli.service_url {
        config.service_url = url.clone();
    }
    Ok(config)
}

/// One file opened in a fresh engine with providers registered.
struct OpenFile {
    engine: Arc<MemoryEngine>,
    document: Arc<MemoryDocument>,
    providers: Arc<LanguageProviders>,
    lease: ProviderLease,
}

/// Open `file` in a fresh engine, register providers and sync it.
async fn open(registry: &ProviderRegistry, file: &Path) -> Result<OpenFile> {
    let path = std::fs::canonicalize(file)
        .with_context(|| format!("resolving {}", file.display()))?;
    let path = path.to_string_lossy().into_owned();
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;

    let engine = MemoryEngine::new();
    let document = engine.open_document(&path, &text);
    let lease = registry.acquire(engine.clone());
    let providers = engine
        .providers(Capability::Completion)
        .context("providers were not registered")?;
    providers.sync_document(document.as_ref()).await?;
    Ok(OpenFile {
        engine,
        document,
        providers,
        lease,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fusion_bridge=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    info!("using analysis service at {}", config.service_url);

    let client = ServiceClient::from_config(&config)?;
    let registry = ProviderRegistry::new(client.clone(), &config);
    let token = CancellationToken::new();

    match &cli.command {
        Command::Initialize => {
            client.initialize().await?;
            if let Some(root) = &config.project_root {
                client.set_project_root(root).await?;
            }
            if let Some(python) = &config.python_path {
                client.set_python_path(python).await?;
            }
            println!("initialized");
        }
        Command::Check { file } => {
            let opened = open(&registry, file).await?;
            // Give the service a moment to publish for the new document.
            tokio::time::sleep(config.diagnostics_interval()).await;
            poll_once(&client, opened.engine.as_ref()).await?;
            let markers = opened.engine.markers(opened.document.path());
            if markers.is_empty() {
                println!("no problems");
            }
            for marker in markers {
                println!(
                    "{}:{}: {:?}: {}",
                    marker.range.start_line_number,
                    marker.range.start_column,
                    marker.severity,
                    marker.message
                );
            }
            registry.release(opened.lease);
        }
        Command::Complete { file, line, column } => {
            let opened = open(&registry, file).await?;
            let items = opened
                .providers
                .provide_completions(opened.document.as_ref(), position(*line, *column), &token)
                .await;
            for item in items {
                println!("{}\t{}", item.label, item.detail.unwrap_or_default());
            }
            registry.release(opened.lease);
        }
        Command::Hover { file, line, column } => {
            let opened = open(&registry, file).await?;
            match opened
                .providers
                .provide_hover(opened.document.as_ref(), position(*line, *column), &token)
                .await
            {
                Some(hover) => println!("{}", hover.content),
                None => println!("no hover information"),
            }
            registry.release(opened.lease);
        }
        Command::Signature { file, line, column } => {
            let opened = open(&registry, file).await?;
            let help = opened
                .providers
                .provide_signature_help(opened.document.as_ref(), position(*line, *column), &token)
                .await;
            match help.as_ref().and_then(|h| h.active().map(|s| (h, s))) {
                Some((help, signature)) => {
                    println!("{}", signature.label);
                    if let Some(param) = signature.parameters.get(help.active_parameter as usize) {
                        println!("active parameter: {}", param.label);
                    }
                }
                None => println!("no signature help"),
            }
            registry.release(opened.lease);
        }
        Command::Definition { file, line, column } => {
            let opened = open(&registry, file).await?;
            let targets = opened
                .providers
                .provide_definition(opened.document.as_ref(), position(*line, *column), &token)
                .await;
            if targets.is_empty() {
                println!("no definition found");
            }
            for target in targets {
                println!(
                    "{}:{}:{}",
                    target.uri,
                    target.range.start.line.saturating_add(1),
                    target.range.start.character.saturating_add(1)
                );
            }
            registry.release(opened.lease);
        }
    }

    registry.shutdown();
    Ok(())
}

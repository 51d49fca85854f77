//! Schema Registry CLI
//!
//! Serves the registry over HTTP, and talks to a running registry to upload
//! and inspect schemas.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use familiar_isr::config::Backend;
use familiar_isr::{IsrConfig, RegistryClient, SchemaTarget};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-registry")]
#[command(about = "Immutable schema registry server and client")]
struct Cli {
    /// Config file (layered over isr.toml and ISR__* environment variables)
    #[arg(short, long)]
    config: Option<String>,

    /// Registry URL for client commands
    #[arg(short = 'u', long, env = "ISR_REGISTRY_URL")]
    registry_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the registry HTTP API
    Serve {
        /// Bind address host
        #[arg(long)]
        host: Option<String>,
        /// Bind port
        #[arg(short, long)]
        port: Option<u16>,
        /// Store directory (fs backend)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Keep schemas in memory only
        #[arg(long)]
        memory: bool,
    },

    /// Upload a descriptor set file as a new version
    Upload {
        /// Version to register (e.g. "1.0.0")
        version: String,
        /// Descriptor set file
        file: PathBuf,
    },

    /// Download the payload of a version
    Get {
        version: String,
        /// Write the payload here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the latest patch for a major.minor line
    Latest {
        /// Target line (e.g. "1.0")
        target: String,
    },

    /// Check whether a version is registered
    Exists { version: String },

    /// List versions in a local fs store
    List {
        /// Store directory (defaults to registry.path)
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Recompute the checksum of a version in a local fs store
    Verify {
        version: String,
        /// Store directory (defaults to registry.path)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = IsrConfig::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(url) = cli.registry_url {
        config.consumer.registry_url = url;
    }

    match cli.command {
        Commands::Serve { host, port, path, memory } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(path) = path {
                config.registry.path = path;
            }
            if memory {
                config.registry.backend = Backend::Memory;
            }

            let registry = config.open_registry().context("Failed to open schema store")?;
            let addr = config.server.socket_addr();
            let listener = TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;

            println!("🚀 Schema registry listening on http://{}", listener.local_addr()?);
            match config.registry.backend {
                Backend::Memory => println!("   Storage: memory (not persisted)"),
                Backend::Fs => println!("   Storage: {}", config.registry_path().display()),
            }
            familiar_isr::http::serve(listener, registry, shutdown_signal()).await?;
            Ok(())
        }

        Commands::Upload { version, file } => {
            let client = client(&config)?;
            let payload = std::fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let metadata = client.upload(&version, &payload).await?;
            println!("✅ Registered {} ({} bytes)", metadata.version, metadata.size_bytes);
            println!("   id:       {}", metadata.id);
            println!("   checksum: {}", metadata.checksum);
            Ok(())
        }

        Commands::Get { version, output } => {
            let record = client(&config)?.get_by_version(&version).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &record.payload)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("✅ Wrote {} ({} bytes) to {}", record.version(), record.payload.len(), path.display());
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&record.payload)?;
                }
            }
            Ok(())
        }

        Commands::Latest { target } => {
            let target = SchemaTarget::parse(&target)?;
            let client = client(&config)?;
            let record = familiar_isr::SchemaSource::latest_patch(&client, target).await?;
            println!("{}", serde_json::to_string_pretty(&record.metadata)?);
            Ok(())
        }

        Commands::Exists { version } => {
            if client(&config)?.version_exists(&version).await? {
                println!("✅ {} is registered", version);
            } else {
                println!("❌ {} is not registered", version);
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::List { path } => {
            let registry = local_registry(config, path)?;
            let schemas = registry.list().await?;
            if schemas.is_empty() {
                println!("No versions registered");
            }
            for metadata in schemas {
                println!(
                    "{:<12} {:>10} bytes  {}  {}",
                    metadata.version,
                    metadata.size_bytes,
                    metadata.checksum.short(),
                    metadata.created_at.to_rfc3339()
                );
            }
            Ok(())
        }

        Commands::Verify { version, path } => {
            let registry = local_registry(config, path)?;
            if registry.verify(&version).await? {
                println!("✅ Version {} - checksum valid", version);
            } else {
                println!("❌ Version {} - checksum validation FAILED", version);
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn client(config: &IsrConfig) -> Result<RegistryClient> {
    let timeout = Duration::from_secs(config.consumer.request_timeout_secs);
    Ok(RegistryClient::new(&config.consumer.registry_url, timeout)?)
}

fn local_registry(mut config: IsrConfig, path: Option<PathBuf>) -> Result<familiar_isr::SchemaRegistry> {
    if let Some(path) = path {
        config.registry.path = path;
    }
    if config.registry.backend != Backend::Fs {
        bail!("list and verify need an fs store");
    }
    if !config.registry_path().join("versions").exists() {
        bail!("No schema store at {}", config.registry_path().display());
    }
    Ok(config.open_registry()?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

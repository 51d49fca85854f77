//! Schema Validator CLI
//!
//! Consumer process: follows the latest patch of a schema line and validates
//! newline-delimited JSON messages read from stdin.
//!
//! Input, one per line:  `{"type": "user.v1.User", "message": {...}}`
//! Output, one per line: `{"valid": true, "version": "1.0.2"}` or the failure details.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use familiar_isr::{
    HotSwapValidator, IsrConfig, Message, ReconciliationManager, RegistryClient, ValidateError, Violation,
};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-validator")]
#[command(about = "Validate messages against the latest schema patch")]
struct Cli {
    /// Config file (layered over isr.toml and ISR__* environment variables)
    #[arg(short, long)]
    config: Option<String>,

    /// Registry URL; "http://" is assumed when no scheme is given
    #[arg(short = 'u', long, env = "ISR_REGISTRY_URL")]
    registry_url: Option<String>,

    /// Schema line to follow (e.g. "1.0")
    #[arg(short, long, env = "ISR_SCHEMA_TARGET")]
    target: Option<String>,

    /// Seconds between registry polls
    #[arg(long)]
    interval: Option<u64>,

    /// Read messages from this file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,
}

#[derive(Serialize)]
struct Outcome<'a> {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "<[Violation]>::is_empty")]
    violations: &'a [Violation],
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
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
    if let Some(target) = cli.target {
        config.consumer.schema_target = target;
    }
    if let Some(interval) = cli.interval {
        config.consumer.polling_interval_secs = interval;
    }

    let manager_config = config.consumer.manager_config()?;
    let client = RegistryClient::new(&config.consumer.registry_url, config.consumer.request_timeout())?;
    info!(
        registry = client.base_url(),
        schema_target = %manager_config.target,
        "Starting schema validator"
    );

    let validator = Arc::new(HotSwapValidator::new());
    let manager = ReconciliationManager::new(manager_config, Arc::new(client), validator.clone())?;
    manager
        .load_initial_schema()
        .await
        .context("Failed to load initial schema")?;
    manager.start().await?;

    let result = tokio::select! {
        result = validate_stream(&validator, cli.input) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            Ok(())
        }
    };

    manager.stop().await?;
    result
}

async fn validate_stream(validator: &HotSwapValidator, input: Option<PathBuf>) -> Result<()> {
    let reader: Box<dyn tokio::io::AsyncRead + Unpin + Send> = match input {
        Some(path) => Box::new(
            tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };
    let mut lines = BufReader::new(reader).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let mut out = serde_json::to_vec(&check_line(validator, &line))?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }
    Ok(())
}

fn check_line(validator: &HotSwapValidator, line: &str) -> serde_json::Value {
    let message: Message = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            return serde_json::json!({ "valid": false, "error": format!("invalid input: {}", e) });
        }
    };

    // One snapshot per line so the reported version is the one that judged it
    let Some(bundle) = validator.current_bundle() else {
        return outcome(None, Err(ValidateError::NoSchema));
    };
    outcome(Some(bundle.version()), bundle.validate(&message))
}

fn outcome(version: Option<&str>, result: std::result::Result<(), ValidateError>) -> serde_json::Value {
    let violations: &[Violation] = match &result {
        Err(ValidateError::Violations { violations, .. }) => violations,
        _ => &[],
    };
    let outcome = Outcome {
        valid: result.is_ok(),
        version,
        error: result.as_ref().err().map(|e| e.to_string()),
        violations,
    };
    serde_json::to_value(&outcome).unwrap_or_else(|e| serde_json::json!({ "valid": false, "error": e.to_string() }))
}

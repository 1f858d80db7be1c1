//! Sandbox Orchestrator CLI
//!
//! Creates a sandbox and waits for it to render, probes a running one, or
//! classifies a build error message.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use sandbox_orchestrator::diagnostics::{self, DiagnosticsConfig};
use sandbox_orchestrator::{
    calculate_retry_delay, classify_error, extract_missing_packages, CreateRequest, Error,
    ErrorKind, Orchestrator, OrchestratorConfig, ProviderConfig, ProviderKind, Result,
};

#[derive(Parser)]
#[command(name = "sandbox-orchestrator", version, about = "Provision and validate remote dev sandboxes")]
struct Cli {
    /// Orchestrator configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Attach debug details to error output (same as SANDBOX_DIAGNOSTICS=1)
    #[arg(long, global = true)]
    diagnostics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a sandbox and wait until the app renders
    Create {
        /// Backend kind (remote-serverless, container-dev-box, kubernetes-workspace)
        #[arg(long)]
        kind: Option<ProviderKind>,
        /// Backend settings file (TOML), forwarded to the provider
        #[arg(long)]
        provider_config: Option<PathBuf>,
    },
    /// Probe a running sandbox once
    Validate {
        #[arg(long)]
        url: String,
        #[arg(long)]
        id: String,
    },
    /// Classify a build error message
    Classify {
        message: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Classification {
    kind: ErrorKind,
    retry_delays_ms: Vec<u64>,
    missing_packages: Vec<String>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| Error::Serde(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<OrchestratorConfig> {
    match path {
        Some(path) => OrchestratorConfig::load(path),
        None => Ok(OrchestratorConfig::default()),
    }
}

fn load_provider_config(path: &Path) -> Result<ProviderConfig> {
    let text = std::fs::read_to_string(path)?;
    toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

async fn create(
    config: OrchestratorConfig,
    kind: Option<ProviderKind>,
    provider_config: Option<PathBuf>,
) -> Result<()> {
    let request = CreateRequest {
        kind,
        config: provider_config
            .as_deref()
            .map(load_provider_config)
            .transpose()?,
    };
    let orchestrator = Orchestrator::new(config)?;

    let outcome = tokio::select! {
        outcome = orchestrator.provision(request) => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, tearing down sandboxes");
            for e in orchestrator.terminate_all().await {
                tracing::error!(error = %e, "cleanup failed");
            }
            return Ok(());
        }
    };

    match outcome {
        Ok(outcome) => {
            print_json(&outcome.sandbox)?;
            tracing::info!(sandbox_id = %outcome.sandbox.sandbox_id, "sandbox ready, press Ctrl-C to tear down");
            tokio::signal::ctrl_c().await?;
        }
        Err(e) => {
            for cleanup in orchestrator.terminate_all().await {
                tracing::error!(error = %cleanup, "cleanup failed");
            }
            return Err(e);
        }
    }

    for e in orchestrator.terminate_all().await {
        tracing::error!(error = %e, "cleanup failed");
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Create {
            kind,
            provider_config,
        } => create(config, kind, provider_config).await,
        Command::Validate { url, id } => {
            let orchestrator = Orchestrator::new(config)?;
            let validation = orchestrator.validate_build(&url, &id).await;
            print_json(&validation)
        }
        Command::Classify { message } => {
            let kind = classify_error(&message);
            print_json(&Classification {
                kind,
                retry_delays_ms: (1..=3).map(|n| calculate_retry_delay(n, kind)).collect(),
                missing_packages: extract_missing_packages(&message).into_iter().collect(),
            })
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.diagnostics {
        diagnostics::init(DiagnosticsConfig {
            include_details: true,
        });
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, code = e.code(), "command failed");
            if let Ok(text) = serde_json::to_string_pretty(&e.to_payload()) {
                println!("{}", text);
            }
            ExitCode::FAILURE
        }
    }
}

//! Trueform CLI
//!
//! Drives the reconcilers from YAML manifests. Observed state is printed
//! to stdout as JSON; persisting it is up to the caller. Logs go to stderr.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trueform::{Client, Manifest, OpContext, ProviderConfig, ResourceSet};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Trueform - declarative TrueNAS service configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Provider configuration file (YAML)
    #[arg(long, env = "TRUEFORM_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Appliance host, overrides the config file
    #[arg(long, env = "TRUENAS_HOST", global = true)]
    host: Option<String>,

    /// API key, overrides the config file
    #[arg(long, env = "TRUENAS_API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, env = "TRUENAS_INSECURE", global = true)]
    insecure: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    /// Print client metrics to stderr on exit
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or update every resource in a manifest
    Apply {
        /// Desired state manifest (YAML)
        manifest: PathBuf,
        /// Previously observed state (JSON or YAML)
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Refresh observed state, dropping resources that no longer exist
    Read {
        #[arg(long)]
        state: PathBuf,
    },
    /// Delete every resource in a state file
    Destroy {
        #[arg(long)]
        state: PathBuf,
    },
    /// Print the manifest JSON Schema
    Schema,
    /// Check connectivity and credentials
    Ping,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    if let Command::Schema = args.command {
        let schema = schemars::schema_for!(Manifest);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let config = load_config(&args)?;
    let client = Arc::new(Client::connect(&config)?);

    info!("Trueform {} targeting {}", trueform::VERSION, client.host());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight operations");
            trigger.cancel();
        }
    });
    let ctx = OpContext::from_config(&config, cancel);

    let outcome = match &args.command {
        Command::Apply { manifest, state } => apply(&client, &ctx, manifest, state.as_deref()).await,
        Command::Read { state } => refresh(&client, &ctx, state).await,
        Command::Destroy { state } => destroy(&client, &ctx, state).await,
        Command::Ping => {
            client.ping(&ctx).await?;
            println!("pong from {}", client.host());
            Ok(())
        }
        Command::Schema => Ok(()),
    };

    if args.print_metrics {
        eprintln!("{}", client.metrics().render());
    }
    outcome
}

fn load_config(args: &Args) -> anyhow::Result<ProviderConfig> {
    let mut config = match &args.config {
        Some(path) => ProviderConfig::load(path)
            .with_context(|| format!("loading provider config {}", path.display()))?,
        None => ProviderConfig::default(),
    };

    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(api_key) = &args.api_key {
        config.api_key = api_key.clone();
    }
    if args.insecure {
        config.verify_tls = false;
    }

    config.validate()?;
    Ok(config)
}

fn load_state(path: Option<&Path>) -> anyhow::Result<Manifest> {
    match path {
        Some(path) if path.exists() => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading state {}", path.display()))?;
            // JSON is a subset of YAML
            Ok(serde_yaml::from_str(&text)
                .with_context(|| format!("parsing state {}", path.display()))?)
        }
        _ => Ok(Manifest::default()),
    }
}

fn print_state(state: &Manifest) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(state)?);
    Ok(())
}

// =============================================================================
// Commands
// =============================================================================

async fn apply(
    client: &Arc<Client>,
    ctx: &OpContext,
    manifest: &Path,
    state: Option<&Path>,
) -> anyhow::Result<()> {
    let desired = Manifest::load(manifest)
        .with_context(|| format!("loading manifest {}", manifest.display()))?;
    let prior = load_state(state)?;
    let set = ResourceSet::new(client.clone());

    let results = join_all(desired.resources.into_iter().map(|(name, plan)| {
        let set = &set;
        let previous = prior.resources.get(&name);
        async move {
            let result = set.apply(ctx, previous, plan).await;
            (name, result)
        }
    }))
    .await;

    let mut observed = prior.clone();
    let mut failed = 0;
    for (name, result) in results {
        match result {
            Ok(spec) => {
                info!("{} applied", name);
                observed.resources.insert(name, spec);
            }
            // Prior state for this resource stays as it was
            Err(e) => {
                error!("{}: {}", name, e);
                failed += 1;
            }
        }
    }

    print_state(&observed)?;
    if failed > 0 {
        bail!("{} resource(s) failed to apply", failed);
    }
    Ok(())
}

async fn refresh(client: &Arc<Client>, ctx: &OpContext, state: &Path) -> anyhow::Result<()> {
    let prior = load_state(Some(state))?;
    let set = ResourceSet::new(client.clone());

    // Failed reads keep their prior entry
    let (observed, failures) = set.refresh(ctx, prior).await;
    for (name, e) in &failures {
        error!("{}: {}", name, e);
    }

    print_state(&observed)?;
    if !failures.is_empty() {
        bail!("{} resource(s) failed to refresh", failures.len());
    }
    Ok(())
}

async fn destroy(client: &Arc<Client>, ctx: &OpContext, state: &Path) -> anyhow::Result<()> {
    let prior = load_state(Some(state))?;
    let set = ResourceSet::new(client.clone());

    let mut remaining = Manifest::default();
    let mut failed = 0;
    for (name, spec) in prior.resources {
        match set.delete(ctx, spec.clone()).await {
            Ok(()) => info!("{} destroyed", name),
            Err(e) => {
                error!("{}: {}", name, e);
                remaining.resources.insert(name, spec);
                failed += 1;
            }
        }
    }

    print_state(&remaining)?;
    if failed > 0 {
        bail!("{} resource(s) failed to destroy", failed);
    }
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},hyper=warn,reqwest=warn,rustls=warn",
            level.as_str().to_lowercase()
        ))
    });

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

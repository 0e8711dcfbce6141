//! appscaled: operate the scale-to-zero engine by hand.
//!
//! Talks to the cluster API through a plain-HTTP endpoint such as
//! `kubectl proxy`, and exposes the same operations the autoscaler and
//! request buffer use.
//!
//! # Usage
//!
//! ```text
//! appscaled --namespace default-tenant resources
//! appscaled --namespace default-tenant scale jupyter grafana --replicas 0
//! appscaled config --listen-address :8090
//! ```

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use appscale_kube::{KubeRecordStore, resolve_namespace};
use appscale_scaler::{AppResourceScaler, ScalerConfig};

const DEFAULT_LOG_FILTER: &str =
    "info,appscaled=debug,appscale_scaler=debug,appscale_record=debug,appscale_kube=debug";

#[derive(Parser)]
#[command(name = "appscaled", about = "Scale tenant application services to and from zero")]
struct Cli {
    /// API server endpoint (host:port), e.g. a local `kubectl proxy`.
    #[arg(long, default_value = "127.0.0.1:8001", global = true)]
    api_server: String,

    /// Namespace of the service set. Falls back to $SCALER_NAMESPACE,
    /// the pod namespace, then "default".
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Engine configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List ready services that carry scale-to-zero rules.
    Resources,

    /// Scale services to zero (`--replicas 0`) or back from zero.
    Scale {
        /// Service names.
        #[arg(required = true)]
        services: Vec<String>,

        #[arg(long)]
        replicas: u32,
    },

    /// Print the options the autoscaler and request buffer would run with.
    Config(commands::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let namespace = resolve_namespace(cli.namespace.as_deref());
    let config = match &cli.config {
        Some(path) => ScalerConfig::from_file(path)?,
        None => ScalerConfig::default(),
    };

    let store = KubeRecordStore::new(cli.api_server.clone(), config.record.key(&namespace));
    info!(api_server = %cli.api_server, %namespace, "using service set");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let scaler = AppResourceScaler::new(store, config).with_shutdown(shutdown_rx);

    match cli.command {
        Command::Resources => commands::resources(&scaler).await,
        Command::Scale { services, replicas } => {
            commands::scale(&scaler, &services, replicas).await
        }
        Command::Config(args) => commands::config(&scaler, &namespace, &args),
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

//! Subcommand implementations.

use std::time::Duration;

use anyhow::Context;
use clap::Args;
use tracing::info;

use appscale_record::duration::parse_duration;
use appscale_record::{RecordStore, Resource};
use appscale_scaler::{
    AppResourceScaler, AutoScalerOptions, DlxOptions, GroupKind, MultiTargetStrategy,
    ResourceScaler, ResourceScalerConfig,
};

pub async fn resources<S: RecordStore>(scaler: &AppResourceScaler<S>) -> anyhow::Result<()> {
    let resources = scaler
        .get_resources()
        .await
        .context("failed to list scalable services")?;
    println!("{}", serde_json::to_string_pretty(&resources)?);
    Ok(())
}

pub async fn scale<S: RecordStore>(
    scaler: &AppResourceScaler<S>,
    services: &[String],
    replicas: u32,
) -> anyhow::Result<()> {
    let resources: Vec<Resource> = services.iter().map(Resource::named).collect();
    let names = resources
        .iter()
        .map(|r| scaler.resolve_service_name(r))
        .collect::<Result<Vec<_>, _>>()?;

    scaler
        .set_scale(&resources, replicas)
        .await
        .with_context(|| format!("failed to scale {} to {replicas}", names.join(", ")))?;

    info!(services = ?names, replicas, "scale completed");
    Ok(())
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Autoscaler evaluation interval.
    #[arg(long, default_value = "30s", value_parser = duration_arg)]
    scale_interval: Duration,

    /// Kind of the resource custom metrics are attached to.
    #[arg(long, default_value = "IguazioTenantAppServiceSet")]
    metrics_resource_kind: String,

    /// Group of the resource custom metrics are attached to.
    #[arg(long, default_value = "iguazio.com")]
    metrics_resource_group: String,

    /// Request header naming the target service.
    #[arg(long, default_value = "X-Scaler-Target-Name")]
    target_name_header: String,

    /// Request header carrying the target path.
    #[arg(long, default_value = "X-Scaler-Target-Path")]
    target_path_header: String,

    #[arg(long, default_value = "8080")]
    target_port: u16,

    #[arg(long, default_value = ":8090")]
    listen_address: String,

    /// How long a buffered request waits for its service to come up.
    #[arg(long, default_value = "5m", value_parser = duration_arg)]
    resource_readiness_timeout: Duration,

    #[arg(long, value_enum, default_value = "random")]
    multi_target_strategy: StrategyArg,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum StrategyArg {
    Random,
    Primary,
    Canary,
}

impl From<StrategyArg> for MultiTargetStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Random => Self::Random,
            StrategyArg::Primary => Self::Primary,
            StrategyArg::Canary => Self::Canary,
        }
    }
}

fn duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

/// Print the command-line options, replaced by the engine's override
/// when it has one.
pub fn config<S: RecordStore>(
    scaler: &AppResourceScaler<S>,
    namespace: &str,
    args: &ConfigArgs,
) -> anyhow::Result<()> {
    let defaults = ResourceScalerConfig {
        auto_scaler: AutoScalerOptions {
            namespace: namespace.to_string(),
            scale_interval: args.scale_interval,
            group_kind: GroupKind {
                group: args.metrics_resource_group.clone(),
                kind: args.metrics_resource_kind.clone(),
            },
        },
        dlx: DlxOptions {
            namespace: namespace.to_string(),
            target_name_header: args.target_name_header.clone(),
            target_path_header: args.target_path_header.clone(),
            target_port: args.target_port,
            listen_address: args.listen_address.clone(),
            resource_readiness_timeout: args.resource_readiness_timeout,
            multi_target_strategy: args.multi_target_strategy.into(),
        },
    };

    let effective = match scaler.get_config()? {
        Some(overrides) => {
            info!("engine overrides the command-line options");
            overrides
        }
        None => defaults,
    };
    println!("{}", serde_json::to_string_pretty(&effective)?);
    Ok(())
}

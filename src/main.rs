//! Migration operator - reconciles MigController resources

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use migration_operator::config::{self, OperatorConfig};
use migration_operator::controller::{self, Context};
use migration_operator::crd::MigController;
use migration_operator::retry::{retry_with_backoff, RetryConfig};

/// Migration operator - keeps one MigController in charge of the operator ConfigMap.
#[derive(Parser, Debug)]
#[command(name = "migration-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit.
    #[arg(long)]
    crd: bool,

    /// Namespace holding the operator ConfigMap.
    #[arg(long, env = "OPERATOR_NAMESPACE", default_value = config::DEFAULT_NAMESPACE)]
    namespace: String,

    /// Name of the ConfigMap a MigController claims.
    #[arg(
        long,
        env = "MIGRATION_CONFIG_MAP_NAME",
        default_value = config::DEFAULT_CONFIG_MAP_NAME
    )]
    config_map_name: String,

    /// Seconds to wait before retrying a pass blocked on an ownership change.
    #[arg(
        long,
        default_value_t = config::OWNERSHIP_WAIT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    ownership_wait_secs: u64,

    /// Seconds before retrying a failed reconciliation.
    #[arg(
        long,
        default_value_t = config::ERROR_REQUEUE.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    error_requeue_secs: u64,

    /// Skip installing the MigController CRD on startup.
    #[arg(long)]
    skip_crd_install: bool,
}

impl Cli {
    fn operator_config(&self) -> OperatorConfig {
        OperatorConfig {
            namespace: self.namespace.clone(),
            config_map_name: self.config_map_name.clone(),
            ownership_wait: Duration::from_secs(self.ownership_wait_secs),
            error_requeue: Duration::from_secs(self.error_requeue_secs),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        print!("{}", serde_yaml::to_string(&MigController::crd())?);
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = cli.operator_config();
    tracing::info!(
        namespace = %config.namespace,
        config_map = %config.config_map_name,
        version = %config.version,
        "migration operator starting"
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client: {}", e))?;

    if !cli.skip_crd_install {
        ensure_crds_installed(&client, &config.field_manager).await?;
    }

    let ctx = Arc::new(Context::new(client.clone(), config));
    controller::run(client, ctx).await?;

    tracing::info!("migration operator shut down");
    Ok(())
}

/// Install the MigController CRD with server-side apply.
///
/// Keeps the installed schema in step with the running operator version.
async fn ensure_crds_installed(client: &Client, field_manager: &str) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(field_manager).force();
    let crd = MigController::crd();
    let name = crd
        .metadata
        .name
        .clone()
        .ok_or_else(|| anyhow::anyhow!("generated CRD has no name"))?;

    tracing::info!("Installing {} CRD...", name);
    retry_with_backoff(&RetryConfig::with_max_attempts(10), "install_crd", || async {
        crds.patch(&name, &params, &Patch::Apply(&crd)).await
    })
    .await
    .map_err(|e| anyhow::anyhow!("failed to install {} CRD: {}", name, e))?;

    tracing::info!("{} CRD installed/updated", name);
    Ok(())
}

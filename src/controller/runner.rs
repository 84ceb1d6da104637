//! Controller runner - wires the MigController controller to its watches

use std::sync::Arc;

use futures::StreamExt;
use kube::api::{Api, DynamicObject};
use kube::discovery::ApiResource;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::Client;
use tracing::{debug, info};

use super::mig_controller::{error_policy, reconcile, Context};
use crate::crd::MigController;
use crate::hooks::WatchRegistrar;
use crate::Error;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Resource kinds registered by the hooks, in registration order.
#[derive(Debug, Default)]
pub struct WatchSet {
    resources: Vec<ApiResource>,
}

impl WatchSet {
    /// Registered resources.
    pub fn resources(&self) -> &[ApiResource] {
        &self.resources
    }
}

impl WatchRegistrar for WatchSet {
    fn watch_resource_type(&mut self, resource: ApiResource) -> Result<(), Error> {
        let duplicate = self.resources.iter().any(|r| {
            r.group == resource.group && r.version == resource.version && r.kind == resource.kind
        });
        if duplicate {
            return Err(Error::watch(resource.kind, "resource type already watched"));
        }
        debug!(kind = %resource.kind, "registered watch");
        self.resources.push(resource);
        Ok(())
    }
}

/// References to every known MigController.
///
/// A change to the managed ConfigMap can unblock any of them: the current
/// owner proceeds, and a rejected one may take over once the old owner is gone.
pub fn requeue_all(owners: &[Arc<MigController>]) -> Vec<ObjectRef<MigController>> {
    owners.iter().map(|mc| ObjectRef::from_obj(mc.as_ref())).collect()
}

/// Run the MigController controller until a shutdown signal arrives.
pub async fn run(client: Client, ctx: Arc<Context>) -> Result<(), Error> {
    let mut watches = WatchSet::default();
    ctx.hooks.register_watches(&mut watches)?;

    let controller = Controller::new(
        Api::<MigController>::all(client.clone()),
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    );
    let owners = controller.store();

    let selector = format!("metadata.name={}", ctx.config.config_map_name);
    let controller = watches
        .resources()
        .iter()
        .fold(controller, |controller, resource| {
            info!(kind = %resource.kind, namespace = %ctx.config.namespace, "- watching");
            let api: Api<DynamicObject> =
                Api::namespaced_with(client.clone(), &ctx.config.namespace, resource);
            let owners = owners.clone();
            controller.watches_with(
                api,
                resource.clone(),
                WatcherConfig::default()
                    .timeout(WATCH_TIMEOUT_SECS)
                    .fields(&selector),
                move |_| requeue_all(&owners.state()),
            )
        });

    info!("- MigController controller");
    controller
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("MigController"))
        .await;
    Ok(())
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}

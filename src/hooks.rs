//! Reconciliation hooks guarding the operator ConfigMap
//!
//! The controller calls into these hooks on every pass for a MigController:
//!
//! 1. `register_watches` once at startup, so edits to ConfigMaps re-trigger
//!    reconciliation
//! 2. `pre_create` whenever the managed ConfigMap is absent, to claim it
//! 3. `check_sanity` before any normal reconciliation, to make sure the
//!    ConfigMap is still controlled by the MigController being reconciled
//!
//! The hooks never mutate the ConfigMap after creating it. They report a
//! [`Verdict`] and the controller acts on it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::discovery::ApiResource;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::config::OperatorConfig;
use crate::crd::MigController;
use crate::ownership::{is_controlled_by, owner_reference_for, resolve_owner_liveness, OwnerLiveness};
use crate::resources::ResourceLabels;
use crate::store::ObjectStore;
use crate::{Error, Result};

/// Message reported when a second MigController contends for the ConfigMap.
pub const UNWANTED_OWNER_MESSAGE: &str = "Reconciling to error state, unwanted MigController object";

/// Outcome of the sanity check for one reconciliation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The ConfigMap is controlled by this MigController; carry on.
    Proceed,
    /// An ownership change is in flight; retry after the given delay.
    Wait(Duration),
    /// Another live MigController owns the ConfigMap; park in the error state.
    Reject(String),
}

/// Surface through which hooks subscribe the controller to extra resource kinds.
pub trait WatchRegistrar: Send {
    /// Watch `resource` so that changes to it re-trigger reconciliation.
    fn watch_resource_type(&mut self, resource: ApiResource) -> Result<()>;
}

/// Hooks the controller runs around its normal reconciliation.
#[async_trait]
pub trait ReconcilerHooks: Send + Sync {
    /// Register additional watches; called once when the controller starts.
    fn register_watches(&self, registrar: &mut dyn WatchRegistrar) -> Result<()>;

    /// Create the managed object for `owner`.
    ///
    /// Only called when the object is known to be absent; does not re-check.
    async fn pre_create(&self, owner: &MigController) -> Result<()>;

    /// Check that the managed object is controlled by `owner`.
    async fn check_sanity(&self, owner: &MigController) -> Result<Verdict>;
}

/// Hooks for the MigController / operator ConfigMap pair.
pub struct MigControllerHooks {
    store: Arc<dyn ObjectStore>,
    config: Arc<OperatorConfig>,
    labels: Arc<ResourceLabels>,
}

impl MigControllerHooks {
    /// Create the hook set.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        config: Arc<OperatorConfig>,
        labels: Arc<ResourceLabels>,
    ) -> Self {
        Self {
            store,
            config,
            labels,
        }
    }

    /// The ConfigMap claimed on behalf of `owner`.
    pub fn operator_config_map(&self, owner: &MigController) -> Result<ConfigMap> {
        Ok(ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.config.config_map_name.clone()),
                namespace: Some(self.config.namespace.clone()),
                labels: Some(self.labels.operator_resource()),
                owner_references: Some(vec![owner_reference_for(owner)?]),
                ..Default::default()
            },
            ..Default::default()
        })
    }
}

#[async_trait]
impl ReconcilerHooks for MigControllerHooks {
    fn register_watches(&self, registrar: &mut dyn WatchRegistrar) -> Result<()> {
        registrar.watch_resource_type(ApiResource::erase::<ConfigMap>(&()))
    }

    async fn pre_create(&self, owner: &MigController) -> Result<()> {
        let config_map = self.operator_config_map(owner)?;
        self.store.create_config_map(&config_map).await?;
        info!(
            mig_controller = %owner.name_any(),
            config_map = %self.config.config_map_name,
            "claimed operator configmap"
        );
        Ok(())
    }

    async fn check_sanity(&self, owner: &MigController) -> Result<Verdict> {
        let name = owner.name_any();
        let Some(config_map) = self.store.get_config_map(&self.config.config_map_name).await?
        else {
            // Gone between the controller's existence check and now; the
            // next pass will claim it again.
            debug!(mig_controller = %name, "operator configmap disappeared, retrying");
            return Ok(Verdict::Wait(self.config.ownership_wait));
        };

        if is_controlled_by(&config_map.metadata, owner) {
            return Ok(Verdict::Proceed);
        }

        let liveness = resolve_owner_liveness(self.store.as_ref(), &config_map).await?;
        let config_map_deleting = config_map.metadata.deletion_timestamp.is_some();

        if liveness == OwnerLiveness::Deleted || config_map_deleting {
            info!(
                mig_controller = %name,
                config_map = %self.config.config_map_name,
                "Waiting for {} to be deleted before reconciling",
                self.config.config_map_name
            );
            return Ok(Verdict::Wait(self.config.ownership_wait));
        }

        info!(mig_controller = %name, "{}", UNWANTED_OWNER_MESSAGE);
        Ok(Verdict::Reject(UNWANTED_OWNER_MESSAGE.to_string()))
    }
}

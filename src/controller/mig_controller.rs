//! MigController reconciliation
//!
//! Every pass runs the ownership guard first and only then does the normal
//! work:
//!
//! - owner deleting: nothing to do, garbage collection removes the ConfigMap
//! - ConfigMap absent: `pre_create` claims it for this owner
//! - ConfigMap present without a controller owner: delete it, claim next pass
//! - `check_sanity` verdict decides the rest:
//!   `Proceed` → mark Deployed, `Wait` → requeue, `Reject` → error state

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use super::events::{actions, reasons, EventPublisher, KubeEventPublisher, NoopEventPublisher};
use crate::config::OperatorConfig;
use crate::crd::{
    Condition, ConditionStatus, MigController, MigControllerPhase, MigControllerStatus,
    CONDITION_AVAILABLE, CONDITION_DEGRADED, CONDITION_PROGRESSING,
};
use crate::error::is_already_exists;
use crate::ownership::controller_of;
use crate::hooks::{MigControllerHooks, ReconcilerHooks, Verdict};
use crate::resources::ResourceLabels;
use crate::store::{KubeObjectStore, ObjectStore};
use crate::{Error, Result};

/// Name reported on Events and used as the status field manager.
pub const CONTROLLER_NAME: &str = "migcontroller-controller";

/// Trait abstracting MigController status writes.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Replace the status of the named MigController.
    async fn patch_status(&self, name: &str, status: &MigControllerStatus) -> Result<()>;
}

/// Real status writer using a merge patch on the status subresource.
pub struct KubeStatusWriter {
    client: Client,
    field_manager: String,
}

impl KubeStatusWriter {
    /// Create a new KubeStatusWriter.
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }
}

#[async_trait]
impl StatusWriter for KubeStatusWriter {
    async fn patch_status(&self, name: &str, status: &MigControllerStatus) -> Result<()> {
        let api: Api<MigController> = Api::all(self.client.clone());
        let patch = serde_json::json!({ "status": serde_json::to_value(status)? });
        api.patch_status(
            name,
            &PatchParams::apply(&self.field_manager),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }
}

/// Shared context for the MigController controller.
pub struct Context {
    /// Object store used for the existence check before `pre_create`.
    pub store: Arc<dyn ObjectStore>,
    /// Status writer.
    pub status: Arc<dyn StatusWriter>,
    /// Event publisher.
    pub events: Arc<dyn EventPublisher>,
    /// Ownership hooks.
    pub hooks: Arc<dyn ReconcilerHooks>,
    /// Operator settings.
    pub config: Arc<OperatorConfig>,
}

impl Context {
    /// Build a context backed by the Kubernetes API.
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        let config = Arc::new(config);
        let store: Arc<dyn ObjectStore> =
            Arc::new(KubeObjectStore::new(client.clone(), config.namespace.clone()));
        let hooks = Arc::new(MigControllerHooks::new(
            store.clone(),
            config.clone(),
            Arc::new(ResourceLabels::default()),
        ));
        Self {
            store,
            status: Arc::new(KubeStatusWriter::new(
                client.clone(),
                config.field_manager.clone(),
            )),
            events: Arc::new(KubeEventPublisher::new(client, CONTROLLER_NAME)),
            hooks,
            config,
        }
    }

    /// Build a context from explicit parts; events are dropped.
    pub fn from_parts(
        store: Arc<dyn ObjectStore>,
        status: Arc<dyn StatusWriter>,
        hooks: Arc<dyn ReconcilerHooks>,
        config: Arc<OperatorConfig>,
    ) -> Self {
        Self {
            store,
            status,
            events: Arc::new(NoopEventPublisher),
            hooks,
            config,
        }
    }
}

/// Reconcile a MigController.
///
/// Runs the ownership guard and, once this MigController holds the operator
/// ConfigMap, marks it Deployed.
///
/// # Arguments
///
/// * `mc` - The MigController being reconciled
/// * `ctx` - Store, hooks, status writer and settings shared by all passes
#[instrument(skip(mc, ctx), fields(mig_controller = %mc.name_any()))]
pub async fn reconcile(mc: Arc<MigController>, ctx: Arc<Context>) -> Result<Action> {
    if mc.is_deleting() {
        debug!("MigController is being deleted, nothing to reconcile");
        return Ok(Action::await_change());
    }

    match ctx.store.get_config_map(&ctx.config.config_map_name).await? {
        None => claim_config_map(&mc, &ctx).await?,
        Some(cm) if is_orphaned(&cm) => return remove_orphaned_config_map(&mc, &ctx, &cm).await,
        Some(_) => {}
    }

    match ctx.hooks.check_sanity(&mc).await? {
        Verdict::Proceed => reconcile_deployed(&mc, &ctx).await,
        Verdict::Wait(delay) => Ok(Action::requeue(delay)),
        Verdict::Reject(message) => report_error(&mc, &ctx, &message).await,
    }
}

/// No controller owner and not already on its way out.
fn is_orphaned(config_map: &ConfigMap) -> bool {
    controller_of(&config_map.metadata).is_none()
        && config_map.metadata.deletion_timestamp.is_none()
}

async fn claim_config_map(mc: &MigController, ctx: &Context) -> Result<()> {
    match ctx.hooks.pre_create(mc).await {
        Ok(()) => {
            ctx.events
                .publish(
                    &mc.object_ref(&()),
                    EventType::Normal,
                    reasons::CONFIG_CLAIMED,
                    actions::CREATE,
                    Some(format!("Claimed ConfigMap {}", ctx.config.config_map_name)),
                )
                .await;
            Ok(())
        }
        // Another MigController won the race; the sanity check sorts it out
        Err(Error::Kube { source }) if is_already_exists(&source) => {
            debug!("operator configmap created concurrently");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Delete a managed ConfigMap that no controller owns.
///
/// Garbage collection never removes such an object, so waiting on it would
/// never end. Once it is gone the next pass claims a fresh one.
async fn remove_orphaned_config_map(
    mc: &MigController,
    ctx: &Context,
    config_map: &ConfigMap,
) -> Result<Action> {
    warn!(
        config_map = %ctx.config.config_map_name,
        namespace = %ctx.config.namespace,
        "operator configmap has no controller owner, deleting it"
    );
    ctx.store.delete_config_map(config_map).await?;
    ctx.events
        .publish(
            &mc.object_ref(&()),
            EventType::Warning,
            reasons::ORPHAN_REMOVED,
            actions::DELETE,
            Some(format!(
                "Deleted ConfigMap {} because it had no controller owner",
                ctx.config.config_map_name
            )),
        )
        .await;
    Ok(Action::requeue(ctx.config.ownership_wait))
}

/// Park the MigController in the error state.
///
/// Sets phase `Error` with a `Degraded` condition and emits a Warning event.
/// Nothing is requeued: the state holds until a watched object changes.
///
/// # Arguments
///
/// * `mc` - The MigController to park
/// * `ctx` - Controller context used for the status write and the event
/// * `message` - Human-readable reason, shown on the `Degraded` condition
pub async fn report_error(
    mc: &MigController,
    ctx: &Context,
    message: &str,
) -> Result<Action> {
    let desired = MigControllerStatus::with_phase(MigControllerPhase::Error)
        .observed_version(ctx.config.version.clone())
        .condition(Condition::new(
            CONDITION_AVAILABLE,
            ConditionStatus::False,
            reasons::RECONCILE_ERROR,
            message,
        ))
        .condition(Condition::new(
            CONDITION_PROGRESSING,
            ConditionStatus::False,
            reasons::RECONCILE_ERROR,
            "",
        ))
        .condition(Condition::new(
            CONDITION_DEGRADED,
            ConditionStatus::True,
            reasons::RECONCILE_ERROR,
            message,
        ));

    if update_status(mc, ctx, desired).await? {
        warn!(reason = reasons::RECONCILE_ERROR, "{}", message);
        ctx.events
            .publish(
                &mc.object_ref(&()),
                EventType::Warning,
                reasons::RECONCILE_ERROR,
                actions::RECONCILE,
                Some(message.to_string()),
            )
            .await;
    }
    Ok(Action::await_change())
}

async fn reconcile_deployed(mc: &MigController, ctx: &Context) -> Result<Action> {
    let desired = MigControllerStatus::with_phase(MigControllerPhase::Deployed)
        .observed_version(ctx.config.version.clone())
        .condition(Condition::new(
            CONDITION_AVAILABLE,
            ConditionStatus::True,
            reasons::RECONCILE_COMPLETE,
            "Reconcile completed successfully",
        ))
        .condition(Condition::new(
            CONDITION_PROGRESSING,
            ConditionStatus::False,
            reasons::RECONCILE_COMPLETE,
            "",
        ))
        .condition(Condition::new(
            CONDITION_DEGRADED,
            ConditionStatus::False,
            reasons::RECONCILE_COMPLETE,
            "",
        ));

    if update_status(mc, ctx, desired).await? {
        info!("MigController deployed");
        ctx.events
            .publish(
                &mc.object_ref(&()),
                EventType::Normal,
                reasons::RECONCILE_COMPLETE,
                actions::RECONCILE,
                None,
            )
            .await;
    }
    Ok(Action::await_change())
}

/// Write `desired` unless the current status already matches; true if written.
async fn update_status(
    mc: &MigController,
    ctx: &Context,
    desired: MigControllerStatus,
) -> Result<bool> {
    if mc
        .status
        .as_ref()
        .is_some_and(|current| current.is_equivalent(&desired))
    {
        return Ok(false);
    }
    ctx.status.patch_status(&mc.name_any(), &desired).await?;
    Ok(true)
}

/// Error policy for MigController reconciliation.
///
/// Retryable errors requeue after the configured delay. The rest wait for a
/// change to the MigController or the ConfigMap.
pub fn error_policy(mc: Arc<MigController>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        mig_controller = %mc.name_any(),
        retryable = error.is_retryable(),
        "MigController reconciliation failed"
    );
    if error.is_retryable() {
        Action::requeue(ctx.config.error_requeue)
    } else {
        Action::await_change()
    }
}

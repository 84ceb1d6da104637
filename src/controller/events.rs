//! Kubernetes Event recording for the MigController controller
//!
//! Events are fire-and-forget: failures are logged as warnings and never
//! propagate. A failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Trait for publishing Kubernetes Events.
///
/// Implementations never return an error; failures are logged.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on the given resource.
    ///
    /// # Arguments
    ///
    /// * `resource_ref` - The MigController this event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason, one of [`reasons`]
    /// * `action` - What was done, one of [`actions`]
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "failed to publish Kubernetes event");
        }
    }
}

/// Publisher that drops every event.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reason strings, shown under REASON in `kubectl get events`.
pub mod reasons {
    /// Ownership settled and reconciliation completed.
    pub const RECONCILE_COMPLETE: &str = "ReconcileComplete";
    /// Parked in the error state until a user intervenes.
    pub const RECONCILE_ERROR: &str = "ReconcileError";
    /// The operator ConfigMap was claimed for this MigController.
    pub const CONFIG_CLAIMED: &str = "ConfigMapClaimed";
    /// A managed ConfigMap without a controller owner was removed.
    pub const ORPHAN_REMOVED: &str = "OrphanedConfigMapRemoved";
}

/// Event action strings.
pub mod actions {
    /// A reconciliation pass.
    pub const RECONCILE: &str = "Reconcile";
    /// Creating the managed ConfigMap.
    pub const CREATE: &str = "Create";
    /// Deleting the managed ConfigMap.
    pub const DELETE: &str = "Delete";
}

//! MigController Custom Resource Definition
//!
//! A MigController asks the operator to deploy the migration controller into
//! the cluster. Only one may be in effect at a time: it claims the operator
//! ConfigMap, and any second instance is parked in the `Error` phase.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, MigControllerPhase, NodePlacement};

/// Kind string recorded in owner references that point at a MigController.
pub const MIG_CONTROLLER_KIND: &str = "MigController";

/// Specification for a MigController.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "migrations.kubevirt.io",
    version = "v1alpha1",
    kind = "MigController",
    plural = "migcontrollers",
    shortname = "migc",
    status = "MigControllerStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MigControllerSpec {
    /// Pull policy for the controller image (Always, IfNotPresent, Never).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Placement of the infrastructure pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infra: Option<NodePlacement>,
}

/// Status for a MigController.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MigControllerStatus {
    /// Current phase.
    #[serde(default)]
    pub phase: MigControllerPhase,

    /// Conditions representing the resource state.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Operator version that last reconciled this resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_version: Option<String>,
}

impl MigControllerStatus {
    /// Create a new status with the given phase.
    pub fn with_phase(phase: MigControllerPhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the observed operator version and return self for chaining.
    pub fn observed_version(mut self, version: impl Into<String>) -> Self {
        self.observed_version = Some(version.into());
        self
    }

    /// Add a condition and return self for chaining.
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
        self
    }

    /// Look up a condition by type.
    pub fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// True when `desired` would not change anything observable.
    ///
    /// Condition timestamps are ignored so repeated passes don't patch
    /// the status just to bump `lastTransitionTime`.
    pub fn is_equivalent(&self, desired: &MigControllerStatus) -> bool {
        self.phase == desired.phase
            && self.observed_version == desired.observed_version
            && self.conditions.len() == desired.conditions.len()
            && desired.conditions.iter().all(|d| {
                self.get_condition(&d.type_)
                    .is_some_and(|current| current.same_state(d))
            })
    }
}

impl MigController {
    /// True once deletion has been requested (finalizers may still be running).
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

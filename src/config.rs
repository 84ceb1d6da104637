//! Runtime configuration for the operator
//!
//! Built once at startup (from CLI flags and environment in `main.rs`) and
//! shared read-only by the hooks and the controller.

use std::time::Duration;

/// Namespace the operator runs in when none is configured.
pub const DEFAULT_NAMESPACE: &str = "kubevirt-migration";

/// Name of the ConfigMap that a MigController claims.
pub const DEFAULT_CONFIG_MAP_NAME: &str = "kubevirt-migration-controller-config";

/// Field manager used for server-side apply and status patches.
pub const FIELD_MANAGER: &str = "kubevirt-migration-operator";

/// Delay before retrying a pass that hit an ownership race.
///
/// Fixed; it does not grow between attempts.
pub const OWNERSHIP_WAIT: Duration = Duration::from_secs(1);

/// Requeue delay applied by the error policy.
pub const ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// Operator settings.
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Namespace holding the managed ConfigMap.
    pub namespace: String,
    /// Name of the managed ConfigMap.
    pub config_map_name: String,
    /// Delay returned with a `Wait` verdict.
    pub ownership_wait: Duration,
    /// Delay before retrying a failed reconciliation.
    pub error_requeue: Duration,
    /// Field manager for writes.
    pub field_manager: String,
    /// Operator version recorded in status.
    pub version: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            config_map_name: DEFAULT_CONFIG_MAP_NAME.to_string(),
            ownership_wait: OWNERSHIP_WAIT,
            error_requeue: ERROR_REQUEUE,
            field_manager: FIELD_MANAGER.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl OperatorConfig {
    /// Default configuration in the given namespace.
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }
}

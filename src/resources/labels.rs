//! Labels stamped on everything the operator creates

use std::collections::BTreeMap;

/// Label applied to all non-operator resources.
pub const GENERIC_LABEL_KEY: &str = "migration.kubevirt.io";
/// Value of the `app` label on all non-operator resources.
pub const APP_LABEL_VALUE: &str = "kubevirt-migration-controller";
/// Label marking resources that belong to the operator itself.
pub const OPERATOR_LABEL_KEY: &str = "operator.migration.kubevirt.io";

/// Standard `app.kubernetes.io/managed-by` label.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
/// Standard `app.kubernetes.io/component` label.
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";

const MANAGED_BY_VALUE: &str = "kubevirt-migration-operator";
const COMPONENT_VALUE: &str = "migration";

/// Immutable label sets, built once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceLabels {
    common: BTreeMap<String, String>,
    operator: BTreeMap<String, String>,
}

impl Default for ResourceLabels {
    fn default() -> Self {
        let common = [
            (GENERIC_LABEL_KEY, ""),
            (MANAGED_BY_LABEL, MANAGED_BY_VALUE),
            (COMPONENT_LABEL, COMPONENT_VALUE),
            ("app", APP_LABEL_VALUE),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let operator = [(OPERATOR_LABEL_KEY.to_string(), String::new())]
            .into_iter()
            .collect();

        Self { common, operator }
    }
}

impl ResourceLabels {
    /// Labels for resources deployed on behalf of a MigController.
    pub fn common(&self) -> &BTreeMap<String, String> {
        &self.common
    }

    /// Common labels plus `extra`; `extra` wins on conflicts.
    pub fn with(&self, extra: &[(&str, &str)]) -> BTreeMap<String, String> {
        let mut labels = self.common.clone();
        for (k, v) in extra {
            labels.insert(k.to_string(), v.to_string());
        }
        labels
    }

    /// Operator labels merged over the common labels.
    pub fn operator_resource(&self) -> BTreeMap<String, String> {
        let mut labels = self.common.clone();
        labels.extend(self.operator.clone());
        labels
    }
}

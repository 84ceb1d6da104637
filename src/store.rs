//! Object store access for the ownership guard
//!
//! The hooks need three calls against the cluster: read the managed ConfigMap,
//! create it, and look up a MigController by name. The controller additionally
//! deletes a ConfigMap left behind without a controller owner. Keeping them
//! behind a trait lets the reconciliation logic be tested without an API
//! server.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, DeleteParams, PostParams, Preconditions};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::MigController;
use crate::error::is_not_found;
use crate::Result;

/// Trait abstracting object store reads and writes.
///
/// "Not found" is not an error here: it comes back as `Ok(None)`. Every other
/// failure is returned as-is so callers can fail closed.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get a ConfigMap from the operator namespace.
    async fn get_config_map(&self, name: &str) -> Result<Option<ConfigMap>>;

    /// Create a ConfigMap in the operator namespace.
    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<()>;

    /// Delete exactly this ConfigMap from the operator namespace.
    ///
    /// The delete is conditioned on the object's UID and resource version, so
    /// a ConfigMap replaced in the meantime is left alone. Already gone is `Ok`.
    async fn delete_config_map(&self, config_map: &ConfigMap) -> Result<()>;

    /// Get a (cluster-scoped) MigController by name.
    async fn get_mig_controller(&self, name: &str) -> Result<Option<MigController>>;
}

/// Real object store backed by the Kubernetes API.
pub struct KubeObjectStore {
    client: Client,
    namespace: String,
}

impl KubeObjectStore {
    /// Create a store reading ConfigMaps from `namespace`.
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get_config_map(&self, name: &str) -> Result<Option<ConfigMap>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        match api.get(name).await {
            Ok(cm) => Ok(Some(cm)),
            Err(e) if is_not_found(&e) => {
                debug!(namespace = %self.namespace, config_map = %name, "configmap not found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        let created = api.create(&PostParams::default(), config_map).await?;
        debug!(
            namespace = %self.namespace,
            config_map = %created.name_any(),
            "created configmap"
        );
        Ok(())
    }

    async fn delete_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        let name = config_map.name_any();
        let params = DeleteParams {
            preconditions: Some(Preconditions {
                uid: config_map.metadata.uid.clone(),
                resource_version: config_map.metadata.resource_version.clone(),
            }),
            ..DeleteParams::default()
        };
        match api.delete(&name, &params).await {
            Ok(_) => {
                debug!(namespace = %self.namespace, config_map = %name, "deleted configmap");
                Ok(())
            }
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_mig_controller(&self, name: &str) -> Result<Option<MigController>> {
        let api: Api<MigController> = Api::all(self.client.clone());
        match api.get(name).await {
            Ok(mc) => Ok(Some(mc)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

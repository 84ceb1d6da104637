//! Owner reference resolution
//!
//! An owner reference on the managed ConfigMap is only a `{kind, name, uid}`
//! snapshot. It says nothing about whether that owner still exists, so every
//! question about it is answered by looking the owner up again in the store.
//! Nothing resolved here is cached between passes.

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use tracing::debug;

use crate::crd::{MigController, MIG_CONTROLLER_KIND};
use crate::store::ObjectStore;
use crate::{Error, Result};

/// Whether the owner recorded on a managed object is still the live owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnerLiveness {
    /// The recorded owner exists, isn't deleting, and has the recorded UID.
    Alive,
    /// No owner is recorded, or the recorded one is gone, deleting, or replaced.
    Deleted,
}

/// Return the owner reference marked as the managing controller, if any.
pub fn controller_of(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .as_ref()?
        .iter()
        .find(|r| r.controller == Some(true))
}

/// True when `owner` is the managing controller of the object.
///
/// Compared by UID: an owner deleted and recreated under the same name is a
/// different owner.
pub fn is_controlled_by<K: Resource>(meta: &ObjectMeta, owner: &K) -> bool {
    match (controller_of(meta), owner.meta().uid.as_deref()) {
        (Some(r), Some(uid)) => r.uid == uid,
        _ => false,
    }
}

/// Build the controller owner reference pointing at `owner`.
pub fn owner_reference_for(owner: &MigController) -> Result<OwnerReference> {
    let mut reference = owner.controller_owner_ref(&()).ok_or_else(|| {
        Error::validation_for(
            owner.name_any(),
            "MigController has no name or uid, cannot own the configmap",
        )
    })?;
    reference.block_owner_deletion = Some(true);
    Ok(reference)
}

/// Decide whether the controller recorded on `config_map` is still alive.
///
/// - no controller reference: `Deleted`, the object is orphaned
/// - controller of another kind: `Error::Configuration`, someone else put
///   this object here and it must not be treated as ours
/// - owner not found, deleting, or with a different UID: `Deleted`
/// - otherwise: `Alive`
///
/// Lookup failures other than not-found are returned unchanged; no
/// liveness decision is made on partial information.
///
/// # Arguments
///
/// * `store` - Where the recorded owner is looked up, on every call
/// * `config_map` - The managed ConfigMap carrying the owner reference
pub async fn resolve_owner_liveness(
    store: &dyn ObjectStore,
    config_map: &ConfigMap,
) -> Result<OwnerLiveness> {
    let Some(owner_ref) = controller_of(&config_map.metadata) else {
        debug!(config_map = %config_map.name_any(), "configmap has no controller");
        return Ok(OwnerLiveness::Deleted);
    };

    if owner_ref.kind != MIG_CONTROLLER_KIND {
        return Err(Error::configuration(
            format!("ConfigMap/{}", config_map.name_any()),
            format!("unexpected configmap owner kind {:?}", owner_ref.kind),
        ));
    }

    let Some(owner) = store.get_mig_controller(&owner_ref.name).await? else {
        debug!(owner = %owner_ref.name, "recorded owner not found");
        return Ok(OwnerLiveness::Deleted);
    };

    let same_uid = owner.metadata.uid.as_deref() == Some(owner_ref.uid.as_str());
    if !owner.is_deleting() && same_uid {
        Ok(OwnerLiveness::Alive)
    } else {
        debug!(
            owner = %owner_ref.name,
            deleting = owner.is_deleting(),
            same_uid,
            "recorded owner is deleting or was replaced"
        );
        Ok(OwnerLiveness::Deleted)
    }
}

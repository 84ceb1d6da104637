//! Ownership handover between MigController resources
//!
//! Drives the public hooks and reconcile entry point against an in-memory
//! object store, so whole lifecycles can be played out without a cluster.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};
use kube::runtime::controller::Action;

use migration_operator::config::OperatorConfig;
use migration_operator::controller::{reconcile, Context, StatusWriter};
use migration_operator::crd::{
    MigController, MigControllerPhase, MigControllerSpec, MigControllerStatus, MIG_CONTROLLER_KIND,
};
use migration_operator::hooks::{
    MigControllerHooks, ReconcilerHooks, Verdict, UNWANTED_OWNER_MESSAGE,
};
use migration_operator::resources::ResourceLabels;
use migration_operator::store::ObjectStore;
use migration_operator::Error;

/// Object store backed by hash maps.
#[derive(Default)]
struct InMemoryStore {
    config_maps: Mutex<HashMap<String, ConfigMap>>,
    mig_controllers: Mutex<HashMap<String, MigController>>,
}

impl InMemoryStore {
    fn add_mig_controller(&self, mc: &MigController) {
        let name = mc.metadata.name.clone().unwrap_or_default();
        self.mig_controllers.lock().unwrap().insert(name, mc.clone());
    }

    fn remove_mig_controller(&self, name: &str) {
        self.mig_controllers.lock().unwrap().remove(name);
    }

    fn put_config_map(&self, cm: ConfigMap) {
        let name = cm.metadata.name.clone().unwrap_or_default();
        self.config_maps.lock().unwrap().insert(name, cm);
    }

    fn remove_config_map(&self, name: &str) {
        self.config_maps.lock().unwrap().remove(name);
    }

    fn config_map(&self, name: &str) -> Option<ConfigMap> {
        self.config_maps.lock().unwrap().get(name).cloned()
    }

    fn config_map_count(&self) -> usize {
        self.config_maps.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get_config_map(&self, name: &str) -> Result<Option<ConfigMap>, Error> {
        Ok(self.config_map(name))
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<(), Error> {
        let name = config_map.metadata.name.clone().unwrap_or_default();
        let mut maps = self.config_maps.lock().unwrap();
        if maps.contains_key(&name) {
            return Err(Error::Kube {
                source: kube::Error::Api(kube::error::ErrorResponse {
                    status: "Failure".to_string(),
                    message: format!("configmaps \"{name}\" already exists"),
                    reason: "AlreadyExists".to_string(),
                    code: 409,
                }),
            });
        }
        maps.insert(name, config_map.clone());
        Ok(())
    }

    async fn delete_config_map(&self, config_map: &ConfigMap) -> Result<(), Error> {
        let name = config_map.metadata.name.clone().unwrap_or_default();
        self.config_maps.lock().unwrap().remove(&name);
        Ok(())
    }

    async fn get_mig_controller(&self, name: &str) -> Result<Option<MigController>, Error> {
        Ok(self.mig_controllers.lock().unwrap().get(name).cloned())
    }
}

/// Status writer that keeps the latest status per MigController.
#[derive(Default)]
struct RecordingStatusWriter {
    statuses: Mutex<HashMap<String, MigControllerStatus>>,
    writes: Mutex<usize>,
}

impl RecordingStatusWriter {
    fn phase(&self, name: &str) -> Option<MigControllerPhase> {
        self.statuses
            .lock()
            .unwrap()
            .get(name)
            .map(|s| s.phase.clone())
    }

    fn status(&self, name: &str) -> Option<MigControllerStatus> {
        self.statuses.lock().unwrap().get(name).cloned()
    }

    fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

#[async_trait]
impl StatusWriter for RecordingStatusWriter {
    async fn patch_status(&self, name: &str, status: &MigControllerStatus) -> Result<(), Error> {
        self.statuses
            .lock()
            .unwrap()
            .insert(name.to_string(), status.clone());
        *self.writes.lock().unwrap() += 1;
        Ok(())
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    status: Arc<RecordingStatusWriter>,
    hooks: Arc<MigControllerHooks>,
    ctx: Arc<Context>,
    config: Arc<OperatorConfig>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryStore::default());
        let status = Arc::new(RecordingStatusWriter::default());
        let config = Arc::new(OperatorConfig::default());
        let hooks = Arc::new(MigControllerHooks::new(
            store.clone(),
            config.clone(),
            Arc::new(ResourceLabels::default()),
        ));
        let ctx = Arc::new(Context::from_parts(
            store.clone(),
            status.clone(),
            hooks.clone(),
            config.clone(),
        ));
        Self {
            store,
            status,
            hooks,
            ctx,
            config,
        }
    }

    /// MigController as the controller would see it, with recorded status.
    fn observed(&self, mc: &MigController) -> Arc<MigController> {
        let mut mc = mc.clone();
        mc.status = self.status.status(mc.metadata.name.as_deref().unwrap_or_default());
        Arc::new(mc)
    }

    async fn reconcile(&self, mc: &MigController) -> Result<Action, Error> {
        reconcile(self.observed(mc), self.ctx.clone()).await
    }

    fn managed_config_map(&self) -> Option<ConfigMap> {
        self.store.config_map(&self.config.config_map_name)
    }
}

fn mig_controller(name: &str, uid: &str) -> MigController {
    MigController {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            uid: Some(uid.to_string()),
            ..Default::default()
        },
        spec: MigControllerSpec::default(),
        status: None,
    }
}

fn config_map_with_owner(kind: &str, name: &str, uid: &str) -> ConfigMap {
    let config = OperatorConfig::default();
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(config.config_map_name),
            namespace: Some(config.namespace),
            owner_references: Some(vec![OwnerReference {
                api_version: "migrations.kubevirt.io/v1alpha1".to_string(),
                kind: kind.to_string(),
                name: name.to_string(),
                uid: uid.to_string(),
                controller: Some(true),
                block_owner_deletion: Some(true),
            }]),
            ..Default::default()
        },
        ..Default::default()
    }
}

mod hook_scenarios {
    use super::*;

    #[tokio::test]
    async fn story_first_owner_claims_configmap_and_passes_sanity_check() {
        let h = Harness::new();
        let x = mig_controller("x", "u1");
        h.store.add_mig_controller(&x);

        h.hooks.pre_create(&x).await.unwrap();

        let cm = h.managed_config_map().expect("configmap created");
        let owner = &cm.metadata.owner_references.as_ref().unwrap()[0];
        assert_eq!(owner.kind, MIG_CONTROLLER_KIND);
        assert_eq!(owner.name, "x");
        assert_eq!(owner.uid, "u1");
        assert_eq!(owner.controller, Some(true));
        assert_eq!(h.hooks.check_sanity(&x).await.unwrap(), Verdict::Proceed);
    }

    #[tokio::test]
    async fn story_replacement_waits_while_old_owners_configmap_remains() {
        let h = Harness::new();
        h.store
            .put_config_map(config_map_with_owner(MIG_CONTROLLER_KIND, "x", "u1"));
        let y = mig_controller("y", "u2");
        h.store.add_mig_controller(&y);

        let verdict = h.hooks.check_sanity(&y).await.unwrap();

        assert_eq!(verdict, Verdict::Wait(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn story_second_owner_is_rejected_while_first_is_alive() {
        let h = Harness::new();
        let x = mig_controller("x", "u1");
        let y = mig_controller("y", "u2");
        h.store.add_mig_controller(&x);
        h.store.add_mig_controller(&y);
        h.hooks.pre_create(&x).await.unwrap();

        let verdict = h.hooks.check_sanity(&y).await.unwrap();

        assert_eq!(verdict, Verdict::Reject(UNWANTED_OWNER_MESSAGE.to_string()));
    }

    #[tokio::test]
    async fn test_foreign_owner_kind_is_a_configuration_error() {
        let h = Harness::new();
        h.store
            .put_config_map(config_map_with_owner("SomeOtherKind", "x", "u1"));
        let y = mig_controller("y", "u2");

        let err = h.hooks.check_sanity(&y).await.unwrap_err();

        assert!(matches!(err, Error::Configuration { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn story_recreated_owner_with_same_name_is_not_the_old_owner() {
        let h = Harness::new();
        h.store
            .put_config_map(config_map_with_owner(MIG_CONTROLLER_KIND, "x", "u1"));
        let new_x = mig_controller("x", "u9");
        h.store.add_mig_controller(&new_x);

        // same name, different uid: the owner reference points at a dead object
        let verdict = h.hooks.check_sanity(&new_x).await.unwrap();

        assert_eq!(verdict, Verdict::Wait(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_sanity_check_does_not_mutate_the_store() {
        let h = Harness::new();
        let x = mig_controller("x", "u1");
        let y = mig_controller("y", "u2");
        h.store.add_mig_controller(&x);
        h.hooks.pre_create(&x).await.unwrap();
        let before = h.managed_config_map();

        for _ in 0..3 {
            h.hooks.check_sanity(&x).await.unwrap();
            h.hooks.check_sanity(&y).await.unwrap();
        }

        assert_eq!(h.managed_config_map(), before);
        assert_eq!(h.store.config_map_count(), 1);
    }
}

mod reconcile_lifecycle {
    use super::*;

    #[tokio::test]
    async fn story_single_owner_deploys_once() {
        let h = Harness::new();
        let x = mig_controller("x", "u1");
        h.store.add_mig_controller(&x);

        assert_eq!(h.reconcile(&x).await.unwrap(), Action::await_change());
        assert_eq!(h.reconcile(&x).await.unwrap(), Action::await_change());

        assert_eq!(h.status.phase("x"), Some(MigControllerPhase::Deployed));
        assert_eq!(h.status.writes(), 1);
        assert_eq!(h.store.config_map_count(), 1);
    }

    #[tokio::test]
    async fn story_contender_is_parked_until_owner_is_replaced() {
        let h = Harness::new();
        let x = mig_controller("x", "u1");
        let y = mig_controller("y", "u2");
        h.store.add_mig_controller(&x);
        h.store.add_mig_controller(&y);

        h.reconcile(&x).await.unwrap();
        assert_eq!(h.reconcile(&y).await.unwrap(), Action::await_change());
        assert_eq!(h.status.phase("y"), Some(MigControllerPhase::Error));

        // x is deleted; its ConfigMap lingers until garbage collection
        h.store.remove_mig_controller("x");
        assert_eq!(
            h.reconcile(&y).await.unwrap(),
            Action::requeue(Duration::from_secs(1))
        );
        assert_eq!(h.status.phase("y"), Some(MigControllerPhase::Error));

        // garbage collection removes the ConfigMap; y claims it
        h.store.remove_config_map(&h.config.config_map_name);
        assert_eq!(h.reconcile(&y).await.unwrap(), Action::await_change());

        assert_eq!(h.status.phase("y"), Some(MigControllerPhase::Deployed));
        let cm = h.managed_config_map().expect("configmap reclaimed");
        assert_eq!(cm.metadata.owner_references.unwrap()[0].uid, "u2");
    }

    #[tokio::test]
    async fn story_configmap_being_deleted_makes_contender_wait() {
        let h = Harness::new();
        let x = mig_controller("x", "u1");
        let y = mig_controller("y", "u2");
        h.store.add_mig_controller(&x);
        let mut cm = config_map_with_owner(MIG_CONTROLLER_KIND, "x", "u1");
        cm.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        h.store.put_config_map(cm);

        let action = h.reconcile(&y).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(1)));
        assert_eq!(h.status.writes(), 0);
    }

    #[tokio::test]
    async fn test_foreign_owner_kind_fails_reconcile_without_status_change() {
        let h = Harness::new();
        h.store
            .put_config_map(config_map_with_owner("SomeOtherKind", "x", "u1"));

        let err = h.reconcile(&mig_controller("y", "u2")).await.unwrap_err();

        assert!(!err.is_retryable());
        assert_eq!(h.status.writes(), 0);
    }

    #[tokio::test]
    async fn test_deleting_owner_is_not_reconciled() {
        let h = Harness::new();
        let mut x = mig_controller("x", "u1");
        x.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        h.store.add_mig_controller(&x);

        assert_eq!(h.reconcile(&x).await.unwrap(), Action::await_change());
        assert!(h.managed_config_map().is_none());
        assert_eq!(h.status.writes(), 0);
    }

    #[tokio::test]
    async fn story_orphaned_configmap_is_deleted_then_claimed() {
        let h = Harness::new();
        let y = mig_controller("y", "u2");
        h.store.add_mig_controller(&y);
        let mut orphan = config_map_with_owner(MIG_CONTROLLER_KIND, "x", "u1");
        orphan.metadata.owner_references = None;
        h.store.put_config_map(orphan);

        assert_eq!(
            h.reconcile(&y).await.unwrap(),
            Action::requeue(Duration::from_secs(1))
        );
        assert!(h.managed_config_map().is_none());

        assert_eq!(h.reconcile(&y).await.unwrap(), Action::await_change());
        let cm = h.managed_config_map().expect("configmap claimed");
        assert_eq!(cm.metadata.owner_references.unwrap()[0].uid, "u2");
        assert_eq!(h.status.phase("y"), Some(MigControllerPhase::Deployed));
    }

    #[tokio::test]
    async fn test_orphan_never_requeues_more_than_once() {
        let h = Harness::new();
        let y = mig_controller("y", "u2");
        h.store.add_mig_controller(&y);
        let mut orphan = config_map_with_owner(MIG_CONTROLLER_KIND, "x", "u1");
        orphan.metadata.owner_references = None;
        h.store.put_config_map(orphan);

        let mut requeues = 0;
        for _ in 0..10 {
            if h.reconcile(&y).await.unwrap() != Action::await_change() {
                requeues += 1;
            }
        }

        assert_eq!(requeues, 1);
        assert_eq!(h.status.writes(), 1);
    }
}

//! Builders for the controller Deployment and its containers
//!
//! All containers get the same hardened security context; all deployments
//! spread their replicas across nodes with a preferred anti-affinity term.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Affinity, Capabilities, Container, ContainerPort, PodAffinityTerm, PodAntiAffinity, PodSpec,
    PodSecurityContext, PodTemplateSpec, SeccompProfile, SecurityContext, WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, LabelSelectorRequirement, ObjectMeta,
};

use super::labels::{ResourceLabels, GENERIC_LABEL_KEY};
use crate::crd::NodePlacement;

/// Priority class for all operator-managed pods.
pub const PRIORITY_CLASS_DEFAULT: &str = "kubevirt-cluster-critical";

const TERMINATION_MESSAGE_PATH: &str = "/dev/termination-log";
const TERMINATION_MESSAGE_FALLBACK: &str = "FallbackToLogsOnError";
const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

fn restricted_security_context() -> SecurityContext {
    SecurityContext {
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            ..Default::default()
        }),
        seccomp_profile: Some(SeccompProfile {
            type_: "RuntimeDefault".to_string(),
            ..Default::default()
        }),
        allow_privilege_escalation: Some(false),
        run_as_non_root: Some(true),
        ..Default::default()
    }
}

fn base_container(name: &str, image: &str, pull_policy: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some(pull_policy.to_string()),
        termination_message_policy: Some(TERMINATION_MESSAGE_FALLBACK.to_string()),
        termination_message_path: Some(TERMINATION_MESSAGE_PATH.to_string()),
        security_context: Some(restricted_security_context()),
        ..Default::default()
    }
}

/// Create a container that logs at the given verbosity.
pub fn create_container(name: &str, image: &str, verbosity: &str, pull_policy: &str) -> Container {
    Container {
        args: Some(vec![format!("-v={verbosity}")]),
        ..base_container(name, image, pull_policy)
    }
}

/// Create a container exposing `ports`.
pub fn create_ports_container(
    name: &str,
    image: &str,
    pull_policy: &str,
    ports: Vec<ContainerPort>,
) -> Container {
    Container {
        ports: Some(ports),
        ..base_container(name, image, pull_policy)
    }
}

/// Return a copy of `affinity` with a preferred anti-affinity term for `name`.
///
/// The input is never modified. Existing anti-affinity terms are kept and the
/// new term is appended after them.
pub fn add_pod_anti_affinity(name: &str, affinity: Option<&Affinity>) -> Affinity {
    let term = WeightedPodAffinityTerm {
        weight: 1,
        pod_affinity_term: PodAffinityTerm {
            label_selector: Some(LabelSelector {
                match_expressions: Some(vec![LabelSelectorRequirement {
                    key: GENERIC_LABEL_KEY.to_string(),
                    operator: "In".to_string(),
                    values: Some(vec![name.to_string()]),
                }]),
                ..Default::default()
            }),
            topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
            ..Default::default()
        },
    };

    let mut affinity = affinity.cloned().unwrap_or_default();
    let anti = affinity
        .pod_anti_affinity
        .get_or_insert_with(PodAntiAffinity::default);
    anti.preferred_during_scheduling_ignored_during_execution
        .get_or_insert_with(Vec::new)
        .push(term);
    affinity
}

/// Parameters for [`create_deployment`].
#[derive(Clone, Debug)]
pub struct DeploymentParams<'a> {
    /// Deployment name, also used for the anti-affinity term.
    pub name: &'a str,
    /// Namespace to deploy into.
    pub namespace: &'a str,
    /// Selector label key.
    pub match_key: &'a str,
    /// Selector label value.
    pub match_value: &'a str,
    /// Service account for the pods.
    pub service_account: &'a str,
    /// Desired replica count.
    pub replicas: i32,
    /// Optional node placement from the MigController spec.
    pub placement: Option<&'a NodePlacement>,
}

/// Create a deployment running as non-root with the common labels.
///
/// Containers are left empty for the caller to fill in.
pub fn create_deployment(labels: &ResourceLabels, params: &DeploymentParams<'_>) -> Deployment {
    let pod_labels = labels.with(&[(params.match_key, params.match_value)]);
    let placement = params.placement.cloned().unwrap_or_default();
    let affinity = add_pod_anti_affinity(params.name, placement.affinity.as_ref());

    let pod_spec = PodSpec {
        security_context: Some(PodSecurityContext {
            run_as_non_root: Some(true),
            ..Default::default()
        }),
        service_account_name: Some(params.service_account.to_string()),
        priority_class_name: Some(PRIORITY_CLASS_DEFAULT.to_string()),
        node_selector: (!placement.node_selector.is_empty()).then_some(placement.node_selector),
        tolerations: (!placement.tolerations.is_empty()).then_some(placement.tolerations),
        affinity: Some(affinity),
        ..Default::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(params.name.to_string()),
            namespace: Some(params.namespace.to_string()),
            labels: Some(pod_labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(params.replicas),
            selector: LabelSelector {
                match_labels: Some(
                    [(params.match_key.to_string(), params.match_value.to_string())]
                        .into_iter()
                        .collect(),
                ),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

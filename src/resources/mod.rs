//! Templates for the Kubernetes objects the operator creates

pub mod deploy;
pub mod labels;

pub use deploy::{
    add_pod_anti_affinity, create_container, create_deployment, create_ports_container,
    DeploymentParams, PRIORITY_CLASS_DEFAULT,
};
pub use labels::ResourceLabels;

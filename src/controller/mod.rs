//! MigController controller
//!
//! Reconciliation logic, status reporting and the runner that ties the
//! controller to its watches.

pub mod events;
mod mig_controller;
mod runner;

pub use events::{EventPublisher, KubeEventPublisher, NoopEventPublisher};
pub use mig_controller::{
    error_policy, reconcile, report_error, Context, KubeStatusWriter, StatusWriter,
    CONTROLLER_NAME,
};
pub use runner::{requeue_all, run, WatchSet};

//! Custom Resource Definitions for the migration operator

mod mig_controller;
mod types;

pub use mig_controller::{MigController, MigControllerSpec, MigControllerStatus, MIG_CONTROLLER_KIND};
pub use types::{
    Condition, ConditionStatus, MigControllerPhase, NodePlacement, CONDITION_AVAILABLE,
    CONDITION_DEGRADED, CONDITION_PROGRESSING,
};

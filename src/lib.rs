//! Migration operator - keeps a single MigController in charge of the
//! operator ConfigMap
//!
//! The operator reconciles cluster-scoped `MigController` resources. The
//! first one to be reconciled claims the `kubevirt-migration-controller-config`
//! ConfigMap as its controller owner. Any other MigController is parked in an
//! error state while that owner is alive, and takes over once it is gone.
//!
//! # Modules
//!
//! - [`crd`] - MigController custom resource
//! - [`controller`] - Reconciliation, status reporting and the controller runner
//! - [`hooks`] - Ownership hooks run around every reconciliation
//! - [`ownership`] - Owner reference helpers and owner liveness resolution
//! - [`store`] - Read/create access to cluster objects
//! - [`resources`] - Labels and Deployment templates for managed objects
//! - [`config`] - Operator settings
//! - [`retry`] - Backoff for startup calls
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod hooks;
pub mod ownership;
pub mod resources;
pub mod retry;
pub mod store;

pub use error::Error;

/// Result type alias using our custom Error type.
pub type Result<T> = std::result::Result<T, Error>;

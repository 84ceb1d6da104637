//! Error types for the migration operator
//!
//! Errors carry the object they concern so a failed reconciliation can be
//! traced back to a specific MigController or ConfigMap from the logs alone.

use thiserror::Error;

/// Main error type for migration operator operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error (anything other than not-found reaches here).
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error.
        #[from]
        source: kube::Error,
    },

    /// An object in the cluster is set up in a way this operator cannot accept.
    ///
    /// Raised when another component placed a conflicting object, e.g. the
    /// managed ConfigMap is controlled by an owner of an unexpected kind.
    #[error("configuration error for {object}: {message}")]
    Configuration {
        /// Object that carries the offending configuration.
        object: String,
        /// Description of what's wrong.
        message: String,
    },

    /// A resource is missing fields the operator relies on.
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Name of the resource that failed validation.
        resource: String,
        /// Description of what's invalid.
        message: String,
    },

    /// Watch registration failed.
    #[error("watch error [{kind}]: {message}")]
    Watch {
        /// Kind of the resource being watched.
        kind: String,
        /// Description of what failed.
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed.
        message: String,
    },

    /// Internal/operational error.
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Where the error occurred (e.g. "pre-create", "status").
        context: String,
        /// Description of what failed.
        message: String,
    },
}

impl Error {
    /// Create a configuration error for the given object.
    pub fn configuration(object: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Configuration {
            object: object.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error for a named resource.
    pub fn validation_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a watch registration error.
    pub fn watch(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Watch {
            kind: kind.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with context.
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Whether retrying the reconciliation could make this error go away.
    ///
    /// Configuration and validation errors need a human to change something
    /// in the cluster; retrying them only produces log noise.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Kube { .. } | Self::Watch { .. } | Self::Internal { .. } => true,
            Self::Configuration { .. } | Self::Validation { .. } | Self::Serialization { .. } => {
                false
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Check if a kube error is a 404 from the API server.
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Check if a kube error is a 409 AlreadyExists from a create.
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists")
}

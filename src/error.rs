//! Error types for the training portal operator
//!
//! Errors carry the resource they relate to so the dispatcher can log
//! them with context. Every error is classified as either temporary (retry
//! with backoff) or permanent (record on status and wait for a spec change).

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// How the dispatcher should treat a failed reconciliation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected to resolve on its own; retry with backoff
    Temporary,
    /// Requires a spec change; do not retry until the object changes
    Permanent,
}

/// Main error type for operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for a resource spec
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Name of the resource with invalid configuration
        resource: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.workshops[0].name")
        field: Option<String>,
    },

    /// A referenced object does not exist yet
    #[error("{kind} {name} is not available yet")]
    DependencyNotReady {
        /// Kind of the missing object
        kind: String,
        /// Name of the missing object
        name: String,
    },

    /// Optimistic concurrency conflict on a write
    #[error("conflicting update to {kind} {name}")]
    Conflict {
        /// Kind of the object
        kind: String,
        /// Name of the object
        name: String,
    },

    /// A cluster API call did not complete in time
    #[error("timed out during {operation}")]
    Timeout {
        /// Operation that timed out
        operation: String,
    },

    /// An owner reference could not be attached
    #[error("ownership error for {object}: {message}")]
    Ownership {
        /// Object the error relates to (child or parent)
        object: String,
        /// Description of what failed
        message: String,
        /// Whether waiting can fix it (parent still being created)
        retryable: bool,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "pool", "allocation")
        context: String,
    },
}

impl Error {
    /// Create a validation error without resource context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a named resource
    pub fn validation_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a named resource and field path
    pub fn validation_for_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create an error for a referenced object that does not exist yet
    pub fn dependency_not_ready(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DependencyNotReady {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a write conflict error
    pub fn conflict(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Parent exists but has not been persisted yet
    pub fn owner_pending(object: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Ownership {
            object: object.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Owner reference would never be honoured by the garbage collector
    pub fn owner_invalid(object: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Ownership {
            object: object.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Classify the error for the dispatcher
    ///
    /// Kubernetes 409 (conflict), 404 (not yet visible) and 429 (throttled)
    /// are temporary; other 4xx responses are permanent. Transport errors
    /// and 5xx responses are temporary.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) if matches!(ae.code, 404 | 409 | 429) => {
                    ErrorClass::Temporary
                }
                kube::Error::Api(ae) if (400..500).contains(&ae.code) => ErrorClass::Permanent,
                _ => ErrorClass::Temporary,
            },
            Error::Validation { .. } => ErrorClass::Permanent,
            Error::DependencyNotReady { .. } => ErrorClass::Temporary,
            Error::Conflict { .. } => ErrorClass::Temporary,
            Error::Timeout { .. } => ErrorClass::Temporary,
            Error::Ownership { retryable, .. } => {
                if *retryable {
                    ErrorClass::Temporary
                } else {
                    ErrorClass::Permanent
                }
            }
            Error::Serialization { .. } => ErrorClass::Permanent,
            Error::Internal { .. } => ErrorClass::Temporary,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Temporary
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}

/// True when the kube error is an API response with the given status code
pub(crate) fn is_api_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == code)
}

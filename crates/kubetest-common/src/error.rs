//! Error types for kubetest
//!
//! Errors are structured with fields to aid debugging when a test session
//! fails to come up. Each variant carries the context a user needs to find
//! the offending document, resource, or cluster call.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for kubetest operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Invalid configuration or session input
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The invalid field (e.g., "pollIntervalSecs")
        field: Option<String>,
    },

    /// A configuration document could not be read or understood
    #[error("failed to load configuration document {source_url}: {message}")]
    Document {
        /// URL or path of the document
        source_url: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Creating or updating a resource in the cluster failed
    #[error("failed to apply {kind} {name}: {message}")]
    Apply {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
        /// Description of what failed
        message: String,
    },

    /// One or more session resources could not be removed
    #[error(
        "cleanup of session {session} failed for {} resource(s): {}",
        .failures.len(),
        .failures.join("; ")
    )]
    Cleanup {
        /// Session whose cleanup was incomplete
        session: String,
        /// One entry per failed list or delete
        failures: Vec<String>,
    },

    /// Filesystem or process error
    #[error("io error [{context}]: {source}")]
    Io {
        /// What was being done (e.g., "read /tmp/app.yaml")
        context: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "wait", "loader")
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a specific field
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a document load error
    pub fn document(source_url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Document {
            source_url: source_url.into(),
            message: msg.into(),
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

    /// Create an apply error for a resource
    pub fn apply(kind: impl Into<String>, name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Apply {
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create an aggregate cleanup error
    pub fn cleanup(session: impl Into<String>, failures: Vec<String>) -> Self {
        Self::Cleanup {
            session: session.into(),
            failures,
        }
    }

    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
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

    /// True if the API server answered 404 for the object
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube { source } if crate::kube_utils::is_not_found(source))
    }

    /// True if this is the aggregate cleanup failure
    pub fn is_cleanup(&self) -> bool {
        matches!(self, Error::Cleanup { .. })
    }

    /// Check if this error is retryable
    ///
    /// Validation, document and serialization errors need a config fix.
    /// Kubernetes errors are retryable unless the server rejected the request (4xx).
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Validation { .. } => false,
            Error::Document { .. } => false,
            Error::Serialization { .. } => false,
            Error::Apply { .. } => true,
            Error::Cleanup { .. } => false,
            Error::Io { .. } => true,
            Error::Internal { .. } => true,
        }
    }
}

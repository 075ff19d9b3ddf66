//! Common types for kubetest: errors, retry, and Kubernetes helpers

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod retry;
pub mod yaml;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label key stamped on every resource provisioned for a test session
pub const SESSION_LABEL_KEY: &str = "kubetest.io/session";

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "kubetest";

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "default";

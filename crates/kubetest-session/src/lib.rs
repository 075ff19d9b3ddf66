//! kubetest-session - provisioning engine for ephemeral Kubernetes test sessions
//!
//! A test session applies a batch of pods, services and replication
//! controllers, stamps each one with the session's identity, blocks until they
//! are ready (or a deadline passes), and guarantees that everything carrying
//! the session label is removed again when the session ends.
//!
//! # Modules
//!
//! - [`session`] - Session identity and its tracing span
//! - [`config`] - Session configuration (documents, timeouts, connectivity wait)
//! - [`resource`] - Resource sum type, session tagging and apply ordering
//! - [`document`] - Configuration document loading and parsing
//! - [`dependency`] - Dependency document resolution
//! - [`cluster`] - Cluster seams (apply, list, delete) and their kube-rs implementation
//! - [`readiness`] - Readiness conditions and the composite AND condition
//! - [`wait`] - Fixed-interval polling under a timeout
//! - [`cleanup`] - Best-effort removal of every session resource
//! - [`status`] - Session status reporting
//! - [`shutdown`] - Process-exit fallback cleanup
//! - [`orchestrator`] - `start` / `stop` driver tying it all together

#![deny(missing_docs)]

pub mod cleanup;
pub mod cluster;
pub mod config;
pub mod dependency;
pub mod document;
pub mod orchestrator;
pub mod readiness;
pub mod resource;
pub mod session;
pub mod shutdown;
pub mod status;
pub mod wait;

pub use cleanup::{cleanup_session, CleanupReport};
pub use cluster::{KubeSessionClient, ResourceApplier, SessionCluster};
pub use config::SessionConfig;
pub use dependency::{DependencyResolver, ManifestDirResolver, NoDependencies};
pub use document::{ConfigDocument, DocumentLoader, UrlLoader};
pub use kubetest_common::{Error, Result};
pub use orchestrator::SessionOrchestrator;
pub use readiness::{CompositeCondition, Condition, Readiness};
pub use resource::{order_for_apply, Resource, ResourceKind, ResourceRef};
pub use session::Session;
pub use shutdown::{shutdown_signal, FallbackRegistry};
pub use status::{display_session_status, session_status, SessionStatus};
pub use wait::{WaitOutcome, WaitStrategy};

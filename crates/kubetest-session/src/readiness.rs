//! Readiness conditions for a session's resources
//!
//! A [`Condition`] is a predicate re-evaluated against live cluster state on
//! every call. [`SessionPodsReady`] and [`SessionServicesReady`] each cover one
//! family of kinds, and [`CompositeCondition`] ANDs any set of them together.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Pod, ReplicationController, Service};
use kubetest_common::Error;
use tracing::debug;

use crate::cluster::SessionCluster;
use crate::session::Session;

/// Pod phase reported once all containers have been started
const POD_PHASE_RUNNING: &str = "Running";

/// Service type that is a DNS alias and never has endpoints
const SERVICE_TYPE_EXTERNAL_NAME: &str = "ExternalName";

/// A repeatedly evaluable readiness predicate.
#[async_trait]
pub trait Condition: Send + Sync {
    /// Human readable description for logs
    fn describe(&self) -> String;

    /// Query current state and report whether the condition holds
    async fn evaluate(&self) -> Result<bool, Error>;
}

/// The readiness families a batch of resources can contribute
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Readiness {
    /// Pods and replication controllers
    Pods,
    /// Services
    Services,
}

impl Readiness {
    /// Build the condition for this family, scoped to `session`
    pub fn condition(
        self,
        cluster: Arc<dyn SessionCluster>,
        session: &Session,
        wait_for_connectivity: bool,
    ) -> Box<dyn Condition> {
        match self {
            Readiness::Pods => Box::new(SessionPodsReady::new(cluster, session)),
            Readiness::Services => Box::new(SessionServicesReady::new(
                cluster,
                session,
                wait_for_connectivity,
            )),
        }
    }
}

/// Every pod and replication controller of the session is running.
pub struct SessionPodsReady {
    cluster: Arc<dyn SessionCluster>,
    selector: String,
}

impl SessionPodsReady {
    /// Create the condition for `session`
    pub fn new(cluster: Arc<dyn SessionCluster>, session: &Session) -> Self {
        Self {
            cluster,
            selector: session.label_selector(),
        }
    }
}

#[async_trait]
impl Condition for SessionPodsReady {
    fn describe(&self) -> String {
        format!("pods ready ({})", self.selector)
    }

    async fn evaluate(&self) -> Result<bool, Error> {
        let pods = self.cluster.list_pods(&self.selector).await?;
        let controllers = self
            .cluster
            .list_replication_controllers(&self.selector)
            .await?;

        if pods.is_empty() && controllers.is_empty() {
            debug!(selector = %self.selector, "no session pods or controllers yet");
            return Ok(false);
        }

        let mut ready = true;
        for pod in &pods {
            if !is_pod_running(pod) {
                debug!(
                    pod = pod.metadata.name.as_deref().unwrap_or_default(),
                    phase = pod_phase(pod).unwrap_or("Unknown"),
                    "pod not running"
                );
                ready = false;
            }
        }
        for controller in &controllers {
            let (desired, ready_replicas) = replica_counts(controller);
            if ready_replicas < desired {
                debug!(
                    controller = controller.metadata.name.as_deref().unwrap_or_default(),
                    desired,
                    ready = ready_replicas,
                    "replication controller not at desired replicas"
                );
                ready = false;
            }
        }
        Ok(ready)
    }
}

/// Every service of the session exists and, when requested, is backed by a
/// ready endpoint.
pub struct SessionServicesReady {
    cluster: Arc<dyn SessionCluster>,
    selector: String,
    wait_for_connectivity: bool,
}

impl SessionServicesReady {
    /// Create the condition for `session`
    pub fn new(
        cluster: Arc<dyn SessionCluster>,
        session: &Session,
        wait_for_connectivity: bool,
    ) -> Self {
        Self {
            cluster,
            selector: session.label_selector(),
            wait_for_connectivity,
        }
    }
}

#[async_trait]
impl Condition for SessionServicesReady {
    fn describe(&self) -> String {
        format!(
            "services ready ({}, connectivity={})",
            self.selector, self.wait_for_connectivity
        )
    }

    async fn evaluate(&self) -> Result<bool, Error> {
        let services = self.cluster.list_services(&self.selector).await?;
        if services.is_empty() {
            debug!(selector = %self.selector, "no session services yet");
            return Ok(false);
        }
        if !self.wait_for_connectivity {
            return Ok(true);
        }

        for service in services.iter().filter(|s| !is_external_name(s)) {
            let Some(name) = service.metadata.name.as_deref() else {
                continue;
            };
            let endpoints = self.cluster.get_endpoints(name).await?;
            if !endpoints.as_ref().is_some_and(has_ready_address) {
                debug!(service = name, "service has no ready endpoint");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Logical AND over a set of conditions.
///
/// Every call re-evaluates the members; a member that was true earlier can
/// regress (a pod crashes), so nothing is cached. Evaluation stops at the
/// first member that is not satisfied. An empty composite is vacuously true.
pub struct CompositeCondition {
    members: Vec<Box<dyn Condition>>,
}

impl CompositeCondition {
    /// Combine `members`
    pub fn new(members: Vec<Box<dyn Condition>>) -> Self {
        Self { members }
    }

    /// Number of member conditions
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether there are no members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[async_trait]
impl Condition for CompositeCondition {
    fn describe(&self) -> String {
        self.members
            .iter()
            .map(|m| m.describe())
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    async fn evaluate(&self) -> Result<bool, Error> {
        for member in &self.members {
            if !member.evaluate().await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|s| s.phase.as_deref())
}

/// Whether a pod has reached the Running phase
pub fn is_pod_running(pod: &Pod) -> bool {
    pod_phase(pod) == Some(POD_PHASE_RUNNING)
}

/// (desired, ready) replica counts; desired defaults to 1 like the API server
pub fn replica_counts(controller: &ReplicationController) -> (i32, i32) {
    let desired = controller
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let ready = controller
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    (desired, ready)
}

fn is_external_name(service: &Service) -> bool {
    service
        .spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        == Some(SERVICE_TYPE_EXTERNAL_NAME)
}

fn has_ready_address(endpoints: &Endpoints) -> bool {
    endpoints
        .subsets
        .as_ref()
        .is_some_and(|subsets| {
            subsets
                .iter()
                .any(|s| s.addresses.as_ref().is_some_and(|a| !a.is_empty()))
        })
}

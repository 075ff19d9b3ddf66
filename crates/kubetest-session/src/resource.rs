//! Session resources: the kinds a session can provision, how they are
//! tagged with the session identity, and the order they are applied in.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Pod, ReplicationController, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kubetest_common::{Error, SESSION_LABEL_KEY};
use serde_json::Value;

use crate::readiness::Readiness;

/// Kinds a session knows how to provision
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// core/v1 Pod
    Pod,
    /// core/v1 Service
    Service,
    /// core/v1 ReplicationController
    ReplicationController,
}

impl ResourceKind {
    /// Kubernetes `kind` string
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "Pod",
            ResourceKind::Service => "Service",
            ResourceKind::ReplicationController => "ReplicationController",
        }
    }

    /// Parse a Kubernetes `kind` string; `None` for kinds a session does not handle
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "Pod" => Some(ResourceKind::Pod),
            "Service" => Some(ResourceKind::Service),
            "ReplicationController" => Some(ResourceKind::ReplicationController),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a resource in the session namespace
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceRef {
    /// Resource kind
    pub kind: ResourceKind,
    /// Resource name
    pub name: String,
}

impl ResourceRef {
    /// Create a reference
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

/// A workload resource to provision for a session
#[derive(Clone, Debug, PartialEq)]
pub enum Resource {
    /// A bare pod
    Pod(Pod),
    /// A service
    Service(Service),
    /// A replication controller and its pod template
    ReplicationController(ReplicationController),
}

impl Resource {
    /// Deserialize a Kubernetes object.
    ///
    /// Returns `Ok(None)` for kinds a session does not provision.
    pub fn from_object(object: Value) -> Result<Option<Self>, Error> {
        let Some(kind) = object
            .get("kind")
            .and_then(|k| k.as_str())
            .and_then(ResourceKind::from_kind)
        else {
            return Ok(None);
        };

        let malformed = |e: serde_json::Error| Error::serialization_for_kind(kind.as_str(), e.to_string());
        let resource = match kind {
            ResourceKind::Pod => Resource::Pod(serde_json::from_value(object).map_err(malformed)?),
            ResourceKind::Service => {
                Resource::Service(serde_json::from_value(object).map_err(malformed)?)
            }
            ResourceKind::ReplicationController => {
                Resource::ReplicationController(serde_json::from_value(object).map_err(malformed)?)
            }
        };
        Ok(Some(resource))
    }

    /// Resource kind
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Pod(_) => ResourceKind::Pod,
            Resource::Service(_) => ResourceKind::Service,
            Resource::ReplicationController(_) => ResourceKind::ReplicationController,
        }
    }

    /// Object metadata
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Resource::Pod(pod) => &pod.metadata,
            Resource::Service(service) => &service.metadata,
            Resource::ReplicationController(rc) => &rc.metadata,
        }
    }

    /// `metadata.name`, if set
    pub fn name(&self) -> Option<&str> {
        self.metadata().name.as_deref()
    }

    /// The object's own labels
    pub fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata().labels.as_ref()
    }

    /// Whether this is a service
    pub fn is_service(&self) -> bool {
        matches!(self, Resource::Service(_))
    }

    /// Readiness condition this resource contributes once applied
    pub fn readiness(&self) -> Readiness {
        match self {
            Resource::Pod(_) | Resource::ReplicationController(_) => Readiness::Pods,
            Resource::Service(_) => Readiness::Services,
        }
    }

    /// Stamp the session identity onto the resource's labels.
    ///
    /// A replication controller is tagged twice: on the controller itself and
    /// on its pod template, so the pods it spawns carry the session label too.
    pub fn tag(&mut self, session_id: &str) {
        match self {
            Resource::Pod(pod) => tag_labels(&mut pod.metadata, session_id),
            Resource::Service(service) => tag_labels(&mut service.metadata, session_id),
            Resource::ReplicationController(rc) => {
                let template_meta = rc
                    .spec
                    .get_or_insert_with(Default::default)
                    .template
                    .get_or_insert_with(Default::default)
                    .metadata
                    .get_or_insert_with(Default::default);
                tag_labels(template_meta, session_id);
                tag_labels(&mut rc.metadata, session_id);
            }
        }
    }
}

fn tag_labels(meta: &mut ObjectMeta, session_id: &str) {
    meta.labels
        .get_or_insert_with(BTreeMap::new)
        .insert(SESSION_LABEL_KEY.to_string(), session_id.to_string());
}

/// Reorder a batch so every service is applied before anything else.
///
/// Services must exist before the pods that resolve them through DNS or
/// injected environment variables start. The sort is stable, so the relative
/// order within services and within non-services is preserved.
pub fn order_for_apply(resources: &mut [Resource]) {
    resources.sort_by_key(|r| !r.is_service());
}

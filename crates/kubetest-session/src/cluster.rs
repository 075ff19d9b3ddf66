//! Cluster seams used by a session
//!
//! [`ResourceApplier`] creates or updates resources, [`SessionCluster`] reads
//! and deletes them. Both are traits so the orchestrator can be driven against
//! mocks in tests and against a real API server through [`KubeSessionClient`].

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Pod, ReplicationController, Service};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::{Client, Resource as KubeResource};
use kubetest_common::kube_utils::prepare_metadata_for_apply;
use kubetest_common::retry::{retry_with_backoff_when, RetryConfig};
use kubetest_common::{Error, FIELD_MANAGER};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::resource::{ResourceKind, ResourceRef};

/// Idempotent create-or-update of session resources, one operation per kind.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceApplier: Send + Sync {
    /// Create or update a pod
    async fn apply_pod(&self, pod: &Pod, session_id: &str) -> Result<(), Error>;

    /// Create or update a service
    async fn apply_service(&self, service: &Service, session_id: &str) -> Result<(), Error>;

    /// Create or update a replication controller
    async fn apply_replication_controller(
        &self,
        controller: &ReplicationController,
        session_id: &str,
    ) -> Result<(), Error>;
}

/// Read and delete access to the resources of a session.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SessionCluster: Send + Sync {
    /// List pods matching a label selector
    async fn list_pods(&self, selector: &str) -> Result<Vec<Pod>, Error>;

    /// List services matching a label selector
    async fn list_services(&self, selector: &str) -> Result<Vec<Service>, Error>;

    /// List replication controllers matching a label selector
    async fn list_replication_controllers(
        &self,
        selector: &str,
    ) -> Result<Vec<ReplicationController>, Error>;

    /// Get the Endpoints object backing a service, if any
    async fn get_endpoints(&self, service: &str) -> Result<Option<Endpoints>, Error>;

    /// Delete a resource.
    ///
    /// Returns `false` if it was already gone; absence is not an error.
    async fn delete(&self, target: &ResourceRef) -> Result<bool, Error>;
}

/// kube-rs implementation of both seams, scoped to one namespace
#[derive(Clone)]
pub struct KubeSessionClient {
    client: Client,
    namespace: String,
    retry: RetryConfig,
}

/// Attempts per delete before a transient API failure is reported
const DELETE_ATTEMPTS: u32 = 3;

impl KubeSessionClient {
    /// Create a client operating in `namespace`
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            retry: RetryConfig::with_max_attempts(DELETE_ATTEMPTS),
        }
    }

    /// Namespace this client operates in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn api<K>(&self) -> Api<K>
    where
        K: KubeResource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as KubeResource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn server_side_apply<K>(
        &self,
        kind: ResourceKind,
        object: &K,
        session_id: &str,
    ) -> Result<(), Error>
    where
        K: KubeResource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + Serialize
            + DeserializeOwned
            + std::fmt::Debug,
        <K as KubeResource>::DynamicType: Default,
    {
        let name = object
            .meta()
            .name
            .clone()
            .ok_or_else(|| Error::validation(format!("{} has no metadata.name", kind)))?;

        let mut object = object.clone();
        prepare_metadata_for_apply(object.meta_mut(), &self.namespace);

        debug!(kind = %kind, name = %name, session = %session_id, "server-side apply");
        self.api::<K>()
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&object),
            )
            .await
            .map_err(|e| Error::apply(kind.as_str(), &name, e.to_string()))?;
        Ok(())
    }

    async fn delete_named<K>(&self, name: &str) -> Result<bool, Error>
    where
        K: KubeResource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
        <K as KubeResource>::DynamicType: Default,
    {
        let api = self.api::<K>();
        let deleted = retry_with_backoff_when(
            &self.retry,
            "delete",
            || {
                let api = &api;
                async move {
                    api.delete(name, &DeleteParams::background())
                        .await
                        .map_err(Error::from)
                }
            },
            Error::is_retryable,
        )
        .await;

        match deleted {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ResourceApplier for KubeSessionClient {
    async fn apply_pod(&self, pod: &Pod, session_id: &str) -> Result<(), Error> {
        self.server_side_apply(ResourceKind::Pod, pod, session_id)
            .await
    }

    async fn apply_service(&self, service: &Service, session_id: &str) -> Result<(), Error> {
        self.server_side_apply(ResourceKind::Service, service, session_id)
            .await
    }

    async fn apply_replication_controller(
        &self,
        controller: &ReplicationController,
        session_id: &str,
    ) -> Result<(), Error> {
        self.server_side_apply(ResourceKind::ReplicationController, controller, session_id)
            .await
    }
}

#[async_trait]
impl SessionCluster for KubeSessionClient {
    async fn list_pods(&self, selector: &str) -> Result<Vec<Pod>, Error> {
        let list = self
            .api::<Pod>()
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(list.items)
    }

    async fn list_services(&self, selector: &str) -> Result<Vec<Service>, Error> {
        let list = self
            .api::<Service>()
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(list.items)
    }

    async fn list_replication_controllers(
        &self,
        selector: &str,
    ) -> Result<Vec<ReplicationController>, Error> {
        let list = self
            .api::<ReplicationController>()
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(list.items)
    }

    async fn get_endpoints(&self, service: &str) -> Result<Option<Endpoints>, Error> {
        Ok(self.api::<Endpoints>().get_opt(service).await?)
    }

    async fn delete(&self, target: &ResourceRef) -> Result<bool, Error> {
        match target.kind {
            ResourceKind::Pod => self.delete_named::<Pod>(&target.name).await,
            ResourceKind::Service => self.delete_named::<Service>(&target.name).await,
            ResourceKind::ReplicationController => {
                self.delete_named::<ReplicationController>(&target.name)
                    .await
            }
        }
    }
}

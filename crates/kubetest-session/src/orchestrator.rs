//! Session orchestrator
//!
//! Drives one session from configuration documents to ready resources:
//!
//! 1. Load dependency documents, then the configured document
//! 2. Order the resources (services first), tag and apply each one
//! 3. Wait for the readiness conditions contributed by what was applied
//! 4. Register the process-exit fallback cleanup
//!
//! A failure while loading or applying aborts the start and cleans up
//! whatever was already applied. The triggering error is always the one
//! returned; an incomplete cleanup at that point is only logged. A readiness
//! timeout is not an error: `start` returns `Ok(false)`.

use std::collections::BTreeSet;
use std::sync::Arc;

use kubetest_common::Error;
use tracing::{error, info, warn, Instrument};

use crate::cleanup::{cleanup_session, CleanupReport};
use crate::cluster::{KubeSessionClient, ResourceApplier, SessionCluster};
use crate::config::SessionConfig;
use crate::dependency::DependencyResolver;
use crate::document::{ConfigDocument, DocumentLoader};
use crate::readiness::{CompositeCondition, Condition, Readiness};
use crate::resource::{order_for_apply, Resource};
use crate::session::Session;
use crate::shutdown::FallbackRegistry;
use crate::status::display_session_status;
use crate::wait::WaitStrategy;

/// Starts and stops test sessions against one cluster.
pub struct SessionOrchestrator {
    cluster: Arc<dyn SessionCluster>,
    applier: Arc<dyn ResourceApplier>,
    loader: Arc<dyn DocumentLoader>,
    resolver: Arc<dyn DependencyResolver>,
    /// Fallback cleanups for sessions started but not yet stopped
    fallbacks: Arc<FallbackRegistry>,
}

impl SessionOrchestrator {
    /// Create an orchestrator from its collaborators
    pub fn new(
        cluster: Arc<dyn SessionCluster>,
        applier: Arc<dyn ResourceApplier>,
        loader: Arc<dyn DocumentLoader>,
        resolver: Arc<dyn DependencyResolver>,
    ) -> Self {
        Self {
            cluster,
            applier,
            loader,
            resolver,
            fallbacks: FallbackRegistry::global(),
        }
    }

    /// Arm fallbacks in `registry` instead of the process-wide one
    pub fn with_fallback_registry(mut self, registry: Arc<FallbackRegistry>) -> Self {
        self.fallbacks = registry;
        self
    }

    /// Create an orchestrator that applies and cleans up through `client`
    pub fn from_client(
        client: KubeSessionClient,
        loader: Arc<dyn DocumentLoader>,
        resolver: Arc<dyn DependencyResolver>,
    ) -> Self {
        let client = Arc::new(client);
        Self::new(client.clone(), client, loader, resolver)
    }

    /// Start `session`.
    ///
    /// Returns `Ok(true)` when every applied resource became ready in time,
    /// `Ok(false)` on a readiness timeout, and the triggering error when
    /// loading or applying failed (after cleaning up).
    pub async fn start(&self, config: &SessionConfig, session: &Session) -> Result<bool, Error> {
        async {
            config.validate()?;
            info!(namespace = %config.namespace, "starting session");

            let provisioned = async {
                let documents = self.load_documents(config, session).await?;
                self.apply_and_wait(config, session, documents).await
            }
            .await;
            let ready = self.cleanup_on_error(session, provisioned).await?;

            display_session_status(self.cluster.as_ref(), session).await;

            // Registered on timeout as well: the resources exist and still
            // need removing if the process dies before `stop`.
            if config.register_fallback {
                self.register_fallback(session);
            }
            Ok(ready)
        }
        .instrument(session.span())
        .await
    }

    /// Stop `session`, removing every resource it created.
    ///
    /// Idempotent. On success the fallback cleanup is deregistered; when
    /// cleanup is incomplete the error is returned and the fallback stays
    /// armed.
    pub async fn stop(&self, session: &Session) -> Result<CleanupReport, Error> {
        async {
            info!("stopping session");
            let report = cleanup_session(self.cluster.as_ref(), session).await?;
            self.fallbacks.disarm(session.id());
            Ok(report)
        }
        .instrument(session.span())
        .await
    }

    /// Apply already-loaded documents for `session` and wait for readiness.
    ///
    /// Cleans up and returns the error if any apply fails.
    pub async fn apply_configuration(
        &self,
        config: &SessionConfig,
        session: &Session,
        documents: Vec<ConfigDocument>,
    ) -> Result<bool, Error> {
        async {
            let applied = self.apply_and_wait(config, session, documents).await;
            self.cleanup_on_error(session, applied).await
        }
        .instrument(session.span())
        .await
    }

    /// Whether a fallback cleanup is armed for `session`
    pub fn has_fallback(&self, session: &Session) -> bool {
        self.fallbacks.is_armed(session.id())
    }

    async fn load_documents(
        &self,
        config: &SessionConfig,
        session: &Session,
    ) -> Result<Vec<ConfigDocument>, Error> {
        let mut urls = if config.dependencies.is_empty() {
            self.resolver.resolve(session).await?
        } else {
            config.dependencies.clone()
        };
        urls.extend(config.config_url.iter().cloned());

        let mut documents = Vec::with_capacity(urls.len());
        for url in &urls {
            info!(url = %url, "loading configuration document");
            documents.push(ConfigDocument::load(self.loader.as_ref(), url).await?);
        }
        Ok(documents)
    }

    async fn apply_and_wait(
        &self,
        config: &SessionConfig,
        session: &Session,
        documents: Vec<ConfigDocument>,
    ) -> Result<bool, Error> {
        let mut resources: Vec<Resource> = documents
            .into_iter()
            .flat_map(|document| document.resources)
            .collect();
        order_for_apply(&mut resources);

        let mut readiness = BTreeSet::new();
        for mut resource in resources {
            resource.tag(session.id());
            self.apply(&resource, session).await?;
            readiness.insert(resource.readiness());
        }

        if readiness.is_empty() {
            warn!("no pods, services or replication controllers defined in the configuration");
            return Ok(true);
        }

        let condition = self.readiness_condition(config, session, readiness);
        let strategy = WaitStrategy::new(config.timeout(), config.poll_interval());
        info!(
            condition = %condition.describe(),
            timeout_secs = config.timeout_secs,
            poll_interval_secs = config.poll_interval_secs,
            "waiting for session resources"
        );

        let outcome = strategy.wait_for(&condition).await;
        let elapsed_ms = outcome.elapsed.as_millis() as u64;
        if outcome.ready {
            info!(elapsed_ms, "all session pods and services are running");
        } else {
            error!(
                elapsed_ms,
                attempts = outcome.attempts,
                last_error = outcome.last_error.as_deref().unwrap_or("none"),
                "timed out waiting for session pods and services"
            );
        }
        Ok(outcome.ready)
    }

    async fn apply(&self, resource: &Resource, session: &Session) -> Result<(), Error> {
        info!(
            kind = %resource.kind(),
            name = resource.name().unwrap_or_default(),
            "applying"
        );
        match resource {
            Resource::Pod(pod) => self.applier.apply_pod(pod, session.id()).await,
            Resource::Service(service) => self.applier.apply_service(service, session.id()).await,
            Resource::ReplicationController(controller) => {
                self.applier
                    .apply_replication_controller(controller, session.id())
                    .await
            }
        }
    }

    fn readiness_condition(
        &self,
        config: &SessionConfig,
        session: &Session,
        readiness: BTreeSet<Readiness>,
    ) -> CompositeCondition {
        CompositeCondition::new(
            readiness
                .into_iter()
                .map(|r| r.condition(self.cluster.clone(), session, config.wait_for_connectivity))
                .collect(),
        )
    }

    /// Clean up after a failed step, keeping the step's error as the result
    async fn cleanup_on_error<T>(
        &self,
        session: &Session,
        result: Result<T, Error>,
    ) -> Result<T, Error> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                error!(error = %e, "session start failed, cleaning up");
                if let Err(cleanup_err) = cleanup_session(self.cluster.as_ref(), session).await {
                    warn!(error = %cleanup_err, "cleanup after failed start was incomplete");
                }
                Err(e)
            }
        }
    }

    fn register_fallback(&self, session: &Session) {
        self.fallbacks.arm(self.cluster.clone(), session);
    }
}

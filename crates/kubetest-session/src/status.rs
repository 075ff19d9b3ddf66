//! Point-in-time view of a session's resources

use futures::try_join;
use k8s_openapi::api::core::v1::{Pod, ReplicationController, Service};
use kubetest_common::Error;
use tracing::{info, warn};

use crate::cluster::SessionCluster;
use crate::readiness::replica_counts;
use crate::session::Session;

/// Status of one pod
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodStatus {
    /// Pod name
    pub name: String,
    /// Lifecycle phase, `Unknown` if not reported yet
    pub phase: String,
    /// Pod IP once assigned
    pub pod_ip: Option<String>,
}

/// Status of one service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceStatus {
    /// Service name
    pub name: String,
    /// Service type (ClusterIP, NodePort, ...)
    pub service_type: String,
    /// Cluster IP, if allocated
    pub cluster_ip: Option<String>,
}

/// Status of one replication controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerStatus {
    /// Controller name
    pub name: String,
    /// Desired replicas
    pub desired: i32,
    /// Ready replicas
    pub ready: i32,
}

/// Everything currently labelled with a session
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStatus {
    /// Session pods
    pub pods: Vec<PodStatus>,
    /// Session services
    pub services: Vec<ServiceStatus>,
    /// Session replication controllers
    pub controllers: Vec<ControllerStatus>,
}

impl SessionStatus {
    /// Whether the session has no resources at all
    pub fn is_empty(&self) -> bool {
        self.pods.is_empty() && self.services.is_empty() && self.controllers.is_empty()
    }
}

/// Query the cluster for the current status of `session`
pub async fn session_status(
    cluster: &dyn SessionCluster,
    session: &Session,
) -> Result<SessionStatus, Error> {
    let selector = session.label_selector();
    let (pods, services, controllers) = try_join!(
        cluster.list_pods(&selector),
        cluster.list_services(&selector),
        cluster.list_replication_controllers(&selector),
    )?;

    Ok(SessionStatus {
        pods: pods.iter().map(pod_status).collect(),
        services: services.iter().map(service_status).collect(),
        controllers: controllers.iter().map(controller_status).collect(),
    })
}

/// Log the current status of `session`.
///
/// Informational only: a failure to query is logged and swallowed.
pub async fn display_session_status(cluster: &dyn SessionCluster, session: &Session) {
    let status = match session_status(cluster, session).await {
        Ok(status) => status,
        Err(e) => {
            warn!(error = %e, "could not query session status");
            return;
        }
    };

    if status.is_empty() {
        info!("session has no resources");
        return;
    }
    for pod in &status.pods {
        info!(
            pod = %pod.name,
            phase = %pod.phase,
            ip = pod.pod_ip.as_deref().unwrap_or("-"),
            "pod status"
        );
    }
    for service in &status.services {
        info!(
            service = %service.name,
            service_type = %service.service_type,
            cluster_ip = service.cluster_ip.as_deref().unwrap_or("-"),
            "service status"
        );
    }
    for controller in &status.controllers {
        info!(
            controller = %controller.name,
            desired = controller.desired,
            ready = controller.ready,
            "replication controller status"
        );
    }
}

fn pod_status(pod: &Pod) -> PodStatus {
    let status = pod.status.as_ref();
    PodStatus {
        name: pod.metadata.name.clone().unwrap_or_default(),
        phase: status
            .and_then(|s| s.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        pod_ip: status.and_then(|s| s.pod_ip.clone()),
    }
}

fn service_status(service: &Service) -> ServiceStatus {
    let spec = service.spec.as_ref();
    ServiceStatus {
        name: service.metadata.name.clone().unwrap_or_default(),
        service_type: spec
            .and_then(|s| s.type_.clone())
            .unwrap_or_else(|| "ClusterIP".to_string()),
        cluster_ip: spec.and_then(|s| s.cluster_ip.clone()),
    }
}

fn controller_status(controller: &ReplicationController) -> ControllerStatus {
    let (desired, ready) = replica_counts(controller);
    ControllerStatus {
        name: controller.metadata.name.clone().unwrap_or_default(),
        desired,
        ready,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockSessionCluster;
    use k8s_openapi::api::core::v1::{PodStatus as CorePodStatus, ServiceSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn session() -> Session {
        Session::with_id("sess-1").unwrap()
    }

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_collects_all_three_kinds() {
        let mut mock = MockSessionCluster::new();
        mock.expect_list_pods().returning(|_| {
            Ok(vec![Pod {
                metadata: meta("web-0"),
                status: Some(CorePodStatus {
                    phase: Some("Running".to_string()),
                    pod_ip: Some("10.1.0.4".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }])
        });
        mock.expect_list_services().returning(|_| {
            Ok(vec![Service {
                metadata: meta("web"),
                spec: Some(ServiceSpec {
                    type_: Some("NodePort".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }])
        });
        mock.expect_list_replication_controllers()
            .returning(|_| Ok(vec![]));

        let status = session_status(&mock, &session()).await.unwrap();

        assert_eq!(
            status.pods,
            vec![PodStatus {
                name: "web-0".to_string(),
                phase: "Running".to_string(),
                pod_ip: Some("10.1.0.4".to_string()),
            }]
        );
        assert_eq!(status.services[0].service_type, "NodePort");
        assert!(status.controllers.is_empty());
        assert!(!status.is_empty());
    }

    #[tokio::test]
    async fn test_unreported_fields_get_placeholders() {
        let mut mock = MockSessionCluster::new();
        mock.expect_list_pods().returning(|_| {
            Ok(vec![Pod {
                metadata: meta("fresh"),
                ..Default::default()
            }])
        });
        mock.expect_list_services().returning(|_| {
            Ok(vec![Service {
                metadata: meta("plain"),
                ..Default::default()
            }])
        });
        mock.expect_list_replication_controllers()
            .returning(|_| Ok(vec![]));

        let status = session_status(&mock, &session()).await.unwrap();
        assert_eq!(status.pods[0].phase, "Unknown");
        assert_eq!(status.services[0].service_type, "ClusterIP");
    }

    /// Status display never fails the caller, even when the cluster is unreachable.
    #[tokio::test]
    async fn test_display_swallows_query_errors() {
        let mut mock = MockSessionCluster::new();
        mock.expect_list_pods()
            .returning(|_| Err(Error::internal("connection refused")));
        mock.expect_list_services().returning(|_| Ok(vec![]));
        mock.expect_list_replication_controllers()
            .returning(|_| Ok(vec![]));

        display_session_status(&mock, &session()).await;
    }
}

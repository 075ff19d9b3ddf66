//! Session cleanup
//!
//! Deletes everything carrying the session label. Controllers go first so
//! they cannot recreate pods while those are being deleted, services last.
//! Cleanup is idempotent and never stops at the first failure.

use kubetest_common::Error;
use tracing::{debug, info, warn};

use crate::cluster::SessionCluster;
use crate::resource::{ResourceKind, ResourceRef};
use crate::session::Session;

/// Deletion order
const CLEANUP_ORDER: [ResourceKind; 3] = [
    ResourceKind::ReplicationController,
    ResourceKind::Pod,
    ResourceKind::Service,
];

/// What a successful cleanup did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Resources deleted by this call
    pub deleted: Vec<ResourceRef>,
    /// Resources listed but already gone when deleted
    pub already_absent: Vec<ResourceRef>,
}

impl CleanupReport {
    /// Whether nothing was left to delete
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.already_absent.is_empty()
    }
}

/// Delete every resource labelled with `session`.
///
/// Returns [`Error::Cleanup`] listing every failed list or delete when any
/// step failed; the remaining steps are still attempted.
pub async fn cleanup_session(
    cluster: &dyn SessionCluster,
    session: &Session,
) -> Result<CleanupReport, Error> {
    let selector = session.label_selector();
    let mut report = CleanupReport::default();
    let mut failures = Vec::new();

    for kind in CLEANUP_ORDER {
        let names = match list_names(cluster, kind, &selector).await {
            Ok(names) => names,
            Err(e) => {
                warn!(kind = %kind, error = %e, "failed to list session resources");
                failures.push(format!("list {}: {}", kind, e));
                continue;
            }
        };

        for name in names {
            let target = ResourceRef::new(kind, name);
            match cluster.delete(&target).await {
                Ok(true) => {
                    debug!(resource = %target, "deleted");
                    report.deleted.push(target);
                }
                Ok(false) => {
                    debug!(resource = %target, "already absent");
                    report.already_absent.push(target);
                }
                Err(e) => {
                    warn!(resource = %target, error = %e, "failed to delete");
                    failures.push(format!("{}: {}", target, e));
                }
            }
        }
    }

    if !failures.is_empty() {
        return Err(Error::cleanup(session.id(), failures));
    }

    info!(
        deleted = report.deleted.len(),
        already_absent = report.already_absent.len(),
        "session cleaned up"
    );
    Ok(report)
}

async fn list_names(
    cluster: &dyn SessionCluster,
    kind: ResourceKind,
    selector: &str,
) -> Result<Vec<String>, Error> {
    let names = match kind {
        ResourceKind::Pod => cluster
            .list_pods(selector)
            .await?
            .into_iter()
            .filter_map(|p| p.metadata.name)
            .collect(),
        ResourceKind::Service => cluster
            .list_services(selector)
            .await?
            .into_iter()
            .filter_map(|s| s.metadata.name)
            .collect(),
        ResourceKind::ReplicationController => cluster
            .list_replication_controllers(selector)
            .await?
            .into_iter()
            .filter_map(|rc| rc.metadata.name)
            .collect(),
    };
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockSessionCluster;
    use k8s_openapi::api::core::v1::{Pod, ReplicationController, Service};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::sync::{Arc, Mutex};

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn session() -> Session {
        Session::with_id("sess-1").unwrap()
    }

    /// Records delete calls in order
    #[derive(Clone, Default)]
    struct DeleteCapture {
        calls: Arc<Mutex<Vec<ResourceRef>>>,
    }

    impl DeleteCapture {
        fn record(&self, target: &ResourceRef) {
            self.calls.lock().unwrap().push(target.clone());
        }

        fn calls(&self) -> Vec<ResourceRef> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn populated_cluster(capture: DeleteCapture) -> MockSessionCluster {
        let mut mock = MockSessionCluster::new();
        mock.expect_list_replication_controllers().returning(|_| {
            Ok(vec![ReplicationController {
                metadata: meta("web"),
                ..Default::default()
            }])
        });
        mock.expect_list_pods().returning(|_| {
            Ok(vec![
                Pod {
                    metadata: meta("web-abc"),
                    ..Default::default()
                },
                Pod {
                    metadata: meta("db-0"),
                    ..Default::default()
                },
            ])
        });
        mock.expect_list_services().returning(|_| {
            Ok(vec![Service {
                metadata: meta("web"),
                ..Default::default()
            }])
        });
        mock.expect_delete().returning(move |target| {
            capture.record(target);
            Ok(true)
        });
        mock
    }

    /// Controllers are deleted before the pods they own, services last.
    #[tokio::test]
    async fn test_deletes_in_dependency_order() {
        let capture = DeleteCapture::default();
        let cluster = populated_cluster(capture.clone());

        let report = cleanup_session(&cluster, &session()).await.unwrap();

        let expected = vec![
            ResourceRef::new(ResourceKind::ReplicationController, "web"),
            ResourceRef::new(ResourceKind::Pod, "web-abc"),
            ResourceRef::new(ResourceKind::Pod, "db-0"),
            ResourceRef::new(ResourceKind::Service, "web"),
        ];
        assert_eq!(capture.calls(), expected);
        assert_eq!(report.deleted, expected);
        assert!(report.already_absent.is_empty());
    }

    /// Cleaning up an empty or already cleaned session is a no-op, not an error.
    #[tokio::test]
    async fn test_second_cleanup_is_a_noop() {
        let mut mock = MockSessionCluster::new();
        mock.expect_list_replication_controllers()
            .returning(|_| Ok(vec![]));
        mock.expect_list_pods().returning(|_| Ok(vec![]));
        mock.expect_list_services().returning(|_| Ok(vec![]));
        mock.expect_delete().never();

        let report = cleanup_session(&mock, &session()).await.unwrap();
        assert!(report.is_empty());
    }

    /// A resource that disappears between list and delete is not a failure.
    #[tokio::test]
    async fn test_already_deleted_is_reported_not_failed() {
        let mut mock = MockSessionCluster::new();
        mock.expect_list_replication_controllers()
            .returning(|_| Ok(vec![]));
        mock.expect_list_pods().returning(|_| {
            Ok(vec![Pod {
                metadata: meta("web-abc"),
                ..Default::default()
            }])
        });
        mock.expect_list_services().returning(|_| Ok(vec![]));
        mock.expect_delete().returning(|_| Ok(false));

        let report = cleanup_session(&mock, &session()).await.unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(
            report.already_absent,
            vec![ResourceRef::new(ResourceKind::Pod, "web-abc")]
        );
    }

    /// One failing delete does not stop the others, and all failures surface.
    #[tokio::test]
    async fn test_failures_are_aggregated() {
        let capture = DeleteCapture::default();
        let recorder = capture.clone();
        let mut mock = MockSessionCluster::new();
        mock.expect_list_replication_controllers()
            .returning(|_| Err(Error::internal("rc list timed out")));
        mock.expect_list_pods().returning(|_| {
            Ok(vec![
                Pod {
                    metadata: meta("web-abc"),
                    ..Default::default()
                },
                Pod {
                    metadata: meta("db-0"),
                    ..Default::default()
                },
            ])
        });
        mock.expect_list_services().returning(|_| {
            Ok(vec![Service {
                metadata: meta("web"),
                ..Default::default()
            }])
        });
        mock.expect_delete().returning(move |target| {
            recorder.record(target);
            if target.name == "web-abc" {
                Err(Error::internal("forbidden"))
            } else {
                Ok(true)
            }
        });

        let err = cleanup_session(&mock, &session()).await.unwrap_err();

        assert_eq!(capture.calls().len(), 3);
        match err {
            Error::Cleanup { session, failures } => {
                assert_eq!(session, "sess-1");
                assert_eq!(failures.len(), 2);
                assert!(failures[0].contains("list ReplicationController"));
                assert!(failures[1].contains("Pod web-abc"));
            }
            other => panic!("expected cleanup error, got {other:?}"),
        }
    }
}

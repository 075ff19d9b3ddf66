//! Process-exit fallback cleanup
//!
//! When a session has started but the owner never calls `stop` (the test
//! runner is interrupted, for example), the session's resources would leak.
//! A [`FallbackRegistry`] holds every armed session and owns the single
//! termination listener for them. On SIGINT or SIGTERM it cleans up all armed
//! sessions concurrently and exits only once every cleanup has finished. With
//! no session armed it exits straight away with the signal's conventional
//! status, so deregistering the last session leaves termination working.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use dashmap::DashMap;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::cleanup::cleanup_session;
use crate::cluster::SessionCluster;
use crate::session::Session;

/// Exit status conventionally used after SIGINT
const EXIT_CODE_SIGINT: i32 = 130;

/// Exit status conventionally used after SIGTERM
const EXIT_CODE_SIGTERM: i32 = 143;

static GLOBAL: OnceLock<Arc<FallbackRegistry>> = OnceLock::new();

struct ArmedSession {
    cluster: Arc<dyn SessionCluster>,
    session: Session,
}

/// State shared between the registry and its listener task
struct FallbackState {
    armed: DashMap<String, ArmedSession>,
    fired: AtomicBool,
    done: CancellationToken,
}

impl FallbackState {
    /// Clean up every armed session, then hand back the exit status.
    async fn fire(&self, exit_code: Option<i32>) -> Option<i32> {
        self.fired.store(true, Ordering::SeqCst);

        let ids: Vec<String> = self.armed.iter().map(|entry| entry.key().clone()).collect();
        let sessions: Vec<ArmedSession> = ids
            .iter()
            .filter_map(|id| self.armed.remove(id).map(|(_, armed)| armed))
            .collect();

        if sessions.is_empty() {
            info!("termination requested with no session armed");
        } else {
            warn!(
                sessions = sessions.len(),
                "sessions still active at process exit, running fallback cleanup"
            );
            join_all(sessions.into_iter().map(|armed| {
                let span = armed.session.span();
                async move {
                    match cleanup_session(armed.cluster.as_ref(), &armed.session).await {
                        Ok(report) => info!(
                            deleted = report.deleted.len(),
                            "fallback cleanup finished"
                        ),
                        Err(e) => error!(error = %e, "fallback cleanup incomplete"),
                    }
                }
                .instrument(span)
            }))
            .await;
        }

        self.done.cancel();
        exit_code
    }
}

/// Sessions to clean up if the process is told to terminate.
///
/// The listener is spawned on the first [`arm`](Self::arm), which must run
/// inside a tokio runtime. Before that no signal handler is installed.
pub struct FallbackRegistry {
    state: Arc<FallbackState>,
    trigger: Mutex<Option<BoxFuture<'static, Option<i32>>>>,
    listening: AtomicBool,
}

impl FallbackRegistry {
    /// Process-wide registry listening for SIGINT and SIGTERM.
    ///
    /// Every orchestrator shares it, so one signal runs every session's
    /// cleanup before the process exits.
    pub fn global() -> Arc<Self> {
        GLOBAL
            .get_or_init(|| Arc::new(Self::with_trigger(async { Some(shutdown_signal().await) })))
            .clone()
    }

    /// Registry that fires when `trigger` resolves.
    ///
    /// If the trigger yields an exit code the process exits with it once
    /// every armed session is cleaned up; `None` leaves the process running.
    pub fn with_trigger<F>(trigger: F) -> Self
    where
        F: Future<Output = Option<i32>> + Send + 'static,
    {
        Self {
            state: Arc::new(FallbackState {
                armed: DashMap::new(),
                fired: AtomicBool::new(false),
                done: CancellationToken::new(),
            }),
            trigger: Mutex::new(Some(trigger.boxed())),
            listening: AtomicBool::new(false),
        }
    }

    /// Arm the fallback for `session`.
    ///
    /// A session already armed keeps its first registration. Returns `false`
    /// when the fallback has already fired and nothing was armed.
    pub fn arm(&self, cluster: Arc<dyn SessionCluster>, session: &Session) -> bool {
        if self.has_fired() {
            warn!(session = %session, "termination in progress, fallback cleanup not armed");
            return false;
        }

        self.state
            .armed
            .entry(session.id().to_string())
            .or_insert_with(|| ArmedSession {
                cluster,
                session: session.clone(),
            });
        debug!(session = %session, "fallback cleanup armed");

        self.ensure_listening();
        true
    }

    /// Deregister the fallback for `session_id`; `true` if one was armed
    pub fn disarm(&self, session_id: &str) -> bool {
        let removed = self.state.armed.remove(session_id).is_some();
        if removed {
            debug!(session = %session_id, "fallback cleanup disarmed");
        }
        removed
    }

    /// Whether a fallback is armed for `session_id`
    pub fn is_armed(&self, session_id: &str) -> bool {
        self.state.armed.contains_key(session_id)
    }

    /// Number of armed sessions
    pub fn len(&self) -> usize {
        self.state.armed.len()
    }

    /// Whether no session is armed
    pub fn is_empty(&self) -> bool {
        self.state.armed.is_empty()
    }

    /// Whether the trigger has resolved
    pub fn has_fired(&self) -> bool {
        self.state.fired.load(Ordering::SeqCst)
    }

    /// Wait until a fired fallback has finished every cleanup
    pub async fn finished(&self) {
        self.state.done.cancelled().await
    }

    fn ensure_listening(&self) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }
        let trigger = self
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(trigger) = trigger else {
            return;
        };

        let state = self.state.clone();
        tokio::spawn(async move {
            let exit_code = trigger.await;
            if let Some(code) = state.fire(exit_code).await {
                std::process::exit(code);
            }
        });
    }
}

/// Resolve on SIGINT or SIGTERM with the conventional exit status.
///
/// A signal that cannot be hooked is logged and never resolves.
pub async fn shutdown_signal() -> i32 {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => EXIT_CODE_SIGINT,
            Err(e) => {
                error!(error = %e, "failed to register ctrl-c handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let term = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                EXIT_CODE_SIGTERM
            }
            Err(e) => {
                error!(error = %e, "failed to register SIGTERM handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<i32>();

    tokio::select! {
        code = ctrl_c => code,
        code = term => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockSessionCluster;
    use crate::resource::ResourceRef;
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::{Endpoints, Pod, ReplicationController, Service};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kubetest_common::Error;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn session(id: &str) -> Session {
        Session::with_id(id).unwrap()
    }

    fn pod(name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Registry whose trigger fires (without exiting) when the sender is used
    fn registry() -> (FallbackRegistry, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel::<()>();
        let registry = FallbackRegistry::with_trigger(async move {
            let _ = rx.await;
            None
        });
        (registry, tx)
    }

    /// Cluster holding one pod; records every delete
    fn cluster(pod_name: &'static str, deletes: Arc<Mutex<Vec<String>>>) -> Arc<dyn SessionCluster> {
        let mut mock = MockSessionCluster::new();
        mock.expect_list_replication_controllers()
            .returning(|_| Ok(vec![]));
        mock.expect_list_pods()
            .returning(move |_| Ok(vec![pod(pod_name)]));
        mock.expect_list_services().returning(|_| Ok(vec![]));
        mock.expect_delete().returning(move |target| {
            deletes.lock().unwrap().push(target.to_string());
            Ok(true)
        });
        Arc::new(mock)
    }

    /// Cluster holding one pod whose delete takes `delay`
    struct SlowCluster {
        pod: &'static str,
        delay: Duration,
        deletes: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl SessionCluster for SlowCluster {
        async fn list_pods(&self, _selector: &str) -> Result<Vec<Pod>, Error> {
            Ok(vec![pod(self.pod)])
        }

        async fn list_services(&self, _selector: &str) -> Result<Vec<Service>, Error> {
            Ok(vec![])
        }

        async fn list_replication_controllers(
            &self,
            _selector: &str,
        ) -> Result<Vec<ReplicationController>, Error> {
            Ok(vec![])
        }

        async fn get_endpoints(&self, _service: &str) -> Result<Option<Endpoints>, Error> {
            Ok(None)
        }

        async fn delete(&self, target: &ResourceRef) -> Result<bool, Error> {
            tokio::time::sleep(self.delay).await;
            self.deletes.lock().unwrap().push(target.to_string());
            Ok(true)
        }
    }

    mod firing {
        use super::*;

        #[tokio::test]
        async fn test_trigger_runs_cleanup() {
            let deletes = Arc::new(Mutex::new(Vec::new()));
            let (registry, tx) = registry();

            assert!(registry.arm(cluster("web-0", deletes.clone()), &session("sess-1")));
            assert!(registry.is_armed("sess-1"));
            assert!(!registry.has_fired());

            tx.send(()).unwrap();
            registry.finished().await;

            assert_eq!(*deletes.lock().unwrap(), vec!["Pod web-0".to_string()]);
            assert!(registry.is_empty());
        }

        /// One termination cleans up every armed session, and the exit
        /// status is only handed back once the slowest cleanup is done.
        #[tokio::test(start_paused = true)]
        async fn test_every_armed_session_is_cleaned_before_exit() {
            let deletes = Arc::new(Mutex::new(Vec::new()));
            let (registry, _tx) = registry();
            registry.arm(
                Arc::new(SlowCluster {
                    pod: "fast-0",
                    delay: Duration::from_millis(10),
                    deletes: deletes.clone(),
                }),
                &session("sess-a"),
            );
            registry.arm(
                Arc::new(SlowCluster {
                    pod: "slow-0",
                    delay: Duration::from_millis(500),
                    deletes: deletes.clone(),
                }),
                &session("sess-b"),
            );

            let exit_code = registry.state.fire(Some(42)).await;

            assert_eq!(exit_code, Some(42));
            let mut deleted = deletes.lock().unwrap().clone();
            deleted.sort();
            assert_eq!(
                deleted,
                vec!["Pod fast-0".to_string(), "Pod slow-0".to_string()]
            );
        }

        /// Sessions armed through one shared trigger are all cleaned up.
        #[tokio::test]
        async fn test_shared_trigger_cleans_all_sessions() {
            let first = Arc::new(Mutex::new(Vec::new()));
            let second = Arc::new(Mutex::new(Vec::new()));
            let (registry, tx) = registry();
            registry.arm(cluster("web-0", first.clone()), &session("sess-a"));
            registry.arm(cluster("db-0", second.clone()), &session("sess-b"));
            assert_eq!(registry.len(), 2);

            tx.send(()).unwrap();
            registry.finished().await;

            assert_eq!(*first.lock().unwrap(), vec!["Pod web-0".to_string()]);
            assert_eq!(*second.lock().unwrap(), vec!["Pod db-0".to_string()]);
        }

        #[tokio::test]
        async fn test_arming_after_firing_is_refused() {
            let deletes = Arc::new(Mutex::new(Vec::new()));
            let (registry, tx) = registry();
            registry.arm(cluster("web-0", deletes.clone()), &session("sess-1"));
            tx.send(()).unwrap();
            registry.finished().await;

            assert!(!registry.arm(cluster("web-1", deletes), &session("sess-2")));
            assert!(!registry.is_armed("sess-2"));
        }
    }

    mod disarming {
        use super::*;

        #[tokio::test]
        async fn test_disarmed_session_is_not_cleaned_up() {
            let deletes = Arc::new(Mutex::new(Vec::new()));
            let (registry, tx) = registry();
            registry.arm(cluster("web-0", deletes.clone()), &session("sess-1"));

            assert!(registry.disarm("sess-1"));
            assert!(!registry.disarm("sess-1"));

            tx.send(()).unwrap();
            registry.finished().await;
            assert!(deletes.lock().unwrap().is_empty());
        }

        /// Once nothing is armed, a termination still exits with the
        /// signal's status instead of being swallowed.
        #[tokio::test]
        async fn test_termination_with_nothing_armed_still_exits() {
            let deletes = Arc::new(Mutex::new(Vec::new()));
            let (registry, _tx) = registry();
            registry.arm(cluster("web-0", deletes.clone()), &session("sess-1"));
            registry.disarm("sess-1");

            let exit_code = registry.state.fire(Some(EXIT_CODE_SIGINT)).await;

            assert_eq!(exit_code, Some(EXIT_CODE_SIGINT));
            assert!(deletes.lock().unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_rearming_keeps_first_registration() {
            let first = Arc::new(Mutex::new(Vec::new()));
            let second = Arc::new(Mutex::new(Vec::new()));
            let (registry, tx) = registry();
            registry.arm(cluster("web-0", first.clone()), &session("sess-1"));
            registry.arm(cluster("web-1", second.clone()), &session("sess-1"));
            assert_eq!(registry.len(), 1);

            tx.send(()).unwrap();
            registry.finished().await;

            assert_eq!(first.lock().unwrap().len(), 1);
            assert!(second.lock().unwrap().is_empty());
        }
    }
}

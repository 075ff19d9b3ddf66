//! Run command - wrap a test command in a session
//!
//! Usage: kubetest run [session flags] -- <command> [args...]
//!
//! 1. Provision the configured resources under a new session id
//! 2. Wait for them to become ready
//! 3. Run the command with KUBETEST_SESSION_ID and KUBETEST_NAMESPACE set
//! 4. Delete the session's resources, whatever the outcome

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use kubetest_session::{
    DependencyResolver, ManifestDirResolver, NoDependencies, Session, SessionConfig,
    SessionOrchestrator, UrlLoader,
};
use tracing::{info, warn};

use super::connect;
use crate::config::SessionArgs;
use crate::{Error, Result};

/// Environment variable carrying the session id to the test command
pub const SESSION_ID_ENV: &str = "KUBETEST_SESSION_ID";

/// Environment variable carrying the session namespace to the test command
pub const NAMESPACE_ENV: &str = "KUBETEST_NAMESPACE";

/// Start a session and run a command against it
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Session id to use instead of a generated one
    #[arg(long)]
    pub session_id: Option<String>,

    /// Path to kubeconfig (defaults to KUBECONFIG / ~/.kube/config)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Command to run once the session is ready
    #[arg(last = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let config = args.session.resolve()?;
    let session = match &args.session_id {
        Some(id) => Session::with_id(id.clone())?,
        None => Session::new(),
    };

    let client = connect(args.kubeconfig.as_deref(), &config.namespace).await?;
    let resolver: Arc<dyn DependencyResolver> = match &args.session.manifest_dir {
        Some(dir) => Arc::new(ManifestDirResolver::new(dir.clone())),
        None => Arc::new(NoDependencies),
    };
    let orchestrator =
        SessionOrchestrator::from_client(client, Arc::new(UrlLoader::new()?), resolver);

    info!(session = %session, namespace = %config.namespace, "starting test session");
    let ready = orchestrator.start(&config, &session).await?;

    let outcome = if ready {
        run_command(&args.command, &session, &config).await
    } else {
        Err(Error::NotReady {
            session: session.id().to_string(),
        })
    };

    let stopped = orchestrator.stop(&session).await.map(|report| {
        info!(
            deleted = report.deleted.len(),
            "test session stopped"
        );
    });
    finish(outcome, stopped.map_err(Error::from))
}

/// Run `command` with the session exported in its environment
pub async fn run_command(
    command: &[String],
    session: &Session,
    config: &SessionConfig,
) -> Result<()> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| Error::validation("no command given"))?;

    info!(command = %command.join(" "), "running test command");
    let status = tokio::process::Command::new(program)
        .args(args)
        .env(SESSION_ID_ENV, session.id())
        .env(NAMESPACE_ENV, &config.namespace)
        .status()
        .await
        .map_err(|e| Error::command_failed(format!("failed to start {}: {}", program, e)))?;

    if !status.success() {
        return Err(Error::command_failed(format!(
            "`{}` exited with {}",
            command.join(" "),
            status
        )));
    }
    Ok(())
}

/// Combine the command outcome with the session stop.
///
/// The command's error wins over a failed stop, which is then only logged.
fn finish(outcome: Result<()>, stopped: Result<()>) -> Result<()> {
    match (outcome, stopped) {
        (Err(e), Err(stop_err)) => {
            warn!(error = %stop_err, "session cleanup incomplete");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), stopped) => stopped,
    }
}

//! Cleanup command - delete everything a session left behind
//!
//! Usage: kubetest cleanup --session-id <id> [--namespace <ns>]

use clap::Args;
use kubetest_session::{cleanup_session, CleanupReport};

use super::TargetArgs;
use crate::Result;

/// Delete every resource labelled with a session
#[derive(Args, Debug)]
pub struct CleanupArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

pub async fn run(args: CleanupArgs) -> Result<()> {
    let session = args.target.session()?;
    let client = args.target.client().await?;

    let report = cleanup_session(&client, &session).await?;
    println!("{}", summarize(&session.to_string(), &report));
    Ok(())
}

fn summarize(session: &str, report: &CleanupReport) -> String {
    if report.is_empty() {
        return format!("Session {} has no resources.", session);
    }
    let mut lines = vec![format!(
        "Session {}: deleted {}, already gone {}.",
        session,
        report.deleted.len(),
        report.already_absent.len()
    )];
    lines.extend(report.deleted.iter().map(|r| format!("  deleted {}", r)));
    lines.join("\n")
}

//! CLI commands

use std::path::{Path, PathBuf};

use clap::Args;
use kubetest_common::kube_utils;
use kubetest_common::DEFAULT_NAMESPACE;
use kubetest_session::{KubeSessionClient, Session};

use crate::Result;

pub mod cleanup;
pub mod run;
pub mod status;

/// Identifies an existing session
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Session id (exported to commands started by `kubetest run`)
    #[arg(long, env = "KUBETEST_SESSION_ID")]
    pub session_id: String,

    /// Namespace the session was provisioned in
    #[arg(short = 'n', long, env = "KUBETEST_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Path to kubeconfig (defaults to KUBECONFIG / ~/.kube/config)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,
}

impl TargetArgs {
    /// The targeted session
    pub fn session(&self) -> Result<Session> {
        Ok(Session::with_id(self.session_id.clone())?)
    }

    /// Cluster client scoped to the session namespace
    pub async fn client(&self) -> Result<KubeSessionClient> {
        connect(self.kubeconfig.as_deref(), &self.namespace).await
    }
}

/// Create a session client for `namespace`
pub async fn connect(kubeconfig: Option<&Path>, namespace: &str) -> Result<KubeSessionClient> {
    let client = kube_utils::create_client(kubeconfig).await?;
    Ok(KubeSessionClient::new(client, namespace))
}

/// Render rows as left-aligned columns separated by two spaces
pub fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.len());
            }
        }
    }

    let render = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:<width$}", cell, width = w)
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![render(headers.to_vec())];
    for row in rows {
        lines.push(render(row.iter().map(String::as_str).collect()));
    }
    lines.join("\n")
}

//! Status command - show what a session currently has in the cluster
//!
//! Usage: kubetest status --session-id <id> [--namespace <ns>] [--output json]

use clap::{Args, ValueEnum};
use kubetest_session::{session_status, SessionStatus};

use super::{format_table, TargetArgs};
use crate::{Error, Result};

/// Output format
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Show the resources of a session
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

pub async fn run(args: StatusArgs) -> Result<()> {
    let session = args.target.session()?;
    let client = args.target.client().await?;

    let status = session_status(&client, &session).await?;
    if status.is_empty() {
        println!("Session {} has no resources.", session);
        return Ok(());
    }

    match args.output {
        OutputFormat::Table => println!("{}", render_table(&status)),
        OutputFormat::Json => println!("{}", render_json(&status)?),
    }
    Ok(())
}

fn render_table(status: &SessionStatus) -> String {
    let mut rows = Vec::new();
    for controller in &status.controllers {
        rows.push(vec![
            "ReplicationController".to_string(),
            controller.name.clone(),
            format!("{}/{} ready", controller.ready, controller.desired),
            "-".to_string(),
        ]);
    }
    for pod in &status.pods {
        rows.push(vec![
            "Pod".to_string(),
            pod.name.clone(),
            pod.phase.clone(),
            pod.pod_ip.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    for service in &status.services {
        rows.push(vec![
            "Service".to_string(),
            service.name.clone(),
            service.service_type.clone(),
            service.cluster_ip.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    format_table(&["KIND", "NAME", "STATE", "IP"], &rows)
}

fn render_json(status: &SessionStatus) -> Result<String> {
    serde_json::to_string_pretty(&to_json(status)).map_err(serialization_error)
}

fn serialization_error(e: serde_json::Error) -> Error {
    kubetest_common::Error::serialization(format!("session status: {}", e)).into()
}

fn to_json(status: &SessionStatus) -> serde_json::Value {
    serde_json::json!({
        "replicationControllers": status.controllers.iter().map(|c| serde_json::json!({
            "name": c.name,
            "desired": c.desired,
            "ready": c.ready,
        })).collect::<Vec<_>>(),
        "pods": status.pods.iter().map(|p| serde_json::json!({
            "name": p.name,
            "phase": p.phase,
            "podIP": p.pod_ip,
        })).collect::<Vec<_>>(),
        "services": status.services.iter().map(|s| serde_json::json!({
            "name": s.name,
            "type": s.service_type,
            "clusterIP": s.cluster_ip,
        })).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubetest_session::status::{ControllerStatus, PodStatus, ServiceStatus};

    fn status() -> SessionStatus {
        SessionStatus {
            pods: vec![PodStatus {
                name: "web-abc".to_string(),
                phase: "Running".to_string(),
                pod_ip: Some("10.1.0.4".to_string()),
            }],
            services: vec![ServiceStatus {
                name: "web".to_string(),
                service_type: "ClusterIP".to_string(),
                cluster_ip: None,
            }],
            controllers: vec![ControllerStatus {
                name: "web".to_string(),
                desired: 2,
                ready: 1,
            }],
        }
    }

    #[test]
    fn test_table_lists_controllers_pods_then_services() {
        let table = render_table(&status());
        let kinds: Vec<&str> = table
            .lines()
            .skip(1)
            .filter_map(|l| l.split_whitespace().next())
            .collect();
        assert_eq!(kinds, vec!["ReplicationController", "Pod", "Service"]);
        assert!(table.contains("1/2 ready"));
    }

    #[test]
    fn test_json_shape() {
        let json = to_json(&status());
        assert_eq!(json["pods"][0]["podIP"], "10.1.0.4");
        assert_eq!(json["services"][0]["clusterIP"], serde_json::Value::Null);
        assert_eq!(json["replicationControllers"][0]["desired"], 2);
    }

    #[test]
    fn test_rendered_json_parses_back() {
        let rendered = render_json(&status()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed, to_json(&status()));
    }

    #[test]
    fn test_json_failure_is_a_serialization_error() {
        let cause = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = serialization_error(cause);
        assert!(matches!(
            err,
            Error::Session(kubetest_common::Error::Serialization { .. })
        ));
        assert!(err.to_string().starts_with("serialization error: session status"));
    }
}

//! Session configuration for CLI commands.
//!
//! Settings are layered, later layers winning:
//! 1. Built-in defaults
//! 2. `--config <file>` (YAML or JSON, camelCase keys)
//! 3. Command-line flags and their `KUBETEST_*` environment variables

use std::path::{Path, PathBuf};

use clap::Args;
use kubetest_common::yaml::parse_yaml_multi;
use kubetest_session::SessionConfig;

use crate::{Error, Result};

/// Flags shared by commands that start a session
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Session settings file (YAML or JSON)
    #[arg(long = "config", env = "KUBETEST_CONFIG")]
    pub config_file: Option<PathBuf>,

    /// Configuration document to apply (path, file:// or http(s):// URL)
    #[arg(long, env = "KUBETEST_CONFIG_URL")]
    pub config_url: Option<String>,

    /// Dependency document applied before the configuration (repeatable)
    #[arg(long = "dependency", env = "KUBETEST_DEPENDENCIES", value_delimiter = ',')]
    pub dependencies: Vec<String>,

    /// Directory of dependency manifests, used when no --dependency is given
    #[arg(long, env = "KUBETEST_MANIFEST_DIR")]
    pub manifest_dir: Option<PathBuf>,

    /// Seconds to wait for the session to become ready
    #[arg(long, env = "KUBETEST_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Seconds between readiness checks
    #[arg(long, env = "KUBETEST_POLL_INTERVAL_SECS")]
    pub poll_interval_secs: Option<u64>,

    /// Require a ready endpoint behind every service
    #[arg(long, env = "KUBETEST_WAIT_FOR_CONNECTIVITY", value_name = "BOOL")]
    pub wait_for_connectivity: Option<bool>,

    /// Namespace to provision the session in
    #[arg(short = 'n', long, env = "KUBETEST_NAMESPACE")]
    pub namespace: Option<String>,

    /// Do not clean up on SIGINT/SIGTERM
    #[arg(long)]
    pub no_fallback: bool,
}

impl SessionArgs {
    /// Build the effective session configuration
    pub fn resolve(&self) -> Result<SessionConfig> {
        let mut config = match &self.config_file {
            Some(path) => load_config_file(path)?,
            None => SessionConfig::default(),
        };

        if let Some(url) = &self.config_url {
            config.config_url = Some(url.clone());
        }
        if !self.dependencies.is_empty() {
            config.dependencies = self.dependencies.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout_secs = secs;
        }
        if let Some(secs) = self.poll_interval_secs {
            config.poll_interval_secs = secs;
        }
        if let Some(wait) = self.wait_for_connectivity {
            config.wait_for_connectivity = wait;
        }
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        if self.no_fallback {
            config.register_fallback = false;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Load a session settings file; an empty file yields the defaults
pub fn load_config_file(path: &Path) -> Result<SessionConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::config(path, format!("failed to read: {}", e)))?;

    let value = if text.trim_start().starts_with('{') {
        serde_json::from_str(&text).map_err(|e| Error::config(path, e.to_string()))?
    } else {
        let mut docs = parse_yaml_multi(&text).map_err(|e| Error::config(path, e.to_string()))?;
        if docs.len() > 1 {
            return Err(Error::config(path, "expected a single YAML document"));
        }
        match docs.pop() {
            Some(serde_json::Value::Null) | None => return Ok(SessionConfig::default()),
            Some(value) => value,
        }
    };

    serde_json::from_value(value).map_err(|e| Error::config(path, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        file.write_all(contents.as_bytes()).expect("write temp file");
        file
    }

    #[test]
    fn test_defaults_without_file_or_flags() {
        let config = SessionArgs::default().resolve().unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_file_then_flags() {
        let file = write_temp(
            "configUrl: file:///work/app.yaml\ntimeoutSecs: 120\nnamespace: ci\ndependencies:\n  - file:///work/db.yaml\n",
        );
        let args = SessionArgs {
            config_file: Some(file.path().to_path_buf()),
            timeout_secs: Some(30),
            wait_for_connectivity: Some(false),
            no_fallback: true,
            ..Default::default()
        };

        let config = args.resolve().unwrap();

        assert_eq!(config.config_url.as_deref(), Some("file:///work/app.yaml"));
        assert_eq!(config.dependencies, vec!["file:///work/db.yaml".to_string()]);
        assert_eq!(config.namespace, "ci");
        assert_eq!(config.timeout_secs, 30);
        assert!(!config.wait_for_connectivity);
        assert!(!config.register_fallback);
    }

    #[test]
    fn test_json_file() {
        let file = write_temp(r#"{"pollIntervalSecs": 2, "waitForConnectivity": false}"#);
        let config = load_config_file(file.path()).unwrap();
        assert_eq!(config.poll_interval_secs, 2);
        assert!(!config.wait_for_connectivity);
    }

    #[test]
    fn test_empty_file_is_defaults() {
        let file = write_temp("");
        assert_eq!(load_config_file(file.path()).unwrap(), SessionConfig::default());
    }

    #[test]
    fn test_bad_field_type_names_the_file() {
        let file = write_temp("timeoutSecs: soon\n");
        let err = load_config_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_invalid_result_is_rejected() {
        let args = SessionArgs {
            poll_interval_secs: Some(0),
            ..Default::default()
        };
        assert!(matches!(args.resolve(), Err(Error::Session(_))));
    }
}

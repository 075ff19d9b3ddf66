//! Configuration documents
//!
//! A configuration document is YAML (possibly multi-document) or JSON text
//! holding Kubernetes objects. Objects may be wrapped in `List` or `Config`
//! envelopes. Only the kinds a session provisions are kept; everything else
//! is counted and ignored.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use kubetest_common::retry::{retry_with_backoff_when, RetryConfig};
use kubetest_common::yaml::parse_yaml_multi;
use kubetest_common::Error;
use serde_json::Value;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::resource::Resource;

/// Envelope kinds whose `items` are flattened into the document
const LIST_KINDS: &[&str] = &["List", "Config"];

/// Timeout for fetching a remote document
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Attempts for fetching a remote document
const HTTP_MAX_ATTEMPTS: u32 = 3;

/// Fetches the raw text of a configuration document.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Read the document at `url`
    async fn read(&self, url: &str) -> Result<String, Error>;
}

/// Loads `file://` URLs, plain paths and `http(s)://` URLs.
#[derive(Clone)]
pub struct UrlLoader {
    http: reqwest::Client,
    retry: RetryConfig,
}

impl UrlLoader {
    /// Create a loader with default HTTP timeout and retry policy
    pub fn new() -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::internal_with_context("document-loader", e.to_string()))?;
        Ok(Self {
            http,
            retry: RetryConfig::with_max_attempts(HTTP_MAX_ATTEMPTS),
        })
    }

    async fn fetch(&self, url: &str) -> Result<String, Error> {
        retry_with_backoff_when(
            &self.retry,
            "fetch-document",
            || {
                let http = &self.http;
                async move {
                    http.get(url)
                        .send()
                        .await?
                        .error_for_status()?
                        .text()
                        .await
                }
            },
            is_transient_http_error,
        )
        .await
        .map_err(|e| Error::document(url, e.to_string()))
    }
}

#[async_trait]
impl DocumentLoader for UrlLoader {
    async fn read(&self, url: &str) -> Result<String, Error> {
        if url.starts_with("http://") || url.starts_with("https://") {
            debug!(url = %url, "fetching configuration document");
            return self.fetch(url).await;
        }

        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
        debug!(path = %path.display(), "reading configuration document");
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::document(url, e.to_string()))
    }
}

fn is_transient_http_error(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
}

/// The resources found in one configuration document
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigDocument {
    /// Where the document came from
    pub source: String,
    /// Recognised resources, in document order
    pub resources: Vec<Resource>,
    /// Objects of kinds a session does not provision
    pub skipped: usize,
}

impl ConfigDocument {
    /// Read and parse the document at `url`
    pub async fn load(loader: &dyn DocumentLoader, url: &str) -> Result<Self, Error> {
        let text = loader.read(url).await?;
        Self::parse(url, &text)
    }

    /// Parse document text.
    ///
    /// Text starting with `{` or `[` is JSON, anything else YAML. A document
    /// that cannot be parsed, or a recognised kind that does not deserialize,
    /// is an [`Error::Document`].
    pub fn parse(source: impl Into<String>, text: &str) -> Result<Self, Error> {
        let source = source.into();
        let trimmed = text.trim_start();
        let values = if trimmed.starts_with('{') || trimmed.starts_with('[') {
            vec![serde_json::from_str::<Value>(trimmed)
                .map_err(|e| Error::document(&source, e.to_string()))?]
        } else {
            parse_yaml_multi(text).map_err(|e| Error::document(&source, e.to_string()))?
        };

        let mut document = Self {
            source,
            resources: Vec::new(),
            skipped: 0,
        };
        for value in values {
            document.collect(value)?;
        }
        debug!(
            source = %document.source,
            resources = document.resources.len(),
            skipped = document.skipped,
            "parsed configuration document"
        );
        Ok(document)
    }

    /// Whether the document holds no recognised resources
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    fn collect(&mut self, value: Value) -> Result<(), Error> {
        match value {
            // empty YAML document
            Value::Null => Ok(()),
            Value::Array(items) => items.into_iter().try_for_each(|v| self.collect(v)),
            Value::Object(mut object) => {
                let is_list = object
                    .get("kind")
                    .and_then(Value::as_str)
                    .is_some_and(|k| LIST_KINDS.contains(&k));
                if is_list {
                    return match object.remove("items") {
                        Some(items) => self.collect(items),
                        None => Ok(()),
                    };
                }

                match Resource::from_object(Value::Object(object)) {
                    Ok(Some(resource)) => {
                        self.resources.push(resource);
                        Ok(())
                    }
                    Ok(None) => {
                        self.skipped += 1;
                        Ok(())
                    }
                    Err(e) => Err(Error::document(&self.source, e.to_string())),
                }
            }
            _ => {
                self.skipped += 1;
                Ok(())
            }
        }
    }
}

//! Test session identity

use kubetest_common::kube_utils::label_selector;
use kubetest_common::{Error, SESSION_LABEL_KEY};
use tracing::Span;
use uuid::Uuid;

/// Maximum length of a Kubernetes label value
const MAX_LABEL_VALUE_LEN: usize = 63;

/// One ephemeral test session.
///
/// The id is written into the labels of every resource the session creates,
/// so it must be a valid label value. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    id: String,
}

impl Session {
    /// Create a session with a random identity
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
        }
    }

    /// Create a session with a caller-chosen identity
    pub fn with_id(id: impl Into<String>) -> Result<Self, Error> {
        let id = id.into();
        validate_label_value(&id)?;
        Ok(Self { id })
    }

    /// The session identity
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Label selector matching every resource of this session
    pub fn label_selector(&self) -> String {
        label_selector(SESSION_LABEL_KEY, &self.id)
    }

    /// Span that all logging for this session is recorded under
    pub fn span(&self) -> Span {
        tracing::info_span!("session", id = %self.id)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

fn validate_label_value(value: &str) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::validation_for_field(
            "sessionId",
            "session id must not be empty",
        ));
    }
    if value.len() > MAX_LABEL_VALUE_LEN {
        return Err(Error::validation_for_field(
            "sessionId",
            format!(
                "session id '{}' is longer than {} characters",
                value, MAX_LABEL_VALUE_LEN
            ),
        ));
    }

    let bytes = value.as_bytes();
    let edges_ok = bytes[0].is_ascii_alphanumeric() && bytes[bytes.len() - 1].is_ascii_alphanumeric();
    let body_ok = bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if !edges_ok || !body_ok {
        return Err(Error::validation_for_field(
            "sessionId",
            format!("session id '{}' is not a valid label value", value),
        ));
    }
    Ok(())
}

//! Transient/fatal classification of collaborator failures.

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorClass, ProviderError};

fn default_transient_statuses() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

fn default_fatal_statuses() -> Vec<u16> {
    vec![400, 401, 403, 404]
}

fn default_transient_markers() -> Vec<String> {
    ["quota", "overloaded", "internal", "unavailable", "rate limit", "timeout", "timed out"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_fatal_markers() -> Vec<String> {
    ["api key", "permission", "unauthenticated", "invalid argument", "malformed"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Maps a [`ProviderError`] to an [`ErrorClass`].
///
/// HTTP statuses decide first: the configured lists, then any other 5xx as
/// transient and any other 4xx as fatal. Status-less failures are matched
/// against message markers (fatal markers win) and otherwise treated as
/// transient network trouble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassifier {
    /// Statuses always retried.
    #[serde(default = "default_transient_statuses")]
    pub transient_statuses: Vec<u16>,
    /// Statuses never retried.
    #[serde(default = "default_fatal_statuses")]
    pub fatal_statuses: Vec<u16>,
    /// Lower-case message fragments that mark a transient failure.
    #[serde(default = "default_transient_markers")]
    pub transient_markers: Vec<String>,
    /// Lower-case message fragments that mark a fatal failure.
    #[serde(default = "default_fatal_markers")]
    pub fatal_markers: Vec<String>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            transient_statuses: default_transient_statuses(),
            fatal_statuses: default_fatal_statuses(),
            transient_markers: default_transient_markers(),
            fatal_markers: default_fatal_markers(),
        }
    }
}

impl ErrorClassifier {
    /// Creates the default classifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a status that should be retried.
    #[must_use]
    pub fn with_transient_status(mut self, status: u16) -> Self {
        self.fatal_statuses.retain(|s| *s != status);
        self.transient_statuses.push(status);
        self
    }

    /// Adds a status that should never be retried.
    #[must_use]
    pub fn with_fatal_status(mut self, status: u16) -> Self {
        self.transient_statuses.retain(|s| *s != status);
        self.fatal_statuses.push(status);
        self
    }

    /// Classifies a failure as transient or fatal.
    #[must_use]
    pub fn classify(&self, err: &ProviderError) -> ErrorClass {
        if let Some(status) = err.status {
            if self.transient_statuses.contains(&status) {
                return ErrorClass::Transient;
            }
            if self.fatal_statuses.contains(&status) {
                return ErrorClass::Fatal;
            }
            match status {
                500..=599 => return ErrorClass::Transient,
                400..=499 => return ErrorClass::Fatal,
                _ => {}
            }
        }

        let message = err.message.to_lowercase();
        if self.fatal_markers.iter().any(|m| message.contains(m.as_str())) {
            return ErrorClass::Fatal;
        }
        if self.transient_markers.iter().any(|m| message.contains(m.as_str())) {
            return ErrorClass::Transient;
        }
        ErrorClass::Transient
    }
}

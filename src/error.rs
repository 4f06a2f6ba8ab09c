//! Error types for the Binocs provider.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::client::ApiError;
use crate::schema::Diagnostic;

/// Errors that can occur while serving provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested remote entity was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A field failed a static or cross-field rule.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider is not configured, or its configuration is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The remote API rejected or failed an operation.
    ///
    /// `action` describes the operation and entity, e.g.
    /// `create Binocs check` or `attach Binocs channel "x" to check "y"`.
    #[error("unable to {action}: {source}")]
    Remote {
        /// The operation that failed.
        action: String,
        /// The underlying API error.
        source: ApiError,
    },

    /// The request handed to the provider is malformed (e.g. state without an id).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The entity was created remotely but a later step failed.
    ///
    /// `state` carries the identifier and what is known to be applied; the
    /// host must persist it or the entity is orphaned.
    #[error("{source}")]
    PartiallyCreated {
        /// State of the created entity.
        state: Value,
        /// The step that failed after creation.
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Wrap an API error with the operation it interrupted.
    pub fn remote(action: impl Into<String>, source: ApiError) -> Self {
        Self::Remote {
            action: action.into(),
            source,
        }
    }

    /// Collapse error diagnostics into a single validation error.
    pub fn from_diagnostics(diagnostics: &[Diagnostic]) -> Self {
        let summaries: Vec<String> = diagnostics
            .iter()
            .map(|d| match &d.detail {
                Some(detail) => format!("{}: {}", d.summary, detail),
                None => d.summary.clone(),
            })
            .collect();
        Self::Validation(summaries.join("; "))
    }

    /// Record that `state` exists remotely even though `source` failed.
    pub fn partially_created<T: Serialize>(state: &T, source: ProviderError) -> Self {
        match serde_json::to_value(state) {
            Ok(state) => Self::PartiallyCreated {
                state,
                source: Box::new(source),
            },
            Err(err) => Self::Serialization(err),
        }
    }

    /// State to persist despite the failure, if the entity was created.
    pub fn partial_state(&self) -> Option<&Value> {
        match self {
            Self::PartiallyCreated { state, .. } => Some(state),
            _ => None,
        }
    }

    /// Whether this error means the remote entity no longer exists.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Remote { source, .. } => source.is_not_found(),
            Self::PartiallyCreated { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

//! Error types for the editor

use crate::model::TokenOverrides;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Failure reported by a backend collaborator, before classification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendFailure {
    /// HTTP-like status code; `None` when the request never got an answer
    pub status: Option<u16>,

    pub message: String,

    /// Field-level rejection reasons
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl BackendFailure {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Network-level failure (no response at all)
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, reason: impl Into<String>) -> Self {
        self.fields.insert(field.into(), reason.into());
        self
    }
}

/// Classified mutation / fetch failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error("Rejected: {message}")]
    ValidationRejected {
        message: String,
        fields: BTreeMap<String, String>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Fieldless tag for matching on the error class alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ValidationRejected,
    NotFound,
    Conflict,
    Transient,
    Unknown,
}

impl MutationError {
    /// Map a collaborator failure onto an error class
    pub fn classify(failure: BackendFailure) -> Self {
        let BackendFailure {
            status,
            message,
            fields,
        } = failure;

        match status {
            Some(400) | Some(422) => MutationError::ValidationRejected { message, fields },
            Some(404) | Some(410) => MutationError::NotFound(message),
            Some(409) | Some(412) => MutationError::Conflict(message),
            None | Some(408) | Some(429) | Some(502) | Some(503) | Some(504) => {
                MutationError::Transient(message)
            }
            Some(_) => MutationError::Unknown(message),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MutationError::ValidationRejected { .. } => ErrorKind::ValidationRejected,
            MutationError::NotFound(_) => ErrorKind::NotFound,
            MutationError::Conflict(_) => ErrorKind::Conflict,
            MutationError::Transient(_) => ErrorKind::Transient,
            MutationError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Whether re-issuing the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, MutationError::Transient(_) | MutationError::Conflict(_))
    }
}

impl From<BackendFailure> for MutationError {
    fn from(failure: BackendFailure) -> Self {
        MutationError::classify(failure)
    }
}

/// Failure of a token-override save or restore
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HistoryError {
    /// Nothing changed; the token settings were not applied
    #[error(transparent)]
    Mutation(#[from] MutationError),

    /// The token settings were applied, but the ledger append failed
    #[error("Token settings applied but not recorded in history: {source}")]
    Unrecorded {
        overrides: TokenOverrides,
        source: MutationError,
    },
}

impl HistoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HistoryError::Mutation(err) => err.kind(),
            HistoryError::Unrecorded { source, .. } => source.kind(),
        }
    }

    /// Whether the server's token settings already hold the new document
    pub fn is_applied(&self) -> bool {
        matches!(self, HistoryError::Unrecorded { .. })
    }
}

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Mutation error: {0}")]
    Mutation(#[from] MutationError),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_status() {
        let cases = [
            (Some(400), ErrorKind::ValidationRejected),
            (Some(422), ErrorKind::ValidationRejected),
            (Some(404), ErrorKind::NotFound),
            (Some(410), ErrorKind::NotFound),
            (Some(409), ErrorKind::Conflict),
            (Some(412), ErrorKind::Conflict),
            (None, ErrorKind::Transient),
            (Some(503), ErrorKind::Transient),
            (Some(429), ErrorKind::Transient),
            (Some(500), ErrorKind::Unknown),
            (Some(418), ErrorKind::Unknown),
        ];

        for (status, expected) in cases {
            let failure = BackendFailure {
                status,
                message: "boom".to_string(),
                fields: BTreeMap::new(),
            };
            assert_eq!(MutationError::classify(failure).kind(), expected, "status {:?}", status);
        }
    }

    #[test]
    fn test_validation_keeps_field_reasons() {
        let failure = BackendFailure::new(422, "invalid").with_field("url", "must be https");
        match MutationError::classify(failure) {
            MutationError::ValidationRejected { fields, .. } => {
                assert_eq!(fields.get("url").map(String::as_str), Some("must be https"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_retryable() {
        assert!(MutationError::Transient("t".into()).is_retryable());
        assert!(!MutationError::NotFound("n".into()).is_retryable());
    }
}

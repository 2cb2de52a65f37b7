// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StewardError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Watch error: {0}")]
    WatchError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Transient(String),

    #[error("Invalid object: {0}")]
    Invalid(String),

    #[error("{child} is already controlled by {kind} {name}")]
    AlreadyOwned {
        child: String,
        kind: String,
        name: String,
    },

    #[error("Fatal: {0}")]
    Fatal(String),
}

/// Coarse error classes that drive retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The object is gone; treated as already reconciled away.
    NotFound,
    /// Optimistic-concurrency failure, retried with a fresh read.
    Conflict,
    /// Store or network unavailability, retried with backoff.
    Transient,
    /// Malformed desired state, surfaced in the parent status.
    Invalid,
    /// Needs a spec change or manual intervention.
    Fatal,
}

impl StewardError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StewardError::KubeError(kube::Error::Api(resp)) => match resp.code {
                404 => ErrorClass::NotFound,
                409 => ErrorClass::Conflict,
                400 | 422 => ErrorClass::Invalid,
                _ => ErrorClass::Transient,
            },
            StewardError::KubeError(_) | StewardError::WatchError(_) => ErrorClass::Transient,
            StewardError::SerializationError(_) => ErrorClass::Invalid,
            StewardError::NotFound(_) => ErrorClass::NotFound,
            StewardError::Conflict(_) => ErrorClass::Conflict,
            StewardError::Transient(_) => ErrorClass::Transient,
            StewardError::Invalid(_) => ErrorClass::Invalid,
            StewardError::AlreadyOwned { .. } | StewardError::Fatal(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Conflict | ErrorClass::Transient)
    }
}

pub type Result<T> = std::result::Result<T, StewardError>;

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> StewardError {
        StewardError::KubeError(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        }))
    }

    #[test]
    fn test_classifies_api_status_codes() {
        assert_eq!(api_error(404).class(), ErrorClass::NotFound);
        assert_eq!(api_error(409).class(), ErrorClass::Conflict);
        assert_eq!(api_error(422).class(), ErrorClass::Invalid);
        assert_eq!(api_error(400).class(), ErrorClass::Invalid);
        assert_eq!(api_error(503).class(), ErrorClass::Transient);
        assert_eq!(api_error(429).class(), ErrorClass::Transient);
    }

    #[test]
    fn test_only_conflict_and_transient_are_retryable() {
        assert!(StewardError::Conflict("x".into()).is_retryable());
        assert!(StewardError::Transient("x".into()).is_retryable());
        assert!(!StewardError::Invalid("x".into()).is_retryable());
        assert!(!StewardError::Fatal("x".into()).is_retryable());
        assert!(!StewardError::NotFound("x".into()).is_retryable());
        let owned = StewardError::AlreadyOwned {
            child: "MariaDB openstack".into(),
            kind: "OpenStackControlPlane".into(),
            name: "other".into(),
        };
        assert_eq!(owned.class(), ErrorClass::Fatal);
    }
}

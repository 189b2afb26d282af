use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Credential unavailable: {0}")]
    CredentialUnavailable(String),

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Validation failure: {0}")]
    ValidationFailure(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid window: from {from} is after to {to}")]
    InvalidWindow {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("Query timed out after {0:?}")]
    QueryTimeout(Duration),

    #[error("Authentication failure")]
    AuthenticationFailure,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl DomainError {
    /// Whether the failure is transient and worth retrying with backoff.
    ///
    /// `StoreUnavailable` is retryable on the write path only; the router
    /// degrades it to the error path instead of retrying, and the query
    /// engine surfaces it to the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DomainError::CredentialUnavailable(_)
                | DomainError::TransportFailure(_)
                | DomainError::StoreUnavailable(_)
        )
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

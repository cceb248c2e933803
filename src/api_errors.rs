// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for resource store calls and make-right steps.
//!
//! Every failed store call becomes a [`StoreError`] carrying the API reason,
//! message and (when the server answered) the HTTP status. The status decides
//! whether the caller re-reads and retries or propagates the failure:
//!
//! | HTTP Code | Class | Meaning |
//! |-----------|-------|---------|
//! | 409 | recoverable | Conflict, the cached copy is stale |
//! | 429 | recoverable | Rate limited |
//! | 5xx | recoverable | API server trouble |
//! | none | recoverable | Transport failure |
//! | 400, 401, 403, 404, 405, 410, 422 | unrecoverable | Retrying cannot succeed |
//! | other 4xx | unrecoverable | Client error |

use thiserror::Error;

/// HTTP status codes that never succeed on retry.
const UNRECOVERABLE_CODES: &[u16] = &[400, 401, 403, 404, 405, 410, 422];

/// Errors returned by a [`ResourceStore`](crate::store::ResourceStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The API server rejected the call.
    #[error("{operation} failed with {reason} ({code}): {message}")]
    Api {
        /// Human-readable name of the call (e.g., "replace status of domain apps/sample")
        operation: String,
        /// `CamelCase` reason returned by the API server
        reason: String,
        /// Message returned by the API server
        message: String,
        /// HTTP status code
        code: u16,
    },

    /// The call never reached the API server, or its answer could not be read.
    #[error("{operation} failed: {message}")]
    Transport {
        /// Human-readable name of the call
        operation: String,
        /// Underlying error text
        message: String,
    },

    /// The request could not be built.
    #[error("{operation} could not be serialized: {message}")]
    Serialization {
        /// Human-readable name of the call
        operation: String,
        /// Underlying error text
        message: String,
    },
}

impl StoreError {
    /// Builds an API error from an HTTP status.
    #[must_use]
    pub fn api(operation: &str, code: u16, reason: &str, message: &str) -> Self {
        StoreError::Api {
            operation: operation.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
            code,
        }
    }

    /// Builds a conflict (409) error.
    #[must_use]
    pub fn conflict(operation: &str) -> Self {
        Self::api(
            operation,
            409,
            "Conflict",
            "the object has been modified; please apply your changes to the latest version",
        )
    }

    /// Converts a `kube` client error.
    #[must_use]
    pub fn from_kube(operation: &str, err: &kube::Error) -> Self {
        match err {
            kube::Error::Api(response) => StoreError::Api {
                operation: operation.to_string(),
                reason: response.reason.clone(),
                message: response.message.clone(),
                code: response.code,
            },
            kube::Error::SerdeError(e) => StoreError::Serialization {
                operation: operation.to_string(),
                message: e.to_string(),
            },
            other => StoreError::Transport {
                operation: operation.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// HTTP status returned by the server, if any.
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        match self {
            StoreError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns `true` if retrying the call cannot succeed.
    #[must_use]
    pub fn is_unrecoverable(&self) -> bool {
        match self {
            StoreError::Api { code, .. } => is_unrecoverable_code(*code),
            StoreError::Transport { .. } => false,
            StoreError::Serialization { .. } => true,
        }
    }

    /// Returns `true` for a 404.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code() == Some(404)
    }

    /// Returns `true` for a 409.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.code() == Some(409)
    }
}

/// Classifies an HTTP status code.
///
/// # Example
///
/// ```rust
/// use domainkeeper::api_errors::is_unrecoverable_code;
///
/// assert!(is_unrecoverable_code(422));
/// assert!(!is_unrecoverable_code(409));
/// assert!(!is_unrecoverable_code(503));
/// ```
#[must_use]
pub fn is_unrecoverable_code(code: u16) -> bool {
    if UNRECOVERABLE_CODES.contains(&code) {
        return true;
    }
    match code {
        409 | 429 => false,
        400..=499 => true,
        _ => false,
    }
}

/// Errors raised by a make-right step.
#[derive(Error, Debug)]
pub enum StepError {
    /// A store call failed and could not be retried.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Topology or state could not be gathered for the domain.
    #[error("failed to gather reconcile inputs for domain {domain_uid}: {message}")]
    Inputs {
        /// Uid of the domain being reconciled
        domain_uid: String,
        /// Underlying error text
        message: String,
    },
}

#[cfg(test)]
#[path = "api_errors_tests.rs"]
mod api_errors_tests;

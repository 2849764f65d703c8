//! Domain error taxonomy shared by the store, gate, and routers.
//!
//! Every fallible operation returns one of these variants; the api layer
//! translates them into the wire envelope exactly once.

use hyper::StatusCode;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Typed domain errors, one variant per failure kind in the wire contract.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation {
        messages: Vec<String>,
        fields: BTreeMap<String, String>,
    },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("rate limit exceeded")]
    RateLimited {
        /// Seconds until enough window entries expire to admit a request.
        retry_after_secs: u64,
        /// Quota still available at rejection time.
        remaining: u32,
        /// Epoch seconds at which the window fully resets.
        reset_epoch_secs: i64,
    },
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Validation error with a single top-level message.
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            messages: vec![message.into()],
            fields: BTreeMap::new(),
        }
    }

    /// Validation error attributed to a single field.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.into(), message.into());
        ApiError::Validation {
            messages: Vec::new(),
            fields,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ApiError::NotFound(what.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    /// HTTP status for this error kind.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wire envelope: `{"errorMessages": [...], "errors": {field: message}}`.
    pub fn envelope(&self) -> ErrorEnvelope {
        match self {
            ApiError::Validation { messages, fields } => {
                let mut messages = messages.clone();
                if messages.is_empty() && fields.is_empty() {
                    messages.push("validation failed".to_string());
                }
                ErrorEnvelope {
                    error_messages: messages,
                    errors: fields.clone(),
                }
            }
            other => ErrorEnvelope {
                error_messages: vec![other.to_string()],
                errors: BTreeMap::new(),
            },
        }
    }
}

/// Error envelope shared by every non-2xx response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub error_messages: Vec<String>,
    pub errors: BTreeMap<String, String>,
}

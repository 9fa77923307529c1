use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::error::CloudQError::GenericError;

/// Stable error codes exposed at the engine boundary.
///
/// Callers (UI, API layer) match on these, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidParams,
    JobScriptNotFound,
    AclViolation,
    QuotaExceeded,
    SubmitJobFailed,
    SessionConnectionError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::JobScriptNotFound => "JOB_SCRIPT_NOT_FOUND",
            ErrorCode::AclViolation => "ACL_VIOLATION",
            ErrorCode::QuotaExceeded => "QUOTA_EXCEEDED",
            ErrorCode::SubmitJobFailed => "SUBMIT_JOB_FAILED",
            ErrorCode::SessionConnectionError => "SESSION_CONNECTION_ERROR",
        }
    }
}

/// A single boundary validation failure.
///
/// Validation failures are returned as structured lists so that multiple
/// simultaneous violations are all surfaced at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: ErrorCode,
    pub message: String,
}

impl ValidationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CloudQError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("Job script not found: {0}")]
    JobScriptNotFound(String),
    #[error("ACL violation: {0}")]
    AclViolation(String),
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("Job submission failed: {0}")]
    SubmitJobFailed(String),
    #[error("Session connection error: {0}")]
    SessionConnectionError(String),
    #[error("Error: {0}")]
    GenericError(String),
}

impl CloudQError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CloudQError::InvalidParams(_) => ErrorCode::InvalidParams,
            CloudQError::JobScriptNotFound(_) => ErrorCode::JobScriptNotFound,
            CloudQError::AclViolation(_) => ErrorCode::AclViolation,
            CloudQError::QuotaExceeded(_) => ErrorCode::QuotaExceeded,
            CloudQError::SubmitJobFailed(_) | CloudQError::GenericError(_) => {
                ErrorCode::SubmitJobFailed
            }
            CloudQError::SessionConnectionError(_) => ErrorCode::SessionConnectionError,
        }
    }
}

impl From<anyhow::Error> for CloudQError {
    fn from(error: anyhow::Error) -> Self {
        GenericError(error.to_string())
    }
}

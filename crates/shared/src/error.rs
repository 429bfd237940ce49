use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error taxonomy shared by every layer so clients can branch on `code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed or missing payload fields.
    Validation,
    /// The caller could not be identified as a user of this system.
    Authorization,
    /// The action is not legal in the current state for the caller's role.
    StateGuard,
    NotFound,
    Internal,
    /// A downstream collaborator failed.
    External,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Validation => "validation",
            ErrorCode::Authorization => "authorization",
            ErrorCode::StateGuard => "state_guard",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Internal => "internal",
            ErrorCode::External => "external",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("{}: {message}", code.as_str())]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

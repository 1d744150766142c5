// src/error.rs

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Failure kinds of the tool pipeline and the endpoints around it.
///
/// Every collaborator wrapper converts its own transport errors into one of
/// these before returning, so handlers only ever see this type.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("User not signed in")]
    Unauthorized,

    #[error("Invalid tool: {0}")]
    InvalidTool(String),

    #[error("Order already fulfilled")]
    AlreadyFulfilled,

    #[error("Payment not received")]
    PaymentNotReceived,

    #[error("Amount paid ({charged}) is lower than the price of this operation ({expected})")]
    PriceMismatch { charged: i64, expected: i64 },

    #[error("Failed to verify payment")]
    PaymentVerificationFailed(String),

    #[error("Insufficient credits")]
    InsufficientCredits { balance: i32, required: i32 },

    #[error("User not found")]
    UserNotFound,

    #[error("{}", execution_message(.index, .reason))]
    ExecutionFailed { index: Option<usize>, reason: String },

    #[error("Failed to generate transcript")]
    TranscriptionFailed(String),

    #[error("Failed to upload file")]
    StorageWriteFailed(String),

    #[error("Failed to store user operation")]
    LedgerWriteFailed(String),

    #[error("Failed to complete the order, please contact support")]
    FinalizeFailed(String),

    #[error("Not found")]
    NotFound,

    #[error("Internal Server Error. Please try again or contact support.")]
    Internal(String),
}

fn execution_message(index: &Option<usize>, reason: &str) -> String {
    match index {
        Some(i) => format!("Failed to process file {}: {}", i + 1, reason),
        None => format!("Failed to process tool operation: {reason}"),
    }
}

impl ToolError {
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            index: None,
            reason: reason.into(),
        }
    }

    pub fn execution_at(index: usize, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            index: Some(index),
            reason: reason.into(),
        }
    }

    /// Short machine-readable tag, used in logs and tests.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::Unauthorized => "Unauthorized",
            Self::InvalidTool(_) => "InvalidTool",
            Self::AlreadyFulfilled => "AlreadyFulfilled",
            Self::PaymentNotReceived => "PaymentNotReceived",
            Self::PriceMismatch { .. } => "PriceMismatch",
            Self::PaymentVerificationFailed(_) => "PaymentVerificationFailed",
            Self::InsufficientCredits { .. } => "InsufficientCredits",
            Self::UserNotFound => "UserNotFound",
            Self::ExecutionFailed { .. } => "ExecutionFailed",
            Self::TranscriptionFailed(_) => "TranscriptionFailed",
            Self::StorageWriteFailed(_) => "StorageWriteFailed",
            Self::LedgerWriteFailed(_) => "LedgerWriteFailed",
            Self::FinalizeFailed(_) => "FinalizeFailed",
            Self::NotFound => "NotFound",
            Self::Internal(_) => "Internal",
        }
    }
}

impl ResponseError for ToolError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }))
    }
}

impl From<sqlx::Error> for ToolError {
    fn from(e: sqlx::Error) -> Self {
        log::error!("database error: {e}");
        Self::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_failure_reports_one_based_index() {
        let err = ToolError::execution_at(2, "bad header");
        assert_eq!(err.to_string(), "Failed to process file 3: bad header");
    }

    #[test]
    fn anticipated_failures_are_bad_requests() {
        assert_eq!(
            ToolError::AlreadyFulfilled.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ToolError::InsufficientCredits { balance: 1, required: 7 }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ToolError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ToolError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    }
}

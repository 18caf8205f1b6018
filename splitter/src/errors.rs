use crate::credentials::CredentialsError;
use crate::sheets::SheetsError;
use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Coarse grouping reported to callers alongside the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Configuration,
    Lookup,
    Upstream,
    Data,
    InvalidInput,
    Unexpected,
}

#[derive(Error, Debug)]
pub enum SplitterError {
    #[error("Credentials error: {0}")]
    Credentials(#[from] CredentialsError),

    #[error(transparent)]
    Sheets(#[from] SheetsError),

    #[error("No data found in the sheet (need at least header + 1 row).")]
    InsufficientData,

    #[error("Column '{0}' not found in the source header")]
    MissingColumn(String),

    #[error("Worksheet {worksheet} is the destination of both {first} and {second}")]
    ConflictingDestination {
        worksheet: String,
        first: String,
        second: String,
    },

    #[error("Worksheet {worksheet} would receive both {first} and {second}")]
    DestinationCollision {
        worksheet: String,
        first: String,
        second: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl SplitterError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SplitterError::Credentials(_) => ErrorCategory::Configuration,
            SplitterError::Sheets(e) => match e {
                SheetsError::SpreadsheetNotFound(_) | SheetsError::WorksheetNotFound { .. } => {
                    ErrorCategory::Lookup
                }
                SheetsError::InvalidUrl(_) => ErrorCategory::Configuration,
                SheetsError::Api { .. } | SheetsError::Http(_) | SheetsError::Auth(_) => {
                    ErrorCategory::Upstream
                }
            },
            SplitterError::InsufficientData
            | SplitterError::MissingColumn(_)
            | SplitterError::DestinationCollision { .. } => ErrorCategory::Data,
            SplitterError::ConflictingDestination { .. } | SplitterError::InvalidRequest(_) => {
                ErrorCategory::InvalidInput
            }
            SplitterError::Unexpected(_) => ErrorCategory::Unexpected,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.category() {
            ErrorCategory::InvalidInput => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

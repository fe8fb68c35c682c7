use serde_json::json;

use crate::grid::GridError;

/// Failure kinds surfaced to callers. Every variant carries a human-readable
/// message; `code()` is the stable machine-readable name used on the wire.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Conflict {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    BadParams(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("storage error: {0}")]
    Storage(rusqlite::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::BadParams(message.into())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Validation(_) => "validation_error",
            Self::BadParams(_) => "bad_params",
            Self::PermissionDenied(_) => "permission_denied",
            Self::Storage(_) => "db_error",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Conflict { details, .. } => details.clone(),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        // UNIQUE / CHECK / FOREIGN KEY violations are the storage-level backstop
        // for the invariants the managers check first.
        if let rusqlite::Error::SqliteFailure(ref f, ref msg) = e {
            if f.code == rusqlite::ErrorCode::ConstraintViolation {
                return Self::Conflict {
                    message: msg
                        .clone()
                        .unwrap_or_else(|| "constraint violation".to_string()),
                    details: Some(json!({ "constraint": true })),
                };
            }
        }
        Self::Storage(e)
    }
}

impl From<GridError> for CoreError {
    fn from(e: GridError) -> Self {
        match e {
            GridError::OutOfBounds { .. } | GridError::InvalidDimensions { .. } => {
                Self::Validation(e.to_string())
            }
            GridError::Occupied { row, column, .. } => Self::Conflict {
                message: "This seat is already occupied".to_string(),
                details: Some(json!({ "row": row, "column": column })),
            },
            GridError::AlreadySeated { .. } => Self::Conflict {
                message: e.to_string(),
                details: None,
            },
        }
    }
}

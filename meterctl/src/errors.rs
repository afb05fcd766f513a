use crate::db::errors::DbError;
use crate::sync::prices::PriceSyncError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Missing or wrong bearer credential
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Malformed payload or a business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Required configuration is absent or invalid
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Body returned for every failed request.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    /// One of `configuration_error`, `authorization_error`, `not_found`, `validation_error`,
    /// `transient_store_error`, `internal_error`
    pub error_type: &'static str,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound | DbError::UserNotFoundOrDeleted { .. } => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. }
                | DbError::ForeignKeyViolation { .. }
                | DbError::CheckViolation { .. }
                | DbError::ValueOutOfRange { .. } => StatusCode::BAD_REQUEST,
                DbError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine readable category, stable across releases
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::Unauthenticated { .. } => "authorization_error",
            Error::BadRequest { .. } => "validation_error",
            Error::NotFound { .. } => "not_found",
            Error::Configuration { .. } => "configuration_error",
            Error::Database(db_err) => match db_err {
                DbError::NotFound | DbError::UserNotFoundOrDeleted { .. } => "not_found",
                DbError::UniqueViolation { .. }
                | DbError::ForeignKeyViolation { .. }
                | DbError::CheckViolation { .. }
                | DbError::ValueOutOfRange { .. } => "validation_error",
                DbError::Transient(_) => "transient_store_error",
                DbError::Other(_) => "internal_error",
            },
            Error::Internal { .. } | Error::Other(_) => "internal_error",
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::Configuration { message } => message.clone(),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UserNotFoundOrDeleted { user_id } => format!("User {user_id} not found or deleted"),
                DbError::UniqueViolation { table, .. } => match table.as_deref() {
                    Some(table) => format!("Duplicate key in {table}"),
                    None => "Resource already exists".to_string(),
                },
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::ValueOutOfRange { .. } => "Numeric value out of range".to_string(),
                DbError::Transient(_) => "Database temporarily unavailable, please retry".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) | Error::Configuration { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(DbError::Transient(_)) => {
                tracing::warn!("Transient store error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database error: {}", self);
            }
            Error::Unauthenticated { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = ErrorResponse {
            success: false,
            error: self.user_message(),
            error_type: self.error_type(),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

impl From<PriceSyncError> for Error {
    fn from(err: PriceSyncError) -> Self {
        match err {
            PriceSyncError::ModelNotFound { model_id } => Error::NotFound {
                resource: "Model".to_string(),
                id: model_id,
            },
            PriceSyncError::BaseModelNotFound { base_model_id, .. } => Error::NotFound {
                resource: "Base model".to_string(),
                id: base_model_id,
            },
            e @ PriceSyncError::NoBaseModel { .. } => Error::BadRequest { message: e.to_string() },
            PriceSyncError::Database(db_err) => Error::Database(db_err),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Database(err.into())
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

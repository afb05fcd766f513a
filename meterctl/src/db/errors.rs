use thiserror::Error;

/// SQLSTATE codes that indicate the statement may succeed if the caller tries again:
/// `57014` query_canceled (statement timeout), `40001` serialization_failure,
/// `40P01` deadlock_detected.
const TRANSIENT_SQLSTATES: &[&str] = &["57014", "40001", "40P01"];

/// `22003` numeric_value_out_of_range
const OUT_OF_RANGE_SQLSTATE: &str = "22003";

/// Unified error type for database operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// A ledger statement matched no live user row
    #[error("User {user_id} not found or deleted")]
    UserNotFoundOrDeleted { user_id: String },

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Foreign key constraint violation
    #[error("Foreign key constraint violation")]
    ForeignKeyViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Check constraint violation
    #[error("Check constraint violation")]
    CheckViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// A value does not fit its column
    #[error("Value out of range: {message}")]
    ValueOutOfRange { message: String },

    /// The store could not serve the request right now (pool exhausted, connection lost,
    /// statement timeout). Nothing was committed.
    #[error("Database temporarily unavailable: {0}")]
    Transient(#[source] sqlx::Error),

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DbError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Transient(_))
    }
}

/// Convert from sqlx::Error using proper sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::WorkerCrashed => {
                DbError::Transient(err)
            }
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    DbError::UniqueViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_foreign_key_violation() {
                    DbError::ForeignKeyViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_check_violation() {
                    DbError::CheckViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else if db_err.code().is_some_and(|code| code == OUT_OF_RANGE_SQLSTATE) {
                    DbError::ValueOutOfRange {
                        message: db_err.message().to_string(),
                    }
                } else if db_err.code().is_some_and(|code| TRANSIENT_SQLSTATES.contains(&code.as_ref())) {
                    DbError::Transient(err)
                } else {
                    // All other database errors are non-recoverable - convert to anyhow
                    DbError::Other(anyhow::Error::from(err))
                }
            }
            // All other sqlx errors are non-recoverable - convert to anyhow with context
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;

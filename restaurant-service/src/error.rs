use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::PoolError;
use shared::InvalidTransition;
use thiserror::Error;
use uuid::Uuid;

/// Typed failures of the workflow engine. Nothing here is retried by the
/// engine; the HTTP boundary translates each kind into a response.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(DieselError),

    #[error("connection pool error: {0}")]
    Pool(#[from] bb8::RunError<PoolError>),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

impl From<DieselError> for EngineError {
    fn from(err: DieselError) -> Self {
        match err {
            // uniqueness is the DB backstop for the conflict pre-checks
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::Conflict(info.message().to_string())
            }
            other => Self::Database(other),
        }
    }
}

impl From<InvalidTransition> for EngineError {
    fn from(err: InvalidTransition) -> Self {
        Self::Validation(err.to_string())
    }
}

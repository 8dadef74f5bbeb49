//! Error types for the recommendation pipeline.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type RecommendResult<T> = Result<T, RecommendError>;

/// Errors raised by models, stores and the serving layer.
///
/// `InsufficientData` and `ComputationFailure` never leave the strategy
/// selector: a model that raises either contributes an empty candidate list.
#[derive(Error, Debug)]
pub enum RecommendError {
    /// Unknown user or product
    #[error("Not found: {0}")]
    NotFound(String),

    /// Too few ratings or interactions for a model to produce a signal
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Numeric fault inside a model
    #[error("Computation failure: {0}")]
    ComputationFailure(String),

    /// A store read or write failed
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// Caller supplied a malformed request
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl RecommendError {
    pub fn user_not_found(user_id: i64) -> Self {
        RecommendError::NotFound(format!("User {} not found", user_id))
    }

    pub fn product_not_found(product_id: i64) -> Self {
        RecommendError::NotFound(format!("Product {} not found", product_id))
    }

    /// True for the failures a model boundary swallows into an empty result.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            RecommendError::InsufficientData(_) | RecommendError::ComputationFailure(_)
        )
    }
}

impl From<sqlx::Error> for RecommendError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RecommendError::NotFound("row not found".to_string()),
            other => RecommendError::PersistenceFailure(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for RecommendError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        RecommendError::PersistenceFailure(format!("migration failed: {}", err))
    }
}

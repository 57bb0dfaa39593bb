use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("message already deleted")]
    AlreadyDeleted,

    #[error("duplicate reaction: {emoji}")]
    DuplicateReaction { emoji: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("directory error: {0}")]
    Directory(String),

    #[error("internal server error")]
    Internal,
}

impl AppError {
    /// Returns whether this error is retryable (e.g., database connection timeout)
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Database(e) => {
                matches!(
                    e,
                    sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
                )
            }
            AppError::Internal => true,
            _ => false,
        }
    }

    /// Returns HTTP status code for the transport layer
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::Forbidden => 403,
            AppError::NotFound => 404,
            AppError::DuplicateReaction { .. } => 409, // 409 Conflict
            AppError::AlreadyDeleted => 410,           // 410 Gone
            AppError::Config(_) | AppError::Database(_) | AppError::Directory(_) => 500,
            AppError::Internal => 500,
        }
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutosaveError {
    #[error("Invalid language token: {0:?}")]
    InvalidLanguage(String),

    #[error("Staging store error: {0}")]
    Staging(#[from] redis::RedisError),

    #[error("Durable store error: {0}")]
    Durable(#[from] sqlx::Error),
}

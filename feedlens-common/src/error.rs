//! Error type shared by the feedlens crates
//!
//! `InvalidInput` is reserved for values a caller supplied; anything read
//! back from the store that does not make sense is `Internal`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// SQLite failure
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Creating the database directory failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A caller-supplied value was rejected (priority, sort field, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Embedding blob whose length is not a whole number of f32 values
    #[error("Malformed embedding: {0}")]
    Embedding(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

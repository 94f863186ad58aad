use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// The referenced chat or message does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database lock poisoned: {0}")]
    LockPoisoned(String),

    /// A stored value could not be decoded back into its domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

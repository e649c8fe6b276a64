use thiserror::Error;

/// Errors produced by the store layer.
///
/// From the application's point of view every variant is a transport
/// failure: the operation did not reach (or was rejected by) the database.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The addressed document does not exist.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// An array operation targeted a field holding something other than an array.
    #[error("Field `{field}` of {path} is not an array")]
    NotAnArray { path: String, field: String },

    /// Stored JSON could not be read or written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A writer panicked while holding the store lock.
    #[error("Store lock poisoned")]
    LockPoisoned,

    /// The backend refused or could not complete the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

use teamboard_shared::ParseError;
use teamboard_store::StoreError;
use thiserror::Error;

/// Identity-provider failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Password must be at least {min} characters")]
    WeakPassword { min: usize },

    #[error("An account already exists for {0}")]
    EmailInUse(String),

    #[error("Invalid email or password")]
    InvalidCredentials,
}

/// Every failure an operation of this crate can report.
///
/// None of them is fatal: each is scoped to the single operation that raised
/// it, and the caller decides whether to retry.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input: empty text, bad confirmation phrase, self-chat.
    #[error("{0}")]
    Validation(String),

    /// Email lookup miss or missing referenced document.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The actor lacks the role the operation requires.
    #[error("Not allowed: {0}")]
    Unauthorized(String),

    /// The store could not complete the request.
    #[error("Transport error: {0}")]
    Transport(#[source] StoreError),

    /// A multi-step operation stopped part-way. `completed` steps took effect;
    /// retrying `remaining` finishes the job.
    #[error("{operation} incomplete after {completed} step(s), remaining: {remaining}: {source}")]
    Incomplete {
        operation: &'static str,
        completed: usize,
        remaining: String,
        #[source]
        source: StoreError,
    },

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// A stored document could not be decoded.
    #[error("Corrupt document {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Discriminant of [`CoreError`] for callers that branch on the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unauthorized,
    Transport,
    Incomplete,
    Auth,
    Corrupt,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Unauthorized(_) => ErrorKind::Unauthorized,
            CoreError::Transport(_) => ErrorKind::Transport,
            CoreError::Incomplete { .. } => ErrorKind::Incomplete,
            CoreError::Auth(_) => ErrorKind::Auth,
            CoreError::Corrupt { .. } => ErrorKind::Corrupt,
        }
    }

    /// Whether re-issuing the same call unchanged can succeed.
    ///
    /// Bad input and undecodable documents fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            CoreError::Validation(_) | CoreError::Corrupt { .. } | CoreError::Auth(_)
        )
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub(crate) fn corrupt(path: impl ToString, err: impl ToString) -> Self {
        CoreError::Corrupt {
            path: path.to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => CoreError::NotFound(path),
            other => CoreError::Transport(other),
        }
    }
}

impl From<ParseError> for CoreError {
    fn from(err: ParseError) -> Self {
        CoreError::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

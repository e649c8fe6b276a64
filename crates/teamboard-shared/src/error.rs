use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid task status: {0}")]
    InvalidStatus(String),

    #[error("Invalid calendar date: {0}")]
    InvalidDate(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
}

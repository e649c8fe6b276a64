use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::types::UserId;

/// The authenticated caller.
///
/// Every store operation takes the acting identity as an argument instead of
/// reading a process-wide "current user", so authorization decisions are
/// visible at each call site and testable without a simulated login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    /// Normalized (trimmed, lowercase) email.
    pub email: String,
}

impl Identity {
    pub fn new(user_id: impl Into<UserId>, email: &str) -> Self {
        Self {
            user_id: user_id.into(),
            email: normalize_email(email),
        }
    }
}

/// Trim and lowercase an email address. Lookups by email always go through
/// this so `Bob@Example.com ` and `bob@example.com` find the same profile.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Normalize and minimally validate an email: one `@` with a non-empty local
/// part and domain.
pub fn parse_email(email: &str) -> Result<String, ParseError> {
    let normalized = normalize_email(email);
    match normalized.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(normalized)
        }
        _ => Err(ParseError::InvalidEmail(email.trim().to_string())),
    }
}

//! Error taxonomy shared by the validator, ledger, session gate and API

use thiserror::Error;

/// Result alias for drink desk operations
pub type Result<T> = std::result::Result<T, DrinksError>;

/// Every failure a staff member can see.
///
/// All variants are recoverable: the message is shown and the user
/// re-submits. `GuestNotFound` and `LimitReached` must stay distinct all the
/// way to the screen.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DrinksError {
    /// Nothing but whitespace was scanned or typed
    #[error("No code entered")]
    EmptyInput,

    /// Wrong length or characters outside A-Z / 0-9
    #[error("Invalid code '{input}': a guest code is exactly 6 characters (A-Z, 0-9)")]
    MalformedCode { input: String },

    /// Code is well-formed but no guest is registered under it
    #[error("Guest {code} not found")]
    GuestNotFound { code: String },

    /// Guest already consumed their whole allowance
    #[error("Guest {code} reached the drink limit ({allowance})")]
    LimitReached { code: String, allowance: u32 },

    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Request carried no session token, or one that was logged out
    #[error("Not logged in")]
    Unauthorized,

    /// Remote store could not be reached or answered garbage
    #[error("Guest store unavailable: {0}")]
    Unavailable(String),
}

impl DrinksError {
    /// Stable machine-readable kind, used on the wire and in metrics
    pub fn kind(&self) -> &'static str {
        match self {
            DrinksError::EmptyInput => "empty_input",
            DrinksError::MalformedCode { .. } => "malformed_code",
            DrinksError::GuestNotFound { .. } => "guest_not_found",
            DrinksError::LimitReached { .. } => "limit_reached",
            DrinksError::InvalidCredentials => "invalid_credentials",
            DrinksError::Unauthorized => "unauthorized",
            DrinksError::Unavailable(_) => "unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_distinct() {
        let errors = [
            DrinksError::EmptyInput,
            DrinksError::MalformedCode { input: "AB".to_string() },
            DrinksError::GuestNotFound { code: "ZZZ999".to_string() },
            DrinksError::LimitReached { code: "ABC123".to_string(), allowance: 3 },
            DrinksError::InvalidCredentials,
            DrinksError::Unauthorized,
            DrinksError::Unavailable("timeout".to_string()),
        ];
        let mut kinds: Vec<&str> = errors.iter().map(|e| e.kind()).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_messages() {
        let err = DrinksError::LimitReached { code: "ABC123".to_string(), allowance: 3 };
        assert_eq!(err.to_string(), "Guest ABC123 reached the drink limit (3)");

        let err = DrinksError::GuestNotFound { code: "ZZZ999".to_string() };
        assert_eq!(err.to_string(), "Guest ZZZ999 not found");
    }
}

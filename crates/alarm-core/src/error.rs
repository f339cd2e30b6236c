//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur while turning user input into an alarm.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Day or time could not be turned into a local timestamp
    #[error("Invalid schedule '{input}': {reason}")]
    InvalidSchedule { input: String, reason: String },

    /// Description was empty after trimming
    #[error("Alarm description must not be empty")]
    EmptyDescription,
}

impl DomainError {
    /// Creates an `InvalidSchedule` error for the given input.
    pub fn invalid_schedule(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

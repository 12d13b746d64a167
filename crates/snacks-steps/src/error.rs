//! Step errors.

use snacks_core::error::DomainError;
use thiserror::Error;

/// Errors produced while building a step or reading its receipt.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StepError {
    /// The current metadata pointer's last segment is not a number.
    #[error("metadata pointer {0:?} has a non-numeric final segment")]
    NonNumericPointer(String),

    /// No base metadata pointers are configured.
    #[error("no base metadata pointers configured")]
    NoBasePointers,

    /// The step needs a value an earlier step should have produced.
    #[error("{step} requires {missing}")]
    MissingPrerequisite {
        /// Step being built.
        step: &'static str,
        /// What is missing.
        missing: &'static str,
    },

    /// The receipt does not carry the expected event.
    #[error("receipt has no {0} event")]
    MissingEvent(&'static str),

    /// Computed, queried and emitted bound-account addresses disagree.
    #[error("bound account mismatch: {0}")]
    AccountMismatch(String),

    /// A view call returned data that does not decode.
    #[error("undecodable call result: {0}")]
    Decode(String),
}

impl From<StepError> for DomainError {
    fn from(err: StepError) -> Self {
        match err {
            StepError::NonNumericPointer(_) | StepError::NoBasePointers => {
                Self::Configuration(err.to_string())
            }
            StepError::MissingPrerequisite { .. } => Self::Validation(err.to_string()),
            StepError::MissingEvent(_) | StepError::AccountMismatch(_) | StepError::Decode(_) => {
                Self::Consistency(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_errors_are_configuration_errors() {
        let err: DomainError = StepError::NonNumericPointer("cid/abc".into()).into();
        assert!(matches!(err, DomainError::Configuration(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_account_mismatch_is_consistency_error() {
        let err: DomainError = StepError::AccountMismatch("a != b".into()).into();
        assert!(matches!(err, DomainError::Consistency(_)));
    }
}

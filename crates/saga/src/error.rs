//! Saga error types.

use common::SagaId;
use domain::{DomainError, ReservationError};
use store::StoreError;
use thiserror::Error;

use crate::state::SagaState;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The cart could not be reserved.
    #[error("{0}")]
    Reservation(#[from] ReservationError),

    /// Credit-card checkout without a payment token.
    #[error("Payment token is required for credit-card payments")]
    MissingPaymentToken,

    /// A saga with this request id already ran.
    #[error("Order request {0} was already submitted")]
    DuplicateRequest(SagaId),

    /// The gateway declined the charge.
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    /// The gateway could not be reached or returned an error.
    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    /// The confirmation could not be delivered.
    #[error("Notification error: {0}")]
    Notification(String),

    /// The phone number cannot be used for guest verification.
    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    /// The verification service failed.
    #[error("Verification service error: {0}")]
    Verification(String),

    /// No saga log exists for the id.
    #[error("Saga not found: {0}")]
    SagaNotFound(SagaId),

    /// Saga is in an invalid state for the requested operation.
    #[error("Invalid saga state: expected {expected}, actual {actual}")]
    InvalidState { expected: String, actual: SagaState },

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification used at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is wrong: unknown items, no stock, missing token.
    ClientInput,
    /// The gateway declined or failed.
    Payment,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Returns the label used in metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ClientInput => "client_input",
            ErrorKind::Payment => "payment",
            ErrorKind::Internal => "internal",
        }
    }
}

impl SagaError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SagaError::Reservation(_)
            | SagaError::MissingPaymentToken
            | SagaError::DuplicateRequest(_)
            | SagaError::InvalidPhone(_)
            | SagaError::Domain(_) => ErrorKind::ClientInput,
            SagaError::PaymentDeclined(_) | SagaError::PaymentGateway(_) => ErrorKind::Payment,
            SagaError::Notification(_)
            | SagaError::Verification(_)
            | SagaError::SagaNotFound(_)
            | SagaError::InvalidState { .. }
            | SagaError::Store(_)
            | SagaError::Serialization(_) => ErrorKind::Internal,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProductId;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            SagaError::Reservation(ReservationError::ProductNotFound(ProductId::new())).kind(),
            ErrorKind::ClientInput
        );
        assert_eq!(SagaError::MissingPaymentToken.kind(), ErrorKind::ClientInput);
        assert_eq!(
            SagaError::PaymentDeclined("card declined".into()).kind(),
            ErrorKind::Payment
        );
        assert_eq!(
            SagaError::Store(StoreError::Unavailable("down".into())).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_reservation_message_is_passed_through() {
        let err = SagaError::from(ReservationError::EmptyCart);
        assert_eq!(err.to_string(), "No order items");
    }
}

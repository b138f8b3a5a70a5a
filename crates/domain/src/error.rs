//! Domain error types.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::order::OrderError;
use crate::reservation::ReservationError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A product or variant failed validation.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// An order flag transition was rejected.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// A cart could not be reserved against the catalog.
    #[error("Reservation error: {0}")]
    Reservation(#[from] ReservationError),
}

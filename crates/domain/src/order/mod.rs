//! Placed orders and their owners.

mod model;
mod owner;

pub use model::{Order, OrderLine, PaymentResult};
pub use owner::{Contact, GuestIdentity, OrderOwner, RegisteredUser};

use common::OrderId;
use thiserror::Error;

/// Errors that can occur when updating an order's flags.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The order was already marked paid.
    #[error("Order {0} is already paid")]
    AlreadyPaid(OrderId),

    /// The order was already marked delivered.
    #[error("Order {0} is already delivered")]
    AlreadyDelivered(OrderId),
}

//! Saga pattern implementation for order placement.
//!
//! The order placement saga follows these steps:
//! 1. Plan the cart against the catalog (pure, no side effects)
//! 2. Reserve stock with conditional decrements
//! 3. Capture payment for credit-card orders
//! 4. Persist the order
//! 5. Send a confirmation (best effort)
//!
//! If any of steps 2-4 fails, every reservation recorded in the saga log is
//! released. The log is keyed by the request id, so releasing is idempotent.
//!
//! The crate also holds the guest gate: phone verification and the
//! short-lived sessions issued after it.

pub mod aggregate;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod guest;
pub mod order_placement;
pub mod services;
pub mod state;

pub use aggregate::{Reservation, SagaInstance};
pub use coordinator::{DEFAULT_CURRENCY, OrderSaga};
pub use error::{ErrorKind, SagaError};
pub use events::SagaEvent;
pub use guest::{GuestSession, GuestSessions};
pub use order_placement::PlaceOrder;
pub use services::{
    Attachment, Charge, ChargeRequest, GuestVerifier, InMemoryGuestVerifier,
    InMemoryNotifier, InMemoryPaymentGateway, LogNotifier, Notifier, PaymentGateway,
    SentNotification, VerificationStatus,
};
pub use state::SagaState;

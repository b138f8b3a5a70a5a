//! External collaborators of the order saga and the guest gate.

pub mod notification;
pub mod payment;
pub mod verification;

pub use notification::{Attachment, InMemoryNotifier, LogNotifier, Notifier, SentNotification};
pub use payment::{Charge, ChargeRequest, InMemoryPaymentGateway, PaymentGateway};
pub use verification::{
    GuestVerifier, InMemoryGuestVerifier, VerificationStatus, normalize_phone,
};

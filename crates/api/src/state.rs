//! Shared application state.

use std::sync::Arc;

use saga::{GuestSessions, GuestVerifier, InMemoryPaymentGateway, LogNotifier, OrderSaga};
use store::Store;

/// The order saga as wired into the server.
pub type StoreSaga<S> = OrderSaga<S, InMemoryPaymentGateway, LogNotifier>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub saga: StoreSaga<S>,
    pub guest_sessions: GuestSessions,
    pub verifier: Arc<dyn GuestVerifier>,
    /// Key admin routes require. `None` disables admin routes.
    pub admin_key: Option<String>,
}

impl<S: Store> AppState<S> {
    /// Returns the store behind the saga.
    pub fn store(&self) -> &S {
        self.saga.store()
    }
}

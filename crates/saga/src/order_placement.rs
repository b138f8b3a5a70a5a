//! Order placement saga constants and command.

use common::SagaId;
use domain::{CartLine, Money, OrderOwner, PaymentMethod, ShippingAddress};

/// The saga type identifier for order placement.
pub const SAGA_TYPE: &str = "OrderPlacement";

/// Step name: Decrement stock for every planned line.
pub const STEP_RESERVE_STOCK: &str = "reserve_stock";

/// Step name: Charge the card through the payment gateway.
pub const STEP_CAPTURE_PAYMENT: &str = "capture_payment";

/// Step name: Write the order document.
pub const STEP_PERSIST_ORDER: &str = "persist_order";

/// A checkout request.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    /// Request id. The saga log is keyed by it, so resubmitting the same id
    /// is rejected and compensation can be retried for it.
    pub saga_id: SagaId,
    pub owner: OrderOwner,
    pub lines: Vec<CartLine>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    /// Total the client computed. Informational only.
    pub declared_total: Option<Money>,
    pub payment_token: Option<String>,
}

impl PlaceOrder {
    /// Creates a command with a fresh request id.
    pub fn new(
        owner: OrderOwner,
        lines: Vec<CartLine>,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
    ) -> Self {
        Self {
            saga_id: SagaId::new(),
            owner,
            lines,
            shipping_address,
            payment_method,
            declared_total: None,
            payment_token: None,
        }
    }

    /// Sets the request id.
    pub fn with_saga_id(mut self, saga_id: SagaId) -> Self {
        self.saga_id = saga_id;
        self
    }

    /// Sets the total the client expects to pay.
    pub fn with_declared_total(mut self, total: Money) -> Self {
        self.declared_total = Some(total);
        self
    }

    /// Sets the card token passed to the gateway.
    pub fn with_payment_token(mut self, token: impl Into<String>) -> Self {
        self.payment_token = Some(token.into());
        self
    }

    /// Returns the payment token if it is present and not blank.
    pub fn usable_token(&self) -> Option<&str> {
        self.payment_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

//! Order confirmation notifier trait and implementations.

use std::fmt::Write as _;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::{Contact, Order};

use crate::error::SagaError;

/// A document attached to a confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub body: String,
}

impl Attachment {
    /// Renders a plain-text receipt for an order.
    pub fn receipt(order: &Order) -> Self {
        let mut body = String::new();
        let _ = writeln!(body, "Receipt for order {}", order.id);
        let _ = writeln!(body, "Placed: {}", order.created_at.format("%Y-%m-%d %H:%M UTC"));
        let _ = writeln!(body, "Customer: {}", order.owner.display_name());
        let _ = writeln!(body);
        for line in &order.lines {
            let _ = writeln!(
                body,
                "{} x{} @ {} = {}",
                line.product_name,
                line.quantity,
                line.unit_price,
                line.line_total()
            );
        }
        let _ = writeln!(body);
        let _ = writeln!(body, "Total: {}", order.total_price);
        let _ = writeln!(body, "Payment: {}", order.payment_method);
        let _ = writeln!(body, "Paid: {}", if order.is_paid { "yes" } else { "no" });
        let address = &order.shipping_address;
        let _ = writeln!(
            body,
            "Ship to: {}, {} {}, {}",
            address.address, address.city, address.postal_code, address.country
        );

        Self {
            filename: format!("receipt-{}.txt", order.id),
            content_type: "text/plain".to_string(),
            body,
        }
    }
}

/// Trait for sending order confirmations.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends a confirmation for a persisted order.
    async fn send_order_confirmation(
        &self,
        contact: &Contact,
        order: &Order,
        attachment: &Attachment,
    ) -> Result<(), SagaError>;
}

/// A confirmation accepted by [`InMemoryNotifier`].
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub contact: Contact,
    pub order_id: OrderId,
    pub attachment: Attachment,
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<SentNotification>,
    fail_on_send: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every send.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_send = fail;
    }

    /// Returns the number of confirmations sent.
    pub fn sent_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .len()
    }

    /// Returns every confirmation sent so far.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send_order_confirmation(
        &self,
        contact: &Contact,
        order: &Order,
        attachment: &Attachment,
    ) -> Result<(), SagaError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail_on_send {
            return Err(SagaError::Notification("Mail server unavailable".to_string()));
        }
        state.sent.push(SentNotification {
            contact: contact.clone(),
            order_id: order.id,
            attachment: attachment.clone(),
        });
        Ok(())
    }
}

/// Notifier that only logs. Used when no delivery channel is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_order_confirmation(
        &self,
        contact: &Contact,
        order: &Order,
        attachment: &Attachment,
    ) -> Result<(), SagaError> {
        tracing::info!(
            order_id = %order.id,
            %contact,
            attachment = %attachment.filename,
            "order confirmation"
        );
        Ok(())
    }
}

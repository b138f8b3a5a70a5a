use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, VariantId};
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderOwner};
use crate::reservation::{ReservationLine, ReservationPlan};
use crate::value_objects::{Money, PaymentMethod, ShippingAddress};

/// A purchased line. The unit price is copied at placement and never
/// recomputed from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLine {
    /// Returns quantity times unit price.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

impl From<&ReservationLine> for OrderLine {
    fn from(line: &ReservationLine) -> Self {
        Self {
            product_id: line.product_id,
            variant_id: line.variant_id,
            product_name: line.product_name.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
        }
    }
}

/// Record of a captured charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    /// Charge id assigned by the payment gateway.
    pub id: String,
    pub status: String,
    pub update_time: DateTime<Utc>,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner: OrderOwner,
    pub lines: Vec<OrderLine>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub total_price: Money,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_result: Option<PaymentResult>,
    pub is_seen: bool,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Builds a new, unseen order from a reservation plan.
    ///
    /// The order counts as paid exactly when a payment result is supplied.
    pub fn place(
        owner: OrderOwner,
        plan: &ReservationPlan,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
        payment_result: Option<PaymentResult>,
    ) -> Self {
        let paid_at = payment_result.as_ref().map(|r| r.update_time);
        Self {
            id: OrderId::new(),
            owner,
            lines: plan.lines().iter().map(OrderLine::from).collect(),
            shipping_address,
            payment_method,
            total_price: plan.total(),
            is_paid: payment_result.is_some(),
            paid_at,
            payment_result,
            is_seen: false,
            is_delivered: false,
            delivered_at: None,
            created_at: Utc::now(),
        }
    }

    /// Records a payment made after placement, e.g. cash on delivery.
    pub fn mark_paid(&mut self, payment_result: Option<PaymentResult>) -> Result<(), OrderError> {
        if self.is_paid {
            return Err(OrderError::AlreadyPaid(self.id));
        }
        self.is_paid = true;
        self.paid_at = Some(
            payment_result
                .as_ref()
                .map(|r| r.update_time)
                .unwrap_or_else(Utc::now),
        );
        if payment_result.is_some() {
            self.payment_result = payment_result;
        }
        Ok(())
    }

    /// Marks the order delivered.
    pub fn mark_delivered(&mut self) -> Result<(), OrderError> {
        if self.is_delivered {
            return Err(OrderError::AlreadyDelivered(self.id));
        }
        self.is_delivered = true;
        self.delivered_at = Some(Utc::now());
        Ok(())
    }

    /// Clears the unseen marker shown to admins. Idempotent.
    pub fn mark_seen(&mut self) {
        self.is_seen = true;
    }

    /// Total number of units across all lines.
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }
}

//! Saga log events.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, SagaId, VariantId};
use domain::{Money, PaymentMethod};
use serde::{Deserialize, Serialize};

/// Events recorded while placing an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// The cart was planned and placement began.
    SagaStarted(SagaStartedData),

    /// Stock for one line was decremented.
    StockReserved(StockData),

    /// A reservation was claimed for release.
    StockReleased(StockData),

    /// Releasing a reservation failed; it stays outstanding.
    ReleaseFailed(ReleaseFailedData),

    /// The gateway captured the charge.
    PaymentCaptured(PaymentCapturedData),

    /// The order document was written.
    OrderPersisted(OrderPersistedData),

    /// A saga step failed.
    StepFailed(StepFailedData),

    /// Compensation started after a step failure.
    CompensationStarted(CompensationData),

    /// Saga completed successfully.
    SagaCompleted(SagaCompletedData),

    /// Saga failed after compensation.
    SagaFailed(SagaFailedData),
}

impl SagaEvent {
    /// Returns the name stored alongside the payload.
    pub fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaStarted(_) => "SagaStarted",
            SagaEvent::StockReserved(_) => "StockReserved",
            SagaEvent::StockReleased(_) => "StockReleased",
            SagaEvent::ReleaseFailed(_) => "ReleaseFailed",
            SagaEvent::PaymentCaptured(_) => "PaymentCaptured",
            SagaEvent::OrderPersisted(_) => "OrderPersisted",
            SagaEvent::StepFailed(_) => "StepFailed",
            SagaEvent::CompensationStarted(_) => "CompensationStarted",
            SagaEvent::SagaCompleted(_) => "SagaCompleted",
            SagaEvent::SagaFailed(_) => "SagaFailed",
        }
    }
}

/// Data for SagaStarted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaStartedData {
    /// The request id the saga is keyed by.
    pub saga_id: SagaId,
    /// The type of saga (e.g., "OrderPlacement").
    pub saga_type: String,
    pub payment_method: PaymentMethod,
    /// Total computed from the reservation plan.
    pub total: Money,
    pub started_at: DateTime<Utc>,
}

/// One stock movement. `index` is the position of the reservation in the
/// order it was made, so duplicate variants stay distinguishable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockData {
    pub index: usize,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub quantity: u32,
}

/// Data for ReleaseFailed event. Carries the whole reservation so the log
/// alone is enough to retry the release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseFailedData {
    #[serde(flatten)]
    pub stock: StockData,
    pub error: String,
}

/// Data for PaymentCaptured event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCapturedData {
    /// Charge id assigned by the gateway.
    pub charge_id: String,
    pub status: String,
}

/// Data for OrderPersisted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPersistedData {
    pub order_id: OrderId,
}

/// Data for StepFailed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFailedData {
    /// The step that failed.
    pub step_name: String,
    /// Error message describing the failure.
    pub error: String,
}

/// Data for CompensationStarted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationData {
    pub reason: String,
}

/// Data for SagaCompleted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaCompletedData {
    pub completed_at: DateTime<Utc>,
}

/// Data for SagaFailed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaFailedData {
    /// Reason for failure.
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

// Convenience constructors
impl SagaEvent {
    /// Creates a SagaStarted event.
    pub fn saga_started(
        saga_id: SagaId,
        saga_type: impl Into<String>,
        payment_method: PaymentMethod,
        total: Money,
    ) -> Self {
        SagaEvent::SagaStarted(SagaStartedData {
            saga_id,
            saga_type: saga_type.into(),
            payment_method,
            total,
            started_at: Utc::now(),
        })
    }

    /// Creates a StockReserved event.
    pub fn stock_reserved(
        index: usize,
        product_id: ProductId,
        variant_id: VariantId,
        quantity: u32,
    ) -> Self {
        SagaEvent::StockReserved(StockData {
            index,
            product_id,
            variant_id,
            quantity,
        })
    }

    /// Creates a StockReleased event.
    pub fn stock_released(
        index: usize,
        product_id: ProductId,
        variant_id: VariantId,
        quantity: u32,
    ) -> Self {
        SagaEvent::StockReleased(StockData {
            index,
            product_id,
            variant_id,
            quantity,
        })
    }

    /// Creates a ReleaseFailed event.
    pub fn release_failed(
        index: usize,
        product_id: ProductId,
        variant_id: VariantId,
        quantity: u32,
        error: impl Into<String>,
    ) -> Self {
        SagaEvent::ReleaseFailed(ReleaseFailedData {
            stock: StockData {
                index,
                product_id,
                variant_id,
                quantity,
            },
            error: error.into(),
        })
    }

    /// Creates a PaymentCaptured event.
    pub fn payment_captured(charge_id: impl Into<String>, status: impl Into<String>) -> Self {
        SagaEvent::PaymentCaptured(PaymentCapturedData {
            charge_id: charge_id.into(),
            status: status.into(),
        })
    }

    /// Creates an OrderPersisted event.
    pub fn order_persisted(order_id: OrderId) -> Self {
        SagaEvent::OrderPersisted(OrderPersistedData { order_id })
    }

    /// Creates a StepFailed event.
    pub fn step_failed(step_name: impl Into<String>, error: impl Into<String>) -> Self {
        SagaEvent::StepFailed(StepFailedData {
            step_name: step_name.into(),
            error: error.into(),
        })
    }

    /// Creates a CompensationStarted event.
    pub fn compensation_started(reason: impl Into<String>) -> Self {
        SagaEvent::CompensationStarted(CompensationData {
            reason: reason.into(),
        })
    }

    /// Creates a SagaCompleted event.
    pub fn saga_completed() -> Self {
        SagaEvent::SagaCompleted(SagaCompletedData {
            completed_at: Utc::now(),
        })
    }

    /// Creates a SagaFailed event.
    pub fn saga_failed(reason: impl Into<String>) -> Self {
        SagaEvent::SagaFailed(SagaFailedData {
            reason: reason.into(),
            failed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type() {
        let product_id = ProductId::new();
        let variant_id = VariantId::new();

        assert_eq!(
            SagaEvent::saga_started(
                SagaId::new(),
                "OrderPlacement",
                PaymentMethod::Cash,
                Money::from_cents(100)
            )
            .event_type(),
            "SagaStarted"
        );
        assert_eq!(
            SagaEvent::stock_reserved(0, product_id, variant_id, 2).event_type(),
            "StockReserved"
        );
        assert_eq!(
            SagaEvent::stock_released(0, product_id, variant_id, 2).event_type(),
            "StockReleased"
        );
        assert_eq!(
            SagaEvent::release_failed(0, product_id, variant_id, 2, "store down").event_type(),
            "ReleaseFailed"
        );
        assert_eq!(
            SagaEvent::payment_captured("ch_1", "succeeded").event_type(),
            "PaymentCaptured"
        );
        assert_eq!(
            SagaEvent::order_persisted(OrderId::new()).event_type(),
            "OrderPersisted"
        );
        assert_eq!(SagaEvent::saga_completed().event_type(), "SagaCompleted");
        assert_eq!(SagaEvent::saga_failed("declined").event_type(), "SagaFailed");
    }

    #[test]
    fn test_stock_reserved_data() {
        let product_id = ProductId::new();
        let variant_id = VariantId::new();
        let event = SagaEvent::stock_reserved(3, product_id, variant_id, 7);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StockReserved");
        assert_eq!(json["data"]["index"], 3);

        let deserialized: SagaEvent = serde_json::from_value(json).unwrap();
        if let SagaEvent::StockReserved(data) = deserialized {
            assert_eq!(data.product_id, product_id);
            assert_eq!(data.variant_id, variant_id);
            assert_eq!(data.quantity, 7);
        } else {
            panic!("Expected StockReserved event");
        }
    }

    #[test]
    fn test_release_failed_carries_reservation() {
        let product_id = ProductId::new();
        let variant_id = VariantId::new();
        let event = SagaEvent::release_failed(1, product_id, variant_id, 4, "store down");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ReleaseFailed");
        assert_eq!(json["data"]["index"], 1);
        assert_eq!(json["data"]["quantity"], 4);
        assert_eq!(json["data"]["error"], "store down");

        let SagaEvent::ReleaseFailed(data) = serde_json::from_value(json).unwrap() else {
            panic!("Expected ReleaseFailed event");
        };
        assert_eq!(data.stock.variant_id, variant_id);
    }
}

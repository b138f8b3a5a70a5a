//! Saga instance rebuilt from the saga log.

use std::collections::BTreeMap;

use common::{OrderId, ProductId, SagaId, VariantId};
use serde::{Deserialize, Serialize};
use store::{SagaRecord, Version};

use crate::events::{SagaEvent, StockData};
use crate::state::SagaState;

/// A stock decrement made by the saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub quantity: u32,
    pub released: bool,
}

impl Reservation {
    fn from_stock(data: &StockData, released: bool) -> Self {
        Self {
            product_id: data.product_id,
            variant_id: data.variant_id,
            quantity: data.quantity,
            released,
        }
    }
}

/// An event-sourced saga instance.
///
/// Tracks every reservation the saga made and whether it has been released,
/// which is what makes compensation safe to run more than once. Reservations
/// are keyed by the index in their event, so a log missing an event still
/// maps every later event onto the right line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SagaInstance {
    id: Option<SagaId>,
    version: Version,
    saga_type: String,
    state: SagaState,
    reservations: BTreeMap<usize, Reservation>,
    charge_id: Option<String>,
    order_id: Option<OrderId>,
    failure_reason: Option<String>,
    release_failures: u32,
}

impl SagaInstance {
    /// Rebuilds a saga from its records. Returns `None` for an empty log.
    pub fn from_records(records: Vec<SagaRecord>) -> Result<Option<Self>, serde_json::Error> {
        if records.is_empty() {
            return Ok(None);
        }

        let mut saga = SagaInstance::default();
        for record in records {
            let version = record.version;
            let event: SagaEvent = serde_json::from_value(record.payload)?;
            saga.apply(event);
            saga.set_version(version);
        }
        Ok(Some(saga))
    }

    pub fn id(&self) -> Option<SagaId> {
        self.id
    }

    /// Version of the last applied record.
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn apply(&mut self, event: SagaEvent) {
        match event {
            SagaEvent::SagaStarted(data) => {
                self.id = Some(data.saga_id);
                self.saga_type = data.saga_type;
                self.state = SagaState::Running;
            }
            SagaEvent::StockReserved(data) => {
                self.reservations
                    .insert(data.index, Reservation::from_stock(&data, false));
            }
            SagaEvent::StockReleased(data) => {
                self.reservations
                    .insert(data.index, Reservation::from_stock(&data, true));
            }
            SagaEvent::ReleaseFailed(data) => {
                self.reservations
                    .insert(data.stock.index, Reservation::from_stock(&data.stock, false));
                self.release_failures += 1;
            }
            SagaEvent::PaymentCaptured(data) => {
                self.charge_id = Some(data.charge_id);
            }
            SagaEvent::OrderPersisted(data) => {
                self.order_id = Some(data.order_id);
            }
            SagaEvent::StepFailed(data) => {
                self.failure_reason = Some(data.error);
            }
            SagaEvent::CompensationStarted(_) => {
                self.state = SagaState::Compensating;
            }
            SagaEvent::SagaCompleted(_) => {
                self.state = SagaState::Completed;
            }
            SagaEvent::SagaFailed(data) => {
                self.state = SagaState::Failed;
                self.failure_reason = Some(data.reason);
            }
        }
    }
}

// Query methods
impl SagaInstance {
    /// Returns the saga state.
    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Returns the saga type.
    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    /// Returns every reservation by index, released or not.
    pub fn reservations(&self) -> &BTreeMap<usize, Reservation> {
        &self.reservations
    }

    /// Returns reservations that still hold stock, with their indexes, in
    /// index order.
    pub fn outstanding_reservations(&self) -> Vec<(usize, Reservation)> {
        self.reservations
            .iter()
            .filter(|(_, r)| !r.released)
            .map(|(i, r)| (*i, r.clone()))
            .collect()
    }

    /// Returns the captured charge id, if any.
    pub fn charge_id(&self) -> Option<&str> {
        self.charge_id.as_deref()
    }

    /// Returns the persisted order id, if any.
    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    /// Returns the failure reason, if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Number of release attempts that failed.
    pub fn release_failures(&self) -> u32 {
        self.release_failures
    }
}

//! Payment gateway trait and in-memory implementation.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SagaError;

/// A charge to create through the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    /// Amount in minor currency units (cents).
    pub amount_minor: i64,
    /// ISO currency code, lowercase.
    pub currency: String,
    /// Card token collected by the client.
    pub source: String,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

/// A charge the gateway accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Trait for card payment capture.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates and captures a charge.
    ///
    /// Declines and transport failures are both payment errors.
    async fn create_charge(&self, request: ChargeRequest) -> Result<Charge, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    charges: Vec<(String, ChargeRequest)>,
    attempts: usize,
    next_id: u32,
    fail_on_charge: bool,
}

/// In-memory payment gateway for testing and local development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory payment gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to decline every charge.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_charge = fail;
    }

    /// Returns the number of accepted charges.
    pub fn charge_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .charges
            .len()
    }

    /// Returns the number of calls, accepted or not.
    pub fn attempt_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .attempts
    }

    /// Returns the request behind an accepted charge.
    pub fn charge(&self, charge_id: &str) -> Option<ChargeRequest> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .charges
            .iter()
            .find(|(id, _)| id == charge_id)
            .map(|(_, request)| request.clone())
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_charge(&self, request: ChargeRequest) -> Result<Charge, SagaError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.attempts += 1;

        if state.fail_on_charge {
            return Err(SagaError::PaymentDeclined("Your card was declined".to_string()));
        }
        if request.amount_minor <= 0 {
            return Err(SagaError::PaymentGateway(format!(
                "Invalid amount: {}",
                request.amount_minor
            )));
        }

        state.next_id += 1;
        let id = format!("ch_{:04}", state.next_id);
        state.charges.push((id.clone(), request));

        Ok(Charge {
            id,
            status: "succeeded".to_string(),
            created_at: Utc::now(),
        })
    }
}

//! Phone verification for guest checkout.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SagaError;

/// Outcome of checking a one-time code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerificationStatus {
    Approved,
    Denied,
}

/// Trait for the external verification service.
#[async_trait]
pub trait GuestVerifier: Send + Sync {
    /// Sends a one-time code to `phone`. Returns the attempt id.
    async fn request_code(&self, phone: &str) -> Result<String, SagaError>;

    /// Checks a code previously sent to `phone`.
    async fn verify_code(&self, phone: &str, code: &str) -> Result<VerificationStatus, SagaError>;
}

/// Rejects empty numbers and anything but digits with an optional leading `+`.
pub fn normalize_phone(phone: &str) -> Result<String, SagaError> {
    let trimmed = phone.trim();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if digits.len() < 6 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(SagaError::InvalidPhone(phone.to_string()));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug)]
struct PendingCode {
    attempt_id: String,
    code: String,
}

#[derive(Debug, Default)]
struct InMemoryVerifierState {
    pending: HashMap<String, PendingCode>,
    fixed_code: Option<String>,
}

/// In-memory verifier for testing and local development.
///
/// Codes are never delivered anywhere; tests read them back with
/// [`InMemoryGuestVerifier::pending_code`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryGuestVerifier {
    state: Arc<RwLock<InMemoryVerifierState>>,
}

impl InMemoryGuestVerifier {
    /// Creates a verifier that issues random six-digit codes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a verifier that always issues `code`.
    pub fn with_fixed_code(code: impl Into<String>) -> Self {
        let verifier = Self::default();
        verifier
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fixed_code = Some(code.into());
        verifier
    }

    /// Returns the outstanding code for a phone number.
    pub fn pending_code(&self, phone: &str) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .get(phone.trim())
            .map(|p| p.code.clone())
    }
}

#[async_trait]
impl GuestVerifier for InMemoryGuestVerifier {
    async fn request_code(&self, phone: &str) -> Result<String, SagaError> {
        let phone = normalize_phone(phone)?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let code = state
            .fixed_code
            .clone()
            .unwrap_or_else(|| format!("{:06}", Uuid::new_v4().as_u128() % 1_000_000));
        let attempt_id = format!("VE{}", Uuid::new_v4().simple());

        tracing::debug!(%phone, %attempt_id, "verification code issued");
        state.pending.insert(
            phone,
            PendingCode {
                attempt_id: attempt_id.clone(),
                code,
            },
        );
        Ok(attempt_id)
    }

    async fn verify_code(&self, phone: &str, code: &str) -> Result<VerificationStatus, SagaError> {
        let phone = normalize_phone(phone)?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        match state.pending.get(&phone) {
            Some(pending) if pending.code == code.trim() => {
                tracing::debug!(%phone, attempt_id = %pending.attempt_id, "verification approved");
                state.pending.remove(&phone);
                Ok(VerificationStatus::Approved)
            }
            _ => Ok(VerificationStatus::Denied),
        }
    }
}

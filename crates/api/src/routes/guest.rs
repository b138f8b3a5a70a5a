//! Guest checkout gate: phone verification and session issue.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use chrono::{DateTime, Utc};
use saga::VerificationStatus;
use saga::services::normalize_phone;
use serde::{Deserialize, Serialize};
use store::Store;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    pub phone: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpResponse {
    pub attempt_id: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// POST /guest/otp: send a one-time code to the phone.
#[tracing::instrument(skip(state, payload))]
pub async fn request_code<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<OtpRequest>, JsonRejection>,
) -> Result<Json<OtpResponse>, ApiError> {
    let Json(req) = payload?;
    let phone = normalize_phone(&req.phone)?;
    let attempt_id = state.verifier.request_code(&phone).await?;
    Ok(Json(OtpResponse { attempt_id }))
}

/// POST /guest/verify: exchange a correct code for a guest session.
#[tracing::instrument(skip(state, payload))]
pub async fn verify<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let Json(req) = payload?;
    let phone = normalize_phone(&req.phone)?;
    match state.verifier.verify_code(&phone, &req.code).await? {
        VerificationStatus::Approved => {
            let session = state.guest_sessions.issue(phone).await;
            tracing::info!("guest session issued");
            Ok(Json(VerifyResponse {
                token: session.token,
                expires_at: session.expires_at,
            }))
        }
        VerificationStatus::Denied => Err(ApiError::Unauthorized(
            "Invalid verification code".to_string(),
        )),
    }
}

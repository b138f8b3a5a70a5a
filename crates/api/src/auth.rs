//! Request identity.
//!
//! Registered users arrive with headers set by the upstream auth layer.
//! Guests carry a bearer token issued by `POST /guest/verify`. Admin routes
//! need the configured admin key.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use common::UserId;
use domain::{GuestIdentity, Order, OrderOwner, RegisteredUser};
use saga::GuestSession;
use store::{OrderQuery, Store};

use crate::error::ApiError;
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Whoever is making the request.
#[derive(Debug, Clone)]
pub enum Caller {
    Registered(RegisteredUser),
    Guest(GuestSession),
}

impl Caller {
    /// The owner recorded on orders this caller places.
    pub fn owner(&self) -> OrderOwner {
        match self {
            Caller::Registered(user) => OrderOwner::Registered(user.clone()),
            Caller::Guest(session) => OrderOwner::Guest(GuestIdentity {
                phone: session.phone.clone(),
            }),
        }
    }

    /// Returns true if the caller placed `order`.
    pub fn owns(&self, order: &Order) -> bool {
        match (self, &order.owner) {
            (Caller::Registered(user), OrderOwner::Registered(owner)) => user.id == owner.id,
            (Caller::Guest(session), OrderOwner::Guest(owner)) => session.phone == owner.phone,
            _ => false,
        }
    }

    /// Query for the caller's own orders.
    pub fn orders_query(&self) -> OrderQuery {
        match self {
            Caller::Registered(user) => OrderQuery::for_user(user.id),
            Caller::Guest(session) => OrderQuery::for_guest(session.phone.clone()),
        }
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Resolves the caller from request headers.
///
/// Returns `Ok(None)` when the request carries no identity at all, and an
/// error when it carries one that is malformed or expired.
pub async fn resolve_caller<S: Store>(
    headers: &HeaderMap,
    state: &AppState<S>,
) -> Result<Option<Caller>, ApiError> {
    if let Some(raw_id) = header_value(headers, USER_ID_HEADER) {
        let id = UserId::parse_str(raw_id)
            .map_err(|_| ApiError::Unauthorized("Invalid user id".to_string()))?;
        return Ok(Some(Caller::Registered(RegisteredUser {
            id,
            name: header_value(headers, USER_NAME_HEADER).map(String::from),
            email: header_value(headers, USER_EMAIL_HEADER).map(String::from),
        })));
    }

    let Some(authorization) = header_value(headers, AUTHORIZATION.as_str()) else {
        return Ok(None);
    };
    let token = authorization
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Malformed authorization header".to_string()))?;

    match state.guest_sessions.resolve(token).await {
        Some(session) => Ok(Some(Caller::Guest(session))),
        None => Err(ApiError::Unauthorized(
            "Guest session expired or unknown".to_string(),
        )),
    }
}

/// Checks the admin key header against configuration.
pub fn check_admin<S: Store>(headers: &HeaderMap, state: &AppState<S>) -> Result<(), ApiError> {
    let Some(expected) = state.admin_key.as_deref() else {
        return Err(ApiError::Forbidden(
            "Admin access is not configured".to_string(),
        ));
    };
    match header_value(headers, ADMIN_KEY_HEADER) {
        None => Err(ApiError::Unauthorized("Admin key required".to_string())),
        Some(key) if key == expected => Ok(()),
        Some(_) => Err(ApiError::Forbidden("Not authorized as admin".to_string())),
    }
}

impl<S: Store> FromRequestParts<Arc<AppState<S>>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        resolve_caller(&parts.headers, state)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Not authorized".to_string()))
    }
}

/// Marker extractor for admin-only routes.
#[derive(Debug, Clone, Copy)]
pub struct Admin;

impl<S: Store> FromRequestParts<Arc<AppState<S>>> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        check_admin(&parts.headers, state).map(|()| Admin)
    }
}

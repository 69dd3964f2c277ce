//! Caller identity from trusted upstream headers.
//!
//! An upstream gateway authenticates the caller and forwards who they are.
//! Nothing here verifies the claim.

use std::str::FromStr;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use dispatch_core::model::RequesterId;
use dispatch_core::DispatchError;

use crate::error::ApiError;

pub const REQUESTER_ID_HEADER: &str = "x-requester-id";
pub const REQUESTER_ROLE_HEADER: &str = "x-requester-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Passenger,
    Driver,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn is_operator(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

impl FromStr for Role {
    type Err = DispatchError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PASSENGER" => Ok(Role::Passenger),
            "DRIVER" => Ok(Role::Driver),
            "ADMIN" => Ok(Role::Admin),
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            other => Err(DispatchError::Forbidden(format!("unknown role '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub requester_id: RequesterId,
    pub role: Role,
}

impl Identity {
    pub fn require_operator(&self) -> Result<(), ApiError> {
        if self.role.is_operator() {
            Ok(())
        } else {
            Err(DispatchError::Forbidden("operator role required".to_string()).into())
        }
    }

    /// Position reports come from drivers or operators.
    pub fn require_fleet_reporter(&self) -> Result<(), ApiError> {
        if self.role == Role::Driver || self.role.is_operator() {
            Ok(())
        } else {
            Err(DispatchError::Forbidden("driver or operator role required".to_string()).into())
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, DispatchError> {
        let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

        let requester_id = header(REQUESTER_ID_HEADER)
            .ok_or_else(|| DispatchError::Forbidden("missing requester identity".to_string()))?
            .trim()
            .parse::<RequesterId>()
            .map_err(|_| DispatchError::validation("x-requester-id must be a UUID"))?;
        // Callers without a role header are passengers.
        let role = match header(REQUESTER_ROLE_HEADER) {
            Some(raw) => raw.parse::<Role>()?,
            None => Role::Passenger,
        };
        Ok(Self { requester_id, role })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Identity::from_headers(&parts.headers)?)
    }
}

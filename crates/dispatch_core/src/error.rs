//! Error taxonomy for engine operations.
//!
//! Routing-provider failures have no variant here. They stay inside the ETA
//! enricher and surface as empty enrichment fields.

use std::sync::{Mutex, MutexGuard};

use crate::model::{HailId, RouteKey, VehicleId};

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Lock a table, turning a poisoned mutex into a storage failure.
pub(crate) fn lock_table<'a, T>(
    table: &'a Mutex<T>,
    name: &str,
) -> DispatchResult<MutexGuard<'a, T>> {
    table
        .lock()
        .map_err(|_| DispatchError::Storage(format!("{name} table lock poisoned")))
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("origin and destination terminals must differ")]
    InvalidRoute,
    #[error("a pending request for this route already exists (hail {existing})")]
    DuplicateRequest { existing: HailId },
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("no {side} terminal matches '{fragment}'")]
    NoMatchingTerminal { side: &'static str, fragment: String },
    #[error("vehicle {0} is unknown or not active")]
    VehicleUnavailable(VehicleId),
    #[error("no pending hails for route {0}")]
    NoPendingDemand(RouteKey),
    #[error("hail {0} is no longer pending")]
    HailNotPending(HailId),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Coarse grouping callers use to decide how to surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed input; never retried automatically.
    Validation,
    /// User-correctable duplicate submission.
    Duplicate,
    NotFound,
    /// The resource exists but the operation cannot proceed right now.
    Conflict,
    /// The caller's role may not perform the operation.
    Forbidden,
    /// Fatal for the in-flight request.
    Storage,
}

impl DispatchError {
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        DispatchError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        DispatchError::Validation(message.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            DispatchError::Validation(_) | DispatchError::InvalidRoute => ErrorClass::Validation,
            DispatchError::DuplicateRequest { .. } => ErrorClass::Duplicate,
            DispatchError::NotFound { .. } | DispatchError::NoMatchingTerminal { .. } => {
                ErrorClass::NotFound
            }
            DispatchError::VehicleUnavailable(_)
            | DispatchError::NoPendingDemand(_)
            | DispatchError::HailNotPending(_) => ErrorClass::Conflict,
            DispatchError::Forbidden(_) => ErrorClass::Forbidden,
            DispatchError::Storage(_) => ErrorClass::Storage,
        }
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::Validation(_) => "validation_error",
            DispatchError::InvalidRoute => "invalid_route",
            DispatchError::DuplicateRequest { .. } => "duplicate_request",
            DispatchError::NotFound { .. } => "not_found",
            DispatchError::NoMatchingTerminal { .. } => "no_matching_terminal",
            DispatchError::VehicleUnavailable(_) => "vehicle_unavailable",
            DispatchError::NoPendingDemand(_) => "no_pending_demand",
            DispatchError::HailNotPending(_) => "hail_not_pending",
            DispatchError::Forbidden(_) => "forbidden",
            DispatchError::Storage(_) => "storage_error",
        }
    }
}

//! Durable hail records and their state transitions.
//!
//! A hail is created PENDING and leaves that state exactly once, either to
//! ASSIGNED through [`HailStore::transition_to_assigned`] or to CANCELLED
//! through [`HailStore::cancel`]. Both transitions are compare-and-set on the
//! PENDING state, so concurrent callers can never claim the same row twice.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DispatchResult;
use crate::model::{HailId, HailRequest, RequesterId, RouteKey, TerminalId, VehicleId};

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::InMemoryHailStore;
#[cfg(feature = "postgres")]
pub use postgres::PgHailStore;

/// Fields supplied by the caller when creating a hail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewHail {
    pub requester_id: RequesterId,
    pub origin_id: TerminalId,
    pub destination_id: TerminalId,
}

impl NewHail {
    pub fn route_key(&self) -> RouteKey {
        RouteKey::new(self.origin_id, self.destination_id)
    }
}

#[async_trait]
pub trait HailStore: Send + Sync {
    /// Insert a PENDING hail stamped `at`.
    ///
    /// Fails with `InvalidRoute` when origin equals destination and with
    /// `DuplicateRequest` when the requester already holds a PENDING hail for
    /// the same route inside the duplicate window. The check and the insert are
    /// atomic with respect to each other.
    async fn create(&self, hail: NewHail, at: DateTime<Utc>) -> DispatchResult<HailRequest>;

    async fn get(&self, id: HailId) -> DispatchResult<Option<HailRequest>>;

    /// Every hail of the requester in any state, newest first.
    async fn list_by_requester(&self, requester: RequesterId) -> DispatchResult<Vec<HailRequest>>;

    /// PENDING hails of the requester, oldest first.
    async fn list_pending_by_requester(
        &self,
        requester: RequesterId,
    ) -> DispatchResult<Vec<HailRequest>>;

    /// PENDING hails keyed by route, oldest first inside each group.
    async fn list_pending_grouped_by_route(
        &self,
    ) -> DispatchResult<BTreeMap<RouteKey, Vec<HailRequest>>>;

    /// PENDING hails for one route, oldest first.
    async fn list_pending_for_route(&self, route: RouteKey) -> DispatchResult<Vec<HailRequest>>;

    /// Move each listed hail that is still PENDING to ASSIGNED.
    ///
    /// Ids that are unknown or no longer PENDING are skipped silently. Returns
    /// the ids actually transitioned, in input order.
    async fn transition_to_assigned(
        &self,
        ids: &[HailId],
        vehicle: VehicleId,
        at: DateTime<Utc>,
    ) -> DispatchResult<Vec<HailId>>;

    /// Move the requester's own PENDING hail to CANCELLED.
    ///
    /// A hail owned by someone else is reported as not found.
    async fn cancel(
        &self,
        id: HailId,
        requester: RequesterId,
        at: DateTime<Utc>,
    ) -> DispatchResult<HailRequest>;
}

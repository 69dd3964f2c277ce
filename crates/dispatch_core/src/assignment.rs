//! Commits vehicles to demand groups.
//!
//! The store's conditional transition is the only arbiter between concurrent
//! assignments. The engine reads the PENDING set, hands exactly those ids to
//! the store, and reports what the store actually changed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::{DispatchError, DispatchResult};
use crate::hails::HailStore;
use crate::model::{HailId, RouteKey, ServingClaim, VehicleId};
use crate::registry::FleetRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentResult {
    pub vehicle_id: VehicleId,
    pub route: RouteKey,
    /// PENDING hails seen before the transition.
    pub observed: usize,
    /// Hails this call moved to ASSIGNED. May be below `observed` when a
    /// concurrent assignment or cancellation won some rows.
    pub transitioned: usize,
    pub hail_ids: Vec<HailId>,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AssignmentEngine {
    hails: Arc<dyn HailStore>,
    fleet: Arc<dyn FleetRegistry>,
    clock: Arc<dyn Clock>,
}

impl AssignmentEngine {
    pub fn new(
        hails: Arc<dyn HailStore>,
        fleet: Arc<dyn FleetRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { hails, fleet, clock }
    }

    /// Assign every PENDING hail on `route` to `vehicle_id`.
    pub async fn assign_group(
        &self,
        route: RouteKey,
        vehicle_id: VehicleId,
    ) -> DispatchResult<AssignmentResult> {
        self.require_active(vehicle_id).await?;

        let pending = self.hails.list_pending_for_route(route).await?;
        if pending.is_empty() {
            return Err(DispatchError::NoPendingDemand(route));
        }
        let ids: Vec<HailId> = pending.iter().map(|h| h.id).collect();
        self.commit(route, vehicle_id, ids).await
    }

    /// Assign a single hail; a demand group of one.
    pub async fn assign_hail(
        &self,
        hail_id: HailId,
        vehicle_id: VehicleId,
    ) -> DispatchResult<AssignmentResult> {
        self.require_active(vehicle_id).await?;

        let hail = self
            .hails
            .get(hail_id)
            .await?
            .ok_or_else(|| DispatchError::not_found("hail", hail_id))?;
        if !hail.is_pending() {
            return Err(DispatchError::NoPendingDemand(hail.route_key()));
        }
        self.commit(hail.route_key(), vehicle_id, vec![hail_id]).await
    }

    async fn require_active(&self, vehicle_id: VehicleId) -> DispatchResult<()> {
        match self.fleet.get_vehicle(vehicle_id).await? {
            Some(vehicle) if vehicle.is_active() => Ok(()),
            _ => Err(DispatchError::VehicleUnavailable(vehicle_id)),
        }
    }

    async fn commit(
        &self,
        route: RouteKey,
        vehicle_id: VehicleId,
        ids: Vec<HailId>,
    ) -> DispatchResult<AssignmentResult> {
        let observed = ids.len();
        let assigned_at = self.clock.now();
        let hail_ids = self
            .hails
            .transition_to_assigned(&ids, vehicle_id, assigned_at)
            .await?;
        if hail_ids.is_empty() {
            return Err(DispatchError::NoPendingDemand(route));
        }

        let claim = ServingClaim {
            route,
            since: assigned_at,
        };
        if let Err(err) = self.fleet.record_serving(vehicle_id, claim).await {
            warn!(%vehicle_id, %route, error = %err, "failed to record serving claim");
        }

        info!(
            %vehicle_id,
            %route,
            observed,
            transitioned = hail_ids.len(),
            "assignment committed"
        );
        Ok(AssignmentResult {
            vehicle_id,
            route,
            observed,
            transitioned: hail_ids.len(),
            hail_ids,
            assigned_at,
        })
    }
}

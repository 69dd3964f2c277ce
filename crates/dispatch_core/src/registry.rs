//! Reference data and live fleet state owned outside the engine.
//!
//! Terminals and routes are read-only here. The fleet registry accepts only
//! the soft serving claim written after an assignment, plus status changes
//! coming from fleet management. The position feed keeps the latest reading
//! per vehicle.

use async_trait::async_trait;

use crate::error::DispatchResult;
use crate::model::{
    CompanyId, Route, ServingClaim, Terminal, TerminalId, Vehicle, VehicleId, VehiclePosition,
    VehicleStatus,
};

mod memory;

pub use memory::{InMemoryRegistry, RegistrySeed};

#[async_trait]
pub trait TerminalRegistry: Send + Sync {
    async fn get_terminal(&self, id: TerminalId) -> DispatchResult<Option<Terminal>>;

    /// Case-insensitive substring match on the terminal name.
    async fn find_by_name_fragment(&self, fragment: &str) -> DispatchResult<Vec<Terminal>>;

    /// Every terminal, ordered by name.
    async fn list_terminals(&self) -> DispatchResult<Vec<Terminal>>;
}

#[async_trait]
pub trait RouteRegistry: Send + Sync {
    /// Routes starting at any of `starts` and ending at any of `ends`.
    async fn routes_between(
        &self,
        starts: &[TerminalId],
        ends: &[TerminalId],
    ) -> DispatchResult<Vec<Route>>;

    async fn routes_ending_at(&self, ends: &[TerminalId]) -> DispatchResult<Vec<Route>>;
}

#[async_trait]
pub trait FleetRegistry: Send + Sync {
    async fn get_vehicle(&self, id: VehicleId) -> DispatchResult<Option<Vehicle>>;

    async fn active_vehicles_for_companies(
        &self,
        companies: &[CompanyId],
    ) -> DispatchResult<Vec<Vehicle>>;

    async fn active_vehicles(&self) -> DispatchResult<Vec<Vehicle>>;

    /// Overwrite the vehicle's serving claim.
    async fn record_serving(&self, id: VehicleId, claim: ServingClaim) -> DispatchResult<()>;

    /// Change operational status. Clears any serving claim.
    async fn set_status(&self, id: VehicleId, status: VehicleStatus) -> DispatchResult<Vehicle>;
}

#[async_trait]
pub trait PositionFeed: Send + Sync {
    /// Latest reading for each requested vehicle that has one. Freshness is the
    /// caller's concern.
    async fn latest_positions(&self, ids: &[VehicleId]) -> DispatchResult<Vec<VehiclePosition>>;

    async fn record_position(&self, position: VehiclePosition) -> DispatchResult<()>;
}

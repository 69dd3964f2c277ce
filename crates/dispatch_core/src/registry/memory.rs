use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{FleetRegistry, PositionFeed, RouteRegistry, TerminalRegistry};
use crate::error::{lock_table, DispatchError, DispatchResult};
use crate::geo::Coordinate;
use crate::model::{
    CompanyId, Route, ServingClaim, Terminal, TerminalId, Vehicle, VehicleId, VehiclePosition,
    VehicleStatus,
};

/// Registry contents as loaded from a JSON seed file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySeed {
    pub terminals: Vec<Terminal>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
    #[serde(default)]
    pub positions: Vec<VehiclePosition>,
}

impl RegistrySeed {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// In-process registry backing all four collaborator traits.
#[derive(Debug)]
pub struct InMemoryRegistry {
    /// Sorted by name.
    terminals: Vec<Terminal>,
    routes: Vec<Route>,
    vehicles: Mutex<Vec<Vehicle>>,
    positions: Mutex<HashMap<VehicleId, VehiclePosition>>,
}

impl InMemoryRegistry {
    /// Build a registry, rejecting seeds whose references don't resolve.
    pub fn from_seed(seed: RegistrySeed) -> DispatchResult<Self> {
        let RegistrySeed {
            mut terminals,
            routes,
            vehicles,
            positions,
        } = seed;

        let terminal_ids: HashSet<TerminalId> = terminals.iter().map(|t| t.id).collect();
        if terminal_ids.len() != terminals.len() {
            return Err(DispatchError::validation("duplicate terminal id in seed"));
        }
        for terminal in &terminals {
            check_coordinate(terminal.coordinate, || format!("terminal {}", terminal.id))?;
        }
        for route in &routes {
            for end in [route.start_terminal_id, route.end_terminal_id] {
                if !terminal_ids.contains(&end) {
                    return Err(DispatchError::validation(format!(
                        "route {} references unknown terminal {end}",
                        route.id
                    )));
                }
            }
        }

        let vehicle_ids: HashSet<VehicleId> = vehicles.iter().map(|v| v.id).collect();
        if vehicle_ids.len() != vehicles.len() {
            return Err(DispatchError::validation("duplicate vehicle id in seed"));
        }
        let mut latest: HashMap<VehicleId, VehiclePosition> = HashMap::new();
        for position in positions {
            if !vehicle_ids.contains(&position.vehicle_id) {
                return Err(DispatchError::validation(format!(
                    "position references unknown vehicle {}",
                    position.vehicle_id
                )));
            }
            check_coordinate(position.coordinate, || {
                format!("position of vehicle {}", position.vehicle_id)
            })?;
            keep_latest(&mut latest, position);
        }

        terminals.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self {
            terminals,
            routes,
            vehicles: Mutex::new(vehicles),
            positions: Mutex::new(latest),
        })
    }
}

/// Seed files bypass `Coordinate::new`, so ranges are checked here.
fn check_coordinate(coordinate: Coordinate, owner: impl FnOnce() -> String) -> DispatchResult<()> {
    Coordinate::new(coordinate.lat, coordinate.lng)
        .map(|_| ())
        .map_err(|err| DispatchError::validation(format!("{}: {err}", owner())))
}

fn keep_latest(table: &mut HashMap<VehicleId, VehiclePosition>, position: VehiclePosition) {
    match table.get(&position.vehicle_id) {
        Some(current) if current.recorded_at > position.recorded_at => {}
        _ => {
            table.insert(position.vehicle_id, position);
        }
    }
}

#[async_trait]
impl TerminalRegistry for InMemoryRegistry {
    async fn get_terminal(&self, id: TerminalId) -> DispatchResult<Option<Terminal>> {
        Ok(self.terminals.iter().find(|t| t.id == id).cloned())
    }

    async fn find_by_name_fragment(&self, fragment: &str) -> DispatchResult<Vec<Terminal>> {
        let needle = fragment.trim().to_lowercase();
        Ok(self
            .terminals
            .iter()
            .filter(|t| t.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn list_terminals(&self) -> DispatchResult<Vec<Terminal>> {
        Ok(self.terminals.clone())
    }
}

#[async_trait]
impl RouteRegistry for InMemoryRegistry {
    async fn routes_between(
        &self,
        starts: &[TerminalId],
        ends: &[TerminalId],
    ) -> DispatchResult<Vec<Route>> {
        Ok(self
            .routes
            .iter()
            .filter(|r| starts.contains(&r.start_terminal_id) && ends.contains(&r.end_terminal_id))
            .cloned()
            .collect())
    }

    async fn routes_ending_at(&self, ends: &[TerminalId]) -> DispatchResult<Vec<Route>> {
        Ok(self
            .routes
            .iter()
            .filter(|r| ends.contains(&r.end_terminal_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FleetRegistry for InMemoryRegistry {
    async fn get_vehicle(&self, id: VehicleId) -> DispatchResult<Option<Vehicle>> {
        let vehicles = lock_table(&self.vehicles, "vehicle")?;
        Ok(vehicles.iter().find(|v| v.id == id).cloned())
    }

    async fn active_vehicles_for_companies(
        &self,
        companies: &[CompanyId],
    ) -> DispatchResult<Vec<Vehicle>> {
        let vehicles = lock_table(&self.vehicles, "vehicle")?;
        Ok(vehicles
            .iter()
            .filter(|v| v.is_active() && companies.contains(&v.company_id))
            .cloned()
            .collect())
    }

    async fn active_vehicles(&self) -> DispatchResult<Vec<Vehicle>> {
        let vehicles = lock_table(&self.vehicles, "vehicle")?;
        Ok(vehicles.iter().filter(|v| v.is_active()).cloned().collect())
    }

    async fn record_serving(&self, id: VehicleId, claim: ServingClaim) -> DispatchResult<()> {
        let mut vehicles = lock_table(&self.vehicles, "vehicle")?;
        let vehicle = vehicles
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| DispatchError::not_found("vehicle", id))?;
        vehicle.serving = Some(claim);
        Ok(())
    }

    async fn set_status(&self, id: VehicleId, status: VehicleStatus) -> DispatchResult<Vehicle> {
        let mut vehicles = lock_table(&self.vehicles, "vehicle")?;
        let vehicle = vehicles
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| DispatchError::not_found("vehicle", id))?;
        vehicle.status = status;
        vehicle.serving = None;
        Ok(vehicle.clone())
    }
}

#[async_trait]
impl PositionFeed for InMemoryRegistry {
    async fn latest_positions(&self, ids: &[VehicleId]) -> DispatchResult<Vec<VehiclePosition>> {
        let positions = lock_table(&self.positions, "position")?;
        Ok(ids.iter().filter_map(|id| positions.get(id).copied()).collect())
    }

    async fn record_position(&self, position: VehiclePosition) -> DispatchResult<()> {
        let known = lock_table(&self.vehicles, "vehicle")?
            .iter()
            .any(|v| v.id == position.vehicle_id);
        if !known {
            return Err(DispatchError::not_found("vehicle", position.vehicle_id));
        }
        let mut positions = lock_table(&self.positions, "position")?;
        keep_latest(&mut positions, position);
        Ok(())
    }
}

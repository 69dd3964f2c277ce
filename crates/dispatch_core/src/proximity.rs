//! Finds buses that serve a passenger's trip and are close to the passenger.
//!
//! Pipeline: resolve terminal names, pick exact routes (or alternatives
//! ending at the destination), collect active vehicles of the operators on
//! those routes, keep fresh positions inside the radius, then attach road
//! distance and ETA.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::error::{DispatchError, DispatchResult};
use crate::eta::{EtaEnricher, EtaRequest};
use crate::geo::{self, Coordinate};
use crate::model::{
    CompanyId, Route, RouteId, Terminal, TerminalId, Vehicle, VehicleId, VehiclePosition,
};
use crate::registry::{FleetRegistry, PositionFeed, RouteRegistry, TerminalRegistry};

/// Validated proximity search input.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyQuery {
    pub origin_name: String,
    pub destination_name: String,
    pub user: Coordinate,
    pub radius_km: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteMatch {
    pub id: RouteId,
    pub name: String,
    pub company_id: CompanyId,
    pub start_terminal_id: TerminalId,
    pub start_terminal_name: Option<String>,
    pub end_terminal_id: TerminalId,
    pub end_terminal_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyBus {
    pub vehicle_id: VehicleId,
    pub plate_number: String,
    pub capacity: u32,
    pub company_id: CompanyId,
    pub position: Coordinate,
    pub recorded_at: DateTime<Utc>,
    pub straight_line_distance_km: f64,
    pub road_distance_km: Option<f64>,
    pub eta_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyBuses {
    #[serde(rename = "routes")]
    pub exact_routes: Vec<RouteMatch>,
    pub alternative_routes: Vec<RouteMatch>,
    /// Nearest first by straight-line distance.
    pub buses: Vec<NearbyBus>,
}

/// Active vehicle with its latest fresh position, if it has one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveBus {
    #[serde(flatten)]
    pub vehicle: Vehicle,
    pub position: Option<Coordinate>,
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct ProximitySearchService {
    terminals: Arc<dyn TerminalRegistry>,
    routes: Arc<dyn RouteRegistry>,
    fleet: Arc<dyn FleetRegistry>,
    positions: Arc<dyn PositionFeed>,
    enricher: EtaEnricher,
    clock: Arc<dyn Clock>,
    freshness: Duration,
}

impl ProximitySearchService {
    pub fn new(
        terminals: Arc<dyn TerminalRegistry>,
        routes: Arc<dyn RouteRegistry>,
        fleet: Arc<dyn FleetRegistry>,
        positions: Arc<dyn PositionFeed>,
        enricher: EtaEnricher,
        clock: Arc<dyn Clock>,
        freshness: Duration,
    ) -> Self {
        Self {
            terminals,
            routes,
            fleet,
            positions,
            enricher,
            clock,
            freshness,
        }
    }

    pub async fn find_buses(&self, query: &NearbyQuery) -> DispatchResult<NearbyBuses> {
        let origins = self.resolve("origin", &query.origin_name).await?;
        let destinations = self.resolve("destination", &query.destination_name).await?;
        let origin_ids: Vec<TerminalId> = origins.iter().map(|t| t.id).collect();
        let destination_ids: Vec<TerminalId> = destinations.iter().map(|t| t.id).collect();

        let exact = self.routes.routes_between(&origin_ids, &destination_ids).await?;
        let alternatives = if exact.is_empty() {
            self.routes.routes_ending_at(&destination_ids).await?
        } else {
            Vec::new()
        };
        let operative = if exact.is_empty() { &alternatives } else { &exact };

        let mut names: HashMap<TerminalId, String> = origins
            .iter()
            .chain(destinations.iter())
            .map(|t| (t.id, t.name.clone()))
            .collect();
        self.fill_names(&mut names, exact.iter().chain(alternatives.iter()))
            .await?;

        let buses = if operative.is_empty() {
            Vec::new()
        } else {
            self.buses_for(operative, query.user, query.radius_km).await?
        };

        debug!(
            exact = exact.len(),
            alternatives = alternatives.len(),
            buses = buses.len(),
            "proximity search finished"
        );
        Ok(NearbyBuses {
            exact_routes: exact.iter().map(|r| route_match(r, &names)).collect(),
            alternative_routes: alternatives.iter().map(|r| route_match(r, &names)).collect(),
            buses,
        })
    }

    /// Every active vehicle, joined with its latest fresh position.
    pub async fn active_buses(&self) -> DispatchResult<Vec<ActiveBus>> {
        let vehicles = self.fleet.active_vehicles().await?;
        let positions = self.fresh_positions(&vehicles).await?;
        Ok(vehicles
            .into_iter()
            .map(|vehicle| {
                let position = positions.get(&vehicle.id);
                ActiveBus {
                    position: position.map(|p| p.coordinate),
                    recorded_at: position.map(|p| p.recorded_at),
                    vehicle,
                }
            })
            .collect())
    }

    async fn resolve(&self, side: &'static str, fragment: &str) -> DispatchResult<Vec<Terminal>> {
        let matches = self.terminals.find_by_name_fragment(fragment).await?;
        if matches.is_empty() {
            return Err(DispatchError::NoMatchingTerminal {
                side,
                fragment: fragment.to_string(),
            });
        }
        Ok(matches)
    }

    async fn fill_names<'a>(
        &self,
        names: &mut HashMap<TerminalId, String>,
        routes: impl Iterator<Item = &'a Route>,
    ) -> DispatchResult<()> {
        let missing: BTreeSet<TerminalId> = routes
            .flat_map(|r| [r.start_terminal_id, r.end_terminal_id])
            .filter(|id| !names.contains_key(id))
            .collect();
        for id in missing {
            if let Some(terminal) = self.terminals.get_terminal(id).await? {
                names.insert(id, terminal.name);
            }
        }
        Ok(())
    }

    async fn fresh_positions(
        &self,
        vehicles: &[Vehicle],
    ) -> DispatchResult<HashMap<VehicleId, VehiclePosition>> {
        let ids: Vec<VehicleId> = vehicles.iter().map(|v| v.id).collect();
        let now = self.clock.now();
        Ok(self
            .positions
            .latest_positions(&ids)
            .await?
            .into_iter()
            .filter(|p| p.is_fresh(now, self.freshness))
            .map(|p| (p.vehicle_id, p))
            .collect())
    }

    async fn buses_for(
        &self,
        routes: &[Route],
        user: Coordinate,
        radius_km: f64,
    ) -> DispatchResult<Vec<NearbyBus>> {
        let companies: Vec<CompanyId> = routes
            .iter()
            .map(|r| r.company_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let vehicles = self.fleet.active_vehicles_for_companies(&companies).await?;
        let positions = self.fresh_positions(&vehicles).await?;

        let candidates: Vec<(VehicleId, Coordinate)> = vehicles
            .iter()
            .filter_map(|v| positions.get(&v.id).map(|p| (v.id, p.coordinate)))
            .collect();
        let hits = geo::within_radius(user, radius_km, &candidates);

        let requests = hits
            .iter()
            .filter_map(|(id, _)| {
                positions.get(id).map(|p| EtaRequest {
                    vehicle_id: *id,
                    origin: p.coordinate,
                    destination: user,
                })
            })
            .collect();
        let etas: HashMap<VehicleId, _> = self
            .enricher
            .enrich(requests)
            .await
            .into_iter()
            .map(|result| (result.vehicle_id, result))
            .collect();

        let by_id: HashMap<VehicleId, &Vehicle> = vehicles.iter().map(|v| (v.id, v)).collect();
        Ok(hits
            .into_iter()
            .filter_map(|(id, distance)| {
                let vehicle = by_id.get(&id)?;
                let position = positions.get(&id)?;
                let eta = etas.get(&id);
                Some(NearbyBus {
                    vehicle_id: id,
                    plate_number: vehicle.plate_number.clone(),
                    capacity: vehicle.capacity,
                    company_id: vehicle.company_id,
                    position: position.coordinate,
                    recorded_at: position.recorded_at,
                    straight_line_distance_km: distance,
                    road_distance_km: eta.and_then(|e| e.road_distance_km),
                    eta_minutes: eta.and_then(|e| e.eta_minutes),
                })
            })
            .collect())
    }
}

fn route_match(route: &Route, names: &HashMap<TerminalId, String>) -> RouteMatch {
    RouteMatch {
        id: route.id,
        name: route.name.clone(),
        company_id: route.company_id,
        start_terminal_id: route.start_terminal_id,
        start_terminal_name: names.get(&route.start_terminal_id).cloned(),
        end_terminal_id: route.end_terminal_id,
        end_terminal_name: names.get(&route.end_terminal_id).cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::eta::StraightLineProvider;
    use crate::test_helpers::*;

    fn service() -> ProximitySearchService {
        let registry = Arc::new(sample_registry(fixed_start()));
        let provider = Arc::new(StraightLineProvider::new(40.0).expect("speed"));
        ProximitySearchService::new(
            registry.clone(),
            registry.clone(),
            registry.clone(),
            registry,
            EtaEnricher::new(provider, std::time::Duration::from_secs(1), 4),
            Arc::new(ManualClock::new(fixed_start())),
            Duration::seconds(120),
        )
    }

    fn query(origin: &str, destination: &str, radius_km: f64) -> NearbyQuery {
        NearbyQuery {
            origin_name: origin.to_string(),
            destination_name: destination.to_string(),
            user: user_location(),
            radius_km,
        }
    }

    #[tokio::test]
    async fn exact_route_buses_inside_radius_nearest_first() {
        let found = service().find_buses(&query("central", "airport", 5.0)).await.expect("search");
        assert_eq!(found.exact_routes.len(), 1);
        assert!(found.alternative_routes.is_empty());
        assert_eq!(found.exact_routes[0].start_terminal_name.as_deref(), Some("Central Station"));

        let ids: Vec<VehicleId> = found.buses.iter().map(|b| b.vehicle_id).collect();
        assert_eq!(ids, vec![BUS_NEAR, BUS_MID]);
        assert!(found.buses.iter().all(|b| b.eta_minutes.is_some()));
        assert_eq!(found.buses[0].road_distance_km, Some(1.0));
        assert_eq!(found.buses[0].eta_minutes, Some(2));
    }

    #[tokio::test]
    async fn alternatives_ending_at_destination_are_used_when_no_exact_route() {
        let found = service().find_buses(&query("merkato", "airport", 5.0)).await.expect("search");
        assert!(found.exact_routes.is_empty());
        assert_eq!(found.alternative_routes.len(), 2);
        let ids: Vec<VehicleId> = found.buses.iter().map(|b| b.vehicle_id).collect();
        assert_eq!(ids, vec![BUS_NEAR, BUS_OTHER, BUS_MID]);
    }

    #[tokio::test]
    async fn no_operative_route_yields_no_buses() {
        let found = service().find_buses(&query("central", "merkato", 5.0)).await.expect("search");
        assert!(found.exact_routes.is_empty());
        assert!(found.alternative_routes.is_empty());
        assert!(found.buses.is_empty());
    }

    #[tokio::test]
    async fn unmatched_name_is_reported_per_side() {
        let err = service()
            .find_buses(&query("central", "harbour", 5.0))
            .await
            .expect_err("no destination");
        assert_eq!(
            err,
            DispatchError::NoMatchingTerminal {
                side: "destination",
                fragment: "harbour".to_string()
            }
        );
    }

    #[tokio::test]
    async fn stale_and_inactive_vehicles_are_skipped() {
        let found = service().find_buses(&query("central", "airport", 10.0)).await.expect("search");
        let ids: Vec<VehicleId> = found.buses.iter().map(|b| b.vehicle_id).collect();
        assert_eq!(ids, vec![BUS_NEAR, BUS_MID, BUS_FAR]);
        assert!(!ids.contains(&BUS_STALE));
        assert!(!ids.contains(&BUS_IDLE));
    }

    #[tokio::test]
    async fn active_bus_listing_omits_stale_positions() {
        let buses = service().active_buses().await.expect("list");
        let stale = buses.iter().find(|b| b.vehicle.id == BUS_STALE).expect("stale bus listed");
        assert!(stale.position.is_none());
        let near = buses.iter().find(|b| b.vehicle.id == BUS_NEAR).expect("near bus listed");
        assert!(near.position.is_some());
        assert!(buses.iter().all(|b| b.vehicle.id != BUS_IDLE));
    }
}

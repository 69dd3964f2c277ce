//! Test helpers for common test setup and utilities.
//!
//! A small fixed network around a passenger standing at [`user_location`]:
//!
//! | terminal          | routes                                |
//! |-------------------|---------------------------------------|
//! | Central Station   | Central Station -> Airport (company A)|
//! | Bole              | Bole -> Airport (company B)           |
//! | Merkato, Airport  | none starting there                   |
//!
//! Vehicles sit due north of the passenger at exact distances so proximity
//! expectations can be written by hand.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::clock::ManualClock;
use crate::config::DispatchConfig;
use crate::eta::{RoadRoute, RoutingError, RoutingProvider};
use crate::geo::{offset_north, Coordinate};
use crate::hails::InMemoryHailStore;
use crate::model::{
    CompanyId, RequesterId, Route, RouteId, Terminal, TerminalId, Vehicle, VehicleId,
    VehiclePosition, VehicleStatus,
};
use crate::registry::{InMemoryRegistry, RegistrySeed};
use crate::service::{Collaborators, DispatchService};

pub const CENTRAL: TerminalId = TerminalId::from_u128(0x100);
pub const AIRPORT: TerminalId = TerminalId::from_u128(0x101);
pub const MERKATO: TerminalId = TerminalId::from_u128(0x102);
pub const BOLE: TerminalId = TerminalId::from_u128(0x103);

pub const COMPANY_A: CompanyId = CompanyId::from_u128(0x200);
pub const COMPANY_B: CompanyId = CompanyId::from_u128(0x201);

pub const ROUTE_CENTRAL_AIRPORT: RouteId = RouteId::from_u128(0x300);
pub const ROUTE_BOLE_AIRPORT: RouteId = RouteId::from_u128(0x301);

/// Company A, 1 km from the passenger.
pub const BUS_NEAR: VehicleId = VehicleId::from_u128(0x400);
/// Company A, 3 km.
pub const BUS_MID: VehicleId = VehicleId::from_u128(0x401);
/// Company A, 6 km.
pub const BUS_FAR: VehicleId = VehicleId::from_u128(0x402);
/// Company A, inactive, 2 km.
pub const BUS_IDLE: VehicleId = VehicleId::from_u128(0x403);
/// Company B, 2 km.
pub const BUS_OTHER: VehicleId = VehicleId::from_u128(0x404);
/// Company A, 0.5 km but last reported ten minutes ago.
pub const BUS_STALE: VehicleId = VehicleId::from_u128(0x405);

/// Monday morning, so service-day boundaries are far away.
pub fn fixed_start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-02T08:00:00Z")
        .expect("fixed start should parse")
        .with_timezone(&Utc)
}

pub fn user_location() -> Coordinate {
    Coordinate {
        lat: 9.02,
        lng: 38.75,
    }
}

pub fn requester(n: u128) -> RequesterId {
    RequesterId::from_u128(0x1000 + n)
}

fn terminal(id: TerminalId, name: &str, lat: f64, lng: f64) -> Terminal {
    Terminal {
        id,
        name: name.to_string(),
        coordinate: Coordinate { lat, lng },
    }
}

fn vehicle(id: VehicleId, plate: &str, company_id: CompanyId, status: VehicleStatus) -> Vehicle {
    Vehicle {
        id,
        plate_number: plate.to_string(),
        capacity: 60,
        status,
        driver_id: None,
        company_id,
        serving: None,
    }
}

/// Registry contents with every position except the stale one stamped `now`.
pub fn sample_seed(now: DateTime<Utc>) -> RegistrySeed {
    let user = user_location();
    let at = |vehicle_id, km, recorded_at| VehiclePosition {
        vehicle_id,
        coordinate: offset_north(user, km),
        recorded_at,
    };

    RegistrySeed {
        terminals: vec![
            terminal(CENTRAL, "Central Station", 9.03, 38.74),
            terminal(AIRPORT, "Airport", 8.98, 38.80),
            terminal(MERKATO, "Merkato", 9.03, 38.72),
            terminal(BOLE, "Bole", 8.99, 38.79),
        ],
        routes: vec![
            Route {
                id: ROUTE_CENTRAL_AIRPORT,
                name: "Central - Airport".to_string(),
                company_id: COMPANY_A,
                start_terminal_id: CENTRAL,
                end_terminal_id: AIRPORT,
            },
            Route {
                id: ROUTE_BOLE_AIRPORT,
                name: "Bole - Airport".to_string(),
                company_id: COMPANY_B,
                start_terminal_id: BOLE,
                end_terminal_id: AIRPORT,
            },
        ],
        vehicles: vec![
            vehicle(BUS_NEAR, "AA-1001", COMPANY_A, VehicleStatus::Active),
            vehicle(BUS_MID, "AA-1002", COMPANY_A, VehicleStatus::Active),
            vehicle(BUS_FAR, "AA-1003", COMPANY_A, VehicleStatus::Active),
            vehicle(BUS_IDLE, "AA-1004", COMPANY_A, VehicleStatus::Inactive),
            vehicle(BUS_OTHER, "BB-2001", COMPANY_B, VehicleStatus::Active),
            vehicle(BUS_STALE, "AA-1005", COMPANY_A, VehicleStatus::Active),
        ],
        positions: vec![
            at(BUS_NEAR, 1.0, now),
            at(BUS_MID, 3.0, now),
            at(BUS_FAR, 6.0, now),
            at(BUS_IDLE, 2.0, now),
            at(BUS_OTHER, 2.0, now),
            at(BUS_STALE, 0.5, now - Duration::minutes(10)),
        ],
    }
}

pub fn sample_registry(now: DateTime<Utc>) -> InMemoryRegistry {
    InMemoryRegistry::from_seed(sample_seed(now)).expect("sample seed should be consistent")
}

/// Fully wired service over in-memory collaborators and a manual clock.
pub struct TestEngine {
    pub service: DispatchService,
    pub hails: Arc<InMemoryHailStore>,
    pub registry: Arc<InMemoryRegistry>,
    pub clock: Arc<ManualClock>,
}

pub fn test_engine(config: DispatchConfig, routing: Arc<dyn RoutingProvider>) -> TestEngine {
    let hails = Arc::new(InMemoryHailStore::new(config.duplicate_window));
    let registry = Arc::new(sample_registry(fixed_start()));
    let clock = Arc::new(ManualClock::new(fixed_start()));
    let collaborators = Collaborators {
        hails: hails.clone(),
        terminals: registry.clone(),
        routes: registry.clone(),
        fleet: registry.clone(),
        positions: registry.clone(),
        clock: clock.clone(),
    };
    TestEngine {
        service: DispatchService::new(config, collaborators, routing),
        hails,
        registry,
        clock,
    }
}

/// What a [`ScriptedRoutingProvider`] does for a given origin.
#[derive(Debug, Clone, Copy)]
pub enum ScriptedOutcome {
    Route { route: RoadRoute, delay: StdDuration },
    Fail,
    /// Never completes.
    Hang,
}

impl ScriptedOutcome {
    pub fn instant(distance_m: f64, duration_secs: f64) -> Self {
        ScriptedOutcome::Route {
            route: RoadRoute {
                distance_m,
                duration_secs,
            },
            delay: StdDuration::ZERO,
        }
    }
}

/// Routing provider whose answer is scripted per origin coordinate. Tracks
/// how many lookups were made and the peak number running at once.
pub struct ScriptedRoutingProvider {
    outcomes: Mutex<HashMap<(u64, u64), ScriptedOutcome>>,
    fallback: ScriptedOutcome,
    calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: AtomicUsize,
}

fn coordinate_key(coordinate: Coordinate) -> (u64, u64) {
    (coordinate.lat.to_bits(), coordinate.lng.to_bits())
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedRoutingProvider {
    pub fn new(fallback: ScriptedOutcome) -> Self {
        Self {
            outcomes: Mutex::new(HashMap::new()),
            fallback,
            calls: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_outcome(self, origin: Coordinate, outcome: ScriptedOutcome) -> Self {
        self.outcomes
            .lock()
            .expect("scripted outcomes lock")
            .insert(coordinate_key(origin), outcome);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoutingProvider for ScriptedRoutingProvider {
    async fn route(
        &self,
        origin: Coordinate,
        _destination: Coordinate,
    ) -> Result<RoadRoute, RoutingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _guard = InFlightGuard(self.in_flight.clone());

        let outcome = self
            .outcomes
            .lock()
            .expect("scripted outcomes lock")
            .get(&coordinate_key(origin))
            .copied()
            .unwrap_or(self.fallback);

        match outcome {
            ScriptedOutcome::Route { route, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(route)
            }
            ScriptedOutcome::Fail => Err(RoutingError::Status(503)),
            ScriptedOutcome::Hang => std::future::pending().await,
        }
    }
}

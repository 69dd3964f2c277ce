use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use super::{RoadRoute, RoutingProvider};
use crate::config::EtaConfig;
use crate::geo::Coordinate;
use crate::model::VehicleId;

/// One lookup: from the vehicle's position to the passenger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtaRequest {
    pub vehicle_id: VehicleId,
    pub origin: Coordinate,
    pub destination: Coordinate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EtaResult {
    pub vehicle_id: VehicleId,
    pub eta_minutes: Option<u32>,
    pub road_distance_km: Option<f64>,
}

impl EtaResult {
    fn from_route(vehicle_id: VehicleId, route: RoadRoute) -> Self {
        Self {
            vehicle_id,
            eta_minutes: Some(route.eta_minutes()),
            road_distance_km: Some(route.distance_km()),
        }
    }

    fn unavailable(vehicle_id: VehicleId) -> Self {
        Self {
            vehicle_id,
            eta_minutes: None,
            road_distance_km: None,
        }
    }
}

/// Runs routing lookups for a batch of vehicles.
///
/// At most `max_in_flight` lookups run at once, each under its own timeout.
/// A slot frees as soon as its lookup settles, whatever its position in the
/// batch. Results come back in request order. Dropping the `enrich` future cancels
/// whatever is still in flight.
#[derive(Clone)]
pub struct EtaEnricher {
    provider: Arc<dyn RoutingProvider>,
    timeout: Duration,
    max_in_flight: usize,
}

impl EtaEnricher {
    pub fn new(provider: Arc<dyn RoutingProvider>, timeout: Duration, max_in_flight: usize) -> Self {
        Self {
            provider,
            timeout,
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub fn from_config(provider: Arc<dyn RoutingProvider>, config: &EtaConfig) -> Self {
        Self::new(provider, config.timeout(), config.max_in_flight)
    }

    pub async fn enrich(&self, requests: Vec<EtaRequest>) -> Vec<EtaResult> {
        if requests.is_empty() {
            return Vec::new();
        }

        let total = requests.len();
        let mut indexed: Vec<(usize, EtaResult)> = stream::iter(requests.into_iter().enumerate())
            .map(|(index, request)| async move { (index, self.lookup(request).await) })
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await;
        indexed.sort_unstable_by_key(|(index, _)| *index);
        let results: Vec<EtaResult> = indexed.into_iter().map(|(_, result)| result).collect();

        let resolved = results.iter().filter(|r| r.eta_minutes.is_some()).count();
        debug!(total, resolved, "eta enrichment finished");
        results
    }

    async fn lookup(&self, request: EtaRequest) -> EtaResult {
        let call = self.provider.route(request.origin, request.destination);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(route)) => EtaResult::from_route(request.vehicle_id, route),
            Ok(Err(err)) => {
                warn!(vehicle_id = %request.vehicle_id, error = %err, "eta lookup failed");
                EtaResult::unavailable(request.vehicle_id)
            }
            Err(_) => {
                warn!(
                    vehicle_id = %request.vehicle_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "eta lookup timed out"
                );
                EtaResult::unavailable(request.vehicle_id)
            }
        }
    }
}

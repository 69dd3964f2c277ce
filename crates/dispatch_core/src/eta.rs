//! Road distance and travel-time lookups for proximity results.
//!
//! Three providers, selectable via [`RoutingProviderKind`]:
//!
//! - **`StraightLineProvider`**: great-circle distance at a fixed average speed. No network.
//! - **`DirectionApiProvider`**: third-party direction API keyed by an [`ApiKey`].
//! - **`OsrmRoutingProvider`**: an OSRM `/route` endpoint.
//!
//! HTTP providers are wrapped in a [`CachedRoutingProvider`]. The
//! [`EtaEnricher`] fans lookups out with bounded concurrency and never lets a
//! provider failure escape: a failed lookup just leaves the ETA fields empty.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ApiKey, EtaConfig};
use crate::geo::{distance_km, Coordinate};

mod cache;
mod client;
mod enricher;
mod error;
mod response;


pub use cache::CachedRoutingProvider;
pub use client::{DirectionApiProvider, OsrmRoutingProvider};
pub use enricher::{EtaEnricher, EtaRequest, EtaResult};
pub use error::RoutingError;

/// Average speed assumed by the straight-line estimate.
pub const DEFAULT_STRAIGHT_LINE_SPEED_KMH: f64 = 30.0;

/// Road distance and travel time between two points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoadRoute {
    pub distance_m: f64,
    pub duration_secs: f64,
}

impl RoadRoute {
    /// Whole minutes, rounded up.
    pub fn eta_minutes(&self) -> u32 {
        (self.duration_secs / 60.0).ceil().max(0.0) as u32
    }

    /// Kilometres rounded to two decimals.
    pub fn distance_km(&self) -> f64 {
        (self.distance_m / 10.0).round() / 100.0
    }
}

/// Which routing backend to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutingProviderKind {
    StraightLine {
        speed_kmh: f64,
    },
    /// Direction API base URL (e.g. `"https://mapapi.gebeta.app"`).
    DirectionApi {
        endpoint: String,
        api_key: ApiKey,
    },
    /// OSRM HTTP endpoint (e.g. `"http://localhost:5000"`).
    Osrm {
        endpoint: String,
    },
}

impl Default for RoutingProviderKind {
    fn default() -> Self {
        RoutingProviderKind::StraightLine {
            speed_kmh: DEFAULT_STRAIGHT_LINE_SPEED_KMH,
        }
    }
}

/// Routing backends. Implementations must be `Send + Sync` so one provider can
/// be shared by every request handler.
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<RoadRoute, RoutingError>;
}

/// Great-circle distance travelled at a constant speed.
#[derive(Debug, Clone, Copy)]
pub struct StraightLineProvider {
    speed_kmh: f64,
}

impl StraightLineProvider {
    pub fn new(speed_kmh: f64) -> Result<Self, RoutingError> {
        if !speed_kmh.is_finite() || speed_kmh <= 0.0 {
            return Err(RoutingError::Config(format!(
                "straight-line speed must be positive, got {speed_kmh}"
            )));
        }
        Ok(Self { speed_kmh })
    }
}

#[async_trait]
impl RoutingProvider for StraightLineProvider {
    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<RoadRoute, RoutingError> {
        let km = distance_km(origin, destination);
        Ok(RoadRoute {
            distance_m: km * 1000.0,
            duration_secs: km / self.speed_kmh * 3600.0,
        })
    }
}

/// Construct a shared [`RoutingProvider`] from configuration.
///
/// - `StraightLine` is returned without caching.
/// - `DirectionApi` and `Osrm` share one HTTP client whose timeout matches the
///   per-lookup timeout, and are wrapped in a [`CachedRoutingProvider`].
pub fn build_routing_provider(config: &EtaConfig) -> Result<Arc<dyn RoutingProvider>, RoutingError> {
    match &config.provider {
        RoutingProviderKind::StraightLine { speed_kmh } => {
            Ok(Arc::new(StraightLineProvider::new(*speed_kmh)?))
        }
        RoutingProviderKind::DirectionApi { endpoint, api_key } => {
            if api_key.expose().trim().is_empty() {
                return Err(RoutingError::Config(
                    "direction API key must not be empty".to_string(),
                ));
            }
            let inner: Arc<dyn RoutingProvider> = Arc::new(DirectionApiProvider::new(
                http_client(config)?,
                endpoint,
                api_key.clone(),
            ));
            Ok(with_cache(inner, config))
        }
        RoutingProviderKind::Osrm { endpoint } => {
            let inner: Arc<dyn RoutingProvider> =
                Arc::new(OsrmRoutingProvider::new(http_client(config)?, endpoint));
            Ok(with_cache(inner, config))
        }
    }
}

fn http_client(config: &EtaConfig) -> Result<reqwest::Client, RoutingError> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(RoutingError::from)
}

fn with_cache(inner: Arc<dyn RoutingProvider>, config: &EtaConfig) -> Arc<dyn RoutingProvider> {
    Arc::new(CachedRoutingProvider::new(
        inner,
        config.cache_capacity,
        config.cache_ttl(),
    ))
}

//! Deployment-tunable settings for the dispatch engine.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::eta::RoutingProviderKind;

/// Minimum demand-group size before a group is flagged for dispatch.
pub const DEFAULT_DISPATCH_THRESHOLD: usize = 40;
/// Position readings older than this are excluded from proximity search.
pub const DEFAULT_POSITION_FRESHNESS_SECS: u32 = 120;
pub const DEFAULT_RADIUS_KM: f64 = 5.0;
pub const DEFAULT_MAX_RADIUS_KM: f64 = 50.0;
pub const DEFAULT_ETA_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_ETA_MAX_IN_FLIGHT: usize = 8;
pub const DEFAULT_ETA_CACHE_CAPACITY: usize = 1_024;
pub const DEFAULT_ETA_CACHE_TTL_SECS: u64 = 60;

/// Window inside which a requester may not hold two pending hails for the
/// same route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DuplicateWindow {
    /// Same local calendar day, with the service day starting at midnight at
    /// the given UTC offset.
    ServiceDay { utc_offset_minutes: i32 },
    /// Any pending hail created less than `secs` ago.
    Rolling { secs: u64 },
}

impl Default for DuplicateWindow {
    fn default() -> Self {
        DuplicateWindow::ServiceDay {
            utc_offset_minutes: 0,
        }
    }
}

impl DuplicateWindow {
    /// Whether a hail created at `earlier` still suppresses a new one at `now`.
    pub fn covers(&self, earlier: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match *self {
            DuplicateWindow::ServiceDay { utc_offset_minutes } => {
                let offset = Duration::minutes(i64::from(utc_offset_minutes));
                (earlier + offset).date_naive() == (now + offset).date_naive()
            }
            DuplicateWindow::Rolling { secs } => match now.signed_duration_since(earlier).to_std() {
                Ok(elapsed) => elapsed < StdDuration::from_secs(secs),
                // `earlier` is ahead of `now`: treat as inside the window.
                Err(_) => true,
            },
        }
    }
}

/// Credential for a third-party routing API. Only ever read from deployment
/// configuration; `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// External ETA lookup settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtaConfig {
    /// Timeout applied to each lookup on its own.
    pub timeout_ms: u64,
    /// Cap on concurrent calls to the routing provider.
    pub max_in_flight: usize,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    pub provider: RoutingProviderKind,
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_ETA_TIMEOUT_MS,
            max_in_flight: DEFAULT_ETA_MAX_IN_FLIGHT,
            cache_capacity: DEFAULT_ETA_CACHE_CAPACITY,
            cache_ttl_secs: DEFAULT_ETA_CACHE_TTL_SECS,
            provider: RoutingProviderKind::default(),
        }
    }
}

impl EtaConfig {
    pub fn timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> StdDuration {
        StdDuration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub dispatch_threshold: usize,
    pub duplicate_window: DuplicateWindow,
    pub position_freshness_secs: u32,
    pub default_radius_km: f64,
    pub max_radius_km: f64,
    pub eta: EtaConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            dispatch_threshold: DEFAULT_DISPATCH_THRESHOLD,
            duplicate_window: DuplicateWindow::default(),
            position_freshness_secs: DEFAULT_POSITION_FRESHNESS_SECS,
            default_radius_km: DEFAULT_RADIUS_KM,
            max_radius_km: DEFAULT_MAX_RADIUS_KM,
            eta: EtaConfig::default(),
        }
    }
}

impl DispatchConfig {
    pub fn with_dispatch_threshold(mut self, threshold: usize) -> Self {
        self.dispatch_threshold = threshold;
        self
    }

    pub fn with_duplicate_window(mut self, window: DuplicateWindow) -> Self {
        self.duplicate_window = window;
        self
    }

    pub fn with_position_freshness_secs(mut self, secs: u32) -> Self {
        self.position_freshness_secs = secs;
        self
    }

    pub fn with_default_radius_km(mut self, radius_km: f64) -> Self {
        self.default_radius_km = radius_km;
        self
    }

    pub fn with_max_radius_km(mut self, radius_km: f64) -> Self {
        self.max_radius_km = radius_km;
        self
    }

    pub fn with_eta(mut self, eta: EtaConfig) -> Self {
        self.eta = eta;
        self
    }

    pub fn position_freshness(&self) -> Duration {
        Duration::seconds(i64::from(self.position_freshness_secs))
    }
}

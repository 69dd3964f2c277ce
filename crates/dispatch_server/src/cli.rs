use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use dispatch_core::config::{
    ApiKey, DispatchConfig, DuplicateWindow, EtaConfig, DEFAULT_DISPATCH_THRESHOLD,
    DEFAULT_ETA_CACHE_CAPACITY, DEFAULT_ETA_CACHE_TTL_SECS, DEFAULT_ETA_MAX_IN_FLIGHT,
    DEFAULT_ETA_TIMEOUT_MS, DEFAULT_MAX_RADIUS_KM, DEFAULT_POSITION_FRESHNESS_SECS,
    DEFAULT_RADIUS_KM,
};
use dispatch_core::eta::{RoutingProviderKind, DEFAULT_STRAIGHT_LINE_SPEED_KMH};
use dispatch_core::registry::RegistrySeed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoutingBackend {
    /// Haversine distance at a fixed speed; no network calls
    StraightLine,
    /// Hosted direction API (needs endpoint and API key)
    DirectionApi,
    /// OSRM `route` service
    Osrm,
}

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Debug, Clone, Parser)]
#[command(
    name = "dispatch_server",
    about = "HTTP surface for the terminal hail dispatch engine"
)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "DISPATCH_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// JSON file with terminals, routes, vehicles and positions
    #[arg(long, env = "DISPATCH_SEED")]
    pub seed: Option<PathBuf>,

    /// Postgres URL for the hail store; in-memory when absent
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Emit JSON log lines
    #[arg(long, env = "DISPATCH_LOG_JSON")]
    pub log_json: bool,

    #[arg(long, env = "DISPATCH_THRESHOLD", default_value_t = DEFAULT_DISPATCH_THRESHOLD)]
    pub dispatch_threshold: usize,

    /// Rolling duplicate window; the service-day window applies when unset
    #[arg(long, env = "DISPATCH_DUPLICATE_WINDOW_MINUTES")]
    pub duplicate_window_minutes: Option<u64>,

    /// UTC offset of the local service day
    #[arg(long, env = "DISPATCH_SERVICE_DAY_UTC_OFFSET_MINUTES", default_value_t = 0, allow_hyphen_values = true)]
    pub service_day_utc_offset_minutes: i32,

    #[arg(long, env = "DISPATCH_POSITION_FRESHNESS_SECS", default_value_t = DEFAULT_POSITION_FRESHNESS_SECS)]
    pub position_freshness_secs: u32,

    #[arg(long, env = "DISPATCH_DEFAULT_RADIUS_KM", default_value_t = DEFAULT_RADIUS_KM)]
    pub default_radius_km: f64,

    #[arg(long, env = "DISPATCH_MAX_RADIUS_KM", default_value_t = DEFAULT_MAX_RADIUS_KM)]
    pub max_radius_km: f64,

    #[arg(long, value_enum, env = "DISPATCH_ROUTING_PROVIDER", default_value_t = RoutingBackend::StraightLine)]
    pub routing_provider: RoutingBackend,

    #[arg(long, env = "DISPATCH_ROUTING_ENDPOINT")]
    pub routing_endpoint: Option<String>,

    #[arg(long, env = "DISPATCH_ROUTING_API_KEY", hide_env_values = true)]
    pub routing_api_key: Option<String>,

    #[arg(long, env = "DISPATCH_STRAIGHT_LINE_SPEED_KMH", default_value_t = DEFAULT_STRAIGHT_LINE_SPEED_KMH)]
    pub straight_line_speed_kmh: f64,

    #[arg(long, env = "DISPATCH_ETA_TIMEOUT_MS", default_value_t = DEFAULT_ETA_TIMEOUT_MS)]
    pub eta_timeout_ms: u64,

    #[arg(long, env = "DISPATCH_ETA_MAX_IN_FLIGHT", default_value_t = DEFAULT_ETA_MAX_IN_FLIGHT)]
    pub eta_max_in_flight: usize,

    #[arg(long, env = "DISPATCH_ETA_CACHE_CAPACITY", default_value_t = DEFAULT_ETA_CACHE_CAPACITY)]
    pub eta_cache_capacity: usize,

    #[arg(long, env = "DISPATCH_ETA_CACHE_TTL_SECS", default_value_t = DEFAULT_ETA_CACHE_TTL_SECS)]
    pub eta_cache_ttl_secs: u64,
}

impl Cli {
    pub fn dispatch_config(&self) -> anyhow::Result<DispatchConfig> {
        if self.dispatch_threshold == 0 {
            bail!("dispatch threshold must be at least 1");
        }
        if !(self.default_radius_km > 0.0 && self.default_radius_km <= self.max_radius_km) {
            bail!(
                "default radius {} km must be in (0, {}]",
                self.default_radius_km,
                self.max_radius_km
            );
        }

        let duplicate_window = match self.duplicate_window_minutes {
            Some(minutes) => DuplicateWindow::Rolling {
                secs: minutes
                    .checked_mul(60)
                    .with_context(|| format!("duplicate window of {minutes} minutes is too large"))?,
            },
            None => DuplicateWindow::ServiceDay {
                utc_offset_minutes: self.service_day_utc_offset_minutes,
            },
        };

        let eta = EtaConfig {
            timeout_ms: self.eta_timeout_ms,
            max_in_flight: self.eta_max_in_flight,
            cache_capacity: self.eta_cache_capacity,
            cache_ttl_secs: self.eta_cache_ttl_secs,
            provider: self.routing_provider_kind()?,
        };

        Ok(DispatchConfig::default()
            .with_dispatch_threshold(self.dispatch_threshold)
            .with_duplicate_window(duplicate_window)
            .with_position_freshness_secs(self.position_freshness_secs)
            .with_default_radius_km(self.default_radius_km)
            .with_max_radius_km(self.max_radius_km)
            .with_eta(eta))
    }

    fn routing_provider_kind(&self) -> anyhow::Result<RoutingProviderKind> {
        let endpoint = || {
            self.routing_endpoint
                .clone()
                .context("--routing-endpoint is required for this routing provider")
        };
        Ok(match self.routing_provider {
            RoutingBackend::StraightLine => RoutingProviderKind::StraightLine {
                speed_kmh: self.straight_line_speed_kmh,
            },
            RoutingBackend::DirectionApi => RoutingProviderKind::DirectionApi {
                endpoint: endpoint()?,
                api_key: self
                    .routing_api_key
                    .clone()
                    .map(ApiKey::new)
                    .context("DISPATCH_ROUTING_API_KEY is required for the direction API")?,
            },
            RoutingBackend::Osrm => RoutingProviderKind::Osrm {
                endpoint: endpoint()?,
            },
        })
    }

    /// Registry contents from `--seed`, or an empty registry.
    pub fn registry_seed(&self) -> anyhow::Result<RegistrySeed> {
        let Some(path) = &self.seed else {
            return Ok(RegistrySeed::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading seed file {}", path.display()))?;
        RegistrySeed::from_json(&raw).with_context(|| format!("parsing seed file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["dispatch_server"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("arguments should parse")
    }

    #[test]
    fn defaults_build_the_documented_config() {
        let config = parse(&[]).dispatch_config().expect("config");
        assert_eq!(config, DispatchConfig::default());
    }

    #[test]
    fn rolling_window_and_osrm_provider() {
        let config = parse(&[
            "--duplicate-window-minutes",
            "15",
            "--routing-provider",
            "osrm",
            "--routing-endpoint",
            "http://osrm:5000",
        ])
        .dispatch_config()
        .expect("config");
        assert_eq!(config.duplicate_window, DuplicateWindow::Rolling { secs: 900 });
        assert_eq!(
            config.eta.provider,
            RoutingProviderKind::Osrm {
                endpoint: "http://osrm:5000".to_string()
            }
        );
    }

    #[test]
    fn oversized_duplicate_window_is_rejected() {
        let huge = u64::MAX.to_string();
        let cli = parse(&["--duplicate-window-minutes", &huge]);
        assert!(cli.dispatch_config().is_err());
    }

    #[test]
    fn direction_api_needs_a_key() {
        let cli = parse(&[
            "--routing-provider",
            "direction-api",
            "--routing-endpoint",
            "https://routing.example",
        ]);
        assert!(cli.dispatch_config().is_err());

        let mut with_key = cli.clone();
        with_key.routing_api_key = Some("secret".to_string());
        let config = with_key.dispatch_config().expect("config");
        assert!(matches!(
            config.eta.provider,
            RoutingProviderKind::DirectionApi { ref api_key, .. } if api_key.expose() == "secret"
        ));
    }

    #[test]
    fn default_radius_must_fit_under_max() {
        let cli = parse(&["--default-radius-km", "80"]);
        assert!(cli.dispatch_config().is_err());
    }

    #[test]
    fn missing_seed_means_empty_registry() {
        let seed = parse(&[]).registry_seed().expect("seed");
        assert!(seed.terminals.is_empty());
    }
}

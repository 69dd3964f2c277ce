//! Raw operation inputs and their validation into typed commands.
//!
//! Every check here runs before any store or registry access. Field aliases
//! accept the legacy client payload names.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::config::DispatchConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::geo::Coordinate;
use crate::model::{HailId, RouteKey, TerminalId, VehicleId, VehiclePosition};
use crate::proximity::NearbyQuery;

fn parse_id<T: FromStr>(field: &str, raw: Option<&str>) -> DispatchResult<T> {
    let raw = raw
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| DispatchError::validation(format!("{field} is required")))?;
    raw.parse()
        .map_err(|_| DispatchError::validation(format!("{field} must be a UUID")))
}

fn route_key(origin: Option<&str>, destination: Option<&str>) -> DispatchResult<RouteKey> {
    let origin: TerminalId = parse_id("origin terminal", origin)?;
    let destination: TerminalId = parse_id("destination terminal", destination)?;
    if origin == destination {
        return Err(DispatchError::InvalidRoute);
    }
    Ok(RouteKey::new(origin, destination))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HailInput {
    #[serde(alias = "startTerminalId", alias = "origin_id")]
    pub origin_id: Option<String>,
    #[serde(alias = "endTerminalId", alias = "destination_id")]
    pub destination_id: Option<String>,
}

impl HailInput {
    pub fn validate(&self) -> DispatchResult<RouteKey> {
        route_key(self.origin_id.as_deref(), self.destination_id.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignCommand {
    pub route: RouteKey,
    pub vehicle_id: VehicleId,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignInput {
    #[serde(alias = "startTerminalId", alias = "origin_id")]
    pub origin_id: Option<String>,
    #[serde(alias = "endTerminalId", alias = "destination_id")]
    pub destination_id: Option<String>,
    #[serde(alias = "busId", alias = "vehicle_id", alias = "bus_id")]
    pub vehicle_id: Option<String>,
}

impl AssignInput {
    pub fn validate(&self) -> DispatchResult<AssignCommand> {
        let route = route_key(self.origin_id.as_deref(), self.destination_id.as_deref())?;
        let vehicle_id = parse_id("vehicle", self.vehicle_id.as_deref())?;
        Ok(AssignCommand { route, vehicle_id })
    }
}

/// Body of a single-hail assignment; the hail id comes from the path.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleAssignInput {
    #[serde(alias = "busId", alias = "vehicle_id", alias = "bus_id")]
    pub vehicle_id: Option<String>,
}

impl SingleAssignInput {
    pub fn validate(&self) -> DispatchResult<VehicleId> {
        parse_id("vehicle", self.vehicle_id.as_deref())
    }
}

pub fn parse_hail_id(raw: &str) -> DispatchResult<HailId> {
    parse_id("hail", Some(raw))
}

pub fn parse_vehicle_id(raw: &str) -> DispatchResult<VehicleId> {
    parse_id("vehicle", Some(raw))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NearbyParams {
    #[serde(alias = "start_terminal_name", alias = "startTerminalName")]
    pub origin: Option<String>,
    #[serde(alias = "end_terminal_name", alias = "endTerminalName")]
    pub destination: Option<String>,
    #[serde(alias = "latitude")]
    pub lat: Option<f64>,
    #[serde(alias = "longitude")]
    pub lng: Option<f64>,
    #[serde(alias = "radius")]
    pub radius_km: Option<f64>,
}

impl NearbyParams {
    pub fn validate(&self, config: &DispatchConfig) -> DispatchResult<NearbyQuery> {
        let name = |field: &str, raw: &Option<String>| {
            raw.as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .ok_or_else(|| DispatchError::validation(format!("{field} terminal name is required")))
        };
        let origin_name = name("origin", &self.origin)?;
        let destination_name = name("destination", &self.destination)?;

        let (lat, lng) = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => (lat, lng),
            _ => return Err(DispatchError::validation("lat and lng are required")),
        };
        let user = Coordinate::new(lat, lng)
            .map_err(|err| DispatchError::validation(err.to_string()))?;

        let radius_km = self.radius_km.unwrap_or(config.default_radius_km);
        if !radius_km.is_finite() || radius_km <= 0.0 || radius_km > config.max_radius_km {
            return Err(DispatchError::validation(format!(
                "radius_km must be in (0, {}]",
                config.max_radius_km
            )));
        }

        Ok(NearbyQuery {
            origin_name,
            destination_name,
            user,
            radius_km,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PendingGroupsParams {
    pub threshold: Option<i64>,
}

impl PendingGroupsParams {
    pub fn validate(&self, config: &DispatchConfig) -> DispatchResult<usize> {
        match self.threshold {
            None => Ok(config.dispatch_threshold),
            Some(value) if value >= 1 => usize::try_from(value)
                .map_err(|_| DispatchError::validation("threshold is too large")),
            Some(_) => Err(DispatchError::validation("threshold must be at least 1")),
        }
    }
}

/// How far ahead of the server clock a reported reading may be stamped.
pub const MAX_POSITION_CLOCK_SKEW_SECS: i64 = 30;

/// Rejects readings stamped beyond the tolerated clock skew.
pub(crate) fn check_recorded_at(recorded_at: DateTime<Utc>, now: DateTime<Utc>) -> DispatchResult<()> {
    if recorded_at - now > Duration::seconds(MAX_POSITION_CLOCK_SKEW_SECS) {
        return Err(DispatchError::validation(format!(
            "recordedAt is more than {MAX_POSITION_CLOCK_SKEW_SECS}s in the future"
        )));
    }
    Ok(())
}

/// Location reading posted by a vehicle.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionInput {
    #[serde(alias = "latitude")]
    pub lat: Option<f64>,
    #[serde(alias = "longitude")]
    pub lng: Option<f64>,
    #[serde(alias = "recorded_at")]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl PositionInput {
    /// Missing timestamps default to `now`.
    pub fn validate(&self, vehicle_id: VehicleId, now: DateTime<Utc>) -> DispatchResult<VehiclePosition> {
        let (lat, lng) = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => (lat, lng),
            _ => return Err(DispatchError::validation("lat and lng are required")),
        };
        let coordinate = Coordinate::new(lat, lng)
            .map_err(|err| DispatchError::validation(err.to_string()))?;
        let recorded_at = self.recorded_at.unwrap_or(now);
        check_recorded_at(recorded_at, now)?;
        Ok(VehiclePosition {
            vehicle_id,
            coordinate,
            recorded_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "00000000-0000-0000-0000-000000000001";
    const DESTINATION: &str = "00000000-0000-0000-0000-000000000002";

    #[test]
    fn hail_input_accepts_legacy_field_names() {
        let input: HailInput = serde_json::from_str(&format!(
            r#"{{"startTerminalId":"{ORIGIN}","endTerminalId":"{DESTINATION}"}}"#
        ))
        .expect("parse");
        let route = input.validate().expect("valid");
        assert_eq!(route.origin, TerminalId::from_u128(1));
        assert_eq!(route.destination, TerminalId::from_u128(2));
    }

    #[test]
    fn hail_input_rejects_same_terminals_and_bad_ids() {
        let same = HailInput {
            origin_id: Some(ORIGIN.to_string()),
            destination_id: Some(ORIGIN.to_string()),
        };
        assert_eq!(same.validate(), Err(DispatchError::InvalidRoute));

        let garbage = HailInput {
            origin_id: Some("not-a-uuid".to_string()),
            destination_id: Some(DESTINATION.to_string()),
        };
        assert!(matches!(garbage.validate(), Err(DispatchError::Validation(_))));

        assert!(matches!(HailInput::default().validate(), Err(DispatchError::Validation(_))));
    }

    #[test]
    fn assign_input_reads_bus_id_alias() {
        let input: AssignInput = serde_json::from_str(&format!(
            r#"{{"originId":"{ORIGIN}","destinationId":"{DESTINATION}","busId":"{ORIGIN}"}}"#
        ))
        .expect("parse");
        let command = input.validate().expect("valid");
        assert_eq!(command.vehicle_id, VehicleId::from_u128(1));
    }

    #[test]
    fn nearby_params_apply_default_radius_and_bounds() {
        let config = DispatchConfig::default();
        let mut params = NearbyParams {
            origin: Some(" Central ".to_string()),
            destination: Some("Airport".to_string()),
            lat: Some(9.02),
            lng: Some(38.75),
            radius_km: None,
        };
        let query = params.validate(&config).expect("valid");
        assert_eq!(query.radius_km, 5.0);
        assert_eq!(query.origin_name, "Central");

        for bad in [0.0, -1.0, f64::NAN, 51.0] {
            params.radius_km = Some(bad);
            assert!(params.validate(&config).is_err(), "radius {bad} accepted");
        }

        params.radius_km = None;
        params.lat = Some(95.0);
        assert!(params.validate(&config).is_err());

        params.lat = Some(9.02);
        params.destination = Some("   ".to_string());
        assert!(params.validate(&config).is_err());
    }

    #[test]
    fn threshold_must_be_positive() {
        let config = DispatchConfig::default().with_dispatch_threshold(7);
        assert_eq!(PendingGroupsParams { threshold: None }.validate(&config), Ok(7));
        assert_eq!(PendingGroupsParams { threshold: Some(2) }.validate(&config), Ok(2));
        assert!(PendingGroupsParams { threshold: Some(0) }.validate(&config).is_err());
        assert!(PendingGroupsParams { threshold: Some(-4) }.validate(&config).is_err());
    }

    #[test]
    fn position_defaults_timestamp_to_now() {
        let now = Utc::now();
        let input = PositionInput {
            lat: Some(9.0),
            lng: Some(38.7),
            recorded_at: None,
        };
        let position = input.validate(VehicleId::from_u128(4), now).expect("valid");
        assert_eq!(position.recorded_at, now);
        assert!(PositionInput::default().validate(VehicleId::from_u128(4), now).is_err());
    }

    #[test]
    fn position_rejects_readings_stamped_far_ahead() {
        let now = Utc::now();
        let stamped = |ahead: Duration| PositionInput {
            lat: Some(9.0),
            lng: Some(38.7),
            recorded_at: Some(now + ahead),
        };

        let skewed = stamped(Duration::seconds(MAX_POSITION_CLOCK_SKEW_SECS))
            .validate(VehicleId::from_u128(4), now)
            .expect("small skew tolerated");
        assert_eq!(skewed.recorded_at, now + Duration::seconds(MAX_POSITION_CLOCK_SKEW_SECS));

        let result = stamped(Duration::days(365)).validate(VehicleId::from_u128(4), now);
        assert!(matches!(result, Err(DispatchError::Validation(_))));

        let past = stamped(Duration::minutes(-10))
            .validate(VehicleId::from_u128(4), now)
            .expect("late readings are accepted");
        assert_eq!(past.recorded_at, now - Duration::minutes(10));
    }
}

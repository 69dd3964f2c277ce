use super::error::RoutingError;
use super::RoadRoute;

#[derive(serde::Deserialize)]
pub(super) struct DirectionResponse {
    /// Seconds.
    pub(super) timetaken: Option<f64>,
    /// Metres.
    #[serde(rename = "totalDistance")]
    pub(super) total_distance: Option<f64>,
    pub(super) msg: Option<String>,
}

#[derive(serde::Deserialize)]
pub(super) struct OsrmRouteResponse {
    pub(super) code: String,
    pub(super) routes: Option<Vec<OsrmRoute>>,
    pub(super) message: Option<String>,
}

#[derive(serde::Deserialize)]
pub(super) struct OsrmRoute {
    pub(super) distance: f64,
    pub(super) duration: f64,
}

fn checked(distance_m: f64, duration_secs: f64) -> Result<RoadRoute, RoutingError> {
    if !distance_m.is_finite() || !duration_secs.is_finite() || distance_m < 0.0 || duration_secs < 0.0
    {
        return Err(RoutingError::Payload(format!(
            "distance {distance_m} / duration {duration_secs} out of range"
        )));
    }
    Ok(RoadRoute {
        distance_m,
        duration_secs,
    })
}

pub(super) fn parse_direction_response(resp: DirectionResponse) -> Result<RoadRoute, RoutingError> {
    match (resp.timetaken, resp.total_distance) {
        (Some(secs), Some(metres)) => checked(metres, secs),
        _ => Err(match resp.msg {
            Some(msg) if !msg.trim().is_empty() => RoutingError::Api(msg),
            _ => RoutingError::Payload("missing timetaken or totalDistance".to_string()),
        }),
    }
}

pub(super) fn parse_osrm_response(resp: OsrmRouteResponse) -> Result<RoadRoute, RoutingError> {
    match resp.code.as_str() {
        "Ok" => {}
        "NoRoute" => return Err(RoutingError::NoRoute),
        _ => return Err(RoutingError::Api(resp.message.unwrap_or(resp.code))),
    }

    let route = resp
        .routes
        .and_then(|routes| routes.into_iter().next())
        .ok_or(RoutingError::NoRoute)?;
    checked(route.distance, route.duration)
}

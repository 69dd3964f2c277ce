use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use dispatch_core::model::Terminal;
use dispatch_core::proximity::{ActiveBus, NearbyBuses};
use dispatch_core::requests::{parse_vehicle_id, NearbyParams, PositionInput};
use tracing::debug;

use crate::error::ApiResult;
use crate::identity::Identity;
use crate::router::AppState;

pub async fn nearby(
    State(state): State<AppState>,
    _identity: Identity,
    params: Result<Query<NearbyParams>, QueryRejection>,
) -> ApiResult<Json<NearbyBuses>> {
    let Query(params) = params?;
    let query = params.validate(state.service.config())?;
    Ok(Json(state.service.find_buses(&query).await?))
}

pub async fn active_buses(
    State(state): State<AppState>,
    _identity: Identity,
) -> ApiResult<Json<Vec<ActiveBus>>> {
    Ok(Json(state.service.active_buses().await?))
}

pub async fn record_position(
    State(state): State<AppState>,
    identity: Identity,
    Path(raw_id): Path<String>,
    payload: Result<Json<PositionInput>, JsonRejection>,
) -> ApiResult<StatusCode> {
    identity.require_fleet_reporter()?;
    let vehicle_id = parse_vehicle_id(&raw_id)?;
    let Json(input) = payload?;
    let position = input.validate(vehicle_id, state.service.now())?;
    state.service.record_position(position).await?;
    debug!(%vehicle_id, reporter = %identity.requester_id, "position recorded");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn terminals(
    State(state): State<AppState>,
    _identity: Identity,
) -> ApiResult<Json<Vec<Terminal>>> {
    Ok(Json(state.service.terminals().await?))
}

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use dispatch_core::assignment::AssignmentResult;
use dispatch_core::requests::{
    parse_hail_id, AssignInput, HailInput, PendingGroupsParams, SingleAssignInput,
};
use dispatch_core::service::{DemandGroupView, HailView};

use crate::error::ApiResult;
use crate::identity::Identity;
use crate::router::AppState;

pub async fn create_hail(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<HailInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<HailView>)> {
    let Json(input) = payload?;
    let route = input.validate()?;
    let hail = state.service.request_hail(identity.requester_id, route).await?;
    Ok((StatusCode::CREATED, Json(hail)))
}

pub async fn my_hails(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<Json<Vec<HailView>>> {
    Ok(Json(state.service.my_hails(identity.requester_id).await?))
}

pub async fn cancel_hail(
    State(state): State<AppState>,
    identity: Identity,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<HailView>> {
    let hail_id = parse_hail_id(&raw_id)?;
    Ok(Json(state.service.cancel_hail(identity.requester_id, hail_id).await?))
}

pub async fn pending_groups(
    State(state): State<AppState>,
    identity: Identity,
    params: Result<Query<PendingGroupsParams>, QueryRejection>,
) -> ApiResult<Json<Vec<DemandGroupView>>> {
    identity.require_operator()?;
    let Query(params) = params?;
    let threshold = params.validate(state.service.config())?;
    Ok(Json(state.service.pending_groups(Some(threshold)).await?))
}

pub async fn assign_group(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<AssignInput>, JsonRejection>,
) -> ApiResult<Json<AssignmentResult>> {
    identity.require_operator()?;
    let Json(input) = payload?;
    let command = input.validate()?;
    Ok(Json(state.service.assign_group(command).await?))
}

pub async fn assign_hail(
    State(state): State<AppState>,
    identity: Identity,
    Path(raw_id): Path<String>,
    payload: Result<Json<SingleAssignInput>, JsonRejection>,
) -> ApiResult<Json<AssignmentResult>> {
    identity.require_operator()?;
    let hail_id = parse_hail_id(&raw_id)?;
    let Json(input) = payload?;
    let vehicle_id = input.validate()?;
    Ok(Json(state.service.assign_hail(hail_id, vehicle_id).await?))
}

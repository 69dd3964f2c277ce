use axum::routing::{get, post};
use axum::Router;
use dispatch_core::DispatchService;
use tower_http::trace::TraceLayer;

use crate::handlers::{self, buses, hails};

#[derive(Clone)]
pub struct AppState {
    pub service: DispatchService,
}

pub fn build_router(service: DispatchService) -> Router {
    Router::new()
        // Hails
        .route("/hails", post(hails::create_hail))
        .route("/hails/mine", get(hails::my_hails))
        .route("/hails/pending-groups", get(hails::pending_groups))
        .route("/hails/assign", post(hails::assign_group))
        .route("/hails/:id/cancel", post(hails::cancel_hail))
        .route("/hails/:id/assign", post(hails::assign_hail))
        // Buses
        .route("/buses", get(buses::active_buses))
        .route("/buses/nearby", get(buses::nearby))
        .route("/buses/:id/position", post(buses::record_position))
        .route("/terminals", get(buses::terminals))
        // Health
        .route("/health", get(handlers::health))
        .with_state(AppState { service })
        .layer(TraceLayer::new_for_http())
}

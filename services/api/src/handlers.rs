//! Axum Handlers for the REST API
//!
//! The REST surface is read-only: it lets a client discover the configured
//! routine and the selectable speeds before opening the WebSocket. It uses
//! `utoipa` doc comments to generate OpenAPI documentation.

use axum::{extract::State, response::Json};
use std::sync::Arc;

use crate::{
    models::{RoutineResponse, SpeedOption},
    state::AppState,
};

/// Get the configured pose routine.
#[utoipa::path(
    get,
    path = "/routine",
    responses(
        (status = 200, description = "The configured pose routine", body = RoutineResponse)
    )
)]
pub async fn get_routine(State(state): State<Arc<AppState>>) -> Json<RoutineResponse> {
    Json(RoutineResponse::from_routine(&state.routine))
}

/// List the selectable training speeds.
#[utoipa::path(
    get,
    path = "/speeds",
    responses(
        (status = 200, description = "Selectable speed multipliers", body = [SpeedOption])
    )
)]
pub async fn list_speeds() -> Json<Vec<SpeedOption>> {
    Json(SpeedOption::all())
}

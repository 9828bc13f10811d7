use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use shared::{
    domain::{Command, Setpoints},
    error::{ApiError, ApiException, ErrorCode},
    protocol::{Ack, CommandReply, PressureReading},
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::warn;

use crate::{firmware::Firmware, setpoints::SetpointsUpdate};

const MAX_BODY_BYTES: usize = 4 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub firmware: Arc<Firmware>,
}

#[derive(Debug, Deserialize)]
pub struct ActionQuery {
    action: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/pressure", get(pressure))
        .route("/get_setpoints", get(get_setpoints))
        .route("/set_setpoints", post(set_setpoints))
        .route("/air_up", get(air_up).post(air_up))
        .route("/air_down", get(air_down).post(air_down))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn pressure(State(state): State<AppState>) -> Json<PressureReading> {
    let psi = state.firmware.pressure().await;
    Json(PressureReading {
        pressure: (psi * 100.0).round() / 100.0,
    })
}

async fn get_setpoints(State(state): State<AppState>) -> Json<Setpoints> {
    Json(state.firmware.setpoints().get().await)
}

async fn set_setpoints(
    State(state): State<AppState>,
    Json(update): Json<SetpointsUpdate>,
) -> Result<Json<Ack>, ApiFailure> {
    let setpoints = update.into_setpoints()?;
    state.firmware.setpoints().set(setpoints).await?;
    Ok(Json(Ack::ok()))
}

async fn air_up(
    State(state): State<AppState>,
    Query(query): Query<ActionQuery>,
) -> Json<CommandReply> {
    Json(
        state
            .firmware
            .handle(Command::AirUp, query.action.as_deref())
            .await,
    )
}

async fn air_down(
    State(state): State<AppState>,
    Query(query): Query<ActionQuery>,
) -> Json<CommandReply> {
    Json(
        state
            .firmware
            .handle(Command::AirDown, query.action.as_deref())
            .await,
    )
}

pub struct ApiFailure(ApiException);

impl From<ApiException> for ApiFailure {
    fn from(value: ApiException) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = match self.0.code {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Validation => StatusCode::BAD_REQUEST,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(code = ?self.0.code, message = %self.0.message, "request failed");
        (status, Json(ApiError::from(self.0))).into_response()
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;

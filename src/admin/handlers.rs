use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;

use crate::metrics::MetricsSnapshot;
use crate::settings::{Config, ConfigError, SettingsError};
use crate::status::{ControlCommand, RunState, UnknownAction};

use super::AdminState;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Ack {
    pub ok: bool,
}

const ACK: Ack = Ack { ok: true };

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    #[error("{0}")]
    Persist(String),
    #[error(transparent)]
    UnknownAction(#[from] UnknownAction),
    #[error("control queue is full, try again")]
    QueueFull,
    #[error("capture loop is not accepting commands")]
    LoopClosed,
}

impl From<SettingsError> for AdminError {
    fn from(err: SettingsError) -> Self {
        match err {
            SettingsError::Invalid(err) => AdminError::InvalidConfig(err),
            SettingsError::Persist(err) => AdminError::Persist(format!("{err:#}")),
        }
    }
}

impl AdminError {
    fn status(&self) -> StatusCode {
        match self {
            AdminError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            AdminError::Persist(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AdminError::UnknownAction(_) => StatusCode::NOT_FOUND,
            AdminError::QueueFull | AdminError::LoopClosed => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "ok": false, "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<RunState> {
    Json(state.status.snapshot())
}

pub async fn get_config(State(state): State<AdminState>) -> Json<Config> {
    Json(state.settings.current())
}

pub async fn post_config(
    State(state): State<AdminState>,
    Json(config): Json<Config>,
) -> Result<Json<Ack>, AdminError> {
    let applied = state.settings.replace(config)?;
    log::info!(
        "config updated via admin (sensitivity {}, {} fps)",
        applied.sensitivity,
        applied.capture_fps
    );
    Ok(Json(ACK))
}

pub async fn post_control(
    State(state): State<AdminState>,
    Path(action): Path<String>,
) -> Result<Json<Ack>, AdminError> {
    let command: ControlCommand = action.parse()?;
    state.control.try_send(command).map_err(|err| match err {
        TrySendError::Full(_) => AdminError::QueueFull,
        TrySendError::Closed(_) => AdminError::LoopClosed,
    })?;
    log::info!("control command {command:?} queued");
    Ok(Json(ACK))
}

pub async fn get_metrics(State(state): State<AdminState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.get_snapshot().await)
}

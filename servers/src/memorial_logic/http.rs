//! # HTTP Adapter
//!
//! Thin `axum` layer over [`DeviceService`]. Handlers only translate between
//! JSON and service calls; all rules live in the service.
//!
//! A body that does not deserialize into the request type is answered with
//! `400 {"error": "bad request"}`, the same as any other invalid input.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use lib_memorial::{ControlRequest, DeviceMap, DeviceService, ServiceError, UpdateRequest};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use tokio::sync::broadcast;

#[derive(Debug, Serialize, PartialEq)]
pub struct OkResponse {
    pub ok: bool,
}

/// # API Error
///
/// Wraps a [`ServiceError`] so it can be returned from handlers.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            ServiceError::MissingDeviceId => (StatusCode::BAD_REQUEST, "missing device_id".to_string()),
            ServiceError::UnknownDevice(_) => (StatusCode::BAD_REQUEST, "unknown device".to_string()),
            ServiceError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad request".to_string()),
            ServiceError::Store(e) => {
                log::error!("Store error while handling request: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "store error".to_string())
            }
            ServiceError::Transport(e) => {
                log::error!("Transport error while handling request: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "broadcast failed".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn router(service: DeviceService) -> Router {
    Router::new()
        .route("/devices", get(devices_handler))
        .route("/update", post(update_handler))
        .route("/control", post(control_handler))
        .route("/health", get(health_handler))
        .with_state(service)
}

pub async fn run(addr: SocketAddr, service: DeviceService, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("HTTP API listening on {}", addr);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
            log::info!("HTTP API shutting down.");
        })
        .await?;
    Ok(())
}

async fn devices_handler(State(service): State<DeviceService>) -> Json<DeviceMap> {
    Json(service.list_devices().await)
}

async fn update_handler(
    State(service): State<DeviceService>,
    payload: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<OkResponse>, ApiError> {
    let Json(request) = payload.map_err(rejected_body)?;
    service.update_dates(request).await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn control_handler(
    State(service): State<DeviceService>,
    payload: Result<Json<ControlRequest>, JsonRejection>,
) -> Result<Json<OkResponse>, ApiError> {
    let Json(request) = payload.map_err(rejected_body)?;
    service.manual_control(request).await?;
    Ok(Json(OkResponse { ok: true }))
}

fn rejected_body(rejection: JsonRejection) -> ApiError {
    log::warn!("Rejected request body: {}", rejection.body_text());
    ApiError(ServiceError::BadRequest(rejection.body_text()))
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

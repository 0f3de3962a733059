// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! JSON-over-HTTP surface for the dig-out operations.

use crate::error::DigoutError;
use crate::service::{DigOutService, ServiceView};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct ServicesReply {
    pub items: Vec<ServiceView>,
}

/// Error response carrying the matching status code
#[derive(Debug)]
pub struct ApiError(DigoutError);

impl From<DigoutError> for ApiError {
    fn from(err: DigoutError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DigoutError::NotFound(_) => StatusCode::NOT_FOUND,
            DigoutError::AlreadyExists(_) => StatusCode::CONFLICT,
            DigoutError::ClusterUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!("Request failed ({}): {}", status, self.0);
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn router(service: Arc<DigOutService>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/services", get(list_services))
        .route("/api/services/{name}/dig-out", axum::routing::post(dig_out).delete(de_dig_out))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, service: Arc<DigOutService>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn list_services(
    State(service): State<Arc<DigOutService>>,
) -> Result<Json<ServicesReply>, ApiError> {
    let items = service.get_services().await?;
    Ok(Json(ServicesReply { items }))
}

async fn dig_out(
    State(service): State<Arc<DigOutService>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    service.dig_out(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn de_dig_out(
    State(service): State<Arc<DigOutService>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    service.de_dig_out(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

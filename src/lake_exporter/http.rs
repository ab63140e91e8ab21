// lake_exporter - Prometheus metrics exporter for wassertemperatur.org
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::registry::LakeRegistry;
use crate::sensor::LakeSensor;
use crate::setup::SetupError;
use crate::store::LakeEntry;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const TEXT_FORMAT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// State shared by all HTTP handlers.
#[derive(Debug)]
pub struct RequestContext {
    registry: Registry,
    lakes: Arc<LakeRegistry>,
}

impl RequestContext {
    pub fn new(registry: Registry, lakes: Arc<LakeRegistry>) -> Self {
        RequestContext { registry, lakes }
    }
}

/// Body for adding a lake or changing the URL of an existing one.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LakeRequest {
    pub lake_url: String,
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for SetupError {
    fn into_response(self) -> Response {
        let status = match &self {
            SetupError::InvalidSource(_) => StatusCode::BAD_REQUEST,
            SetupError::CannotConnect(_) => StatusCode::BAD_GATEWAY,
            SetupError::Duplicate(_) => StatusCode::CONFLICT,
            SetupError::UnknownLake(_) => StatusCode::NOT_FOUND,
            SetupError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorResponse {
            error: self.reason(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Routes for Prometheus metrics, the current value of each lake, and adding, changing,
/// or removing lakes.
pub fn router(context: Arc<RequestContext>) -> Router {
    Router::new()
        .route("/metrics", get(text_metrics))
        .route("/lakes", get(list_lakes).post(add_lake))
        .route("/lakes/:lake_id", get(get_lake).put(update_lake).delete(remove_lake))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

async fn text_metrics(State(context): State<Arc<RequestContext>>) -> Response {
    let mut buf = String::new();

    match encode(&mut buf, &context.registry) {
        Ok(()) => {
            tracing::debug!(message = "encoded prometheus metrics to text format", num_bytes = buf.len());
            ([(CONTENT_TYPE, TEXT_FORMAT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn list_lakes(State(context): State<Arc<RequestContext>>) -> Json<Vec<LakeSensor>> {
    Json(context.lakes.sensors().await)
}

async fn get_lake(
    State(context): State<Arc<RequestContext>>,
    Path(lake_id): Path<String>,
) -> Result<Json<LakeSensor>, SetupError> {
    context
        .lakes
        .sensor(&lake_id)
        .await
        .map(Json)
        .ok_or(SetupError::UnknownLake(lake_id))
}

async fn add_lake(
    State(context): State<Arc<RequestContext>>,
    Json(req): Json<LakeRequest>,
) -> Result<(StatusCode, Json<LakeEntry>), SetupError> {
    let entry = context.lakes.register(&req.lake_url).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn update_lake(
    State(context): State<Arc<RequestContext>>,
    Path(lake_id): Path<String>,
    Json(req): Json<LakeRequest>,
) -> Result<Json<LakeEntry>, SetupError> {
    context.lakes.reconfigure(&lake_id, &req.lake_url).await.map(Json)
}

async fn remove_lake(
    State(context): State<Arc<RequestContext>>,
    Path(lake_id): Path<String>,
) -> Result<Json<LakeEntry>, SetupError> {
    context.lakes.remove(&lake_id).await.map(Json)
}

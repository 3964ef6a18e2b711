//! HTTP handlers for the REST API

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use kube::{
    api::{Api, ListParams},
    ResourceExt,
};
use tracing::{error, instrument};

use crate::controller::ControllerState;
use crate::crd::Clique;

use super::dto::{
    CliqueDetailResponse, CliqueListResponse, CliqueSummary, ErrorResponse, HealthResponse,
};

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Health check endpoint
#[instrument(skip(state))]
pub async fn health(State(state): State<Arc<ControllerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        leader: state.is_leader(),
    })
}

/// Prometheus metrics in the OpenMetrics text format
pub async fn metrics() -> Response {
    match crate::controller::metrics::encode_registry() {
        Ok(body) => (
            [(
                header::CONTENT_TYPE,
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// List Cliques in the watched namespace
#[instrument(skip(state))]
pub async fn list_cliques(
    State(state): State<Arc<ControllerState>>,
) -> Result<Json<CliqueListResponse>, ApiError> {
    let api: Api<Clique> = state.api();

    match api.list(&ListParams::default()).await {
        Ok(cliques) => {
            let items: Vec<CliqueSummary> = cliques.items.iter().map(CliqueSummary::from).collect();
            let total = items.len();
            Ok(Json(CliqueListResponse { items, total }))
        }
        Err(e) => {
            error!("Failed to list cliques: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("list_failed", &e.to_string())),
            ))
        }
    }
}

/// Get a specific Clique with its full status
#[instrument(skip(state), fields(name = %name, namespace = %namespace))]
pub async fn get_clique(
    State(state): State<Arc<ControllerState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<CliqueDetailResponse>, ApiError> {
    let api: Api<Clique> = Api::namespaced(state.client.clone(), &namespace);

    match api.get(&name).await {
        Ok(clique) => Ok(Json(CliqueDetailResponse {
            name: clique.name_any(),
            namespace: clique.namespace().unwrap_or_default(),
            scaling_group: state
                .config
                .scaling_group_of(clique.labels())
                .map(str::to_string),
            status: clique.status.clone().unwrap_or_default(),
            created_at: clique
                .metadata
                .creation_timestamp
                .as_ref()
                .map(|t| t.0.to_rfc3339()),
        })),
        Err(kube::Error::Api(e)) if e.code == 404 => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                "not_found",
                &format!("Clique {}/{} not found", namespace, name),
            )),
        )),
        Err(e) => {
            error!("Failed to get clique {}/{}: {:?}", namespace, name, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("get_failed", &e.to_string())),
            ))
        }
    }
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use moka::future::Cache;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::AppError;
use crate::merge::MergeOptions;
use crate::models::*;
use crate::services;
use crate::store::PeopleStore;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// People store (Postgres in production).
    pub store: Arc<dyn PeopleStore>,
    /// Merge tunables derived from configuration.
    pub merge_options: MergeOptions,
    /// Projects with an auto-merge in flight, keyed by project id.
    /// Value is the unix timestamp the run started at.
    pub auto_merge_in_flight: Cache<Uuid, i64>,
}

impl AppState {
    pub fn new(store: Arc<dyn PeopleStore>, merge_options: MergeOptions) -> Self {
        // Entries outlive a stuck run by at most the lock TTL.
        let auto_merge_in_flight = Cache::builder()
            .time_to_live(merge_options.lock_ttl.max(Duration::from_secs(1)))
            .max_capacity(10_000)
            .build();

        Self {
            store,
            merge_options,
            auto_merge_in_flight,
        }
    }
}

/// Detection and merge routes, without transport layers.
pub fn people_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/v1/accounts/:account_id/projects/:project_id/people/duplicates",
            get(find_duplicates),
        )
        .route(
            "/api/v1/accounts/:account_id/projects/:project_id/people/merge",
            post(merge_people),
        )
        .route(
            "/api/v1/accounts/:account_id/projects/:project_id/people/auto-merge",
            post(auto_merge),
        )
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-people-merge-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /api/v1/accounts/:account_id/projects/:project_id/people/duplicates
///
/// Read-only detection pass over one project.
pub async fn find_duplicates(
    State(state): State<Arc<AppState>>,
    Path((account_id, project_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DeduplicationResult>, AppError> {
    tracing::info!("GET duplicates - account: {}, project: {}", account_id, project_id);

    let scope = ProjectScope::new(account_id, project_id);
    let result = services::find_duplicates(state.store.as_ref(), &scope).await;

    Ok(Json(result))
}

/// POST /api/v1/accounts/:account_id/projects/:project_id/people/merge
///
/// Manual merge of operator-chosen duplicates into a primary.
pub async fn merge_people(
    State(state): State<Arc<AppState>>,
    Path((account_id, project_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<MergeRequest>,
) -> Result<Json<MergeResult>, AppError> {
    tracing::info!(
        "POST merge - project: {}, primary: {}, duplicates: {}, dry_run: {}",
        project_id,
        payload.primary_id,
        payload.duplicate_ids.len(),
        payload.dry_run
    );

    if payload.duplicate_ids.is_empty() {
        return Err(AppError::BadRequest(
            "duplicate_ids must contain at least one id".to_string(),
        ));
    }

    let scope = ProjectScope::new(account_id, project_id);
    let result = services::merge_people(
        state.store.as_ref(),
        &scope,
        payload.primary_id,
        &payload.duplicate_ids,
        payload.dry_run,
        &state.merge_options,
    )
    .await;

    Ok(Json(result))
}

/// POST /api/v1/accounts/:account_id/projects/:project_id/people/auto-merge
///
/// Detects and merges every duplicate group. Dry run unless `dry_run: false`.
/// A second request for the same project while one is running gets 409.
/// The run outlives a disconnected client.
pub async fn auto_merge(
    State(state): State<Arc<AppState>>,
    Path((account_id, project_id)): Path<(Uuid, Uuid)>,
    payload: Option<Json<AutoMergeRequest>>,
) -> Result<Json<AutoMergeResult>, AppError> {
    let request = payload.map(|Json(body)| body).unwrap_or_default();
    tracing::info!(
        "POST auto-merge - project: {}, dry_run: {}",
        project_id,
        request.dry_run
    );

    let now = chrono::Utc::now().timestamp();
    let entry = state
        .auto_merge_in_flight
        .entry(project_id)
        .or_insert(now)
        .await;
    if !entry.is_fresh() {
        let started = *entry.value();
        tracing::warn!(
            "Auto-merge already running for project {} ({} seconds ago)",
            project_id,
            now - started
        );
        return Err(AppError::Conflict(format!(
            "Auto-merge already running for project {}",
            project_id
        )));
    }

    // Run detached so a dropped request still finishes the merge and clears
    // the in-flight marker.
    let scope = ProjectScope::new(account_id, project_id);
    let run_state = state.clone();
    let run = tokio::spawn(async move {
        let result = services::auto_merge_duplicates(
            run_state.store.as_ref(),
            &scope,
            request.dry_run,
            &run_state.merge_options,
        )
        .await;
        run_state.auto_merge_in_flight.invalidate(&scope.project_id).await;
        result
    });

    let result = match run.await {
        Ok(result) => result,
        Err(e) => {
            state.auto_merge_in_flight.invalidate(&project_id).await;
            return Err(AppError::InternalError(format!(
                "Auto-merge task for project {} failed: {}",
                project_id, e
            )));
        }
    };

    Ok(Json(result))
}

/// HTTP surface tests. The router is exercised in-process with an in-memory store.
mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    routing::get,
    Router,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tower::ServiceExt;
use uuid::Uuid;

use rust_people_merge_api::api::handlers::{self, AppState};
use rust_people_merge_api::merge::MergeOptions;
use rust_people_merge_api::errors::AppError;
use rust_people_merge_api::field_merge::PersonPatch;
use rust_people_merge_api::models::{Person, ProjectScope};
use rust_people_merge_api::relationships::{LinkTable, TransferPlan};
use rust_people_merge_api::store::{InMemoryStore, MergeLease, PeopleStore};

use common::{person, scope};

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .merge(handlers::people_routes())
        .with_state(state)
}

fn seeded_state() -> (Arc<AppState>, Arc<InMemoryStore>, ProjectScope, Uuid, Uuid) {
    let store = Arc::new(InMemoryStore::new());
    let scope = scope();
    let mut a = person(&scope, 0, "Alice");
    a.primary_email = Some("alice@acme.com".to_string());
    let mut b = person(&scope, 1, "Alice");
    b.primary_email = Some("alice@acme.com".to_string());
    store.insert_person(a.clone());
    store.insert_person(b.clone());

    let state = Arc::new(AppState::new(store.clone(), MergeOptions::default()));
    (state, store, scope, a.id, b.id)
}

fn people_uri(scope: &ProjectScope, action: &str) -> String {
    format!(
        "/api/v1/accounts/{}/projects/{}/people/{}",
        scope.account_id, scope.project_id, action
    )
}

fn post_json(uri: String, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_reports_service() {
    let (state, ..) = seeded_state();
    let response = app(state)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "rust-people-merge-api");
}

#[tokio::test]
async fn test_find_duplicates_returns_groups() {
    let (state, _store, scope, a, b) = seeded_state();
    let response = app(state)
        .oneshot(
            Request::builder()
                .uri(people_uri(&scope, "duplicates"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    let groups = body["duplicate_groups"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["reason"], "email");
    assert_eq!(groups[0]["people"][0]["id"], a.to_string());
    assert_eq!(groups[0]["people"][1]["id"], b.to_string());
}

#[tokio::test]
async fn test_merge_rejects_empty_duplicate_list() {
    let (state, store, scope, a, _) = seeded_state();
    let response = app(state)
        .oneshot(post_json(
            people_uri(&scope, "merge"),
            json!({ "primary_id": a, "duplicate_ids": [] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("duplicate_ids"));
    assert_eq!(store.people_count(), 2);
}

#[tokio::test]
async fn test_merge_executes_by_default() {
    let (state, store, scope, a, b) = seeded_state();
    let response = app(state)
        .oneshot(post_json(
            people_uri(&scope, "merge"),
            json!({ "primary_id": a, "duplicate_ids": [b] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["merged_ids"], json!([b]));
    assert_eq!(store.people_count(), 1);
}

#[tokio::test]
async fn test_merge_failure_is_reported_in_body() {
    let (state, _store, scope, _, b) = seeded_state();
    let missing = Uuid::new_v4();
    let response = app(state)
        .oneshot(post_json(
            people_uri(&scope, "merge"),
            json!({ "primary_id": missing, "duplicate_ids": [b] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(
        body["errors"][0],
        format!("Primary person not found: {}", missing)
    );
}

#[tokio::test]
async fn test_auto_merge_without_body_is_dry_run() {
    let (state, store, scope, ..) = seeded_state();
    let response = app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(people_uri(&scope, "auto-merge"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["groups_processed"], 1);
    assert_eq!(body["people_merged"], 1);
    assert_eq!(store.people_count(), 2);
}

#[tokio::test]
async fn test_auto_merge_executes_when_asked() {
    let (state, store, scope, ..) = seeded_state();
    let response = app(state.clone())
        .oneshot(post_json(
            people_uri(&scope, "auto-merge"),
            json!({ "dry_run": false }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.people_count(), 1);
    assert!(state
        .auto_merge_in_flight
        .get(&scope.project_id)
        .await
        .is_none());
}

#[tokio::test]
async fn test_auto_merge_conflicts_while_running() {
    let (state, store, scope, ..) = seeded_state();
    state
        .auto_merge_in_flight
        .insert(scope.project_id, chrono::Utc::now().timestamp())
        .await;

    let response = app(state)
        .oneshot(post_json(
            people_uri(&scope, "auto-merge"),
            json!({ "dry_run": false }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(store.people_count(), 2);
}

/// Holds project listings until the gate opens.
struct GatedStore {
    inner: Arc<InMemoryStore>,
    gate: Semaphore,
}

#[async_trait]
impl PeopleStore for GatedStore {
    async fn list_project_people(&self, scope: &ProjectScope) -> Result<Vec<Person>, AppError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| AppError::InternalError(e.to_string()))?;
        self.inner.list_project_people(scope).await
    }

    async fn get_person(&self, scope: &ProjectScope, id: Uuid) -> Result<Option<Person>, AppError> {
        self.inner.get_person(scope, id).await
    }

    async fn get_people(&self, scope: &ProjectScope, ids: &[Uuid]) -> Result<Vec<Person>, AppError> {
        self.inner.get_people(scope, ids).await
    }

    async fn list_link_keys(&self, table: LinkTable, person_id: Uuid) -> Result<Vec<String>, AppError> {
        self.inner.list_link_keys(table, person_id).await
    }

    async fn apply_transfer(
        &self,
        table: LinkTable,
        from: Uuid,
        to: Uuid,
        plan: &TransferPlan,
    ) -> Result<(), AppError> {
        self.inner.apply_transfer(table, from, to, plan).await
    }

    async fn update_person_fields(&self, id: Uuid, patch: &PersonPatch) -> Result<(), AppError> {
        self.inner.update_person_fields(id, patch).await
    }

    async fn delete_person(&self, id: Uuid) -> Result<(), AppError> {
        self.inner.delete_person(id).await
    }

    async fn acquire_merge_lock(
        &self,
        person_ids: &[Uuid],
        ttl: Duration,
    ) -> Result<Option<MergeLease>, AppError> {
        self.inner.acquire_merge_lock(person_ids, ttl).await
    }

    async fn release_merge_lock(&self, lease: &MergeLease) -> Result<(), AppError> {
        self.inner.release_merge_lock(lease).await
    }
}

#[tokio::test]
async fn test_abandoned_auto_merge_still_clears_in_flight_marker() {
    let (_, inner, scope, ..) = seeded_state();
    let gated = Arc::new(GatedStore {
        inner: inner.clone(),
        gate: Semaphore::new(0),
    });
    let state = Arc::new(AppState::new(gated.clone(), MergeOptions::default()));

    // The client gives up while detection is still blocked.
    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        app(state.clone()).oneshot(post_json(
            people_uri(&scope, "auto-merge"),
            json!({ "dry_run": false }),
        )),
    )
    .await;
    assert!(abandoned.is_err());

    gated.gate.add_permits(1);
    for _ in 0..200 {
        if state.auto_merge_in_flight.get(&scope.project_id).await.is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(state
        .auto_merge_in_flight
        .get(&scope.project_id)
        .await
        .is_none());
    // The detached run completed the merge.
    assert_eq!(inner.people_count(), 1);

    let response = app(state)
        .oneshot(post_json(
            people_uri(&scope, "auto-merge"),
            json!({ "dry_run": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

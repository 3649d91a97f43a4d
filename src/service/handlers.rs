//! HTTP handlers for the task API.
//!
//! Handlers translate requests into [`TableStore`] calls on the `tasks`
//! table. Reads run inline. Mutations go through [`with_store`] on the
//! blocking pool, since in [`PersistMode::Immediate`] they sync the backing
//! file before returning.
//!
//! [`PersistMode::Immediate`]: crate::persist::PersistMode::Immediate

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use super::dto::{ListQuery, Task, TaskRequest, TASKS_TABLE};
use super::error::ApiErrorResponse;
use crate::store::TableStore;
use crate::types::{Record, SearchCriteria};

/// Shared application dependencies.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TableStore>,
}

impl AppState {
    pub fn new(store: Arc<TableStore>) -> Self {
        Self { store }
    }
}

type ApiResult<T> = Result<T, ApiErrorResponse>;

/// Run a store call on the blocking thread pool.
async fn with_store<T, F>(state: &AppState, call: F) -> ApiResult<T>
where
    F: FnOnce(&TableStore) -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(&state.store);
    tokio::task::spawn_blocking(move || call(store.as_ref()))
        .await
        .map_err(|error| {
            tracing::error!(%error, "store task failed");
            ApiErrorResponse::internal_error()
        })?
        .map_err(ApiErrorResponse::from)
}

/// Unwrap a JSON body, treating any body problem as a validation failure.
fn request_body(body: Result<Json<TaskRequest>, JsonRejection>) -> ApiResult<TaskRequest> {
    body.map(|Json(request)| request).map_err(|rejection| {
        tracing::debug!(error = %rejection, "rejected task body");
        ApiErrorResponse::bad_request(rejection.body_text())
    })
}

/// `GET /tasks?search=X`: all tasks, or those whose title or description
/// contains `X`.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<Record>> {
    let criteria = query.search.filter(|s| !s.is_empty()).map(|search| {
        SearchCriteria::any()
            .field("title", &search)
            .field("description", &search)
    });

    Json(state.store.select(TASKS_TABLE, criteria.as_ref()))
}

/// `GET /tasks/{id}`
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Record>> {
    Ok(Json(state.store.select_by_id(TASKS_TABLE, &id)?))
}

/// `POST /tasks`
///
/// - **201 Created**: body is the stored task
/// - **400 Bad Request**: neither title nor description given
pub async fn create_task(
    State(state): State<AppState>,
    body: Result<Json<TaskRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let fields = request_body(body)?.validate()?;
    let task = Task::new(fields, Utc::now());

    let record = Record::from_serialize(&task)?;
    with_store(&state, move |store| store.insert(TASKS_TABLE, record)).await?;

    tracing::info!(id = %task.id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

/// `PUT /tasks/{id}`
///
/// Only the supplied, non-empty fields change; `updated_at` is refreshed.
pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<TaskRequest>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let fields = request_body(body)?.validate()?;

    let mut patch = Record::new();
    if let Some(title) = fields.title {
        patch.insert("title", title);
    }
    if let Some(description) = fields.description {
        patch.insert("description", description);
    }
    patch.insert("updated_at", json!(Utc::now()));

    with_store(&state, move |store| store.update(TASKS_TABLE, &id, patch)).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// `PATCH /tasks/{id}/complete`: flip `completed_at` between null and now.
pub async fn toggle_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    with_store(&state, move |store| {
        store.update_with(TASKS_TABLE, &id, |task| {
            let completed_at = if is_completed(task.get("completed_at")) {
                Value::Null
            } else {
                json!(Utc::now())
            };
            Record::new().with("completed_at", completed_at)
        })
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /tasks/{id}`
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let removed = with_store(&state, move |store| store.delete(TASKS_TABLE, &id)).await?;
    tracing::info!(id = removed.id().unwrap_or_default(), "task deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /health`
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// A task counts as completed when `completed_at` holds a non-empty value.
fn is_completed(completed_at: Option<&Value>) -> bool {
    match completed_at {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

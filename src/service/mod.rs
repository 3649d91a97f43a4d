//! HTTP surface for the `tasks` table.
//!
//! | Method | Path | Success | Failure |
//! |---|---|---|---|
//! | GET | `/tasks?search=X` | 200 | |
//! | GET | `/tasks/{id}` | 200 | 404 |
//! | POST | `/tasks` | 201 | 400 |
//! | PUT | `/tasks/{id}` | 204 | 400, 404 |
//! | PATCH | `/tasks/{id}/complete` | 204 | 404 |
//! | DELETE | `/tasks/{id}` | 204 | 404 |
//! | GET | `/health` | 200 | |

pub mod dto;
pub mod error;
pub mod handlers;

use axum::{
    routing::{get, patch},
    Router,
};
use tower_http::trace::TraceLayer;

pub use dto::{Task, TaskRequest, TASKS_TABLE};
pub use error::{ApiError, ApiErrorResponse};
pub use handlers::AppState;

use handlers::{
    create_task, delete_task, get_task, health_check, list_tasks, toggle_task, update_task,
};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/tasks/{id}/complete", patch(toggle_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

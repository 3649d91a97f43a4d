//! Task records and request bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ApiErrorResponse;

/// Table holding the tasks.
pub const TASKS_TABLE: &str = "tasks";

/// A task as stored in the `tasks` table.
///
/// Every field is written on creation, `null`s included, so later updates
/// can overwrite any of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A new, open task with a fresh UUID.
    pub fn new(fields: TaskFields, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: fields.title,
            description: fields.description,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Body of `POST /tasks` and `PUT /tasks/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// The non-empty text fields of a [`TaskRequest`]; at least one is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFields {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl TaskRequest {
    /// Drop empty strings and require a title or a description.
    pub fn validate(self) -> Result<TaskFields, ApiErrorResponse> {
        let title = self.title.filter(|s| !s.is_empty());
        let description = self.description.filter(|s| !s.is_empty());

        if title.is_none() && description.is_none() {
            return Err(ApiErrorResponse::bad_request(
                "title or description is required",
            ));
        }

        Ok(TaskFields { title, description })
    }
}

/// Query string of `GET /tasks`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
}

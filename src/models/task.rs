use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A kanban card within a project.
///
/// Tasks are assigned to enrolled students. Each assignment also grants the
/// student one mentorship booking in that project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub assignees: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The kanban column a task sits in.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "TODO",
            Self::InProgress => "IN_PROGRESS",
            Self::Review => "REVIEW",
            Self::Done => "DONE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "TODO" => Some(Self::Todo),
            "IN_PROGRESS" => Some(Self::InProgress),
            "REVIEW" => Some(Self::Review),
            "DONE" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Input for creating a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskInput {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub assignees: Vec<Uuid>,
}

/// Input for updating a task. Absent fields are left unchanged; `assignees`,
/// when present, replaces the whole assignee set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskInput {
    pub id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub assignees: Option<Vec<Uuid>>,
}

/// A task write, tagged by `op` so creates and updates are never confused.
///
/// ```json
/// {"op": "create", "title": "Wireframes", "assignees": ["..."]}
/// {"op": "update", "id": "...", "status": "DONE"}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TaskWrite {
    Create(CreateTaskInput),
    Update(UpdateTaskInput),
}

impl TaskWrite {
    /// Checks required fields before anything touches the database.
    pub fn validate(&self) -> Result<(), String> {
        let title = match self {
            Self::Create(input) => Some(&input.title),
            Self::Update(input) => input.title.as_ref(),
        };
        if title.is_some_and(|t| t.trim().is_empty()) {
            return Err("Task title must not be empty".to_string());
        }
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A project students can apply to.
///
/// Projects are published by a teacher in the `Open` state. The first accepted
/// application moves the project to `InProgress`; later states are set by the
/// owning teacher or an administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// The teacher who owns the project and decides its applications.
    pub teacher_id: Uuid,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The lifecycle state of a project.
///
/// - `Open`: Accepting applications
/// - `InProgress`: At least one student has been accepted
/// - `Completed`: Work finished
/// - `Archived`: Kept for reference only
/// - `Cancelled`: Abandoned
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Open,
    InProgress,
    Completed,
    Archived,
    Cancelled,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Archived => "ARCHIVED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(Self::Open),
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "ARCHIVED" => Some(Self::Archived),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether accepted students can still join.
    pub fn accepts_enrollment(&self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }
}

/// Input for creating a new project. The creator becomes its teacher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectInput {
    pub title: String,
    pub description: Option<String>,
}

/// Input for changing a project's status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectStatusInput {
    pub status: ProjectStatus,
}

/// A project with its enrolled students, used for detailed responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectWithStudents {
    #[serde(flatten)]
    pub project: Project,
    pub students: Vec<Uuid>,
}

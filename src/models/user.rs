use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A person using the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// What a user is allowed to do.
///
/// - `Student`: applies to projects, books mentorship within their quota
/// - `Teacher`: owns projects, decides applications, books without a quota
/// - `Admin`: everything a teacher can do, on any project, plus cleanup
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "STUDENT",
            Self::Teacher => "TEACHER",
            Self::Admin => "ADMIN",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "STUDENT" => Some(Self::Student),
            "TEACHER" => Some(Self::Teacher),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Teachers and admins are staff: no mentorship cap, may manage projects.
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Teacher | Self::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for registering a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserInput {
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
}

/// An opaque session token bound to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

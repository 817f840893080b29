use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Role;

/// Default length of a mentorship session, in minutes.
pub const DEFAULT_BOOKING_MINUTES: u32 = 30;

/// Longest mentorship session that can be booked, in minutes.
pub const MAX_BOOKING_MINUTES: u32 = 480;

/// A scheduled advisory session between a teacher and one or more students.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentorshipBooking {
    pub id: Uuid,
    pub project_id: Uuid,
    /// The staff member who created the booking, if any.
    pub teacher_id: Option<Uuid>,
    pub students: Vec<Uuid>,
    pub minutes: u32,
    /// Free-form notes agreed on during the session.
    pub agreements: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /mentorship/bookings`.
///
/// Students book for themselves in their active project and may leave
/// `project_id` and `student_ids` empty. Staff must name both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingInput {
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub student_ids: Vec<Uuid>,
    pub minutes: Option<u32>,
    pub agreements: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// How many mentorship bookings a user may still make.
///
/// Staff are never capped: `unlimited` is true and `available_slots` is null.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MentorshipQuota {
    pub role: Role,
    pub unlimited: bool,
    pub current_bookings: u32,
    pub total_tasks: u32,
    pub available_slots: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_title: Option<String>,
}

impl MentorshipQuota {
    pub fn unlimited(role: Role) -> Self {
        Self {
            role,
            unlimited: true,
            current_bookings: 0,
            total_tasks: 0,
            available_slots: None,
            project_id: None,
            project_title: None,
        }
    }

    /// A student without an active project.
    pub fn none(role: Role) -> Self {
        Self {
            role,
            unlimited: false,
            current_bookings: 0,
            total_tasks: 0,
            available_slots: Some(0),
            project_id: None,
            project_title: None,
        }
    }

    /// Whether one more booking fits.
    pub fn has_slot(&self) -> bool {
        self.unlimited || self.available_slots.unwrap_or(0) > 0
    }
}

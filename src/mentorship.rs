//! Mentorship quota and booking.
//!
//! A student earns one mentorship booking per task assigned to them in their
//! active (`IN_PROGRESS`) project. Staff are never capped.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::applications::authorize_project_staff;
use crate::db::{self, Database};
use crate::error::{AppError, AppResult};
use crate::models::*;

#[derive(Clone)]
pub struct MentorshipQuotaCalculator {
    db: Database,
}

impl MentorshipQuotaCalculator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Remaining bookable slots for `user_id` acting as `role`.
    pub fn compute_quota(&self, user_id: Uuid, role: Role) -> AppResult<MentorshipQuota> {
        if role.is_staff() {
            return Ok(MentorshipQuota::unlimited(role));
        }
        self.db.read(|conn| Ok(student_quota(conn, user_id, role)?))
    }

    /// Creates a booking.
    ///
    /// Students book for themselves in their active project and need a free
    /// slot; the slot check and the insert share one transaction. Staff book
    /// for enrolled students of a project they manage, without a cap.
    pub fn book(&self, actor: &User, input: CreateBookingInput) -> AppResult<MentorshipBooking> {
        let minutes = input.minutes.unwrap_or(DEFAULT_BOOKING_MINUTES);
        if minutes == 0 || minutes > MAX_BOOKING_MINUTES {
            return Err(AppError::validation(format!(
                "minutes must be between 1 and {MAX_BOOKING_MINUTES}"
            )));
        }

        let booking = match actor.role {
            Role::Student => self.book_as_student(actor, &input, minutes)?,
            Role::Teacher | Role::Admin => self.book_as_staff(actor, &input, minutes)?,
        };

        tracing::info!(
            booking = %booking.id,
            project = %booking.project_id,
            by = %actor.id,
            students = booking.students.len(),
            "Mentorship booked"
        );
        Ok(booking)
    }

    fn book_as_student(
        &self,
        student: &User,
        input: &CreateBookingInput,
        minutes: u32,
    ) -> AppResult<MentorshipBooking> {
        if input.student_ids.iter().any(|id| *id != student.id) {
            return Err(AppError::forbidden("Students can only book for themselves"));
        }

        self.db.transaction(|conn| {
            let quota = student_quota(conn, student.id, student.role)?;
            let project_id = quota
                .project_id
                .ok_or_else(|| AppError::state("You have no project in progress"))?;

            if input.project_id.is_some_and(|requested| requested != project_id) {
                return Err(AppError::validation(
                    "Bookings can only be made for your active project",
                ));
            }
            if !quota.has_slot() {
                return Err(AppError::state(format!(
                    "No mentorship slots remaining ({} of {} used)",
                    quota.current_bookings, quota.total_tasks
                )));
            }

            let id = db::insert_booking(
                conn,
                project_id,
                None,
                &[student.id],
                input,
                minutes,
                Utc::now(),
            )?;
            load_booking(conn, id)
        })
    }

    fn book_as_staff(
        &self,
        staff: &User,
        input: &CreateBookingInput,
        minutes: u32,
    ) -> AppResult<MentorshipBooking> {
        let project_id = input
            .project_id
            .ok_or_else(|| AppError::validation("projectId is required"))?;
        if input.student_ids.is_empty() {
            return Err(AppError::validation("At least one student is required"));
        }

        self.db.transaction(|conn| {
            let project = db::fetch_project(conn, project_id)?.ok_or(AppError::NotFound("Project"))?;
            authorize_project_staff(staff, &project)?;

            for student_id in &input.student_ids {
                if !db::is_enrolled(conn, project_id, *student_id)? {
                    return Err(AppError::validation(format!(
                        "Student {student_id} is not enrolled in this project"
                    )));
                }
            }

            let id = db::insert_booking(
                conn,
                project_id,
                Some(staff.id),
                &input.student_ids,
                input,
                minutes,
                Utc::now(),
            )?;
            load_booking(conn, id)
        })
    }

    pub fn list_bookings(&self, user: &User) -> AppResult<Vec<MentorshipBooking>> {
        let bookings = match user.role {
            Role::Student => self.db.get_bookings_for_student(user.id)?,
            Role::Teacher => self.db.get_bookings_for_teacher(user.id)?,
            Role::Admin => self.db.get_all_bookings()?,
        };
        Ok(bookings)
    }
}

/// Slots left once existing bookings are subtracted from assigned tasks.
pub fn available_slots(total_tasks: u32, current_bookings: u32) -> u32 {
    total_tasks.saturating_sub(current_bookings)
}

fn student_quota(conn: &Connection, student_id: Uuid, role: Role) -> rusqlite::Result<MentorshipQuota> {
    // Several active projects: the oldest one counts.
    let active = conn
        .query_row(
            "SELECT p.id, p.title
             FROM projects p
             JOIN project_students s ON s.project_id = p.id
             WHERE s.student_id = ? AND p.status = 'IN_PROGRESS'
             ORDER BY p.created_at, p.id
             LIMIT 1",
            [student_id.to_string()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    let Some((project_id, project_title)) = active else {
        return Ok(MentorshipQuota::none(role));
    };

    let total_tasks: u32 = conn.query_row(
        "SELECT COUNT(*) FROM tasks t
         JOIN task_assignees a ON a.task_id = t.id
         WHERE t.project_id = ? AND a.student_id = ?",
        (&project_id, student_id.to_string()),
        |row| row.get(0),
    )?;

    let current_bookings: u32 = conn.query_row(
        "SELECT COUNT(*) FROM mentorship_bookings b
         JOIN booking_students bs ON bs.booking_id = b.id
         WHERE b.project_id = ? AND bs.student_id = ?",
        (&project_id, student_id.to_string()),
        |row| row.get(0),
    )?;

    Ok(MentorshipQuota {
        role,
        unlimited: false,
        current_bookings,
        total_tasks,
        available_slots: Some(available_slots(total_tasks, current_bookings)),
        project_id: Some(db::parse_uuid(project_id)),
        project_title: Some(project_title),
    })
}

fn load_booking(conn: &Connection, id: Uuid) -> AppResult<MentorshipBooking> {
    db::fetch_booking(conn, id)?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("booking vanished after insert")))
}

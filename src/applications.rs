//! Project application lifecycle.
//!
//! An application starts `PENDING` and is decided once by the project's
//! teacher (or an admin). Acceptance enrolls the student and moves an `OPEN`
//! project to `IN_PROGRESS`. The status change and the enrollment are written
//! in a single transaction: an accepted application without an enrollment
//! cannot be produced here. Databases carrying such rows from older writers
//! can be inspected with [`ApplicationLifecycle::orphaned_acceptances`] and
//! fixed with [`ApplicationLifecycle::repair_orphaned_acceptances`].

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::db::{self, Database};
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::models::*;

/// An accepted application whose student is missing from the enrolled set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanedAcceptance {
    pub application_id: Uuid,
    pub project_id: Uuid,
    pub student_id: Uuid,
}

#[derive(Clone)]
pub struct ApplicationLifecycle {
    db: Database,
}

impl ApplicationLifecycle {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Files a `PENDING` application for `student_id`.
    pub fn apply(&self, student_id: Uuid, input: ApplyInput) -> AppResult<ProjectApplication> {
        let project_id = input
            .project_id
            .ok_or_else(|| AppError::validation("projectId is required"))?;

        let result = self.db.transaction(|conn| {
            let project = db::fetch_project(conn, project_id)?.ok_or(AppError::NotFound("Project"))?;

            if db::fetch_application_for(conn, project_id, student_id)?.is_some() {
                return Err(AppError::conflict(
                    "You have already applied to this project",
                ));
            }

            if project.status != ProjectStatus::Open {
                return Err(AppError::state(format!(
                    "Project is not open for applications (status {})",
                    project.status.as_str()
                )));
            }

            let now = Utc::now();
            let application = ProjectApplication {
                id: Uuid::new_v4(),
                project_id,
                student_id,
                motivation: input.motivation.trim().to_string(),
                status: ApplicationStatus::Pending,
                created_at: now,
                updated_at: now,
            };

            conn.execute(
                "INSERT INTO project_applications (id, project_id, student_id, motivation, status, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                (
                    application.id.to_string(),
                    project_id.to_string(),
                    student_id.to_string(),
                    &application.motivation,
                    application.status.as_str(),
                    db::timestamp(now),
                    db::timestamp(now),
                ),
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::conflict("You have already applied to this project")
                } else {
                    e.into()
                }
            })?;

            Ok(application)
        });

        if let Ok(application) = &result {
            tracing::info!(
                application = %application.id,
                project = %project_id,
                student = %student_id,
                "Application submitted"
            );
        }
        result
    }

    /// Accepts or rejects an application on behalf of `decider`.
    ///
    /// Deciding the same way twice leaves the status alone, though a repeated
    /// accept enrolls the student if they are missing. Reversing a decision
    /// is a state error.
    pub fn decide(
        &self,
        decider: &User,
        application_id: Uuid,
        decision: Decision,
    ) -> AppResult<ProjectApplication> {
        let application = self.db.transaction(|conn| {
            let mut application = db::fetch_application(conn, application_id)?
                .ok_or(AppError::NotFound("Application"))?;
            let project = db::fetch_project(conn, application.project_id)?
                .ok_or(AppError::NotFound("Project"))?;

            authorize_project_staff(decider, &project)?;

            let outcome = decision.outcome();
            if application.status != ApplicationStatus::Pending && application.status != outcome {
                return Err(AppError::state(format!(
                    "Application has already been {}",
                    application.status.as_str().to_lowercase()
                )));
            }

            let now = Utc::now();
            if decision == Decision::Accept {
                // A repeated accept still enrolls a student left out by an older writer.
                let enrolled = db::is_enrolled(conn, project.id, application.student_id)?;
                if application.status == ApplicationStatus::Pending || !enrolled {
                    if !project.status.accepts_enrollment() {
                        return Err(AppError::state(format!(
                            "Cannot accept students into a {} project",
                            project.status.as_str()
                        )));
                    }
                    db::enroll_student(conn, project.id, application.student_id, now)?;
                    if project.status == ProjectStatus::Open {
                        db::update_project_status(conn, project.id, ProjectStatus::InProgress, now)?;
                    }
                }
            }

            if application.status == outcome {
                return Ok(application);
            }

            conn.execute(
                "UPDATE project_applications SET status = ?, updated_at = ? WHERE id = ?",
                (outcome.as_str(), db::timestamp(now), application.id.to_string()),
            )?;

            application.status = outcome;
            application.updated_at = now;
            Ok(application)
        })?;

        tracing::info!(
            application = %application.id,
            decider = %decider.id,
            status = application.status.as_str(),
            "Application decided"
        );
        Ok(application)
    }

    pub fn list_for_project(&self, viewer: &User, project_id: Uuid) -> AppResult<Vec<ProjectApplication>> {
        let project = self
            .db
            .get_project(project_id)?
            .ok_or(AppError::NotFound("Project"))?;
        authorize_project_staff(viewer, &project)?;
        Ok(self.db.get_applications_by_project(project_id)?)
    }

    pub fn list_for_student(&self, student_id: Uuid) -> AppResult<Vec<ProjectApplication>> {
        Ok(self.db.get_applications_by_student(student_id)?)
    }

    /// Administrative cleanup: drops the student's enrollment together with
    /// their application, so neither outlives the other.
    pub fn remove_student(&self, project_id: Uuid, student_id: Uuid) -> AppResult<()> {
        self.db.transaction(|conn| {
            db::fetch_project(conn, project_id)?.ok_or(AppError::NotFound("Project"))?;

            let enrollments = conn.execute(
                "DELETE FROM project_students WHERE project_id = ? AND student_id = ?",
                (project_id.to_string(), student_id.to_string()),
            )?;
            let applications = conn.execute(
                "DELETE FROM project_applications WHERE project_id = ? AND student_id = ?",
                (project_id.to_string(), student_id.to_string()),
            )?;

            if enrollments + applications == 0 {
                return Err(AppError::NotFound("Enrollment"));
            }
            Ok(())
        })?;

        tracing::info!(project = %project_id, student = %student_id, "Student removed from project");
        Ok(())
    }

    /// Accepted applications with no matching enrollment.
    pub fn orphaned_acceptances(&self) -> AppResult<Vec<OrphanedAcceptance>> {
        self.db.read(|conn| Ok(find_orphans(conn)?))
    }

    /// Enrolls every orphaned acceptance and returns how many were fixed.
    pub fn repair_orphaned_acceptances(&self) -> AppResult<usize> {
        let repaired = self.db.transaction(|conn| {
            let orphans = find_orphans(conn)?;
            let now = Utc::now();
            for orphan in &orphans {
                db::enroll_student(conn, orphan.project_id, orphan.student_id, now)?;
                tracing::warn!(
                    application = %orphan.application_id,
                    project = %orphan.project_id,
                    student = %orphan.student_id,
                    "Enrolled student with orphaned acceptance"
                );
            }
            Ok::<_, AppError>(orphans.len())
        })?;
        Ok(repaired)
    }
}

/// Admins may act on any project; teachers only on their own.
pub fn authorize_project_staff(user: &User, project: &Project) -> AppResult<()> {
    match user.role {
        Role::Admin => Ok(()),
        Role::Teacher if user.id == project.teacher_id => Ok(()),
        Role::Teacher => Err(AppError::forbidden(
            "Only the project's teacher can manage it",
        )),
        Role::Student => Err(AppError::forbidden("Teacher or admin role required")),
    }
}

fn find_orphans(conn: &rusqlite::Connection) -> rusqlite::Result<Vec<OrphanedAcceptance>> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.project_id, a.student_id
         FROM project_applications a
         LEFT JOIN project_students s
           ON s.project_id = a.project_id AND s.student_id = a.student_id
         WHERE a.status = 'ACCEPTED' AND s.student_id IS NULL
         ORDER BY a.created_at, a.id",
    )?;
    let orphans = stmt
        .query_map([], |row| {
            Ok(OrphanedAcceptance {
                application_id: db::parse_uuid(row.get(0)?),
                project_id: db::parse_uuid(row.get(1)?),
                student_id: db::parse_uuid(row.get(2)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(orphans)
}

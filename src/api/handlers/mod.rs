use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use super::auth::{require_admin, require_staff, require_student, CurrentUser};
use super::AppState;
use crate::applications::authorize_project_staff;
use crate::error::{AppError, AppResult};
use crate::models::*;

/// Unwraps a JSON body, turning malformed input into a validation error.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    let Json(value) = payload?;
    Ok(value)
}

fn load_project(state: &AppState, id: Uuid) -> AppResult<Project> {
    state.db.get_project(id)?.ok_or(AppError::NotFound("Project"))
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Applications
// ============================================================

pub async fn apply(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<ApplyInput>, JsonRejection>,
) -> AppResult<Json<ProjectApplication>> {
    require_student(&user)?;
    let input = body(payload)?;
    state.applications.apply(user.id, input).map(Json)
}

pub async fn list_my_applications(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<ProjectApplication>>> {
    require_student(&user)?;
    state.applications.list_for_student(user.id).map(Json)
}

pub async fn decide_application(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<DecideInput>, JsonRejection>,
) -> AppResult<Json<DecideResponse>> {
    require_staff(&user)?;
    let input = body(payload)?;

    let application_id = input
        .application_id
        .ok_or_else(|| AppError::validation("applicationId is required"))?;
    let decision = input
        .action
        .as_deref()
        .and_then(Decision::parse)
        .ok_or_else(|| AppError::validation("action must be ACCEPT or REJECT"))?;

    let application = state
        .applications
        .decide(&user, application_id, decision)?;

    Ok(Json(DecideResponse {
        success: true,
        application,
    }))
}

// ============================================================
// Mentorship
// ============================================================

pub async fn get_quota(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<MentorshipQuota>> {
    state.mentorship.compute_quota(user.id, user.role).map(Json)
}

pub async fn create_booking(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<CreateBookingInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<MentorshipBooking>)> {
    let input = body(payload)?;
    let booking = state.mentorship.book(&user, input)?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<MentorshipBooking>>> {
    state.mentorship.list_bookings(&user).map(Json)
}

// ============================================================
// Projects
// ============================================================

pub async fn list_projects(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> AppResult<Json<Vec<Project>>> {
    Ok(Json(state.db.get_all_projects()?))
}

pub async fn create_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<CreateProjectInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Project>)> {
    require_staff(&user)?;
    let mut input = body(payload)?;

    input.title = input.title.trim().to_string();
    if input.title.is_empty() {
        return Err(AppError::validation("Project title must not be empty"));
    }

    let project = state.db.create_project(user.id, input)?;
    tracing::info!(project = %project.id, teacher = %user.id, "Project created");
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn get_project(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ProjectWithStudents>> {
    state
        .db
        .get_project_with_students(id)?
        .map(Json)
        .ok_or(AppError::NotFound("Project"))
}

pub async fn update_project_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateProjectStatusInput>, JsonRejection>,
) -> AppResult<Json<Project>> {
    let input = body(payload)?;
    let project = load_project(&state, id)?;
    authorize_project_staff(&user, &project)?;

    if input.status == ProjectStatus::InProgress {
        return Err(AppError::state(
            "A project moves to IN_PROGRESS only by accepting an application",
        ));
    }

    let updated = state
        .db
        .set_project_status(id, input.status)?
        .ok_or(AppError::NotFound("Project"))?;
    tracing::info!(project = %id, status = updated.status.as_str(), "Project status changed");
    Ok(Json(updated))
}

pub async fn list_project_applications(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<ProjectApplication>>> {
    state.applications.list_for_project(&user, id).map(Json)
}

pub async fn remove_student(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, student_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    require_admin(&user)?;
    state.applications.remove_student(id, student_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================
// Tasks
// ============================================================

pub async fn list_tasks(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Task>>> {
    load_project(&state, id)?;
    Ok(Json(state.db.get_tasks_by_project(id)?))
}

pub async fn write_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<TaskWrite>, JsonRejection>,
) -> AppResult<Json<Task>> {
    let write = body(payload)?;
    let project = load_project(&state, id)?;
    authorize_project_staff(&user, &project)?;
    state.db.write_task(id, write).map(Json)
}

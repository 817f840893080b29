pub mod auth;
mod handlers;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::applications::ApplicationLifecycle;
use crate::config::AppConfig;
use crate::db::Database;
use crate::mentorship::MentorshipQuotaCalculator;

/// Per-request state. Configuration is injected here rather than read from
/// the environment inside handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<AppConfig>,
    pub applications: ApplicationLifecycle,
    pub mentorship: MentorshipQuotaCalculator,
}

impl AppState {
    pub fn new(db: Database, config: AppConfig) -> Self {
        Self {
            applications: ApplicationLifecycle::new(db.clone()),
            mentorship: MentorshipQuotaCalculator::new(db.clone()),
            config: Arc::new(config),
            db,
        }
    }
}

pub fn create_router(db: Database, config: AppConfig) -> Router {
    let cors = config.cors_layer();
    let state = AppState::new(db, config);

    Router::new()
        // Applications
        .route("/applications", post(handlers::apply))
        .route("/applications", get(handlers::list_my_applications))
        .route("/applications/decide", post(handlers::decide_application))
        // Mentorship
        .route("/mentorship/quota", get(handlers::get_quota))
        .route("/mentorship/bookings", post(handlers::create_booking))
        .route("/mentorship/bookings", get(handlers::list_bookings))
        // Projects
        .route("/projects", get(handlers::list_projects))
        .route("/projects", post(handlers::create_project))
        .route("/projects/{id}", get(handlers::get_project))
        .route("/projects/{id}/status", put(handlers::update_project_status))
        .route("/projects/{id}/applications", get(handlers::list_project_applications))
        .route("/projects/{id}/students/{student_id}", delete(handlers::remove_student))
        .route("/projects/{id}/tasks", get(handlers::list_tasks))
        .route("/projects/{id}/tasks", put(handlers::write_task))
        // Health
        .route("/health", get(handlers::health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

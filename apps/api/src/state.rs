use std::sync::Arc;

use sqlx::PgPool;

use crate::search::service::CandidateSearchService;
use crate::tasks::service::{TaskAssignmentService, TaskService};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub candidate_search: Arc<CandidateSearchService>,
    pub task_service: Arc<TaskService>,
    /// Owns the processor registry; every completion goes through it.
    pub task_assignments: Arc<TaskAssignmentService>,
}

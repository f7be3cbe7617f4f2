pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::search::handlers as search;
use crate::state::AppState;
use crate::tasks::handlers as tasks;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Candidate search
        .route(
            "/api/v1/candidates/search",
            post(search::handle_search_candidates),
        )
        // Task catalogue
        .route("/api/v1/tasks", get(tasks::handle_list_tasks))
        .route("/api/v1/tasks/search", post(tasks::handle_search_tasks))
        .route(
            "/api/v1/tasks/:id",
            get(tasks::handle_get_task).put(tasks::handle_update_task),
        )
        // Task assignments
        .route(
            "/api/v1/task-assignments",
            get(tasks::handle_list_task_assignments).post(tasks::handle_assign_task),
        )
        .route(
            "/api/v1/task-assignments/:id",
            get(tasks::handle_get_task_assignment)
                .put(tasks::handle_update_task_assignment)
                .delete(tasks::handle_delete_task_assignment),
        )
        .route(
            "/api/v1/task-assignments/:id/deactivate",
            post(tasks::handle_deactivate_task_assignment),
        )
        .route(
            "/api/v1/task-assignments/:id/complete",
            post(tasks::handle_complete_task),
        )
        .route(
            "/api/v1/task-assignments/:id/upload",
            post(tasks::handle_upload_task),
        )
        .with_state(state)
}

use std::collections::HashMap;

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::candidate::CandidateId;
use crate::models::task::{Task, TaskAssignment, TaskAssignmentId, TaskId};
use crate::state::AppState;
use crate::tasks::processor::{TaskCompletionContext, UploadedFile};
use crate::tasks::service::{
    AssignTaskRequest, ListTaskAssignmentsRequest, SearchTaskRequest, TaskPage,
    UpdateTaskAssignmentRequest, UpdateTaskRequest,
};

/// Admin user performing the change.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActingUserQuery {
    pub user_id: i64,
}

/// Candidate completing their own assignment.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateQuery {
    pub candidate_id: CandidateId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTaskRequest {
    #[serde(default)]
    pub field_answers: HashMap<String, String>,
}

/// GET /api/v1/tasks
pub async fn handle_list_tasks(State(state): State<AppState>) -> Result<Json<Vec<Task>>, AppError> {
    Ok(Json(state.task_service.list_tasks().await?))
}

/// GET /api/v1/tasks/:id
pub async fn handle_get_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(state.task_service.get(id).await?))
}

/// PUT /api/v1/tasks/:id
pub async fn handle_update_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(state.task_service.update(id, req).await?))
}

/// POST /api/v1/tasks/search
pub async fn handle_search_tasks(
    State(state): State<AppState>,
    Json(req): Json<SearchTaskRequest>,
) -> Result<Json<TaskPage>, AppError> {
    Ok(Json(state.task_service.search_tasks(&req).await?))
}

/// POST /api/v1/task-assignments
pub async fn handle_assign_task(
    State(state): State<AppState>,
    Query(acting): Query<ActingUserQuery>,
    Json(req): Json<AssignTaskRequest>,
) -> Result<Json<Vec<TaskAssignment>>, AppError> {
    let assignments = state
        .task_assignments
        .assign_task_to_candidate(acting.user_id, &req)
        .await?;
    Ok(Json(assignments))
}

/// GET /api/v1/task-assignments
pub async fn handle_list_task_assignments(
    State(state): State<AppState>,
    Query(req): Query<ListTaskAssignmentsRequest>,
) -> Result<Json<Vec<TaskAssignment>>, AppError> {
    Ok(Json(state.task_assignments.list_task_assignments(&req).await?))
}

/// GET /api/v1/task-assignments/:id
pub async fn handle_get_task_assignment(
    State(state): State<AppState>,
    Path(id): Path<TaskAssignmentId>,
) -> Result<Json<TaskAssignment>, AppError> {
    Ok(Json(state.task_assignments.get(id).await?))
}

/// PUT /api/v1/task-assignments/:id
pub async fn handle_update_task_assignment(
    State(state): State<AppState>,
    Path(id): Path<TaskAssignmentId>,
    Json(req): Json<UpdateTaskAssignmentRequest>,
) -> Result<Json<TaskAssignment>, AppError> {
    Ok(Json(state.task_assignments.update(id, req).await?))
}

/// DELETE /api/v1/task-assignments/:id
pub async fn handle_delete_task_assignment(
    State(state): State<AppState>,
    Path(id): Path<TaskAssignmentId>,
    Query(acting): Query<ActingUserQuery>,
) -> Result<Json<TaskAssignment>, AppError> {
    Ok(Json(state.task_assignments.delete(acting.user_id, id).await?))
}

/// POST /api/v1/task-assignments/:id/deactivate
pub async fn handle_deactivate_task_assignment(
    State(state): State<AppState>,
    Path(id): Path<TaskAssignmentId>,
    Query(acting): Query<ActingUserQuery>,
) -> Result<Json<TaskAssignment>, AppError> {
    Ok(Json(state.task_assignments.deactivate(acting.user_id, id).await?))
}

/// POST /api/v1/task-assignments/:id/complete
pub async fn handle_complete_task(
    State(state): State<AppState>,
    Path(id): Path<TaskAssignmentId>,
    Query(candidate): Query<CandidateQuery>,
    Json(req): Json<CompleteTaskRequest>,
) -> Result<Json<TaskAssignment>, AppError> {
    let context = TaskCompletionContext {
        candidate_id: candidate.candidate_id,
        field_answers: req.field_answers,
        files: Vec::new(),
    };
    Ok(Json(state.task_assignments.complete_task(id, &context).await?))
}

/// POST /api/v1/task-assignments/:id/upload
///
/// Multipart form: parts with a file name are uploads, every other part is a
/// field answer keyed by its part name.
pub async fn handle_upload_task(
    State(state): State<AppState>,
    Path(id): Path<TaskAssignmentId>,
    Query(candidate): Query<CandidateQuery>,
    mut multipart: Multipart,
) -> Result<Json<TaskAssignment>, AppError> {
    let mut context = TaskCompletionContext::for_candidate(candidate.candidate_id);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(e.to_string()))?;
                context.files.push(UploadedFile {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(e.to_string()))?;
                context.field_answers.insert(name, value);
            }
        }
    }

    Ok(Json(state.task_assignments.complete_task(id, &context).await?))
}

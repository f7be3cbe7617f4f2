use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::models::candidate::CandidateId;
use crate::models::task::{AssignmentStatus, Task, TaskAssignment, TaskAssignmentId, TaskId};
use crate::tasks::processor::{TaskCompletionContext, TaskProcessorRegistry};
use crate::tasks::question::allowed_answers;
use crate::tasks::repository::{CandidateDirectory, TaskAssignmentRepository, TaskRepository};

const DEFAULT_TASK_PAGE_SIZE: i64 = 20;

/// Fills in fields that are derived rather than stored.
pub fn populate_transient_fields(task: &mut Task) {
    task.allowed_answers = if task.task_type.is_question() {
        allowed_answers(task)
    } else {
        Vec::new()
    };
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchTaskRequest {
    pub keyword: Option<String>,
    pub page_number: i64,
    pub page_size: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub total_count: i64,
    pub page_number: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub display_name: String,
    pub description: Option<String>,
    pub days_to_complete: Option<i32>,
    pub help_link: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

/// Read and admin-edit access to task definitions.
pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
}

impl TaskService {
    pub fn new(tasks: Arc<dyn TaskRepository>) -> Self {
        Self { tasks }
    }

    pub async fn get(&self, id: TaskId) -> Result<Task, AppError> {
        let mut task = self
            .tasks
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Task {id} not found")))?;
        populate_transient_fields(&mut task);
        Ok(task)
    }

    /// Case-insensitive lookup by the task's unique name.
    pub async fn get_by_name(&self, name: &str) -> Result<Task, AppError> {
        let mut task = self
            .tasks
            .find_by_lower_name(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Task '{name}' not found")))?;
        populate_transient_fields(&mut task);
        Ok(task)
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>, AppError> {
        let mut tasks = self.tasks.find_all_by_name().await?;
        tasks.iter_mut().for_each(populate_transient_fields);
        Ok(tasks)
    }

    pub async fn search_tasks(&self, request: &SearchTaskRequest) -> Result<TaskPage, AppError> {
        let page_size = request.page_size.unwrap_or(DEFAULT_TASK_PAGE_SIZE);
        if page_size < 1 {
            return Err(AppError::Validation("pageSize must be at least 1".to_string()));
        }
        if request.page_number < 0 {
            return Err(AppError::Validation("pageNumber must not be negative".to_string()));
        }
        let offset = request
            .page_number
            .checked_mul(page_size)
            .ok_or_else(|| AppError::Validation("pageNumber is too large".to_string()))?;
        let keyword = request
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());

        let (mut tasks, total_count) = self.tasks.search(keyword, page_size, offset).await?;
        tasks.iter_mut().for_each(populate_transient_fields);

        Ok(TaskPage {
            tasks,
            total_count,
            page_number: request.page_number,
            page_size,
            total_pages: (total_count + page_size - 1) / page_size,
        })
    }

    pub async fn update(&self, id: TaskId, request: UpdateTaskRequest) -> Result<Task, AppError> {
        let display_name = request.display_name.trim();
        if display_name.is_empty() {
            return Err(AppError::Validation("displayName must not be blank".to_string()));
        }
        if let Some(days) = request.days_to_complete {
            if days < 0 {
                return Err(AppError::Validation(
                    "daysToComplete must not be negative".to_string(),
                ));
            }
        }

        let mut task = self
            .tasks
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Task {id} not found")))?;

        if let Some(existing) = self.tasks.find_by_lower_display_name(display_name).await? {
            if existing.id != id {
                return Err(AppError::Conflict(format!(
                    "Task with display name '{display_name}' already exists"
                )));
            }
        }

        task.display_name = display_name.to_string();
        task.description = request.description;
        task.days_to_complete = request.days_to_complete;
        task.help_link = request
            .help_link
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        task.optional = request.optional;

        self.tasks.update(&task).await?;
        info!("Updated task {} ('{}')", task.id, task.name);
        populate_transient_fields(&mut task);
        Ok(task)
    }
}

/// Assign a task to one candidate or to every candidate on a saved list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignTaskRequest {
    pub task_id: TaskId,
    pub candidate_id: Option<CandidateId>,
    pub saved_list_id: Option<i64>,
    /// Overrides today + the task's days to complete.
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateTaskAssignmentRequest {
    pub due_date: Option<NaiveDate>,
    pub completed: Option<bool>,
    pub abandoned: bool,
    pub candidate_notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListTaskAssignmentsRequest {
    pub task_id: Option<TaskId>,
    pub saved_list_id: Option<i64>,
}

/// Lifecycle of task assignments. Kind-specific work goes through the
/// processor registry.
pub struct TaskAssignmentService {
    tasks: Arc<dyn TaskRepository>,
    assignments: Arc<dyn TaskAssignmentRepository>,
    candidates: Arc<dyn CandidateDirectory>,
    registry: Arc<TaskProcessorRegistry>,
}

impl TaskAssignmentService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        assignments: Arc<dyn TaskAssignmentRepository>,
        candidates: Arc<dyn CandidateDirectory>,
        registry: Arc<TaskProcessorRegistry>,
    ) -> Self {
        Self {
            tasks,
            assignments,
            candidates,
            registry,
        }
    }

    pub async fn assign_task_to_candidate(
        &self,
        acting_user_id: i64,
        request: &AssignTaskRequest,
    ) -> Result<Vec<TaskAssignment>, AppError> {
        let candidate_ids = match (request.candidate_id, request.saved_list_id) {
            (Some(candidate_id), None) => vec![candidate_id],
            (None, Some(list_id)) => self.candidates.saved_list_candidate_ids(list_id).await?,
            (Some(_), Some(_)) => {
                return Err(AppError::Validation(
                    "Give either candidateId or savedListId, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(AppError::Validation(
                    "Either candidateId or savedListId must be provided".to_string(),
                ))
            }
        };

        let task = self
            .tasks
            .find_by_id(request.task_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Task {} not found", request.task_id)))?;
        let processor = self.registry.get(task.task_type)?;

        let today = Utc::now().date_naive();
        let due_date = match (request.due_date, task.days_to_complete) {
            (Some(date), _) => Some(date),
            (None, Some(days)) => today.checked_add_days(Days::new(days.max(0) as u64)),
            (None, None) => None,
        };

        let mut saved = Vec::with_capacity(candidate_ids.len());
        for candidate_id in candidate_ids {
            let mut assignment = processor.create_task_assignment(task.clone(), candidate_id)?;
            assignment.activated_by = Some(acting_user_id);
            assignment.activated_date = Some(Utc::now());
            assignment.due_date = due_date;
            assignment.related_list_id = request.saved_list_id;
            saved.push(self.assignments.save(assignment).await?);
        }
        info!(
            "User {acting_user_id} assigned task '{}' to {} candidate(s)",
            task.name,
            saved.len()
        );

        saved
            .iter_mut()
            .for_each(|a| populate_transient_fields(&mut a.task));
        Ok(saved)
    }

    pub async fn get(&self, id: TaskAssignmentId) -> Result<TaskAssignment, AppError> {
        let mut assignment = self
            .assignments
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Task assignment {id} not found")))?;
        populate_transient_fields(&mut assignment.task);
        Ok(assignment)
    }

    /// Admin edit. Marking complete runs the kind's completion hook; a
    /// completed assignment cannot be reopened.
    pub async fn update(
        &self,
        id: TaskAssignmentId,
        request: UpdateTaskAssignmentRequest,
    ) -> Result<TaskAssignment, AppError> {
        let mut assignment = self.get(id).await?;

        let newly_completed = match request.completed {
            Some(true) => !assignment.is_completed(),
            Some(false) if assignment.is_completed() => {
                return Err(AppError::Validation(format!(
                    "Task assignment {id} is already completed"
                )))
            }
            _ => false,
        };

        if let Some(due_date) = request.due_date {
            assignment.due_date = Some(due_date);
        }
        if let Some(notes) = request.candidate_notes {
            assignment.candidate_notes = Some(notes);
        }
        if newly_completed {
            assignment.completed_date = Some(Utc::now());
        }
        if request.abandoned {
            assignment.abandoned_date.get_or_insert_with(Utc::now);
        } else {
            assignment.abandoned_date = None;
        }

        let saved = self.assignments.save(assignment).await?;
        if newly_completed {
            self.registry
                .get(saved.task.task_type)?
                .handle_completion(&saved)
                .await?;
        }
        Ok(saved)
    }

    pub async fn deactivate(
        &self,
        acting_user_id: i64,
        id: TaskAssignmentId,
    ) -> Result<TaskAssignment, AppError> {
        self.retire(acting_user_id, id, AssignmentStatus::Inactive).await
    }

    /// Soft delete: the row stays, with status `deleted`.
    pub async fn delete(
        &self,
        acting_user_id: i64,
        id: TaskAssignmentId,
    ) -> Result<TaskAssignment, AppError> {
        self.retire(acting_user_id, id, AssignmentStatus::Deleted).await
    }

    async fn retire(
        &self,
        acting_user_id: i64,
        id: TaskAssignmentId,
        status: AssignmentStatus,
    ) -> Result<TaskAssignment, AppError> {
        let mut assignment = self.get(id).await?;
        assignment.status = status;
        assignment.deactivated_by = Some(acting_user_id);
        assignment.deactivated_date = Some(Utc::now());
        let saved = self.assignments.save(assignment).await?;
        info!("User {acting_user_id} set task assignment {id} to {}", status.as_str());
        Ok(saved)
    }

    /// Candidate-side completion: dispatch to the kind's processor, persist,
    /// then run its completion hook.
    pub async fn complete_task(
        &self,
        id: TaskAssignmentId,
        context: &TaskCompletionContext,
    ) -> Result<TaskAssignment, AppError> {
        let assignment = self.get(id).await?;
        if assignment.status != AssignmentStatus::Active {
            return Err(AppError::Validation(format!(
                "Task assignment {id} is {} and cannot be completed",
                assignment.status.as_str()
            )));
        }

        // Re-completion replaces the answer; follow-up work happens only once.
        let was_completed = assignment.is_completed();
        let processor = self.registry.get(assignment.task.task_type)?;
        let completion = processor.complete_task(assignment, context).await?;
        let saved = self.assignments.record_completion(completion).await?;
        if !was_completed {
            processor.handle_completion(&saved).await?;
        }

        info!(
            "Candidate {} completed task '{}' (assignment {id})",
            saved.candidate_id, saved.task.name
        );
        Ok(saved)
    }

    pub async fn list_task_assignments(
        &self,
        request: &ListTaskAssignmentsRequest,
    ) -> Result<Vec<TaskAssignment>, AppError> {
        let mut assignments = self
            .assignments
            .find_by_task_and_list(request.task_id, request.saved_list_id)
            .await?;
        assignments
            .iter_mut()
            .for_each(|a| populate_transient_fields(&mut a.task));
        Ok(assignments)
    }

    pub async fn find_by_task_candidate_status(
        &self,
        task_id: TaskId,
        candidate_id: CandidateId,
        status: AssignmentStatus,
    ) -> Result<Vec<TaskAssignment>, AppError> {
        self.assignments
            .find_by_task_candidate_status(task_id, candidate_id, status)
            .await
    }
}

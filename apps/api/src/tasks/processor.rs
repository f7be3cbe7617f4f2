//! Task processors: one per `TaskType`, selected at runtime from the
//! registry built in `main`.
//!
//! A processor knows how to create a blank assignment of its kind and how to
//! complete one. Callers go through `TaskProcessorRegistry::get` and never
//! name a concrete processor.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;

use crate::errors::AppError;
use crate::models::candidate::CandidateId;
use crate::models::property::CandidateProperty;
use crate::models::task::{Task, TaskAssignment, TaskType};

/// A file posted with an upload-task completion.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Everything submitted when a candidate completes a task.
#[derive(Debug, Clone, Default)]
pub struct TaskCompletionContext {
    /// The candidate doing the completing. Must own the assignment.
    pub candidate_id: CandidateId,
    pub field_answers: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

impl TaskCompletionContext {
    pub fn for_candidate(candidate_id: CandidateId) -> Self {
        Self {
            candidate_id,
            ..Default::default()
        }
    }

    pub fn with_answer(mut self, field: &str, value: &str) -> Self {
        self.field_answers
            .insert(field.to_string(), value.to_string());
        self
    }

    pub fn with_file(mut self, file: UploadedFile) -> Self {
        self.files.push(file);
        self
    }

    /// Trimmed answer for `field`, `None` when absent or blank.
    pub fn answer(&self, field: &str) -> Option<&str> {
        self.field_answers
            .get(field)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// A validated completion that has not been persisted yet.
///
/// The assignment and its property values are written together by
/// `TaskAssignmentRepository::record_completion`.
#[derive(Debug, Clone)]
pub struct TaskCompletion {
    pub assignment: TaskAssignment,
    pub properties: Vec<CandidateProperty>,
}

impl TaskCompletion {
    pub fn new(assignment: TaskAssignment) -> Self {
        Self {
            assignment,
            properties: Vec::new(),
        }
    }
}

#[async_trait]
pub trait TaskProcessor: Send + Sync {
    /// The task kind this processor handles. Used as the registry key.
    fn task_type(&self) -> TaskType;

    /// A new, unsaved assignment of `task` carrying this kind's empty payload.
    fn create_task_assignment(
        &self,
        task: Task,
        candidate_id: CandidateId,
    ) -> Result<TaskAssignment, AppError> {
        ensure_task_kind(&task, self.task_type())?;
        Ok(TaskAssignment::new(task, candidate_id))
    }

    /// Validates a completion and returns the completed assignment plus the
    /// property values it produces. No database row is written here.
    async fn complete_task(
        &self,
        assignment: TaskAssignment,
        context: &TaskCompletionContext,
    ) -> Result<TaskCompletion, AppError>;

    /// Follow-up work once a completed assignment has been saved.
    async fn handle_completion(&self, assignment: &TaskAssignment) -> Result<(), AppError>;
}

pub fn ensure_task_kind(task: &Task, expected: TaskType) -> Result<(), AppError> {
    if task.task_type == expected {
        Ok(())
    } else {
        Err(AppError::InvalidTaskKind(format!(
            "Task '{}' is a {} task, not {}",
            task.name, task.task_type, expected
        )))
    }
}

/// The candidate completing the task must be the one it is assigned to.
pub fn ensure_owner(
    assignment: &TaskAssignment,
    context: &TaskCompletionContext,
) -> Result<(), AppError> {
    if assignment.candidate_id == context.candidate_id {
        Ok(())
    } else {
        Err(AppError::SessionMismatch(format!(
            "assignment {:?} belongs to candidate {}, not {}",
            assignment.id, assignment.candidate_id, context.candidate_id
        )))
    }
}

/// Checks shared by every processor, run before any mutation.
pub fn check_completion(
    assignment: &TaskAssignment,
    context: &TaskCompletionContext,
    expected: TaskType,
) -> Result<(), AppError> {
    ensure_owner(assignment, context)?;
    ensure_task_kind(&assignment.task, expected)
}

pub fn mark_completed(mut assignment: TaskAssignment) -> TaskAssignment {
    assignment.completed_date = Some(Utc::now());
    assignment
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("more than one processor registered for task type {0}")]
    Duplicate(TaskType),
    #[error("no processor registered for task types {0:?}")]
    Missing(Vec<TaskType>),
}

/// TaskType → processor. Built once at startup; construction fails unless
/// every `TaskType` has exactly one processor.
pub struct TaskProcessorRegistry {
    processors: HashMap<TaskType, Arc<dyn TaskProcessor>>,
}

impl TaskProcessorRegistry {
    pub fn new(processors: Vec<Arc<dyn TaskProcessor>>) -> Result<Self, RegistryError> {
        let mut map: HashMap<TaskType, Arc<dyn TaskProcessor>> = HashMap::new();
        for processor in processors {
            let key = processor.task_type();
            if map.insert(key, processor).is_some() {
                return Err(RegistryError::Duplicate(key));
            }
        }

        let missing: Vec<TaskType> = TaskType::ALL
            .into_iter()
            .filter(|t| !map.contains_key(t))
            .collect();
        if !missing.is_empty() {
            return Err(RegistryError::Missing(missing));
        }

        Ok(Self { processors: map })
    }

    pub fn get(&self, task_type: TaskType) -> Result<&dyn TaskProcessor, AppError> {
        self.processors
            .get(&task_type)
            .map(|p| p.as_ref())
            .ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!(
                    "No processor found for task type: {task_type}"
                ))
            })
    }
}

use async_trait::async_trait;
use tracing::debug;

use crate::errors::AppError;
use crate::models::task::{TaskAssignment, TaskType};
use crate::tasks::processor::{
    check_completion, mark_completed, TaskCompletion, TaskCompletionContext, TaskProcessor,
};

/// Tasks the candidate just ticks off.
pub struct SimpleTaskProcessor;

#[async_trait]
impl TaskProcessor for SimpleTaskProcessor {
    fn task_type(&self) -> TaskType {
        TaskType::Simple
    }

    async fn complete_task(
        &self,
        assignment: TaskAssignment,
        context: &TaskCompletionContext,
    ) -> Result<TaskCompletion, AppError> {
        check_completion(&assignment, context, TaskType::Simple)?;
        Ok(TaskCompletion::new(mark_completed(assignment)))
    }

    async fn handle_completion(&self, assignment: &TaskAssignment) -> Result<(), AppError> {
        debug!("Simple task assignment {:?} completed", assignment.id);
        Ok(())
    }
}

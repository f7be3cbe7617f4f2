use async_trait::async_trait;
use tracing::debug;

use crate::errors::AppError;
use crate::models::property::CandidateProperty;
use crate::models::task::{AllowedAnswer, AssignmentPayload, Task, TaskAssignment, TaskType};
use crate::tasks::processor::{
    check_completion, mark_completed, TaskCompletion, TaskCompletionContext, TaskProcessor,
};

/// Field of the completion form that carries the candidate's answer.
pub const ANSWER_FIELD: &str = "answer";

/// Answers a question task accepts. Empty means free text.
pub fn allowed_answers(task: &Task) -> Vec<AllowedAnswer> {
    if let Some(explicit) = &task.explicit_allowed_answers {
        return explicit
            .iter()
            .map(|a| AllowedAnswer {
                name: a.clone(),
                display_name: a.clone(),
            })
            .collect();
    }
    if task.task_type == TaskType::YesNoQuestion {
        return ["Yes", "No"]
            .into_iter()
            .map(|a| AllowedAnswer {
                name: a.to_string(),
                display_name: a.to_string(),
            })
            .collect();
    }
    Vec::new()
}

/// Property the answer is stored under: the configured answer field, else the task name.
pub fn answer_property_name(task: &Task) -> &str {
    task.candidate_answer_field
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or(&task.name)
}

/// Question and yes/no question tasks. The answer becomes a
/// `CandidateProperty` linked back to the assignment.
pub struct QuestionTaskProcessor {
    task_type: TaskType,
}

impl QuestionTaskProcessor {
    pub fn new() -> Self {
        Self {
            task_type: TaskType::Question,
        }
    }

    pub fn yes_no() -> Self {
        Self {
            task_type: TaskType::YesNoQuestion,
        }
    }

    /// Canonical spelling of `answer`, or a validation error if the task restricts answers.
    fn resolve_answer(&self, task: &Task, answer: &str) -> Result<String, AppError> {
        let allowed = allowed_answers(task);
        if allowed.is_empty() {
            return Ok(answer.to_string());
        }
        allowed
            .into_iter()
            .find(|a| a.name.eq_ignore_ascii_case(answer))
            .map(|a| a.name)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "'{answer}' is not an allowed answer for task '{}'",
                    task.name
                ))
            })
    }
}

impl Default for QuestionTaskProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskProcessor for QuestionTaskProcessor {
    fn task_type(&self) -> TaskType {
        self.task_type
    }

    async fn complete_task(
        &self,
        assignment: TaskAssignment,
        context: &TaskCompletionContext,
    ) -> Result<TaskCompletion, AppError> {
        check_completion(&assignment, context, self.task_type)?;

        let answer = match context.answer(ANSWER_FIELD) {
            Some(raw) => Some(self.resolve_answer(&assignment.task, raw)?),
            None => None,
        };

        let mut assignment = assignment;
        let mut properties = Vec::new();
        if let Some(answer) = answer {
            properties.push(CandidateProperty {
                candidate_id: assignment.candidate_id,
                name: answer_property_name(&assignment.task).to_string(),
                value: Some(answer.clone()),
                related_task_assignment_id: assignment.id,
            });
            debug!(
                "Answer to '{}' from candidate {} accepted",
                assignment.task.name, assignment.candidate_id
            );
            assignment.payload = AssignmentPayload::Question {
                answer: Some(answer),
            };
        }

        Ok(TaskCompletion {
            assignment: mark_completed(assignment),
            properties,
        })
    }

    async fn handle_completion(&self, _assignment: &TaskAssignment) -> Result<(), AppError> {
        Ok(())
    }
}

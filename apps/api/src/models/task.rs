use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

use crate::models::candidate::CandidateId;

pub type TaskId = i64;
pub type TaskAssignmentId = i64;

/// Closed set of task kinds. Every value has exactly one processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    Simple,
    Question,
    YesNoQuestion,
    Upload,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [
        TaskType::Simple,
        TaskType::Question,
        TaskType::YesNoQuestion,
        TaskType::Upload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Simple => "Simple",
            TaskType::Question => "Question",
            TaskType::YesNoQuestion => "YesNoQuestion",
            TaskType::Upload => "Upload",
        }
    }

    pub fn is_question(&self) -> bool {
        matches!(self, TaskType::Question | TaskType::YesNoQuestion)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown task type '{0}'")]
pub struct UnknownTaskType(pub String);

impl FromStr for TaskType {
    type Err = UnknownTaskType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTaskType(s.to_string()))
    }
}

impl TryFrom<String> for TaskType {
    type Error = UnknownTaskType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// An answer a question task will accept, with the label shown to candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedAnswer {
    pub name: String,
    pub display_name: String,
}

/// Task definition. Columns that only apply to one kind are nullable.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    #[sqlx(try_from = "String")]
    pub task_type: TaskType,
    pub days_to_complete: Option<i32>,
    pub optional: bool,
    pub help_link: Option<String>,
    /// Question tasks: candidate field or property name the answer is stored under.
    pub candidate_answer_field: Option<String>,
    pub explicit_allowed_answers: Option<Vec<String>>,
    /// Upload tasks.
    pub upload_type: Option<String>,
    pub upload_subfolder_name: Option<String>,
    pub required_metadata: Option<Vec<String>>,
    /// Populated by `TaskService`, never stored.
    #[sqlx(skip)]
    #[serde(default)]
    pub allowed_answers: Vec<AllowedAnswer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Active,
    Inactive,
    Deleted,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Active => "active",
            AssignmentStatus::Inactive => "inactive",
            AssignmentStatus::Deleted => "deleted",
        }
    }

}

#[derive(Debug, Error)]
#[error("unknown task assignment status '{0}'")]
pub struct UnknownAssignmentStatus(pub String);

impl FromStr for AssignmentStatus {
    type Err = UnknownAssignmentStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AssignmentStatus::Active),
            "inactive" => Ok(AssignmentStatus::Inactive),
            "deleted" => Ok(AssignmentStatus::Deleted),
            other => Err(UnknownAssignmentStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for AssignmentStatus {
    type Error = UnknownAssignmentStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Kind-specific part of an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AssignmentPayload {
    Simple,
    Question { answer: Option<String> },
    Upload { uploaded_files: Vec<String> },
}

impl AssignmentPayload {
    /// The empty payload for a freshly created assignment of `task_type`.
    pub fn empty_for(task_type: TaskType) -> Self {
        match task_type {
            TaskType::Simple => AssignmentPayload::Simple,
            TaskType::Question | TaskType::YesNoQuestion => {
                AssignmentPayload::Question { answer: None }
            }
            TaskType::Upload => AssignmentPayload::Upload {
                uploaded_files: Vec::new(),
            },
        }
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            AssignmentPayload::Question { answer } => answer.as_deref(),
            _ => None,
        }
    }
}

/// A candidate's instance of a task.
///
/// Created → Completed (`completed_date` set). There is no way back to Created
/// through task completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignment {
    /// `None` until the assignment has been saved.
    pub id: Option<TaskAssignmentId>,
    pub task: Task,
    pub candidate_id: CandidateId,
    pub status: AssignmentStatus,
    pub activated_by: Option<i64>,
    pub activated_date: Option<DateTime<Utc>>,
    pub deactivated_by: Option<i64>,
    pub deactivated_date: Option<DateTime<Utc>>,
    pub due_date: Option<NaiveDate>,
    pub completed_date: Option<DateTime<Utc>>,
    pub abandoned_date: Option<DateTime<Utc>>,
    pub candidate_notes: Option<String>,
    pub related_list_id: Option<i64>,
    pub payload: AssignmentPayload,
}

impl TaskAssignment {
    /// A blank, unsaved assignment of `task` for `candidate_id`.
    pub fn new(task: Task, candidate_id: CandidateId) -> Self {
        let payload = AssignmentPayload::empty_for(task.task_type);
        TaskAssignment {
            id: None,
            task,
            candidate_id,
            status: AssignmentStatus::Active,
            activated_by: None,
            activated_date: None,
            deactivated_by: None,
            deactivated_date: None,
            due_date: None,
            completed_date: None,
            abandoned_date: None,
            candidate_notes: None,
            related_list_id: None,
            payload,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_date.is_some()
    }
}

/// Flat `task_assignment` row; joined with its `Task` to build a `TaskAssignment`.
#[derive(Debug, Clone, FromRow)]
pub struct TaskAssignmentRow {
    pub id: TaskAssignmentId,
    pub task_id: TaskId,
    pub candidate_id: CandidateId,
    /// A value outside the known statuses fails the row decode.
    #[sqlx(try_from = "String")]
    pub status: AssignmentStatus,
    pub activated_by: Option<i64>,
    pub activated_date: Option<DateTime<Utc>>,
    pub deactivated_by: Option<i64>,
    pub deactivated_date: Option<DateTime<Utc>>,
    pub due_date: Option<NaiveDate>,
    pub completed_date: Option<DateTime<Utc>>,
    pub abandoned_date: Option<DateTime<Utc>>,
    pub candidate_notes: Option<String>,
    pub related_list_id: Option<i64>,
    pub answer: Option<String>,
}

impl TaskAssignmentRow {
    pub fn into_assignment(self, task: Task) -> TaskAssignment {
        let payload = match task.task_type {
            TaskType::Question | TaskType::YesNoQuestion => {
                AssignmentPayload::Question { answer: self.answer }
            }
            other => AssignmentPayload::empty_for(other),
        };
        TaskAssignment {
            id: Some(self.id),
            task,
            candidate_id: self.candidate_id,
            status: self.status,
            activated_by: self.activated_by,
            activated_date: self.activated_date,
            deactivated_by: self.deactivated_by,
            deactivated_date: self.deactivated_date,
            due_date: self.due_date,
            completed_date: self.completed_date,
            abandoned_date: self.abandoned_date,
            candidate_notes: self.candidate_notes,
            related_list_id: self.related_list_id,
            payload,
        }
    }
}

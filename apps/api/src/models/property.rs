use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::candidate::CandidateId;
use crate::models::task::TaskAssignmentId;

/// Free-form named value on a candidate. Unique on (candidate_id, name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CandidateProperty {
    pub candidate_id: CandidateId,
    pub name: String,
    pub value: Option<String>,
    pub related_task_assignment_id: Option<TaskAssignmentId>,
}

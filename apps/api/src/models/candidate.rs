use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Opaque numeric candidate identifier. Immutable once assigned.
pub type CandidateId = i64;

/// Full candidate record as returned by search.
/// Joined with `users` for the name/email/partner columns.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandidateRow {
    pub id: CandidateId,
    pub candidate_number: String,
    pub status: String,
    pub gender: Option<String>,
    pub dob: Option<NaiveDate>,
    pub nationality_id: Option<i64>,
    pub country_id: Option<i64>,
    pub unhcr_status: Option<String>,
    pub user_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub partner_id: Option<i64>,
    pub created_date: DateTime<Utc>,
    pub updated_date: Option<DateTime<Utc>>,
}

/// Candidate lifecycle status as stored in `candidate.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CandidateStatus {
    Active,
    AutonomousEmployment,
    Deleted,
    Draft,
    Employed,
    Incomplete,
    Ineligible,
    Pending,
    Unreachable,
    Withdrawn,
}

impl CandidateStatus {
    pub const ALL: [CandidateStatus; 10] = [
        CandidateStatus::Active,
        CandidateStatus::AutonomousEmployment,
        CandidateStatus::Deleted,
        CandidateStatus::Draft,
        CandidateStatus::Employed,
        CandidateStatus::Incomplete,
        CandidateStatus::Ineligible,
        CandidateStatus::Pending,
        CandidateStatus::Unreachable,
        CandidateStatus::Withdrawn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Active => "active",
            CandidateStatus::AutonomousEmployment => "autonomousEmployment",
            CandidateStatus::Deleted => "deleted",
            CandidateStatus::Draft => "draft",
            CandidateStatus::Employed => "employed",
            CandidateStatus::Incomplete => "incomplete",
            CandidateStatus::Ineligible => "ineligible",
            CandidateStatus::Pending => "pending",
            CandidateStatus::Unreachable => "unreachable",
            CandidateStatus::Withdrawn => "withdrawn",
        }
    }

    /// Statuses searched when a request names none: everything still "in play".
    pub fn default_search_statuses() -> Vec<CandidateStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| {
                !matches!(
                    s,
                    CandidateStatus::AutonomousEmployment
                        | CandidateStatus::Deleted
                        | CandidateStatus::Draft
                        | CandidateStatus::Employed
                        | CandidateStatus::Ineligible
                        | CandidateStatus::Withdrawn
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Gender {
    Female,
    Male,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Female => "female",
            Gender::Male => "male",
            Gender::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnhcrStatus {
    MandateRefugee,
    RegisteredAsylum,
    RegisteredStateless,
    NotRegistered,
    Unsure,
    NA,
}

impl UnhcrStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnhcrStatus::MandateRefugee => "MandateRefugee",
            UnhcrStatus::RegisteredAsylum => "RegisteredAsylum",
            UnhcrStatus::RegisteredStateless => "RegisteredStateless",
            UnhcrStatus::NotRegistered => "NotRegistered",
            UnhcrStatus::Unsure => "Unsure",
            UnhcrStatus::NA => "NA",
        }
    }
}

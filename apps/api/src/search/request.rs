use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::candidate::{CandidateId, CandidateStatus, Gender, UnhcrStatus};
use crate::search::columns::SortOrder;

pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Whether a list of ids must include (`or`) or exclude (`not`) the candidate's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    Or,
    Not,
}

/// Structured candidate search, as posted by the admin portal.
/// Every filter is optional; an empty request matches all candidates in play.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchCandidateRequest {
    pub simple_query_string: Option<String>,
    pub statuses: Vec<CandidateStatus>,
    pub gender: Option<Gender>,
    pub occupation_ids: Vec<i64>,
    pub nationality_ids: Vec<i64>,
    pub nationality_search_type: SearchType,
    pub country_ids: Vec<i64>,
    pub country_search_type: SearchType,
    pub partner_ids: Vec<i64>,
    pub survey_type_ids: Vec<i64>,
    pub rego_referrer_param: Option<String>,
    pub last_modified_from: Option<NaiveDate>,
    pub last_modified_to: Option<NaiveDate>,
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
    pub unhcr_statuses: Vec<UnhcrStatus>,
    /// Saved list whose candidates are left out of the results.
    pub exclusion_list_id: Option<i64>,
    /// Candidates already seen by the caller.
    pub excluded_candidate_ids: Vec<CandidateId>,

    pub page_number: i64,
    pub page_size: Option<i64>,
    pub sort: Vec<SortOrder>,
}

impl SearchCandidateRequest {
    /// Requested size, or the default capped at the configured maximum.
    pub fn effective_page_size(&self, max_page_size: i64) -> i64 {
        self.page_size.unwrap_or_else(|| DEFAULT_PAGE_SIZE.min(max_page_size))
    }

    /// Checks paging and range filters. Sort and free text are checked when compiled.
    pub fn validate(&self, max_page_size: i64) -> Result<(), AppError> {
        let size = self.effective_page_size(max_page_size);
        if size <= 0 {
            return Err(AppError::Validation("pageSize must be greater than 0".to_string()));
        }
        if size > max_page_size {
            return Err(AppError::Validation(format!(
                "pageSize must not exceed {max_page_size}"
            )));
        }
        if self.page_number < 0 {
            return Err(AppError::Validation("pageNumber must not be negative".to_string()));
        }
        if self.page_number.checked_mul(size).is_none() {
            return Err(AppError::Validation("pageNumber is too large".to_string()));
        }

        for age in [self.min_age, self.max_age].into_iter().flatten() {
            if !(0..=150).contains(&age) {
                return Err(AppError::Validation(format!("Age {age} is out of range")));
            }
        }
        if let (Some(min), Some(max)) = (self.min_age, self.max_age) {
            if min > max {
                return Err(AppError::Validation("minAge is greater than maxAge".to_string()));
            }
        }
        if let (Some(from), Some(to)) = (self.last_modified_from, self.last_modified_to) {
            if from > to {
                return Err(AppError::Validation(
                    "lastModifiedFrom is after lastModifiedTo".to_string(),
                ));
            }
        }
        if let Some(referrer) = &self.rego_referrer_param {
            if referrer.len() > 255 {
                return Err(AppError::Validation("regoReferrerParam is too long".to_string()));
            }
        }
        Ok(())
    }
}

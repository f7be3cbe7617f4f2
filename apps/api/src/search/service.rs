use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::candidate::{CandidateId, CandidateRow};
use crate::search::columns::build_order_by;
use crate::search::filter::{build_predicate, CompiledSearch};
use crate::search::repository::CandidateSearchRepository;
use crate::search::request::SearchCandidateRequest;
use crate::search::text::build_ts_query;

/// One page of candidates in the requested order, plus the unpaged match count.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultPage {
    pub candidates: Vec<CandidateRow>,
    pub total_count: i64,
    pub page_number: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

pub struct CandidateSearchService {
    repo: Arc<dyn CandidateSearchRepository>,
    max_page_size: i64,
}

impl CandidateSearchService {
    pub fn new(repo: Arc<dyn CandidateSearchRepository>, max_page_size: i64) -> Self {
        Self {
            repo,
            max_page_size,
        }
    }

    pub async fn search(
        &self,
        request: &SearchCandidateRequest,
    ) -> Result<SearchResultPage, AppError> {
        self.search_as_of(request, Utc::now().date_naive()).await
    }

    /// Runs the search with age filters anchored on `today`.
    ///
    /// The id query and the count query are separate statements, so a write
    /// landing between them can leave `total_count` out of step with the page.
    pub async fn search_as_of(
        &self,
        request: &SearchCandidateRequest,
        today: NaiveDate,
    ) -> Result<SearchResultPage, AppError> {
        // Everything caller-supplied is checked before the first query.
        request.validate(self.max_page_size)?;
        let order_by = build_order_by(&request.sort)?;
        let ts_query = match request.simple_query_string.as_deref() {
            Some(q) => build_ts_query(q)?,
            None => None,
        };

        let mut excluded = request.excluded_candidate_ids.clone();
        if let Some(list_id) = request.exclusion_list_id {
            excluded.extend(self.repo.saved_list_candidate_ids(list_id).await?);
        }
        excluded.sort_unstable();
        excluded.dedup();

        let page_size = request.effective_page_size(self.max_page_size);
        let predicate = build_predicate(request, ts_query.as_deref(), &excluded, today);
        let compiled = CompiledSearch::new(predicate, order_by, request.page_number, page_size);

        let ids = self.repo.find_page_ids(&compiled).await?;
        let total_count = self.repo.count_matches(&compiled).await?;
        let fetched = self.repo.find_by_ids(&ids).await?;
        let candidates = order_by_ids(&ids, fetched);

        info!(
            "Candidate search page {} returned {} of {} candidates",
            request.page_number,
            candidates.len(),
            total_count
        );

        Ok(SearchResultPage {
            candidates,
            total_count,
            page_number: request.page_number,
            page_size,
            total_pages: (total_count + page_size - 1) / page_size,
        })
    }
}

/// Puts `fetched` back into the order of `ids`.
///
/// The bulk fetch does not preserve order. Ids whose record vanished between the
/// two queries are dropped.
pub fn order_by_ids(ids: &[CandidateId], fetched: Vec<CandidateRow>) -> Vec<CandidateRow> {
    let mut by_id: HashMap<CandidateId, CandidateRow> =
        fetched.into_iter().map(|c| (c.id, c)).collect();

    ids.iter()
        .filter_map(|id| {
            let row = by_id.remove(id);
            if row.is_none() {
                warn!("Candidate {id} matched search but could not be fetched");
            }
            row
        })
        .collect()
}

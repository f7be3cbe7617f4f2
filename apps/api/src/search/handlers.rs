use axum::{extract::State, Json};

use crate::errors::AppError;
use crate::search::request::SearchCandidateRequest;
use crate::search::service::SearchResultPage;
use crate::state::AppState;

/// POST /api/v1/candidates/search
pub async fn handle_search_candidates(
    State(state): State<AppState>,
    Json(req): Json<SearchCandidateRequest>,
) -> Result<Json<SearchResultPage>, AppError> {
    let page = state.candidate_search.search(&req).await?;
    Ok(Json(page))
}

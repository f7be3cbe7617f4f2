use async_trait::async_trait;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};

use crate::errors::AppError;
use crate::models::candidate::{CandidateId, CandidateRow};
use crate::search::filter::{CompiledSearch, QueryParam};

/// Read-only queries behind candidate search.
#[async_trait]
pub trait CandidateSearchRepository: Send + Sync {
    /// Ids of one page, in the compiled sort order.
    async fn find_page_ids(&self, search: &CompiledSearch) -> Result<Vec<CandidateId>, AppError>;

    /// Distinct matches ignoring paging.
    async fn count_matches(&self, search: &CompiledSearch) -> Result<i64, AppError>;

    /// Full records for `ids`. Order is unspecified; missing ids are simply absent.
    async fn find_by_ids(&self, ids: &[CandidateId]) -> Result<Vec<CandidateRow>, AppError>;

    /// Members of a saved list. `NotFound` if the list does not exist.
    async fn saved_list_candidate_ids(&self, list_id: i64) -> Result<Vec<CandidateId>, AppError>;
}

pub struct PgCandidateSearchRepository {
    pool: PgPool,
}

impl PgCandidateSearchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn bind_params<'q>(
    mut q: Query<'q, Postgres, PgArguments>,
    params: &'q [QueryParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        q = match param {
            QueryParam::BigIntArray(v) => q.bind(v),
            QueryParam::Text(v) => q.bind(v),
            QueryParam::TextArray(v) => q.bind(v),
            QueryParam::Timestamp(v) => q.bind(v),
            QueryParam::Date(v) => q.bind(v),
        };
    }
    q
}

const CANDIDATE_COLUMNS: &str = r#"
    candidate.id, candidate.candidate_number, candidate.status, candidate.gender,
    candidate.dob, candidate.nationality_id, candidate.country_id, candidate.unhcr_status,
    candidate.user_id, users.first_name, users.last_name, users.email, users.partner_id,
    candidate.created_date, candidate.updated_date
"#;

#[async_trait]
impl CandidateSearchRepository for PgCandidateSearchRepository {
    async fn find_page_ids(&self, search: &CompiledSearch) -> Result<Vec<CandidateId>, AppError> {
        let sql = search.id_query_sql();
        let q = bind_params(sqlx::query(&sql), &search.predicate.params)
            .bind(search.limit)
            .bind(search.offset);

        let rows = q.fetch_all(&self.pool).await?;
        let ids = rows
            .iter()
            .map(|row| row.try_get::<i64, _>(0))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    async fn count_matches(&self, search: &CompiledSearch) -> Result<i64, AppError> {
        let sql = search.count_query_sql();
        let row = bind_params(sqlx::query(&sql), &search.predicate.params)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    async fn find_by_ids(&self, ids: &[CandidateId]) -> Result<Vec<CandidateRow>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidate JOIN users ON candidate.user_id = users.id \
             WHERE candidate.id = ANY($1)"
        );
        let rows: Vec<CandidateRow> = sqlx::query_as(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn saved_list_candidate_ids(&self, list_id: i64) -> Result<Vec<CandidateId>, AppError> {
        fetch_saved_list_candidate_ids(&self.pool, list_id).await
    }
}

/// Members of saved list `list_id`. `NotFound` if there is no such list.
pub async fn fetch_saved_list_candidate_ids(
    pool: &PgPool,
    list_id: i64,
) -> Result<Vec<CandidateId>, AppError> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM saved_list WHERE id = $1")
        .bind(list_id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound(format!("Saved list {list_id} not found")));
    }

    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT candidate_id FROM candidate_saved_list WHERE saved_list_id = $1 ORDER BY candidate_id",
    )
    .bind(list_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

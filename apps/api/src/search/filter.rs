//! Compiles a `SearchCandidateRequest` into a parameterized WHERE clause and
//! the id / count queries built on it.
//!
//! Caller values never appear in the SQL text. Each one becomes a numbered
//! placeholder and a `QueryParam` bound in the same order.

use chrono::{DateTime, Days, Months, NaiveDate, NaiveTime, Utc};

use crate::models::candidate::{CandidateId, CandidateStatus};
use crate::search::columns::{OrderBy, BASE_FROM, ID_COLUMN};
use crate::search::request::{SearchCandidateRequest, SearchType};

/// Type-safe parameter binding for the generated SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    BigIntArray(Vec<i64>),
    Text(String),
    TextArray(Vec<String>),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
}

/// WHERE clause fragment plus its parameters, numbered from `$1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

struct PredicateBuilder {
    clauses: Vec<String>,
    params: Vec<QueryParam>,
}

impl PredicateBuilder {
    fn new() -> Self {
        Self {
            clauses: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Registers `param` and returns its placeholder.
    fn bind(&mut self, param: QueryParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    fn push(&mut self, clause: String) {
        self.clauses.push(clause);
    }

    fn ids_clause(&mut self, column: &str, ids: &[i64], search_type: SearchType) {
        if ids.is_empty() {
            return;
        }
        let p = self.bind(QueryParam::BigIntArray(ids.to_vec()));
        match search_type {
            SearchType::Or => self.push(format!("{column} = ANY({p})")),
            SearchType::Not => self.push(format!("{column} <> ALL({p})")),
        }
    }

    fn finish(self) -> Predicate {
        let sql = if self.clauses.is_empty() {
            "TRUE".to_string()
        } else {
            self.clauses.join(" AND ")
        };
        Predicate {
            sql,
            params: self.params,
        }
    }
}

fn years_before(today: NaiveDate, years: i32) -> NaiveDate {
    today
        .checked_sub_months(Months::new(12 * years.max(0) as u32))
        .unwrap_or(NaiveDate::MIN)
}

/// Builds the WHERE predicate for `request`.
///
/// `ts_query` is the already-validated free-text query, `excluded` the union of
/// explicitly excluded ids and the exclusion list. `today` anchors age filters.
pub fn build_predicate(
    request: &SearchCandidateRequest,
    ts_query: Option<&str>,
    excluded: &[CandidateId],
    today: NaiveDate,
) -> Predicate {
    let mut b = PredicateBuilder::new();

    let statuses = if request.statuses.is_empty() {
        CandidateStatus::default_search_statuses()
    } else {
        request.statuses.clone()
    };
    let p = b.bind(QueryParam::TextArray(
        statuses.iter().map(|s| s.as_str().to_string()).collect(),
    ));
    b.push(format!("candidate.status = ANY({p})"));

    if let Some(gender) = request.gender {
        let p = b.bind(QueryParam::Text(gender.as_str().to_string()));
        b.push(format!("candidate.gender = {p}"));
    }

    if !request.occupation_ids.is_empty() {
        let p = b.bind(QueryParam::BigIntArray(request.occupation_ids.clone()));
        b.push(format!(
            "EXISTS (SELECT 1 FROM candidate_occupation co WHERE co.candidate_id = candidate.id AND co.occupation_id = ANY({p}))"
        ));
    }

    b.ids_clause(
        "candidate.nationality_id",
        &request.nationality_ids,
        request.nationality_search_type,
    );
    b.ids_clause(
        "candidate.country_id",
        &request.country_ids,
        request.country_search_type,
    );
    b.ids_clause("users.partner_id", &request.partner_ids, SearchType::Or);
    b.ids_clause(
        "candidate.survey_type_id",
        &request.survey_type_ids,
        SearchType::Or,
    );

    if let Some(referrer) = request
        .rego_referrer_param
        .as_deref()
        .map(|r| r.trim().to_lowercase())
        .filter(|r| !r.is_empty())
    {
        let p = b.bind(QueryParam::Text(referrer));
        b.push(format!("lower(candidate.rego_referrer_param) LIKE {p}"));
    }

    if let Some(from) = request.last_modified_from {
        let p = b.bind(QueryParam::Timestamp(
            from.and_time(NaiveTime::MIN).and_utc(),
        ));
        b.push(format!("candidate.updated_date >= {p}"));
    }
    if let Some(to) = request.last_modified_to {
        // Inclusive of the whole `to` day.
        let next_day = to.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
        let p = b.bind(QueryParam::Timestamp(
            next_day.and_time(NaiveTime::MIN).and_utc(),
        ));
        b.push(format!("candidate.updated_date < {p}"));
    }

    // Candidates with no recorded dob are never filtered out by age.
    if let Some(min_age) = request.min_age {
        let p = b.bind(QueryParam::Date(years_before(today, min_age)));
        b.push(format!("(candidate.dob <= {p} OR candidate.dob IS NULL)"));
    }
    if let Some(max_age) = request.max_age {
        let p = b.bind(QueryParam::Date(years_before(today, max_age + 1)));
        b.push(format!("(candidate.dob > {p} OR candidate.dob IS NULL)"));
    }

    if !request.unhcr_statuses.is_empty() {
        let p = b.bind(QueryParam::TextArray(
            request
                .unhcr_statuses
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
        ));
        b.push(format!("candidate.unhcr_status = ANY({p})"));
    }

    if let Some(ts) = ts_query {
        let p = b.bind(QueryParam::Text(ts.to_string()));
        b.push(format!(
            "candidate.text_search_vector @@ to_tsquery('english', {p})"
        ));
    }

    if !excluded.is_empty() {
        let p = b.bind(QueryParam::BigIntArray(excluded.to_vec()));
        b.push(format!("{ID_COLUMN} <> ALL({p})"));
    }

    b.finish()
}

/// One page of a search, ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSearch {
    pub predicate: Predicate,
    pub order_by: OrderBy,
    pub limit: i64,
    pub offset: i64,
}

impl CompiledSearch {
    pub fn new(predicate: Predicate, order_by: OrderBy, page_number: i64, page_size: i64) -> Self {
        Self {
            predicate,
            order_by,
            limit: page_size,
            offset: page_number * page_size,
        }
    }

    fn from_clause(&self) -> String {
        let mut from = BASE_FROM.to_string();
        for join in &self.order_by.joins {
            from.push(' ');
            from.push_str(join.sql());
        }
        from
    }

    /// Distinct matching ids for this page, in sort order.
    /// LIMIT and OFFSET are the two placeholders after the predicate's.
    pub fn id_query_sql(&self) -> String {
        let mut select = vec![ID_COLUMN];
        select.extend(self.order_by.select_columns.iter().copied());
        let n = self.predicate.params.len();
        format!(
            "SELECT DISTINCT {} FROM {} WHERE {} ORDER BY {} LIMIT ${} OFFSET ${}",
            select.join(", "),
            self.from_clause(),
            self.predicate.sql,
            self.order_by.clause,
            n + 1,
            n + 2
        )
    }

    /// Unpaged count of distinct matching ids. Sort joins are not needed here.
    pub fn count_query_sql(&self) -> String {
        format!(
            "SELECT COUNT(DISTINCT {ID_COLUMN}) FROM {BASE_FROM} WHERE {}",
            self.predicate.sql
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::candidate::Gender;
    use crate::search::columns::{build_order_by, SortDirection, SortOrder};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    #[test]
    fn test_empty_request_uses_default_statuses() {
        let p = build_predicate(&SearchCandidateRequest::default(), None, &[], today());
        assert_eq!(p.sql, "candidate.status = ANY($1)");
        match &p.params[0] {
            QueryParam::TextArray(v) => {
                assert!(v.contains(&"active".to_string()));
                assert!(!v.contains(&"deleted".to_string()));
            }
            other => panic!("unexpected param {other:?}"),
        }
    }

    #[test]
    fn test_placeholders_numbered_in_bind_order() {
        let req = SearchCandidateRequest {
            gender: Some(Gender::Female),
            nationality_ids: vec![3, 7],
            nationality_search_type: SearchType::Not,
            partner_ids: vec![1],
            ..Default::default()
        };
        let p = build_predicate(&req, None, &[], today());
        assert_eq!(
            p.sql,
            "candidate.status = ANY($1) AND candidate.gender = $2 \
             AND candidate.nationality_id <> ALL($3) AND users.partner_id = ANY($4)"
        );
        assert_eq!(p.params.len(), 4);
        assert_eq!(p.params[1], QueryParam::Text("female".to_string()));
        assert_eq!(p.params[2], QueryParam::BigIntArray(vec![3, 7]));
    }

    #[test]
    fn test_caller_text_never_inlined() {
        let hostile = "x' OR '1'='1";
        let req = SearchCandidateRequest {
            rego_referrer_param: Some(hostile.to_string()),
            ..Default::default()
        };
        let p = build_predicate(&req, None, &[], today());
        assert!(!p.sql.contains("OR '1'"));
        assert!(p.params.contains(&QueryParam::Text(hostile.to_lowercase())));
    }

    #[test]
    fn test_blank_referrer_ignored() {
        let req = SearchCandidateRequest {
            rego_referrer_param: Some("   ".to_string()),
            ..Default::default()
        };
        let p = build_predicate(&req, None, &[], today());
        assert_eq!(p.params.len(), 1);
    }

    #[test]
    fn test_age_bounds() {
        let req = SearchCandidateRequest {
            min_age: Some(18),
            max_age: Some(30),
            ..Default::default()
        };
        let p = build_predicate(&req, None, &[], today());
        assert!(p.sql.contains("(candidate.dob <= $2 OR candidate.dob IS NULL)"));
        assert!(p.sql.contains("(candidate.dob > $3 OR candidate.dob IS NULL)"));
        assert_eq!(
            p.params[1],
            QueryParam::Date(NaiveDate::from_ymd_opt(2008, 10, 17).unwrap())
        );
        assert_eq!(
            p.params[2],
            QueryParam::Date(NaiveDate::from_ymd_opt(1995, 10, 17).unwrap())
        );
    }

    #[test]
    fn test_last_modified_to_includes_whole_day() {
        let req = SearchCandidateRequest {
            last_modified_to: NaiveDate::from_ymd_opt(2026, 1, 31),
            ..Default::default()
        };
        let p = build_predicate(&req, None, &[], today());
        assert!(p.sql.ends_with("candidate.updated_date < $2"));
        let expected = NaiveDate::from_ymd_opt(2026, 2, 1)
            .unwrap()
            .and_time(NaiveTime::MIN)
            .and_utc();
        assert_eq!(p.params[1], QueryParam::Timestamp(expected));
    }

    #[test]
    fn test_free_text_and_exclusions_last() {
        let p = build_predicate(
            &SearchCandidateRequest::default(),
            Some("nurse & amman"),
            &[11, 12],
            today(),
        );
        assert!(p
            .sql
            .contains("candidate.text_search_vector @@ to_tsquery('english', $2)"));
        assert!(p.sql.ends_with("candidate.id <> ALL($3)"));
        assert_eq!(p.params[2], QueryParam::BigIntArray(vec![11, 12]));
    }

    #[test]
    fn test_occupation_filter_uses_exists() {
        let req = SearchCandidateRequest {
            occupation_ids: vec![5],
            ..Default::default()
        };
        let p = build_predicate(&req, None, &[], today());
        assert!(p.sql.contains("EXISTS (SELECT 1 FROM candidate_occupation co"));
    }

    #[test]
    fn test_id_query_pages_after_predicate_params() {
        let req = SearchCandidateRequest {
            gender: Some(Gender::Male),
            ..Default::default()
        };
        let predicate = build_predicate(&req, None, &[], today());
        let order_by = build_order_by(&[SortOrder {
            property: "user.partner.abbreviation".to_string(),
            direction: SortDirection::Asc,
        }])
        .unwrap();
        let compiled = CompiledSearch::new(predicate, order_by, 3, 25);
        assert_eq!(compiled.offset, 75);
        assert_eq!(compiled.limit, 25);
        assert_eq!(
            compiled.id_query_sql(),
            "SELECT DISTINCT candidate.id, partner.abbreviation \
             FROM candidate JOIN users ON candidate.user_id = users.id \
             LEFT JOIN partner ON users.partner_id = partner.id \
             WHERE candidate.status = ANY($1) AND candidate.gender = $2 \
             ORDER BY partner.abbreviation ASC, candidate.id DESC LIMIT $3 OFFSET $4"
        );
        assert_eq!(
            compiled.count_query_sql(),
            "SELECT COUNT(DISTINCT candidate.id) \
             FROM candidate JOIN users ON candidate.user_id = users.id \
             WHERE candidate.status = ANY($1) AND candidate.gender = $2"
        );
    }
}

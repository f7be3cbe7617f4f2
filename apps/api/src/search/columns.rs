//! Sort allow-list: the only candidate properties a caller may order by,
//! and the SQL column (plus join) each one resolves to.
//!
//! Property names arrive as the front end spells them (`user.partner.abbreviation`,
//! `yearOfArrival`). Anything not listed here is rejected before a query is built.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Joins a sort column may need beyond `candidate JOIN users`.
/// Ordered so the FROM clause comes out the same on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Join {
    Partner,
    Nationality,
    Country,
    EducationLevel,
}

impl Join {
    pub fn sql(&self) -> &'static str {
        match self {
            Join::Partner => "LEFT JOIN partner ON users.partner_id = partner.id",
            Join::Nationality => {
                "LEFT JOIN country AS nationality ON candidate.nationality_id = nationality.id"
            }
            Join::Country => "LEFT JOIN country ON candidate.country_id = country.id",
            Join::EducationLevel => {
                "LEFT JOIN education_level ON candidate.max_education_level_id = education_level.id"
            }
        }
    }
}

/// Always present: every search reads `users` for names and partner filtering.
pub const BASE_FROM: &str = "candidate JOIN users ON candidate.user_id = users.id";

pub const ID_COLUMN: &str = "candidate.id";

struct SortColumn {
    property: &'static str,
    column: &'static str,
    join: Option<Join>,
}

const SORT_COLUMNS: &[SortColumn] = &[
    SortColumn { property: "id", column: ID_COLUMN, join: None },
    SortColumn { property: "candidateNumber", column: "candidate.candidate_number", join: None },
    SortColumn { property: "status", column: "candidate.status", join: None },
    SortColumn { property: "gender", column: "candidate.gender", join: None },
    SortColumn { property: "dob", column: "candidate.dob", join: None },
    SortColumn { property: "yearOfArrival", column: "candidate.year_of_arrival", join: None },
    SortColumn { property: "createdDate", column: "candidate.created_date", join: None },
    SortColumn { property: "updatedDate", column: "candidate.updated_date", join: None },
    SortColumn { property: "user.firstName", column: "users.first_name", join: None },
    SortColumn { property: "user.lastName", column: "users.last_name", join: None },
    SortColumn { property: "user.email", column: "users.email", join: None },
    SortColumn {
        property: "user.partner.abbreviation",
        column: "partner.abbreviation",
        join: Some(Join::Partner),
    },
    SortColumn {
        property: "nationality.name",
        column: "nationality.name",
        join: Some(Join::Nationality),
    },
    SortColumn { property: "country.name", column: "country.name", join: Some(Join::Country) },
    SortColumn {
        property: "maxEducationLevel.level",
        column: "education_level.level",
        join: Some(Join::EducationLevel),
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

impl SortDirection {
    fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub property: String,
    pub direction: SortDirection,
}

/// Compiled ORDER BY plus what the id query must select and join for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// e.g. `users.last_name ASC, candidate.id DESC`
    pub clause: String,
    /// Non-id sort columns. `SELECT DISTINCT` needs them in the select list.
    pub select_columns: Vec<&'static str>,
    pub joins: BTreeSet<Join>,
}

fn lookup(property: &str) -> Option<&'static SortColumn> {
    let property = property.strip_prefix("candidate.").unwrap_or(property);
    SORT_COLUMNS.iter().find(|c| c.property == property)
}

/// Compiles `sort` into an ORDER BY over the allow-list.
///
/// Empty sort means `id DESC`. If the caller did not sort by id, `candidate.id DESC`
/// is appended so rows with equal sort values always page in the same order.
pub fn build_order_by(sort: &[SortOrder]) -> Result<OrderBy, AppError> {
    let mut parts = Vec::with_capacity(sort.len() + 1);
    let mut select_columns = Vec::new();
    let mut joins = BTreeSet::new();
    let mut seen = BTreeSet::new();
    let mut has_id = false;

    for order in sort {
        let column = lookup(&order.property).ok_or_else(|| {
            AppError::Validation(format!("Cannot sort by '{}'", order.property))
        })?;
        if !seen.insert(column.column) {
            return Err(AppError::Validation(format!(
                "Sort property '{}' given more than once",
                order.property
            )));
        }
        if column.column == ID_COLUMN {
            has_id = true;
        } else {
            select_columns.push(column.column);
        }
        if let Some(join) = column.join {
            joins.insert(join);
        }
        parts.push(format!("{} {}", column.column, order.direction.sql()));
    }

    if !has_id {
        parts.push(format!("{ID_COLUMN} DESC"));
    }

    Ok(OrderBy {
        clause: parts.join(", "),
        select_columns,
        joins,
    })
}

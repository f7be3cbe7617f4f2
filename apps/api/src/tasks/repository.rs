use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use sqlx::{PgConnection, PgPool};
use tracing::info;

use crate::errors::AppError;
use crate::models::candidate::CandidateId;
use crate::models::property::CandidateProperty;
use crate::models::task::{
    AssignmentStatus, Task, TaskAssignment, TaskAssignmentId, TaskAssignmentRow, TaskId,
};
use crate::search::repository::fetch_saved_list_candidate_ids;
use crate::tasks::processor::{TaskCompletion, UploadedFile};

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn find_by_id(&self, id: TaskId) -> Result<Option<Task>, AppError>;
    async fn find_by_lower_name(&self, name: &str) -> Result<Option<Task>, AppError>;
    async fn find_by_lower_display_name(&self, display_name: &str)
        -> Result<Option<Task>, AppError>;
    async fn find_all_by_name(&self) -> Result<Vec<Task>, AppError>;
    /// Tasks whose name or display name contains `keyword`, plus the unpaged count.
    async fn search(
        &self,
        keyword: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Task>, i64), AppError>;
    async fn update(&self, task: &Task) -> Result<(), AppError>;
}

#[async_trait]
pub trait TaskAssignmentRepository: Send + Sync {
    async fn find_by_id(&self, id: TaskAssignmentId) -> Result<Option<TaskAssignment>, AppError>;
    /// Inserts when `id` is `None`, otherwise updates. Returns the stored assignment.
    async fn save(&self, assignment: TaskAssignment) -> Result<TaskAssignment, AppError>;
    /// Persists a completion as one unit: the assignment must still be active
    /// when written, its properties are upserted, and only the completion
    /// columns are updated. Nothing is written if the assignment is no longer active.
    async fn record_completion(
        &self,
        completion: TaskCompletion,
    ) -> Result<TaskAssignment, AppError>;
    async fn find_by_task_and_list(
        &self,
        task_id: Option<TaskId>,
        saved_list_id: Option<i64>,
    ) -> Result<Vec<TaskAssignment>, AppError>;
    async fn find_by_task_candidate_status(
        &self,
        task_id: TaskId,
        candidate_id: CandidateId,
        status: AssignmentStatus,
    ) -> Result<Vec<TaskAssignment>, AppError>;
}

/// Candidate lookups the task workflow needs.
#[async_trait]
pub trait CandidateDirectory: Send + Sync {
    async fn candidate_number(&self, candidate_id: CandidateId) -> Result<String, AppError>;
    async fn saved_list_candidate_ids(&self, list_id: i64) -> Result<Vec<CandidateId>, AppError>;
}

pub struct AttachmentUpload<'a> {
    pub candidate_id: CandidateId,
    pub candidate_number: &'a str,
    pub uploaded_name: String,
    pub subfolder: Option<&'a str>,
    pub upload_type: &'a str,
    pub file: &'a UploadedFile,
}

/// Where upload-task files end up.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn upload(&self, upload: AttachmentUpload<'_>) -> Result<(), AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres implementations
// ────────────────────────────────────────────────────────────────────────────

const TASK_COLUMNS: &str = r#"
    id, name, display_name, description, task_type, days_to_complete, optional, help_link,
    candidate_answer_field, explicit_allowed_answers, upload_type, upload_subfolder_name,
    required_metadata
"#;

const ASSIGNMENT_COLUMNS: &str = r#"
    id, task_id, candidate_id, status, activated_by, activated_date, deactivated_by,
    deactivated_date, due_date, completed_date, abandoned_date, candidate_notes,
    related_list_id, answer
"#;

pub struct PgTaskRepository {
    pool: PgPool,
}

impl PgTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    async fn find_by_id(&self, id: TaskId) -> Result<Option<Task>, AppError> {
        let task = sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM task WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    async fn find_by_lower_name(&self, name: &str) -> Result<Option<Task>, AppError> {
        let task = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM task WHERE lower(name) = lower($1)"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn find_by_lower_display_name(
        &self,
        display_name: &str,
    ) -> Result<Option<Task>, AppError> {
        let task = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM task WHERE lower(display_name) = lower($1)"
        ))
        .bind(display_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn find_all_by_name(&self) -> Result<Vec<Task>, AppError> {
        let tasks = sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM task ORDER BY name ASC"))
            .fetch_all(&self.pool)
            .await?;
        Ok(tasks)
    }

    async fn search(
        &self,
        keyword: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Task>, i64), AppError> {
        // NULL keyword matches everything.
        let pattern = keyword.map(|k| format!("%{}%", k.to_lowercase()));
        let predicate = "($1::text IS NULL OR lower(name) LIKE $1 OR lower(display_name) LIKE $1)";

        let tasks = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM task WHERE {predicate} ORDER BY name ASC, id ASC LIMIT $2 OFFSET $3"
        ))
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM task WHERE {predicate}"))
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await?;

        Ok((tasks, total))
    }

    async fn update(&self, task: &Task) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE task
            SET display_name = $2, description = $3, days_to_complete = $4,
                help_link = $5, optional = $6
            WHERE id = $1
            "#,
        )
        .bind(task.id)
        .bind(&task.display_name)
        .bind(&task.description)
        .bind(task.days_to_complete)
        .bind(&task.help_link)
        .bind(task.optional)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Task {} not found", task.id)));
        }
        Ok(())
    }
}

pub struct PgTaskAssignmentRepository {
    pool: PgPool,
}

impl PgTaskAssignmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attaches each row's `Task`, loading every distinct task once.
    async fn hydrate(&self, rows: Vec<TaskAssignmentRow>) -> Result<Vec<TaskAssignment>, AppError> {
        let mut task_ids: Vec<TaskId> = rows.iter().map(|r| r.task_id).collect();
        task_ids.sort_unstable();
        task_ids.dedup();

        let tasks: Vec<Task> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM task WHERE id = ANY($1)"
        ))
        .bind(&task_ids)
        .fetch_all(&self.pool)
        .await?;
        let tasks: HashMap<TaskId, Task> = tasks.into_iter().map(|t| (t.id, t)).collect();

        rows.into_iter()
            .map(|row| {
                let task = tasks.get(&row.task_id).cloned().ok_or_else(|| {
                    AppError::NotFound(format!("Task {} not found", row.task_id))
                })?;
                Ok(row.into_assignment(task))
            })
            .collect()
    }
}

#[async_trait]
impl TaskAssignmentRepository for PgTaskAssignmentRepository {
    async fn find_by_id(&self, id: TaskAssignmentId) -> Result<Option<TaskAssignment>, AppError> {
        let row: Option<TaskAssignmentRow> = sqlx::query_as(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM task_assignment WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn save(&self, mut assignment: TaskAssignment) -> Result<TaskAssignment, AppError> {
        let answer = assignment.payload.answer().map(str::to_string);
        match assignment.id {
            None => {
                let id: i64 = sqlx::query_scalar(
                    r#"
                    INSERT INTO task_assignment
                        (task_id, candidate_id, status, activated_by, activated_date,
                         deactivated_by, deactivated_date, due_date, completed_date,
                         abandoned_date, candidate_notes, related_list_id, answer)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                    RETURNING id
                    "#,
                )
                .bind(assignment.task.id)
                .bind(assignment.candidate_id)
                .bind(assignment.status.as_str())
                .bind(assignment.activated_by)
                .bind(assignment.activated_date)
                .bind(assignment.deactivated_by)
                .bind(assignment.deactivated_date)
                .bind(assignment.due_date)
                .bind(assignment.completed_date)
                .bind(assignment.abandoned_date)
                .bind(&assignment.candidate_notes)
                .bind(assignment.related_list_id)
                .bind(&answer)
                .fetch_one(&self.pool)
                .await?;
                info!(
                    "Assigned task '{}' to candidate {} as assignment {id}",
                    assignment.task.name, assignment.candidate_id
                );
                assignment.id = Some(id);
            }
            Some(id) => {
                let result = sqlx::query(
                    r#"
                    UPDATE task_assignment
                    SET status = $2, activated_by = $3, activated_date = $4,
                        deactivated_by = $5, deactivated_date = $6, due_date = $7,
                        completed_date = $8, abandoned_date = $9, candidate_notes = $10,
                        related_list_id = $11, answer = $12
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(assignment.status.as_str())
                .bind(assignment.activated_by)
                .bind(assignment.activated_date)
                .bind(assignment.deactivated_by)
                .bind(assignment.deactivated_date)
                .bind(assignment.due_date)
                .bind(assignment.completed_date)
                .bind(assignment.abandoned_date)
                .bind(&assignment.candidate_notes)
                .bind(assignment.related_list_id)
                .bind(&answer)
                .execute(&self.pool)
                .await?;
                if result.rows_affected() == 0 {
                    return Err(AppError::NotFound(format!("Task assignment {id} not found")));
                }
            }
        }
        Ok(assignment)
    }

    async fn record_completion(
        &self,
        completion: TaskCompletion,
    ) -> Result<TaskAssignment, AppError> {
        let assignment = completion.assignment;
        let id = assignment.id.ok_or_else(|| {
            AppError::Validation("Cannot complete an unsaved task assignment".to_string())
        })?;

        let mut tx = self.pool.begin().await?;

        // Row lock: a concurrent deactivate or delete either commits first and
        // is seen here, or waits for this transaction.
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM task_assignment WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        match status.as_deref() {
            None => return Err(AppError::NotFound(format!("Task assignment {id} not found"))),
            Some(status) if status != AssignmentStatus::Active.as_str() => {
                return Err(AppError::Validation(format!(
                    "Task assignment {id} is {status} and cannot be completed"
                )))
            }
            Some(_) => {}
        }

        for property in &completion.properties {
            upsert_property(&mut *tx, property).await?;
        }

        sqlx::query("UPDATE task_assignment SET completed_date = $2, answer = $3 WHERE id = $1")
            .bind(id)
            .bind(assignment.completed_date)
            .bind(assignment.payload.answer())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(assignment)
    }

    async fn find_by_task_and_list(
        &self,
        task_id: Option<TaskId>,
        saved_list_id: Option<i64>,
    ) -> Result<Vec<TaskAssignment>, AppError> {
        let rows: Vec<TaskAssignmentRow> = sqlx::query_as(&format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS} FROM task_assignment
            WHERE ($1::bigint IS NULL OR task_id = $1)
              AND ($2::bigint IS NULL OR related_list_id = $2)
            ORDER BY id ASC
            "#
        ))
        .bind(task_id)
        .bind(saved_list_id)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    async fn find_by_task_candidate_status(
        &self,
        task_id: TaskId,
        candidate_id: CandidateId,
        status: AssignmentStatus,
    ) -> Result<Vec<TaskAssignment>, AppError> {
        let rows: Vec<TaskAssignmentRow> = sqlx::query_as(&format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS} FROM task_assignment
            WHERE task_id = $1 AND candidate_id = $2 AND status = $3
            ORDER BY id ASC
            "#
        ))
        .bind(task_id)
        .bind(candidate_id)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }
}

/// Insert or replace the value for (candidate_id, name) in one statement.
///
/// Two concurrent completions serialize on the unique key instead of racing
/// a find-then-save.
async fn upsert_property(
    conn: &mut PgConnection,
    property: &CandidateProperty,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO candidate_property (candidate_id, name, value, related_task_assignment_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (candidate_id, name) DO UPDATE
        SET value = EXCLUDED.value,
            related_task_assignment_id = EXCLUDED.related_task_assignment_id
        "#,
    )
    .bind(property.candidate_id)
    .bind(&property.name)
    .bind(&property.value)
    .bind(property.related_task_assignment_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub struct PgCandidateDirectory {
    pool: PgPool,
}

impl PgCandidateDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CandidateDirectory for PgCandidateDirectory {
    async fn candidate_number(&self, candidate_id: CandidateId) -> Result<String, AppError> {
        let number: Option<String> =
            sqlx::query_scalar("SELECT candidate_number FROM candidate WHERE id = $1")
                .bind(candidate_id)
                .fetch_optional(&self.pool)
                .await?;
        number.ok_or_else(|| AppError::NotFound(format!("Candidate {candidate_id} not found")))
    }

    async fn saved_list_candidate_ids(&self, list_id: i64) -> Result<Vec<CandidateId>, AppError> {
        fetch_saved_list_candidate_ids(&self.pool, list_id).await
    }
}

/// Stores upload-task files in S3 and records them in `candidate_attachment`.
pub struct S3AttachmentStore {
    pool: PgPool,
    s3: aws_sdk_s3::Client,
    bucket: String,
}

impl S3AttachmentStore {
    pub fn new(pool: PgPool, s3: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { pool, s3, bucket }
    }
}

/// `candidates/<number>/<subfolder>/<name>`; the subfolder is optional.
pub fn attachment_key(candidate_number: &str, subfolder: Option<&str>, name: &str) -> String {
    match subfolder.map(str::trim).filter(|s| !s.is_empty()) {
        Some(sub) => format!("candidates/{candidate_number}/{sub}/{name}"),
        None => format!("candidates/{candidate_number}/{name}"),
    }
}

#[async_trait]
impl AttachmentStore for S3AttachmentStore {
    async fn upload(&self, upload: AttachmentUpload<'_>) -> Result<(), AppError> {
        let key = attachment_key(
            upload.candidate_number,
            upload.subfolder,
            &upload.uploaded_name,
        );

        let mut put = self
            .s3
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(upload.file.bytes.clone()));
        if let Some(content_type) = &upload.file.content_type {
            put = put.content_type(content_type);
        }
        put.send()
            .await
            .map_err(|e| AppError::S3(format!("upload of {key} failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO candidate_attachment
                (candidate_id, name, location, upload_type, content_type, file_size)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(upload.candidate_id)
        .bind(&upload.uploaded_name)
        .bind(&key)
        .bind(upload.upload_type)
        .bind(&upload.file.content_type)
        .bind(upload.file.bytes.len() as i64)
        .execute(&self.pool)
        .await?;

        info!("Uploaded s3://{}/{}", self.bucket, key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_key_with_subfolder() {
        assert_eq!(
            attachment_key("CN123", Some("passport"), "CN123-passport-scan.pdf"),
            "candidates/CN123/passport/CN123-passport-scan.pdf"
        );
    }

    #[test]
    fn test_attachment_key_blank_subfolder_skipped() {
        assert_eq!(
            attachment_key("CN123", Some("  "), "cv.pdf"),
            "candidates/CN123/cv.pdf"
        );
        assert_eq!(attachment_key("CN123", None, "cv.pdf"), "candidates/CN123/cv.pdf");
    }
}

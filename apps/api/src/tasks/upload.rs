use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Days, Utc};
use tracing::info;

use crate::errors::AppError;
use crate::models::property::CandidateProperty;
use crate::models::task::{AssignmentPayload, TaskAssignment, TaskType};
use crate::tasks::processor::{
    check_completion, mark_completed, TaskCompletion, TaskCompletionContext, TaskProcessor,
};
use crate::tasks::repository::{
    AttachmentStore, AttachmentUpload, CandidateDirectory, TaskAssignmentRepository,
    TaskRepository,
};

/// Metadata fields already held on the candidate record; not duplicated as properties.
const OVERLAPPING_FIELDS: [&str; 5] = [
    "firstName",
    "lastName",
    "dateOfBirth",
    "gender",
    "countryOfBirth",
];

/// Completing this task unlocks the Duolingo test.
const CLAIM_COUPON_TASK: &str = "claimCouponButton";
const DUOLINGO_TEST_TASK: &str = "duolingoTest";

pub struct UploadTaskProcessor {
    attachments: Arc<dyn AttachmentStore>,
    candidates: Arc<dyn CandidateDirectory>,
    tasks: Arc<dyn TaskRepository>,
    assignments: Arc<dyn TaskAssignmentRepository>,
}

impl UploadTaskProcessor {
    pub fn new(
        attachments: Arc<dyn AttachmentStore>,
        candidates: Arc<dyn CandidateDirectory>,
        tasks: Arc<dyn TaskRepository>,
        assignments: Arc<dyn TaskAssignmentRepository>,
    ) -> Self {
        Self {
            attachments,
            candidates,
            tasks,
            assignments,
        }
    }
}

/// Required metadata answers that become properties, as (field, value).
/// Errors if a required field has no answer.
fn metadata_answers<'a>(
    required: &'a [String],
    context: &'a TaskCompletionContext,
) -> Result<Vec<(&'a str, &'a str)>, AppError> {
    let mut answers = Vec::new();
    for field in required {
        let value = context.answer(field).ok_or_else(|| {
            AppError::Validation(format!("Missing required field '{field}'"))
        })?;
        if !OVERLAPPING_FIELDS.contains(&field.as_str()) {
            answers.push((field.as_str(), value));
        }
    }
    Ok(answers)
}

#[async_trait]
impl TaskProcessor for UploadTaskProcessor {
    fn task_type(&self) -> TaskType {
        TaskType::Upload
    }

    async fn complete_task(
        &self,
        assignment: TaskAssignment,
        context: &TaskCompletionContext,
    ) -> Result<TaskCompletion, AppError> {
        check_completion(&assignment, context, TaskType::Upload)?;
        if context.files.is_empty() {
            return Err(AppError::Validation(
                "At least one file must be uploaded".to_string(),
            ));
        }
        let required = assignment.task.required_metadata.clone().unwrap_or_default();
        let metadata = metadata_answers(&required, context)?;
        let candidate_number = self.candidates.candidate_number(assignment.candidate_id).await?;

        let assignment_ref = assignment
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "new".to_string());
        let properties = metadata
            .into_iter()
            .map(|(field, value)| CandidateProperty {
                candidate_id: assignment.candidate_id,
                name: format!("{}_ta{}_{}", assignment.task.name, assignment_ref, field),
                value: Some(value.to_string()),
                related_task_assignment_id: assignment.id,
            })
            .collect();

        let upload_type = assignment.task.upload_type.as_deref().unwrap_or("other");
        let mut uploaded_files = Vec::with_capacity(context.files.len());
        for file in &context.files {
            let uploaded_name = format!("{candidate_number}-{upload_type}-{}", file.file_name);
            self.attachments
                .upload(AttachmentUpload {
                    candidate_id: assignment.candidate_id,
                    candidate_number: &candidate_number,
                    uploaded_name: uploaded_name.clone(),
                    subfolder: assignment.task.upload_subfolder_name.as_deref(),
                    upload_type,
                    file,
                })
                .await?;
            uploaded_files.push(uploaded_name);
        }
        info!(
            "Candidate {} uploaded {} file(s) for task '{}'",
            assignment.candidate_id,
            uploaded_files.len(),
            assignment.task.name
        );

        let mut assignment = assignment;
        assignment.payload = AssignmentPayload::Upload { uploaded_files };
        Ok(TaskCompletion {
            assignment: mark_completed(assignment),
            properties,
        })
    }

    async fn handle_completion(&self, assignment: &TaskAssignment) -> Result<(), AppError> {
        if assignment.task.name != CLAIM_COUPON_TASK {
            return Ok(());
        }

        let duolingo_task = self
            .tasks
            .find_by_lower_name(DUOLINGO_TEST_TASK)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Task {DUOLINGO_TEST_TASK} not found")))?;
        let days = duolingo_task.days_to_complete.unwrap_or(0).max(0) as u64;

        let mut follow_up = TaskAssignment::new(duolingo_task, assignment.candidate_id);
        follow_up.activated_by = assignment.activated_by;
        follow_up.activated_date = Some(Utc::now());
        follow_up.due_date = Utc::now().date_naive().checked_add_days(Days::new(days));

        let saved = self.assignments.save(follow_up).await?;
        info!(
            "Assigned {DUOLINGO_TEST_TASK} ({:?}) to candidate {} after coupon claim",
            saved.id, saved.candidate_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::models::task::Task;
    use crate::tasks::processor::UploadedFile;
    use crate::test_support::{saved_assignment, task, TestStores};

    fn passport_task() -> Task {
        let mut t = task(10, "passportUpload", TaskType::Upload);
        t.upload_type = Some("passport".to_string());
        t.upload_subfolder_name = Some("identity".to_string());
        t.required_metadata = Some(vec!["firstName".to_string(), "passportNumber".to_string()]);
        t
    }

    fn scan() -> UploadedFile {
        UploadedFile {
            file_name: "scan.pdf".to_string(),
            content_type: Some("application/pdf".to_string()),
            bytes: Bytes::from_static(b"%PDF-1.4"),
        }
    }

    fn processor(stores: &TestStores) -> UploadTaskProcessor {
        UploadTaskProcessor::new(
            stores.attachments.clone(),
            stores.candidates.clone(),
            stores.tasks.clone(),
            stores.assignments.clone(),
        )
    }

    #[tokio::test]
    async fn test_upload_stores_files_and_metadata() {
        let stores = TestStores::default();
        stores.candidates.add(7, "CN7");
        let ctx = TaskCompletionContext::for_candidate(7)
            .with_answer("firstName", "Amal")
            .with_answer("passportNumber", "N123")
            .with_file(scan());

        let done = processor(&stores)
            .complete_task(saved_assignment(30, passport_task(), 7), &ctx)
            .await
            .unwrap();

        assert!(done.assignment.is_completed());
        assert_eq!(
            done.assignment.payload,
            AssignmentPayload::Upload {
                uploaded_files: vec!["CN7-passport-scan.pdf".to_string()]
            }
        );
        assert_eq!(stores.attachments.uploaded(), vec!["CN7-passport-scan.pdf".to_string()]);

        let props = done.properties;
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].name, "passportUpload_ta30_passportNumber");
        assert_eq!(props[0].value.as_deref(), Some("N123"));
    }

    #[tokio::test]
    async fn test_no_files_rejected() {
        let stores = TestStores::default();
        stores.candidates.add(7, "CN7");
        let ctx = TaskCompletionContext::for_candidate(7)
            .with_answer("firstName", "Amal")
            .with_answer("passportNumber", "N123");

        let err = processor(&stores)
            .complete_task(saved_assignment(30, passport_task(), 7), &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(stores.attachments.uploaded().is_empty());
    }

    #[tokio::test]
    async fn test_missing_metadata_rejected_before_upload() {
        let stores = TestStores::default();
        stores.candidates.add(7, "CN7");
        let ctx = TaskCompletionContext::for_candidate(7)
            .with_answer("firstName", "Amal")
            .with_file(scan());

        let err = processor(&stores)
            .complete_task(saved_assignment(30, passport_task(), 7), &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(stores.attachments.uploaded().is_empty());
    }

    #[tokio::test]
    async fn test_claim_coupon_assigns_duolingo_test() {
        let stores = TestStores::default();
        let mut duolingo = task(20, "duolingoTest", TaskType::Simple);
        duolingo.days_to_complete = Some(14);
        stores.tasks.add(duolingo);

        let mut claimed = saved_assignment(31, task(11, "claimCouponButton", TaskType::Upload), 7);
        claimed.activated_by = Some(2);
        processor(&stores).handle_completion(&claimed).await.unwrap();

        let created = stores.assignments.all();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].task.name, "duolingoTest");
        assert_eq!(created[0].candidate_id, 7);
        assert_eq!(created[0].activated_by, Some(2));
        assert_eq!(
            created[0].due_date,
            Utc::now().date_naive().checked_add_days(Days::new(14))
        );
    }

    #[tokio::test]
    async fn test_other_upload_has_no_follow_up() {
        let stores = TestStores::default();
        processor(&stores)
            .handle_completion(&saved_assignment(30, passport_task(), 7))
            .await
            .unwrap();
        assert!(stores.assignments.all().is_empty());
    }
}

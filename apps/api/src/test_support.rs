//! In-memory stand-ins for the storage traits, shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::errors::AppError;
use crate::models::candidate::{CandidateId, CandidateRow};
use crate::models::property::CandidateProperty;
use crate::models::task::{
    AssignmentStatus, Task, TaskAssignment, TaskAssignmentId, TaskId, TaskType,
};
use crate::search::filter::CompiledSearch;
use crate::search::repository::CandidateSearchRepository;
use crate::tasks::processor::{TaskCompletion, TaskProcessor, TaskProcessorRegistry};
use crate::tasks::question::QuestionTaskProcessor;
use crate::tasks::repository::{
    AttachmentStore, AttachmentUpload, CandidateDirectory, TaskAssignmentRepository,
    TaskRepository,
};
use crate::tasks::service::{TaskAssignmentService, TaskService};
use crate::tasks::simple::SimpleTaskProcessor;
use crate::tasks::upload::UploadTaskProcessor;

pub fn candidate(id: CandidateId) -> CandidateRow {
    CandidateRow {
        id,
        candidate_number: format!("CN{id}"),
        status: "active".to_string(),
        gender: None,
        dob: None,
        nationality_id: None,
        country_id: None,
        unhcr_status: None,
        user_id: id + 1000,
        first_name: Some(format!("First{id}")),
        last_name: Some(format!("Last{id}")),
        email: Some(format!("candidate{id}@example.org")),
        partner_id: None,
        created_date: Utc::now(),
        updated_date: None,
    }
}

pub fn task(id: TaskId, name: &str, task_type: TaskType) -> Task {
    Task {
        id,
        name: name.to_string(),
        display_name: name.to_string(),
        description: None,
        task_type,
        days_to_complete: None,
        optional: false,
        help_link: None,
        candidate_answer_field: None,
        explicit_allowed_answers: None,
        upload_type: None,
        upload_subfolder_name: None,
        required_metadata: None,
        allowed_answers: Vec::new(),
    }
}

/// An assignment as if it had already been stored under `id`.
pub fn saved_assignment(id: TaskAssignmentId, task: Task, candidate_id: CandidateId) -> TaskAssignment {
    let mut assignment = TaskAssignment::new(task, candidate_id);
    assignment.id = Some(id);
    assignment
}

// ── search ──────────────────────────────────────────────────────────────────

/// Pretends the database matched `matches`, already in sort order.
pub struct InMemoryCandidateSearchRepository {
    matches: Vec<CandidateId>,
    saved_lists: HashMap<i64, Vec<CandidateId>>,
    queries: AtomicUsize,
    last: Mutex<Option<CompiledSearch>>,
}

impl InMemoryCandidateSearchRepository {
    pub fn new(matches: Vec<CandidateId>) -> Self {
        Self {
            matches,
            saved_lists: HashMap::new(),
            queries: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn with_saved_list(mut self, list_id: i64, candidate_ids: Vec<CandidateId>) -> Self {
        self.saved_lists.insert(list_id, candidate_ids);
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn last_search(&self) -> Option<CompiledSearch> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl CandidateSearchRepository for InMemoryCandidateSearchRepository {
    async fn find_page_ids(&self, search: &CompiledSearch) -> Result<Vec<CandidateId>, AppError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(search.clone());
        Ok(self
            .matches
            .iter()
            .skip(search.offset as usize)
            .take(search.limit as usize)
            .copied()
            .collect())
    }

    async fn count_matches(&self, _search: &CompiledSearch) -> Result<i64, AppError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.matches.len() as i64)
    }

    async fn find_by_ids(&self, ids: &[CandidateId]) -> Result<Vec<CandidateRow>, AppError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        // Deliberately not in the order asked for.
        let mut rows: Vec<CandidateRow> = ids.iter().map(|id| candidate(*id)).collect();
        rows.sort_by_key(|c| c.id);
        Ok(rows)
    }

    async fn saved_list_candidate_ids(&self, list_id: i64) -> Result<Vec<CandidateId>, AppError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.saved_lists
            .get(&list_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Saved list {list_id} not found")))
    }
}

// ── tasks ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: Mutex<Vec<Task>>,
}

impl InMemoryTaskRepository {
    pub fn add(&self, task: Task) {
        self.tasks.lock().unwrap().push(task);
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.tasks.lock().unwrap().iter().find(|t| t.id == id).cloned()
    }

    fn find(&self, pred: impl Fn(&Task) -> bool) -> Option<Task> {
        self.tasks.lock().unwrap().iter().find(|t| pred(t)).cloned()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn find_by_id(&self, id: TaskId) -> Result<Option<Task>, AppError> {
        Ok(self.get(id))
    }

    async fn find_by_lower_name(&self, name: &str) -> Result<Option<Task>, AppError> {
        Ok(self.find(|t| t.name.eq_ignore_ascii_case(name)))
    }

    async fn find_by_lower_display_name(
        &self,
        display_name: &str,
    ) -> Result<Option<Task>, AppError> {
        Ok(self.find(|t| t.display_name.eq_ignore_ascii_case(display_name)))
    }

    async fn find_all_by_name(&self) -> Result<Vec<Task>, AppError> {
        let mut tasks = self.tasks.lock().unwrap().clone();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tasks)
    }

    async fn search(
        &self,
        keyword: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Task>, i64), AppError> {
        let keyword = keyword.map(str::to_lowercase);
        let mut matched: Vec<Task> = self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| match &keyword {
                Some(k) => {
                    t.name.to_lowercase().contains(k.as_str())
                        || t.display_name.to_lowercase().contains(k.as_str())
                }
                None => true,
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        let total = matched.len() as i64;
        let page = matched
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn update(&self, task: &Task) -> Result<(), AppError> {
        let mut tasks = self.tasks.lock().unwrap();
        let slot = tasks
            .iter_mut()
            .find(|t| t.id == task.id)
            .ok_or_else(|| AppError::NotFound(format!("Task {} not found", task.id)))?;
        *slot = task.clone();
        Ok(())
    }
}

/// Completions write properties into the shared property store, mirroring
/// the single transaction the Postgres repository uses.
#[derive(Default)]
pub struct InMemoryTaskAssignmentRepository {
    rows: Mutex<Vec<TaskAssignment>>,
    properties: Arc<InMemoryPropertyRepository>,
}

impl InMemoryTaskAssignmentRepository {
    pub fn with_properties(properties: Arc<InMemoryPropertyRepository>) -> Self {
        Self {
            rows: Mutex::default(),
            properties,
        }
    }

    pub fn all(&self) -> Vec<TaskAssignment> {
        self.rows.lock().unwrap().clone()
    }

    pub fn get(&self, id: TaskAssignmentId) -> Option<TaskAssignment> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == Some(id))
            .cloned()
    }
}

#[async_trait]
impl TaskAssignmentRepository for InMemoryTaskAssignmentRepository {
    async fn find_by_id(&self, id: TaskAssignmentId) -> Result<Option<TaskAssignment>, AppError> {
        Ok(self.get(id))
    }

    async fn save(&self, mut assignment: TaskAssignment) -> Result<TaskAssignment, AppError> {
        let mut rows = self.rows.lock().unwrap();
        match assignment.id {
            None => {
                let next = rows.iter().filter_map(|a| a.id).max().unwrap_or(0) + 1;
                assignment.id = Some(next);
                rows.push(assignment.clone());
            }
            Some(id) => {
                let slot = rows.iter_mut().find(|a| a.id == Some(id)).ok_or_else(|| {
                    AppError::NotFound(format!("Task assignment {id} not found"))
                })?;
                *slot = assignment.clone();
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
        let mut rows = self.rows.lock().unwrap();
        let slot = rows
            .iter_mut()
            .find(|a| a.id == Some(id))
            .ok_or_else(|| AppError::NotFound(format!("Task assignment {id} not found")))?;
        if slot.status != AssignmentStatus::Active {
            return Err(AppError::Validation(format!(
                "Task assignment {id} is {} and cannot be completed",
                slot.status.as_str()
            )));
        }
        for property in completion.properties {
            self.properties.upsert(property);
        }
        slot.completed_date = assignment.completed_date;
        slot.payload = assignment.payload.clone();
        Ok(assignment)
    }

    async fn find_by_task_and_list(
        &self,
        task_id: Option<TaskId>,
        saved_list_id: Option<i64>,
    ) -> Result<Vec<TaskAssignment>, AppError> {
        Ok(self
            .all()
            .into_iter()
            .filter(|a| task_id.map_or(true, |t| a.task.id == t))
            .filter(|a| saved_list_id.map_or(true, |l| a.related_list_id == Some(l)))
            .collect())
    }

    async fn find_by_task_candidate_status(
        &self,
        task_id: TaskId,
        candidate_id: CandidateId,
        status: AssignmentStatus,
    ) -> Result<Vec<TaskAssignment>, AppError> {
        Ok(self
            .all()
            .into_iter()
            .filter(|a| a.task.id == task_id && a.candidate_id == candidate_id && a.status == status)
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryPropertyRepository {
    rows: Mutex<Vec<CandidateProperty>>,
}

impl InMemoryPropertyRepository {
    pub fn all(&self) -> Vec<CandidateProperty> {
        self.rows.lock().unwrap().clone()
    }

    pub fn get(&self, candidate_id: CandidateId, name: &str) -> Option<CandidateProperty> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.candidate_id == candidate_id && p.name == name)
            .cloned()
    }

    pub fn upsert(&self, property: CandidateProperty) {
        let mut rows = self.rows.lock().unwrap();
        match rows
            .iter_mut()
            .find(|p| p.candidate_id == property.candidate_id && p.name == property.name)
        {
            Some(existing) => *existing = property,
            None => rows.push(property),
        }
    }
}

#[derive(Default)]
pub struct InMemoryCandidateDirectory {
    numbers: Mutex<HashMap<CandidateId, String>>,
    lists: Mutex<HashMap<i64, Vec<CandidateId>>>,
}

impl InMemoryCandidateDirectory {
    pub fn add(&self, candidate_id: CandidateId, number: &str) {
        self.numbers
            .lock()
            .unwrap()
            .insert(candidate_id, number.to_string());
    }

    pub fn add_list(&self, list_id: i64, candidate_ids: Vec<CandidateId>) {
        self.lists.lock().unwrap().insert(list_id, candidate_ids);
    }
}

#[async_trait]
impl CandidateDirectory for InMemoryCandidateDirectory {
    async fn candidate_number(&self, candidate_id: CandidateId) -> Result<String, AppError> {
        self.numbers
            .lock()
            .unwrap()
            .get(&candidate_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Candidate {candidate_id} not found")))
    }

    async fn saved_list_candidate_ids(&self, list_id: i64) -> Result<Vec<CandidateId>, AppError> {
        self.lists
            .lock()
            .unwrap()
            .get(&list_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Saved list {list_id} not found")))
    }
}

#[derive(Default)]
pub struct InMemoryAttachmentStore {
    uploaded: Mutex<Vec<String>>,
}

impl InMemoryAttachmentStore {
    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn upload(&self, upload: AttachmentUpload<'_>) -> Result<(), AppError> {
        self.uploaded.lock().unwrap().push(upload.uploaded_name);
        Ok(())
    }
}

pub struct TestStores {
    pub tasks: Arc<InMemoryTaskRepository>,
    pub assignments: Arc<InMemoryTaskAssignmentRepository>,
    pub properties: Arc<InMemoryPropertyRepository>,
    pub candidates: Arc<InMemoryCandidateDirectory>,
    pub attachments: Arc<InMemoryAttachmentStore>,
}

impl Default for TestStores {
    fn default() -> Self {
        let properties = Arc::new(InMemoryPropertyRepository::default());
        Self {
            tasks: Arc::default(),
            assignments: Arc::new(InMemoryTaskAssignmentRepository::with_properties(
                properties.clone(),
            )),
            properties,
            candidates: Arc::default(),
            attachments: Arc::default(),
        }
    }
}

/// Every processor wired to one set of in-memory stores.
pub struct TestWorkflow {
    pub stores: TestStores,
    pub registry: Arc<TaskProcessorRegistry>,
}

impl TestWorkflow {
    pub fn task_service(&self) -> TaskService {
        TaskService::new(self.stores.tasks.clone())
    }

    pub fn assignment_service(&self) -> TaskAssignmentService {
        TaskAssignmentService::new(
            self.stores.tasks.clone(),
            self.stores.assignments.clone(),
            self.stores.candidates.clone(),
            self.registry.clone(),
        )
    }
}

pub fn full_registry() -> TestWorkflow {
    let stores = TestStores::default();
    let processors: Vec<Arc<dyn TaskProcessor>> = vec![
        Arc::new(SimpleTaskProcessor),
        Arc::new(QuestionTaskProcessor::new()),
        Arc::new(QuestionTaskProcessor::yes_no()),
        Arc::new(UploadTaskProcessor::new(
            stores.attachments.clone(),
            stores.candidates.clone(),
            stores.tasks.clone(),
            stores.assignments.clone(),
        )),
    ];
    let registry = TaskProcessorRegistry::new(processors).unwrap();
    TestWorkflow {
        stores,
        registry: Arc::new(registry),
    }
}

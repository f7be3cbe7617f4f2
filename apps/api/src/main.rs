mod config;
mod db;
mod errors;
mod models;
mod routes;
mod search;
mod state;
mod tasks;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::db::create_pool;
use crate::routes::build_router;
use crate::search::repository::PgCandidateSearchRepository;
use crate::search::service::CandidateSearchService;
use crate::state::AppState;
use crate::tasks::processor::{TaskProcessor, TaskProcessorRegistry};
use crate::tasks::question::QuestionTaskProcessor;
use crate::tasks::repository::{
    PgCandidateDirectory, PgTaskAssignmentRepository, PgTaskRepository, S3AttachmentStore,
};
use crate::tasks::service::{TaskAssignmentService, TaskService};
use crate::tasks::simple::SimpleTaskProcessor;
use crate::tasks::upload::UploadTaskProcessor;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Talent API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    // Repositories
    let tasks = Arc::new(PgTaskRepository::new(db.clone()));
    let assignments = Arc::new(PgTaskAssignmentRepository::new(db.clone()));
    let candidates = Arc::new(PgCandidateDirectory::new(db.clone()));
    let attachments = Arc::new(S3AttachmentStore::new(
        db.clone(),
        s3,
        config.s3_bucket.clone(),
    ));

    // One processor per task type; a gap or a duplicate aborts startup.
    let processors: Vec<Arc<dyn TaskProcessor>> = vec![
        Arc::new(SimpleTaskProcessor),
        Arc::new(QuestionTaskProcessor::new()),
        Arc::new(QuestionTaskProcessor::yes_no()),
        Arc::new(UploadTaskProcessor::new(
            attachments,
            candidates.clone(),
            tasks.clone(),
            assignments.clone(),
        )),
    ];
    let registry =
        Arc::new(TaskProcessorRegistry::new(processors).context("invalid task processor set")?);
    info!("Task processor registry initialized");

    // Build app state
    let state = AppState {
        db: db.clone(),
        candidate_search: Arc::new(CandidateSearchService::new(
            Arc::new(PgCandidateSearchRepository::new(db)),
            config.search_max_page_size,
        )),
        task_service: Arc::new(TaskService::new(tasks.clone())),
        task_assignments: Arc::new(TaskAssignmentService::new(
            tasks,
            assignments,
            candidates,
            registry,
        )),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "talent-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    // MinIO serves buckets under the path, not a subdomain.
    let s3_config = aws_sdk_s3::config::Builder::from(&s3_config)
        .force_path_style(true)
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}

//! One job iteration: fetch → check → render → reconcile → commit.
//!
//! Steps run strictly in order and every failure ends the iteration with
//! an outcome; nothing here returns an error to the scheduler.

use dashmap::DashMap;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::agent::checks::{verify_document, DocumentCheck};
use crate::agent::job::Job;
use crate::agent::outcome::JobOutcome;
use crate::agent::reload::{commit, CommitOutcome};
use crate::agent::render::{render_file, TemplateRenderer};
use crate::agent::writer::{reconcile, Reconcile};
use crate::fetch::{FetchRequest, Fetcher, RequestBody};
use crate::hash::ContentHash;

/// Header carrying the hash of the last document a job applied.
pub const HASH_HEADER: &str = "X-Custom-Hash";

/// State shared by every job task for the life of the process.
pub struct AgentContext {
    pub fetcher: Fetcher,
    pub renderer: Arc<dyn TemplateRenderer>,
    /// Print telemetry lines to stdout.
    pub emit_telemetry: bool,
    /// What each job last put in place, by job id.
    applied: DashMap<String, Applied>,
}

/// Hashes of the last document a job rendered into its destination.
#[derive(Debug, Clone)]
struct Applied {
    document: ContentHash,
    template: ContentHash,
    artifact: ContentHash,
}

impl AgentContext {
    pub fn new(fetcher: Fetcher, renderer: Arc<dyn TemplateRenderer>, emit_telemetry: bool) -> Self {
        Self {
            fetcher,
            renderer,
            emit_telemetry,
            applied: DashMap::new(),
        }
    }

    /// Hash of the document last applied by `job`.
    pub fn last_hash(&self, job: &Job) -> Option<ContentHash> {
        self.applied.get(&job.id()).map(|a| a.document.clone())
    }

    /// Drop every applied record so the next iteration renders again.
    pub fn forget_applied(&self) {
        self.applied.clear();
    }

    fn remember(&self, job: &Job, document: ContentHash, template: Option<ContentHash>, artifact: &ContentHash) {
        match template {
            Some(template) => {
                self.applied.insert(
                    job.id(),
                    Applied {
                        document,
                        template,
                        artifact: artifact.clone(),
                    },
                );
            }
            None => {
                self.applied.remove(&job.id());
            }
        }
    }

    /// The last document hash, offered only while the destination still
    /// holds what that document rendered to with the current template.
    async fn echo_hash(&self, job: &Job, template: Option<&ContentHash>) -> Option<ContentHash> {
        let applied = self.applied.get(&job.id()).map(|a| a.value().clone())?;
        if template != Some(&applied.template) {
            return None;
        }
        let current = file_hash(&job.dest).await?;
        (current == applied.artifact).then_some(applied.document)
    }
}

async fn file_hash(path: &Path) -> Option<ContentHash> {
    tokio::fs::read(path).await.ok().map(|bytes| ContentHash::of(&bytes))
}

enum Document {
    Fresh { value: Value, hash: ContentHash },
    NotModified,
}

/// Run one iteration of `job`. `None` means the job was skipped.
pub async fn run_job(ctx: &AgentContext, job: &Job, checks: &[DocumentCheck]) -> Option<JobOutcome> {
    if job.endpoints.is_empty() {
        tracing::warn!(src = %job.src.display(), "No endpoint URLs configured, skipping job");
        return None;
    }

    let outcome = iterate(ctx, job, checks).await;

    outcome.record(job);
    if ctx.emit_telemetry {
        println!("{}", outcome.telemetry_line(job));
    }
    tracing::debug!(src = %job.src.display(), code = outcome.code(), "Job iteration finished");
    Some(outcome)
}

async fn iterate(ctx: &AgentContext, job: &Job, checks: &[DocumentCheck]) -> JobOutcome {
    let template = file_hash(&job.src).await;
    let (document, hash) = match fetch_document(ctx, job, template.as_ref()).await {
        Some(Document::Fresh { value, hash }) => (value, hash),
        Some(Document::NotModified) => return JobOutcome::NoChange,
        None => return JobOutcome::Failed,
    };

    if let Err(e) = verify_document(checks, &document) {
        tracing::error!(src = %job.src.display(), error = %e, "Document rejected");
        return JobOutcome::Failed;
    }

    let artifact = match render_file(ctx.renderer.as_ref(), &job.src, &document).await {
        Ok(artifact) => artifact,
        Err(e) => {
            tracing::error!(error = %e, "Generating config failed");
            return JobOutcome::Failed;
        }
    };

    match reconcile(&job.dest, &job.staging, &artifact).await {
        Ok(Reconcile::Unchanged) => {
            ctx.remember(job, hash, template, &artifact.hash);
            return JobOutcome::NoChange;
        }
        Ok(Reconcile::Changed) => {}
        Err(e) => {
            tracing::error!(error = %e, "Writing config failed");
            return JobOutcome::FilesystemFailure;
        }
    }

    let committed = commit(
        &job.staging,
        &job.dest,
        job.check_cmd.as_deref(),
        job.reload_cmd.as_deref(),
        job.command_timeout,
    )
    .await;

    match committed {
        CommitOutcome::Committed => {
            ctx.remember(job, hash, template, &artifact.hash);
            JobOutcome::Committed
        }
        CommitOutcome::ReloadFailed(e) => {
            tracing::error!(dest = %job.dest.display(), error = %e, "Reload failed, new config stays in place");
            ctx.remember(job, hash, template, &artifact.hash);
            JobOutcome::ReloadFailed
        }
        CommitOutcome::ValidationFailed(e) => {
            tracing::error!(dest = %job.dest.display(), error = %e, "Validation failed, config not promoted");
            JobOutcome::Failed
        }
        CommitOutcome::PromotionFailed(e) => {
            tracing::error!(dest = %job.dest.display(), error = %e, "Promoting config failed");
            JobOutcome::FilesystemFailure
        }
    }
}

/// Fetch the job's document; `None` means the failure was already logged.
async fn fetch_document(ctx: &AgentContext, job: &Job, template: Option<&ContentHash>) -> Option<Document> {
    let mut request = FetchRequest::new(Method::GET, job.path.clone(), job.timeout)
        .credentials(job.credentials.clone())
        .encoding(job.encoding);
    request.headers = job.headers.clone();

    // A 204 skips rendering, so only ask for one while the destination is current.
    if let Some(hash) = ctx.echo_hash(job, template).await {
        request = request.header(HASH_HEADER, hash.as_str());
    }

    let response = match ctx.fetcher.fetch(&job.endpoints, &request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(path = %job.path, error = %e, "Fetching document failed");
            return None;
        }
    };

    match response.status {
        StatusCode::NO_CONTENT => Some(Document::NotModified),
        StatusCode::NOT_FOUND => {
            tracing::error!(url = %format!("{}{}", response.endpoint, job.path), "Key not found");
            if job.create {
                create_directory(ctx, job).await;
            }
            None
        }
        StatusCode::FORBIDDEN => {
            tracing::error!(url = %format!("{}{}", response.endpoint, job.path), "Access denied");
            None
        }
        status if status.is_success() => match serde_json::from_slice(&response.body) {
            Ok(value) => Some(Document::Fresh {
                value,
                hash: response.hash,
            }),
            Err(e) => {
                tracing::error!(path = %job.path, error = %e, "Document is not valid JSON");
                None
            }
        },
        status => {
            tracing::error!(path = %job.path, status = %status, "Unexpected response status");
            None
        }
    }
}

async fn create_directory(ctx: &AgentContext, job: &Job) {
    let request = FetchRequest::new(Method::PUT, job.path.clone(), job.timeout)
        .credentials(job.credentials.clone())
        .body(RequestBody::Form(vec![("dir".to_string(), "true".to_string())]));

    match ctx.fetcher.fetch(&job.endpoints, &request).await {
        Ok(response) if response.status.is_success() => {
            tracing::info!(path = %job.path, "Created missing directory");
        }
        Ok(response) => {
            tracing::warn!(path = %job.path, status = %response.status, "Directory creation rejected");
        }
        Err(e) => tracing::warn!(path = %job.path, error = %e, "Directory creation failed"),
    }
}

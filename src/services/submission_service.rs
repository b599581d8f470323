//! src/services/submission_service.rs
//!
//! SubmissionService — turns one client-submitted batch of parts into a
//! pull request against the upstream catalog repository, and backs the
//! small admin surface that reviews those pull requests.
//!
//! The submit pipeline is a linear chain of fallible steps: rate check,
//! body parse, bot gate, honeypot, directory listing, title scan,
//! validation, blob staging, then the ref-mutating commit window. The
//! whole batch is validated before any collaborator write, and the commit
//! window is wrapped with a compensating branch deletion.

use crate::models::submission::{SubmissionBatch, SubmitResponse};
use crate::services::catalog::{self, CategoryError, TitleRegistry};
use crate::services::rate_limit::RateLimiter;
use crate::services::repo_host::{
    PullRequestRef, PullRequestSummary, RepoHost, RepoHostError, TreeEntry,
};
use crate::services::turnstile::TurnstileVerifier;
use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Existing files sampled for duplicate-title detection. Bounded by the
/// upstream host's subrequest economics; a heuristic, not a global
/// uniqueness guarantee.
pub const TITLE_SCAN_LIMIT: usize = 40;

/// Submission failures, in pipeline order. Display strings are the exact
/// client-facing messages.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Rate limit exceeded. Please wait 60 seconds.")]
    RateLimited,
    #[error("Invalid JSON body.")]
    InvalidBody,
    #[error("Missing verification token.")]
    MissingChallengeToken,
    #[error("Bot verification failed.")]
    ChallengeRejected,
    #[error("No parts provided.")]
    EmptyBatch,
    #[error("Validation Error: {0}")]
    Validation(#[from] CategoryError),
    #[error("System Busy")]
    SystemBusy,
    #[error("{0}")]
    Internal(String),
}

/// Failures on the admin surface.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{message}")]
    Host { status: u16, message: String },
    #[error("{0}")]
    Internal(String),
}

impl From<RepoHostError> for AdminError {
    fn from(err: RepoHostError) -> Self {
        match err {
            RepoHostError::NotFound => AdminError::Host {
                status: 404,
                message: "Not Found".to_string(),
            },
            RepoHostError::Http { status, body } => AdminError::Host {
                status,
                message: host_message(&body),
            },
            other => AdminError::Internal(other.to_string()),
        }
    }
}

/// Pull the `message` field out of an upstream error body when there is
/// one; never expose raw error objects beyond that string.
fn host_message(body: &str) -> String {
    if let Some(message) = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
    {
        return message;
    }
    if body.is_empty() {
        "upstream host error".to_string()
    } else {
        body.to_string()
    }
}

fn internal(err: RepoHostError) -> SubmitError {
    SubmitError::Internal(err.to_string())
}

/// Core service, shared as router state. All collaborators are injected
/// so the pipeline runs unchanged against fakes in tests.
#[derive(Clone)]
pub struct SubmissionService {
    repo: Arc<dyn RepoHost>,
    limiter: RateLimiter,
    turnstile: Option<Arc<TurnstileVerifier>>,
    base_branch: String,
    parts_dir: String,
    admin_password: Option<String>,
}

impl SubmissionService {
    pub fn new(
        repo: Arc<dyn RepoHost>,
        limiter: RateLimiter,
        turnstile: Option<Arc<TurnstileVerifier>>,
        base_branch: impl Into<String>,
        parts_dir: impl Into<String>,
        admin_password: Option<String>,
    ) -> Self {
        Self {
            repo,
            limiter,
            turnstile,
            base_branch: base_branch.into(),
            parts_dir: parts_dir.into().trim_end_matches('/').to_string(),
            admin_password,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn admin_enabled(&self) -> bool {
        self.admin_password.is_some()
    }

    /// Run the full submission pipeline for one request body.
    ///
    /// `client_key` is the rate-limit bucket (client IP or "anonymous");
    /// `body` is the raw request payload, parsed here so malformed JSON is
    /// still subject to the rate check.
    pub async fn submit(
        &self,
        client_key: &str,
        body: &[u8],
    ) -> Result<SubmitResponse, SubmitError> {
        let now_ms = Utc::now().timestamp_millis();

        let allowed = self
            .limiter
            .check(client_key, now_ms)
            .await
            .map_err(|e| SubmitError::Internal(e.to_string()))?;
        if !allowed {
            return Err(SubmitError::RateLimited);
        }

        let batch: SubmissionBatch =
            serde_json::from_slice(body).map_err(|_| SubmitError::InvalidBody)?;

        if let Some(verifier) = &self.turnstile {
            let token = batch
                .turnstile_token
                .as_deref()
                .filter(|t| !t.is_empty())
                .ok_or(SubmitError::MissingChallengeToken)?;
            let passed = verifier
                .verify(token, client_key)
                .await
                .map_err(|e| SubmitError::Internal(e.to_string()))?;
            if !passed {
                return Err(SubmitError::ChallengeRejected);
            }
        }

        // Bots that fill the hidden field get a fake success, no further
        // action, and no rate-limit consumption.
        if batch.hp_field.as_deref().is_some_and(|v| !v.is_empty()) {
            info!(client = client_key, "honeypot tripped, deflecting submission");
            return Ok(SubmitResponse::deflected());
        }

        if batch.parts.is_empty() {
            return Err(SubmitError::EmptyBatch);
        }

        let files = self.list_part_files().await?;
        let mut titles = self.scan_existing_titles(&files).await;

        // Validate the whole batch before any collaborator write; a single
        // invalid part discards the batch, including its valid parts.
        for part in &batch.parts {
            catalog::validate_categories(&part.type_of_part)?;
        }

        let start_id = catalog::next_part_id(&files);
        let branch = format!("submission-{}", start_id);
        let mut next_id: u32 = start_id
            .parse()
            .map_err(|_| SubmitError::Internal(format!("allocated non-numeric id {start_id}")))?;

        // Stage one blob per part. Blobs are unreferenced until the commit
        // lands, so a failure here strands nothing visible.
        let mut parts = batch.parts;
        let mut entries = Vec::with_capacity(parts.len());
        let mut body_lines = Vec::with_capacity(parts.len());
        for part in &mut parts {
            part.title = titles.claim(&part.title);
            let file_name = catalog::part_file_name(&catalog::format_part_id(next_id));
            let record =
                serde_json::to_vec_pretty(&part).map_err(|e| SubmitError::Internal(e.to_string()))?;
            let blob_sha = self.repo.create_blob(&record).await.map_err(internal)?;
            entries.push(TreeEntry {
                path: format!("{}/{}", self.parts_dir, file_name),
                blob_sha,
            });
            body_lines.push(format!("- **{}** ({})", part.title, file_name));
            next_id += 1;
        }

        let pr = self
            .commit_and_open_pr(&branch, parts.len(), &entries, &body_lines)
            .await?;

        // The PR already exists at this point; a failed bookkeeping write
        // must not turn the response into an error.
        if let Err(err) = self.limiter.record(client_key, now_ms).await {
            warn!(client = client_key, error = %err, "failed to record rate-limit timestamp");
        }

        info!(pr = %pr.url, parts = parts.len(), branch = %branch, "submission accepted");
        Ok(SubmitResponse::accepted(pr.url))
    }

    /// List the parts directory on the base branch, keeping `.json` names.
    ///
    /// A missing directory is the valid first-submission-ever case; a
    /// forbidden or timed-out listing is the host telling us to back off.
    async fn list_part_files(&self) -> Result<Vec<String>, SubmitError> {
        match self
            .repo
            .list_directory(&self.parts_dir, &self.base_branch)
            .await
        {
            Ok(names) => Ok(names.into_iter().filter(|n| n.ends_with(".json")).collect()),
            Err(RepoHostError::NotFound) => Ok(Vec::new()),
            Err(RepoHostError::Forbidden | RepoHostError::Timeout) => Err(SubmitError::SystemBusy),
            Err(err) => Err(SubmitError::Internal(err.to_string())),
        }
    }

    /// Fetch a bounded sample of existing part files concurrently and seed
    /// the title registry with their titles. Per-file failures degrade
    /// dedup accuracy instead of failing the request.
    async fn scan_existing_titles(&self, files: &[String]) -> TitleRegistry {
        let sample: Vec<&String> = files.iter().take(TITLE_SCAN_LIMIT).collect();
        let fetches = sample.iter().map(|name| {
            let path = format!("{}/{}", self.parts_dir, name);
            let repo = Arc::clone(&self.repo);
            let branch = self.base_branch.clone();
            async move {
                let bytes = repo.read_file(&path, &branch).await?;
                let value: Value = serde_json::from_slice(&bytes)
                    .map_err(|e| RepoHostError::Decode(e.to_string()))?;
                Ok::<_, RepoHostError>(
                    value.get("title").and_then(Value::as_str).map(str::to_string),
                )
            }
        });

        let mut registry = TitleRegistry::new();
        for (name, result) in sample.iter().zip(join_all(fetches).await) {
            match result {
                Ok(Some(title)) => registry.seed(&title),
                Ok(None) => {}
                Err(err) => {
                    warn!(file = %name, error = %err, "skipping unreadable part during title scan");
                }
            }
        }
        registry
    }

    /// The ref-mutating window. Once the branch exists, any later failure
    /// triggers a best-effort branch deletion so orphans only survive a
    /// deletion that itself failed.
    async fn commit_and_open_pr(
        &self,
        branch: &str,
        part_count: usize,
        entries: &[TreeEntry],
        body_lines: &[String],
    ) -> Result<PullRequestRef, SubmitError> {
        let base_sha = self
            .repo
            .branch_head(&self.base_branch)
            .await
            .map_err(internal)?;
        self.repo
            .create_branch(branch, &base_sha)
            .await
            .map_err(internal)?;

        let result = self
            .finish_submission(branch, part_count, &base_sha, entries, body_lines)
            .await;
        if result.is_err() {
            if let Err(err) = self.repo.delete_branch(branch).await {
                warn!(branch, error = %err, "failed to delete branch after aborted submission");
            }
        }
        result
    }

    async fn finish_submission(
        &self,
        branch: &str,
        part_count: usize,
        base_sha: &str,
        entries: &[TreeEntry],
        body_lines: &[String],
    ) -> Result<PullRequestRef, SubmitError> {
        let tree_sha = self
            .repo
            .create_tree(base_sha, entries)
            .await
            .map_err(internal)?;
        let message = format!("feat: add {} new parts via submission", part_count);
        let commit_sha = self
            .repo
            .create_commit(&message, &tree_sha, base_sha)
            .await
            .map_err(internal)?;
        self.repo
            .update_branch(branch, &commit_sha)
            .await
            .map_err(internal)?;

        let title = format!("Submission: {} New Parts", part_count);
        let body = format!(
            "Automated submission via the parts catalog dashboard.\n\n{}",
            body_lines.join("\n")
        );
        self.repo
            .open_pull_request(&title, branch, &self.base_branch, &body)
            .await
            .map_err(internal)
    }

    /// Admin gate: exact match against the configured password, fail
    /// closed when none is configured.
    pub fn authorize_admin(&self, supplied: Option<&str>) -> Result<(), AdminError> {
        match (&self.admin_password, supplied) {
            (Some(expected), Some(given)) if !expected.is_empty() && expected == given => Ok(()),
            _ => Err(AdminError::Unauthorized),
        }
    }

    /// Open pull requests, newest first, bounded by the host page size.
    pub async fn list_open_prs(&self) -> Result<Vec<PullRequestSummary>, AdminError> {
        Ok(self.repo.list_pull_requests().await?)
    }

    /// Decode the part records a pull request adds under the parts
    /// directory, read at the PR head, each tagged with its filename.
    pub async fn pr_parts(&self, number: u64) -> Result<Vec<Value>, AdminError> {
        let pr = self.repo.pull_request(number).await?;
        let files = self.repo.pull_request_files(number).await?;
        let prefix = format!("{}/", self.parts_dir);

        let mut parts = Vec::new();
        for file in files {
            if !(file.filename.starts_with(&prefix) && file.filename.ends_with(".json")) {
                continue;
            }
            let bytes = self.repo.read_file(&file.filename, &pr.head_sha).await?;
            let mut value: Value = serde_json::from_slice(&bytes)
                .map_err(|e| AdminError::Internal(e.to_string()))?;
            if let Some(record) = value.as_object_mut() {
                record.insert(
                    "_filename".to_string(),
                    Value::String(file.filename.clone()),
                );
            }
            parts.push(value);
        }
        Ok(parts)
    }

    /// Squash-merge a reviewed pull request.
    pub async fn merge_pr(&self, number: u64) -> Result<(), AdminError> {
        self.repo.merge_pull_request(number).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_message_prefers_embedded_message_field() {
        assert_eq!(
            host_message(r#"{"message":"Pull Request is not mergeable"}"#),
            "Pull Request is not mergeable"
        );
        assert_eq!(host_message("plain text"), "plain text");
        assert_eq!(host_message(""), "upstream host error");
    }
}

#![allow(dead_code)]

//! Shared test harness: an in-memory fake of the upstream host plus a
//! helper that spawns the real router on an ephemeral port.
//!
//! The fake is a recording one, not an expectation mock — assertions are
//! about the Git state a submission leaves behind (branches, commits,
//! blobs, pull requests) and about which host operations ran at all.

use async_trait::async_trait;
use parts_gateway::routes::routes::routes;
use parts_gateway::services::rate_limit::{RateLimiter, SqliteRateLimitStore};
use parts_gateway::services::repo_host::{
    PullRequestFile, PullRequestRef, PullRequestSummary, RepoHost, RepoHostError, TreeEntry,
};
use parts_gateway::services::submission_service::SubmissionService;
use parts_gateway::services::turnstile::TurnstileVerifier;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const BASE_BRANCH: &str = "master";
pub const PARTS_DIR: &str = "src/data/parts";
pub const ADMIN_PASSWORD: &str = "hunter2";

const MUTATING_CALLS: [&str; 7] = [
    "create_blob",
    "create_branch",
    "create_tree",
    "create_commit",
    "update_branch",
    "open_pull_request",
    "merge_pull_request",
];

#[derive(Clone)]
struct FakeCommit {
    tree: String,
    parent: String,
    message: String,
}

#[derive(Clone)]
struct FakePr {
    number: u64,
    title: String,
    head_ref: String,
    head_sha: String,
    body: String,
    url: String,
}

#[derive(Default)]
struct FakeState {
    base_files: BTreeMap<String, Vec<u8>>,
    branches: HashMap<String, String>,
    blobs: HashMap<String, Vec<u8>>,
    trees: HashMap<String, Vec<TreeEntry>>,
    commits: HashMap<String, FakeCommit>,
    prs: Vec<FakePr>,
    merged: Vec<u64>,
    calls: Vec<&'static str>,
    unreadable: HashSet<String>,
    fail_list: Option<RepoHostError>,
    fail_create_tree: bool,
    fail_merge: Option<RepoHostError>,
    next_sha: u64,
}

impl FakeState {
    fn mint_sha(&mut self, kind: &str) -> String {
        self.next_sha += 1;
        format!("{}-{}", kind, self.next_sha)
    }
}

/// In-memory stand-in for the upstream GitHub repository.
pub struct FakeRepoHost {
    base_branch: String,
    state: Mutex<FakeState>,
}

impl FakeRepoHost {
    pub fn new() -> Arc<Self> {
        let mut state = FakeState::default();
        state
            .branches
            .insert(BASE_BRANCH.to_string(), "base-0".to_string());
        Arc::new(Self {
            base_branch: BASE_BRANCH.to_string(),
            state: Mutex::new(state),
        })
    }

    /// Seed a file on the base branch.
    pub fn seed_file(&self, path: &str, bytes: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .base_files
            .insert(path.to_string(), bytes);
    }

    /// Seed a part record with the given filename and title.
    pub fn seed_part(&self, file_name: &str, title: &str) {
        let record = json!({
            "title": title,
            "imageSrc": "https://img.example/existing.png",
            "platform": ["Onewheel"],
            "fabricationMethod": ["3D Printed"],
            "typeOfPart": ["Motor"],
        });
        self.seed_file(
            &format!("{}/{}", PARTS_DIR, file_name),
            serde_json::to_vec_pretty(&record).unwrap(),
        );
    }

    pub fn set_fail_list(&self, err: RepoHostError) {
        self.state.lock().unwrap().fail_list = Some(err);
    }

    pub fn set_fail_create_tree(&self) {
        self.state.lock().unwrap().fail_create_tree = true;
    }

    pub fn set_fail_merge(&self, err: RepoHostError) {
        self.state.lock().unwrap().fail_merge = Some(err);
    }

    pub fn set_unreadable(&self, path: &str) {
        self.state.lock().unwrap().unreadable.insert(path.to_string());
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<&'static str> {
        self.calls()
            .into_iter()
            .filter(|c| MUTATING_CALLS.contains(c))
            .collect()
    }

    pub fn branch_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().unwrap().branches.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn commit_count(&self) -> usize {
        self.state.lock().unwrap().commits.len()
    }

    pub fn pr_count(&self) -> usize {
        self.state.lock().unwrap().prs.len()
    }

    pub fn merged(&self) -> Vec<u64> {
        self.state.lock().unwrap().merged.clone()
    }

    pub fn pr_body(&self, number: u64) -> String {
        let state = self.state.lock().unwrap();
        state
            .prs
            .iter()
            .find(|pr| pr.number == number)
            .map(|pr| pr.body.clone())
            .expect("no such pr")
    }

    /// Files (path -> content) added by the most recent pull request.
    pub fn latest_pr_files(&self) -> BTreeMap<String, Vec<u8>> {
        let state = self.state.lock().unwrap();
        let pr = state.prs.last().expect("no pull request opened");
        let commit = state.commits.get(&pr.head_sha).expect("pr head not a commit");
        let entries = state.trees.get(&commit.tree).expect("commit tree missing");
        entries
            .iter()
            .map(|e| {
                (
                    e.path.clone(),
                    state.blobs.get(&e.blob_sha).expect("blob missing").clone(),
                )
            })
            .collect()
    }
}

#[async_trait]
impl RepoHost for FakeRepoHost {
    async fn branch_head(&self, branch: &str) -> Result<String, RepoHostError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("branch_head");
        state
            .branches
            .get(branch)
            .cloned()
            .ok_or(RepoHostError::NotFound)
    }

    async fn create_branch(&self, branch: &str, sha: &str) -> Result<(), RepoHostError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("create_branch");
        if state.branches.contains_key(branch) {
            return Err(RepoHostError::Http {
                status: 422,
                body: "Reference already exists".to_string(),
            });
        }
        state.branches.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn update_branch(&self, branch: &str, sha: &str) -> Result<(), RepoHostError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("update_branch");
        match state.branches.get_mut(branch) {
            Some(head) => {
                *head = sha.to_string();
                Ok(())
            }
            None => Err(RepoHostError::NotFound),
        }
    }

    async fn delete_branch(&self, branch: &str) -> Result<(), RepoHostError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("delete_branch");
        state
            .branches
            .remove(branch)
            .map(|_| ())
            .ok_or(RepoHostError::NotFound)
    }

    async fn list_directory(
        &self,
        path: &str,
        _reference: &str,
    ) -> Result<Vec<String>, RepoHostError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("list_directory");
        if let Some(err) = state.fail_list.clone() {
            return Err(err);
        }
        let prefix = format!("{}/", path);
        let names: Vec<String> = state
            .base_files
            .keys()
            .filter_map(|p| p.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            // GitHub reports a directory with no files as a missing path.
            return Err(RepoHostError::NotFound);
        }
        Ok(names)
    }

    async fn read_file(&self, path: &str, reference: &str) -> Result<Vec<u8>, RepoHostError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("read_file");
        if state.unreadable.contains(path) {
            return Err(RepoHostError::Http {
                status: 500,
                body: "read failure".to_string(),
            });
        }
        if reference == self.base_branch {
            return state
                .base_files
                .get(path)
                .cloned()
                .ok_or(RepoHostError::NotFound);
        }
        // Treat any other reference as a commit SHA.
        if let Some(commit) = state.commits.get(reference).cloned() {
            let entries = state.trees.get(&commit.tree).cloned().unwrap_or_default();
            if let Some(entry) = entries.iter().find(|e| e.path == path) {
                return state
                    .blobs
                    .get(&entry.blob_sha)
                    .cloned()
                    .ok_or(RepoHostError::NotFound);
            }
            return state
                .base_files
                .get(path)
                .cloned()
                .ok_or(RepoHostError::NotFound);
        }
        Err(RepoHostError::NotFound)
    }

    async fn create_blob(&self, content: &[u8]) -> Result<String, RepoHostError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("create_blob");
        let sha = state.mint_sha("blob");
        state.blobs.insert(sha.clone(), content.to_vec());
        Ok(sha)
    }

    async fn create_tree(
        &self,
        _base_sha: &str,
        entries: &[TreeEntry],
    ) -> Result<String, RepoHostError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("create_tree");
        if state.fail_create_tree {
            return Err(RepoHostError::Http {
                status: 500,
                body: "tree failure".to_string(),
            });
        }
        let sha = state.mint_sha("tree");
        state.trees.insert(sha.clone(), entries.to_vec());
        Ok(sha)
    }

    async fn create_commit(
        &self,
        message: &str,
        tree_sha: &str,
        parent_sha: &str,
    ) -> Result<String, RepoHostError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("create_commit");
        let sha = state.mint_sha("commit");
        state.commits.insert(
            sha.clone(),
            FakeCommit {
                tree: tree_sha.to_string(),
                parent: parent_sha.to_string(),
                message: message.to_string(),
            },
        );
        Ok(sha)
    }

    async fn open_pull_request(
        &self,
        title: &str,
        head: &str,
        base: &str,
        body: &str,
    ) -> Result<PullRequestRef, RepoHostError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("open_pull_request");
        assert_eq!(base, self.base_branch);
        let head_sha = state
            .branches
            .get(head)
            .cloned()
            .ok_or(RepoHostError::NotFound)?;
        let number = state.prs.len() as u64 + 1;
        let url = format!("https://example.test/pr/{}", number);
        state.prs.push(FakePr {
            number,
            title: title.to_string(),
            head_ref: head.to_string(),
            head_sha,
            body: body.to_string(),
            url: url.clone(),
        });
        Ok(PullRequestRef { number, url })
    }

    async fn list_pull_requests(&self) -> Result<Vec<PullRequestSummary>, RepoHostError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("list_pull_requests");
        let mut summaries: Vec<PullRequestSummary> = state
            .prs
            .iter()
            .map(|pr| PullRequestSummary {
                number: pr.number,
                title: pr.title.clone(),
                author: "tester".to_string(),
                url: pr.url.clone(),
                created_at: "2026-01-01T00:00:00Z".to_string(),
                body: Some(pr.body.clone()),
                head_ref: pr.head_ref.clone(),
                head_sha: pr.head_sha.clone(),
            })
            .collect();
        summaries.reverse();
        Ok(summaries)
    }

    async fn pull_request(&self, number: u64) -> Result<PullRequestSummary, RepoHostError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("pull_request");
        state
            .prs
            .iter()
            .find(|pr| pr.number == number)
            .map(|pr| PullRequestSummary {
                number: pr.number,
                title: pr.title.clone(),
                author: "tester".to_string(),
                url: pr.url.clone(),
                created_at: "2026-01-01T00:00:00Z".to_string(),
                body: Some(pr.body.clone()),
                head_ref: pr.head_ref.clone(),
                head_sha: pr.head_sha.clone(),
            })
            .ok_or(RepoHostError::NotFound)
    }

    async fn pull_request_files(
        &self,
        number: u64,
    ) -> Result<Vec<PullRequestFile>, RepoHostError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("pull_request_files");
        let pr = state
            .prs
            .iter()
            .find(|pr| pr.number == number)
            .cloned()
            .ok_or(RepoHostError::NotFound)?;
        let commit = state
            .commits
            .get(&pr.head_sha)
            .cloned()
            .ok_or(RepoHostError::NotFound)?;
        let entries = state.trees.get(&commit.tree).cloned().unwrap_or_default();
        Ok(entries
            .into_iter()
            .map(|e| PullRequestFile { filename: e.path })
            .collect())
    }

    async fn merge_pull_request(&self, number: u64) -> Result<(), RepoHostError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("merge_pull_request");
        if let Some(err) = state.fail_merge.clone() {
            return Err(err);
        }
        if !state.prs.iter().any(|pr| pr.number == number) {
            return Err(RepoHostError::NotFound);
        }
        state.merged.push(number);
        Ok(())
    }
}

/// A spawned gateway wired to a fake host and an in-memory SQLite
/// rate-limit store.
pub struct TestApp {
    pub addr: String,
    pub repo: Arc<FakeRepoHost>,
    pub limiter: RateLimiter,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }
}

pub async fn spawn_app(
    repo: Arc<FakeRepoHost>,
    admin_password: Option<&str>,
    turnstile: Option<TurnstileVerifier>,
) -> TestApp {
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap(),
    );
    sqlx::query(
        "CREATE TABLE rate_limits (client_key TEXT PRIMARY KEY, last_submission_ms TEXT NOT NULL)",
    )
    .execute(&*db)
    .await
    .unwrap();

    let limiter = RateLimiter::new(Arc::new(SqliteRateLimitStore::new(db)));
    let service = SubmissionService::new(
        repo.clone(),
        limiter.clone(),
        turnstile.map(Arc::new),
        BASE_BRANCH,
        PARTS_DIR,
        admin_password.map(String::from),
    );
    let admin_enabled = service.admin_enabled();
    let router = routes(admin_enabled).with_state(service);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        addr,
        repo,
        limiter,
        client: reqwest::Client::new(),
    }
}

/// A minimal valid part payload.
pub fn part(title: &str, categories: &[&str]) -> serde_json::Value {
    json!({
        "title": title,
        "imageSrc": "https://img.example/part.png",
        "platform": ["Onewheel"],
        "fabricationMethod": ["3D Printed"],
        "typeOfPart": categories,
    })
}

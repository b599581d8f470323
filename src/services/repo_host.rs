//! src/services/repo_host.rs
//!
//! The version-control collaborator. `RepoHost` is the narrow seam the
//! orchestrator depends on; `GithubClient` implements it over the GitHub
//! REST v3 API. Tests substitute an in-memory fake behind the same trait.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const GITHUB_API_VERSION: &str = "2022-11-28";
const PR_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, Error)]
pub enum RepoHostError {
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("timeout")]
    Timeout,
    #[error("invalid token")]
    InvalidToken,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network error: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// One new file staged for the submission tree.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub path: String,
    pub blob_sha: String,
}

/// Handle for a freshly opened pull request.
#[derive(Debug, Clone)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
}

/// Pull-request view served to the admin dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct PullRequestSummary {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub url: String,
    pub created_at: String,
    pub body: Option<String>,
    pub head_ref: String,
    pub head_sha: String,
}

/// A file touched by a pull request.
#[derive(Debug, Clone)]
pub struct PullRequestFile {
    pub filename: String,
}

/// Operations the submission pipeline and admin surface need from the
/// upstream host. Object-safe so the orchestrator can hold `Arc<dyn RepoHost>`.
#[async_trait]
pub trait RepoHost: Send + Sync {
    async fn branch_head(&self, branch: &str) -> Result<String, RepoHostError>;
    async fn create_branch(&self, branch: &str, sha: &str) -> Result<(), RepoHostError>;
    async fn update_branch(&self, branch: &str, sha: &str) -> Result<(), RepoHostError>;
    async fn delete_branch(&self, branch: &str) -> Result<(), RepoHostError>;
    async fn list_directory(&self, path: &str, reference: &str)
    -> Result<Vec<String>, RepoHostError>;
    async fn read_file(&self, path: &str, reference: &str) -> Result<Vec<u8>, RepoHostError>;
    async fn create_blob(&self, content: &[u8]) -> Result<String, RepoHostError>;
    async fn create_tree(
        &self,
        base_sha: &str,
        entries: &[TreeEntry],
    ) -> Result<String, RepoHostError>;
    async fn create_commit(
        &self,
        message: &str,
        tree_sha: &str,
        parent_sha: &str,
    ) -> Result<String, RepoHostError>;
    async fn open_pull_request(
        &self,
        title: &str,
        head: &str,
        base: &str,
        body: &str,
    ) -> Result<PullRequestRef, RepoHostError>;
    async fn list_pull_requests(&self) -> Result<Vec<PullRequestSummary>, RepoHostError>;
    async fn pull_request(&self, number: u64) -> Result<PullRequestSummary, RepoHostError>;
    async fn pull_request_files(&self, number: u64)
    -> Result<Vec<PullRequestFile>, RepoHostError>;
    async fn merge_pull_request(&self, number: u64) -> Result<(), RepoHostError>;
}

/// GitHub REST v3 client for a single upstream repository.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: Client,
    api_root: String,
    owner: String,
    repo: String,
    token: String,
}

impl GithubClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(
        api_root: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, RepoHostError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("parts-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RepoHostError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_root: api_root.into().trim_end_matches('/').to_string(),
            owner: owner.into(),
            repo: repo.into(),
            token: token.into(),
        })
    }

    fn repo_url(&self, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_root, self.owner, self.repo, tail
        )
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("accept", "application/vnd.github+json")
            .header("x-github-api-version", GITHUB_API_VERSION)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, RepoHostError> {
        builder.send().await.map_err(map_reqwest_error)
    }
}

#[async_trait]
impl RepoHost for GithubClient {
    async fn branch_head(&self, branch: &str) -> Result<String, RepoHostError> {
        let url = self.repo_url(&format!("git/ref/heads/{}", branch));
        let res = self.send(self.request(Method::GET, url)).await?;
        let reference: RefWire = read_json(res).await?;
        Ok(reference.object.sha)
    }

    async fn create_branch(&self, branch: &str, sha: &str) -> Result<(), RepoHostError> {
        let url = self.repo_url("git/refs");
        let body = json!({ "ref": format!("refs/heads/{}", branch), "sha": sha });
        let res = self.send(self.request(Method::POST, url).json(&body)).await?;
        read_unit(res).await
    }

    async fn update_branch(&self, branch: &str, sha: &str) -> Result<(), RepoHostError> {
        let url = self.repo_url(&format!("git/refs/heads/{}", branch));
        let body = json!({ "sha": sha, "force": false });
        let res = self
            .send(self.request(Method::PATCH, url).json(&body))
            .await?;
        read_unit(res).await
    }

    async fn delete_branch(&self, branch: &str) -> Result<(), RepoHostError> {
        let url = self.repo_url(&format!("git/refs/heads/{}", branch));
        let res = self.send(self.request(Method::DELETE, url)).await?;
        read_unit(res).await
    }

    async fn list_directory(
        &self,
        path: &str,
        reference: &str,
    ) -> Result<Vec<String>, RepoHostError> {
        let url = self.repo_url(&format!("contents/{}", path));
        let res = self
            .send(self.request(Method::GET, url).query(&[("ref", reference)]))
            .await?;
        let entries: Vec<ContentEntryWire> = read_json(res).await?;
        Ok(entries.into_iter().map(|e| e.name).collect())
    }

    async fn read_file(&self, path: &str, reference: &str) -> Result<Vec<u8>, RepoHostError> {
        let url = self.repo_url(&format!("contents/{}", path));
        let res = self
            .send(self.request(Method::GET, url).query(&[("ref", reference)]))
            .await?;
        let file: ContentFileWire = read_json(res).await?;
        decode_content(&file.content)
    }

    async fn create_blob(&self, content: &[u8]) -> Result<String, RepoHostError> {
        let url = self.repo_url("git/blobs");
        let body = json!({
            "content": general_purpose::STANDARD.encode(content),
            "encoding": "base64",
        });
        let res = self.send(self.request(Method::POST, url).json(&body)).await?;
        let blob: ShaWire = read_json(res).await?;
        Ok(blob.sha)
    }

    async fn create_tree(
        &self,
        base_sha: &str,
        entries: &[TreeEntry],
    ) -> Result<String, RepoHostError> {
        let url = self.repo_url("git/trees");
        let tree: Vec<_> = entries
            .iter()
            .map(|entry| {
                json!({
                    "path": entry.path,
                    "mode": "100644",
                    "type": "blob",
                    "sha": entry.blob_sha,
                })
            })
            .collect();
        let body = json!({ "base_tree": base_sha, "tree": tree });
        let res = self.send(self.request(Method::POST, url).json(&body)).await?;
        let created: ShaWire = read_json(res).await?;
        Ok(created.sha)
    }

    async fn create_commit(
        &self,
        message: &str,
        tree_sha: &str,
        parent_sha: &str,
    ) -> Result<String, RepoHostError> {
        let url = self.repo_url("git/commits");
        let body = json!({
            "message": message,
            "tree": tree_sha,
            "parents": [parent_sha],
        });
        let res = self.send(self.request(Method::POST, url).json(&body)).await?;
        let commit: ShaWire = read_json(res).await?;
        Ok(commit.sha)
    }

    async fn open_pull_request(
        &self,
        title: &str,
        head: &str,
        base: &str,
        body: &str,
    ) -> Result<PullRequestRef, RepoHostError> {
        let url = self.repo_url("pulls");
        let payload = json!({ "title": title, "head": head, "base": base, "body": body });
        let res = self
            .send(self.request(Method::POST, url).json(&payload))
            .await?;
        let pr: PullWire = read_json(res).await?;
        Ok(PullRequestRef {
            number: pr.number,
            url: pr.html_url,
        })
    }

    async fn list_pull_requests(&self) -> Result<Vec<PullRequestSummary>, RepoHostError> {
        let url = self.repo_url("pulls");
        let per_page = PR_PAGE_SIZE.to_string();
        let res = self
            .send(self.request(Method::GET, url).query(&[
                ("state", "open"),
                ("sort", "created"),
                ("direction", "desc"),
                ("per_page", per_page.as_str()),
            ]))
            .await?;
        let prs: Vec<PullWire> = read_json(res).await?;
        Ok(prs.into_iter().map(PullWire::into_summary).collect())
    }

    async fn pull_request(&self, number: u64) -> Result<PullRequestSummary, RepoHostError> {
        let url = self.repo_url(&format!("pulls/{}", number));
        let res = self.send(self.request(Method::GET, url)).await?;
        let pr: PullWire = read_json(res).await?;
        Ok(pr.into_summary())
    }

    async fn pull_request_files(
        &self,
        number: u64,
    ) -> Result<Vec<PullRequestFile>, RepoHostError> {
        let url = self.repo_url(&format!("pulls/{}/files", number));
        let res = self.send(self.request(Method::GET, url)).await?;
        let files: Vec<PullFileWire> = read_json(res).await?;
        Ok(files
            .into_iter()
            .map(|f| PullRequestFile {
                filename: f.filename,
            })
            .collect())
    }

    async fn merge_pull_request(&self, number: u64) -> Result<(), RepoHostError> {
        let url = self.repo_url(&format!("pulls/{}/merge", number));
        let body = json!({
            "merge_method": "squash",
            "commit_title": format!("Merge PR #{} (Admin Approved)", number),
            "commit_message": "Merged via the parts catalog admin dashboard.",
        });
        let res = self.send(self.request(Method::PUT, url).json(&body)).await?;
        let merge: MergeWire = read_json(res).await?;
        if merge.merged {
            Ok(())
        } else {
            // 2xx with merged=false should not happen, but do not report it
            // as a successful merge.
            Err(RepoHostError::Http {
                status: 500,
                body: merge
                    .message
                    .unwrap_or_else(|| "merge rejected by host".to_string()),
            })
        }
    }
}

fn map_reqwest_error(err: reqwest::Error) -> RepoHostError {
    if err.is_timeout() {
        RepoHostError::Timeout
    } else {
        RepoHostError::Transport(err.to_string())
    }
}

fn status_error(status: StatusCode, body: String) -> RepoHostError {
    match status {
        StatusCode::NOT_FOUND => RepoHostError::NotFound,
        StatusCode::UNAUTHORIZED => RepoHostError::InvalidToken,
        StatusCode::FORBIDDEN => RepoHostError::Forbidden,
        StatusCode::GATEWAY_TIMEOUT => RepoHostError::Timeout,
        s => RepoHostError::Http {
            status: s.as_u16(),
            body,
        },
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(res: Response) -> Result<T, RepoHostError> {
    let status = res.status();
    if status.is_success() {
        res.json::<T>()
            .await
            .map_err(|e| RepoHostError::Decode(e.to_string()))
    } else {
        let body = res.text().await.unwrap_or_default();
        Err(status_error(status, body))
    }
}

async fn read_unit(res: Response) -> Result<(), RepoHostError> {
    let status = res.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = res.text().await.unwrap_or_default();
        Err(status_error(status, body))
    }
}

/// Content payloads arrive base64 encoded with embedded newlines.
fn decode_content(content: &str) -> Result<Vec<u8>, RepoHostError> {
    let compact: String = content.split_whitespace().collect();
    general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| RepoHostError::Decode(e.to_string()))
}

#[derive(Deserialize)]
struct RefWire {
    object: RefTargetWire,
}

#[derive(Deserialize)]
struct RefTargetWire {
    sha: String,
}

#[derive(Deserialize)]
struct ContentEntryWire {
    name: String,
}

#[derive(Deserialize)]
struct ContentFileWire {
    content: String,
}

#[derive(Deserialize)]
struct ShaWire {
    sha: String,
}

#[derive(Deserialize)]
struct UserWire {
    login: String,
}

#[derive(Deserialize)]
struct HeadWire {
    #[serde(rename = "ref")]
    head_ref: String,
    sha: String,
}

#[derive(Deserialize)]
struct PullWire {
    number: u64,
    title: String,
    html_url: String,
    created_at: String,
    body: Option<String>,
    user: Option<UserWire>,
    head: HeadWire,
}

impl PullWire {
    fn into_summary(self) -> PullRequestSummary {
        PullRequestSummary {
            number: self.number,
            title: self.title,
            author: self
                .user
                .map(|u| u.login)
                .unwrap_or_else(|| "Unknown".to_string()),
            url: self.html_url,
            created_at: self.created_at,
            body: self.body,
            head_ref: self.head.head_ref,
            head_sha: self.head.sha,
        }
    }
}

#[derive(Deserialize)]
struct PullFileWire {
    filename: String,
}

#[derive(Deserialize)]
struct MergeWire {
    merged: bool,
    message: Option<String>,
}

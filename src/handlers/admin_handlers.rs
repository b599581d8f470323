//! HTTP handlers for the admin PR dashboard.
//!
//! Every route requires the `x-admin-password` header; the check fails
//! closed when no password is configured (and the routes are not mounted
//! at all in that case).

use crate::{
    errors::AppError,
    services::{repo_host::PullRequestSummary, submission_service::SubmissionService},
};
use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use serde_json::{Value, json};

fn supplied_password(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-admin-password").and_then(|v| v.to_str().ok())
}

/// `GET /api/admin/prs` — open pull requests, newest first.
pub async fn list_prs(
    State(service): State<SubmissionService>,
    headers: HeaderMap,
) -> Result<Json<Vec<PullRequestSummary>>, AppError> {
    service.authorize_admin(supplied_password(&headers))?;
    Ok(Json(service.list_open_prs().await?))
}

/// `GET /api/admin/prs/{number}` — decoded part records in a PR.
pub async fn pr_details(
    State(service): State<SubmissionService>,
    Path(number): Path<u64>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    service.authorize_admin(supplied_password(&headers))?;
    let parts = service.pr_parts(number).await?;
    Ok(Json(json!({ "parts": parts })))
}

/// `POST /api/admin/prs/{number}/merge` — squash-merge an approved PR.
pub async fn merge_pr(
    State(service): State<SubmissionService>,
    Path(number): Path<u64>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    service.authorize_admin(supplied_password(&headers))?;
    service.merge_pr(number).await?;
    Ok(Json(json!({ "success": true })))
}

//! Defines routes for the submission pipeline and admin surface.
//!
//! ## Structure
//! - **Public endpoints**
//!   - `POST /api/submit` — submit a batch of parts, opens a pull request
//!   - `GET  /healthz`    — liveness
//!   - `GET  /readyz`     — readiness (rate-limit store)
//!
//! - **Admin endpoints** (mounted only when an admin password is configured;
//!   each requires the `x-admin-password` header)
//!   - `GET  /api/admin/prs`                — list open pull requests
//!   - `GET  /api/admin/prs/{number}`       — decoded part records in a PR
//!   - `POST /api/admin/prs/{number}/merge` — squash-merge a PR

use crate::{
    handlers::{
        admin_handlers::{list_prs, merge_pr, pr_details},
        health_handlers::{healthz, readyz},
        submit_handlers::submit,
    },
    services::submission_service::SubmissionService,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build and return the router for the gateway.
///
/// The router carries shared state (`SubmissionService`) to all handlers.
/// Admin routes are left unmounted when `admin_enabled` is false so the
/// password gate cannot default-open.
pub fn routes(admin_enabled: bool) -> Router<SubmissionService> {
    let mut router = Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // the submission pipeline
        .route("/api/submit", post(submit));

    if admin_enabled {
        router = router
            .route("/api/admin/prs", get(list_prs))
            .route("/api/admin/prs/{number}", get(pr_details))
            .route("/api/admin/prs/{number}/merge", post(merge_pr));
    }

    router
}

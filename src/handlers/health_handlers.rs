//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the rate-limit store
//!
//! The upstream host is deliberately not probed here: readiness covers
//! local dependencies only, and API-quota calls per probe would be waste.

use crate::services::submission_service::SubmissionService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON
/// body. This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Runs a lightweight query against the rate-limit store (`SELECT 1`).
/// Returns JSON describing the check: HTTP 200 when it passes, HTTP 503
/// when it fails.
pub async fn readyz(State(service): State<SubmissionService>) -> impl IntoResponse {
    let store_check = match service.limiter().store().ping().await {
        Ok(()) => (true, None::<String>),
        Err(e) => (false, Some(format!("error: {}", e))),
    };

    let store_ok = store_check.0;
    let mut checks = HashMap::new();
    checks.insert(
        "rate_limit_store",
        CheckStatus {
            ok: store_ok,
            error: store_check.1,
        },
    );

    let body = ReadyResponse {
        status: if store_ok { "ok".into() } else { "error".into() },
        checks,
    };

    let status = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

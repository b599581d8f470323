//! HTTP handler for the public submission endpoint.
//!
//! Takes the body as raw bytes so JSON parsing happens inside the
//! pipeline, behind the rate check. All the actual work lives in
//! `SubmissionService`.

use crate::{errors::AppError, services::submission_service::SubmissionService};
use axum::{Json, extract::State, http::HeaderMap, response::IntoResponse};
use bytes::Bytes;
use tracing::Instrument;
use uuid::Uuid;

/// `POST /api/submit`
pub async fn submit(
    State(service): State<SubmissionService>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let client_key = client_key(&headers);
    let span = tracing::info_span!(
        "submit",
        submission_id = %Uuid::new_v4(),
        client = %client_key
    );
    let response = service.submit(&client_key, &body).instrument(span).await?;
    Ok(Json(response))
}

/// Rate-limit key for the request: the proxy-reported client IP, or the
/// shared "anonymous" bucket when no header identifies the client.
fn client_key(headers: &HeaderMap) -> String {
    if let Some(ip) = header_str(headers, "cf-connecting-ip") {
        return ip.to_string();
    }
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }
    "anonymous".to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

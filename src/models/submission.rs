//! Request and response envelopes for the submit endpoint.

use crate::models::part::PartSubmission;
use serde::{Deserialize, Serialize};

/// Body of `POST /api/submit`. A missing `parts` key is treated the same
/// as an empty batch. Unknown extra keys are dropped.
#[derive(Deserialize, Debug)]
pub struct SubmissionBatch {
    #[serde(default)]
    pub parts: Vec<PartSubmission>,

    /// Honeypot field; legitimate clients never fill it in.
    #[serde(default)]
    pub hp_field: Option<String>,

    /// Bot-challenge proof, required when verification is enforced.
    #[serde(default)]
    pub turnstile_token: Option<String>,
}

/// Success envelope. A deflected (honeypot) submission carries no PR URL
/// and must be indistinguishable from a genuine success to the caller.
#[derive(Serialize, Debug)]
pub struct SubmitResponse {
    pub success: bool,

    #[serde(rename = "prUrl", skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
}

impl SubmitResponse {
    pub fn accepted(pr_url: String) -> Self {
        Self {
            success: true,
            pr_url: Some(pr_url),
        }
    }

    pub fn deflected() -> Self {
        Self {
            success: true,
            pr_url: None,
        }
    }
}

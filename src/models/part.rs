//! Represents a single CAD part in the catalog.

use serde::{Deserialize, Serialize};

/// One user-submitted part, persisted verbatim (after title-suffix
/// resolution) as `part-{ID}.json` in the upstream repository.
///
/// The camelCase field names are a cross-system contract: the static-site
/// build reads the same documents. Optional fields are omitted entirely
/// when absent so persisted records stay free of nulls.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PartSubmission {
    /// Display title. May be rewritten by dedup suffixing before persisting.
    pub title: String,

    /// Preview image URL.
    pub image_src: String,

    /// Manufacturer / brand labels.
    pub platform: Vec<String>,

    /// How the part is produced (printed, CNC, ...).
    pub fabrication_method: Vec<String>,

    /// Categories; one entry, or two where one is "OEM".
    pub type_of_part: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropbox_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropbox_zip_last_updated: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_oem: Option<bool>,
}

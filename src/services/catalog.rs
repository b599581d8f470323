//! src/services/catalog.rs
//!
//! Pure catalog rules: sequential part-ID allocation, category validation,
//! and duplicate-title suffixing. Nothing here touches the network — the
//! orchestrator feeds these helpers snapshots it fetched from the upstream
//! repository.

use std::collections::HashSet;
use thiserror::Error;

/// Width of the zero-padded numeric part of a part ID.
const ID_WIDTH: usize = 4;

/// Category rule violations. The display strings are part of the API
/// contract: clients match on "required", "Maximum", and "OEM".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategoryError {
    #[error("At least one category is required.")]
    Missing,
    #[error("Maximum of 2 categories allowed.")]
    TooMany,
    #[error("Secondary category must be 'OEM'.")]
    MissingOem,
}

/// Validate the category list for a single part.
///
/// A part carries one category, or two where one of them is "OEM"
/// (case-insensitive). Anything else is rejected.
pub fn validate_categories(categories: &[String]) -> Result<(), CategoryError> {
    if categories.is_empty() {
        return Err(CategoryError::Missing);
    }
    if categories.len() > 2 {
        return Err(CategoryError::TooMany);
    }
    if categories.len() == 2 && !categories.iter().any(|c| c.eq_ignore_ascii_case("OEM")) {
        return Err(CategoryError::MissingOem);
    }
    Ok(())
}

/// Extract the numeric ID from a filename of the exact form
/// `part-NNNN.json` (four ASCII digits). Anything else yields None.
fn parse_part_id(filename: &str) -> Option<u32> {
    let digits = filename.strip_prefix("part-")?.strip_suffix(".json")?;
    if digits.len() != ID_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Render a numeric ID as the zero-padded string used in filenames.
///
/// Widens past 9999 instead of capping; the listing matcher only accepts
/// exactly four digits, so widened IDs never feed later allocations.
pub fn format_part_id(id: u32) -> String {
    format!("{:04}", id)
}

/// Compute the next sequential part ID from a directory listing.
///
/// Non-matching filenames are ignored; an empty (or all non-matching)
/// listing starts the sequence at "0001".
pub fn next_part_id(filenames: &[String]) -> String {
    let max_id = filenames
        .iter()
        .filter_map(|name| parse_part_id(name))
        .max()
        .unwrap_or(0);
    format_part_id(max_id + 1)
}

/// Render the filename for a part ID. The `part-{ID}.json` shape is a
/// cross-system contract consumed by the static-site build, not an
/// internal detail.
pub fn part_file_name(id: &str) -> String {
    format!("part-{}.json", id)
}

/// Collision key for titles: lowercased, whitespace and hyphens stripped,
/// so "Motor-Mount" and "motormount" collide.
fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

/// Tracks claimed titles (normalized) and resolves collisions by
/// suffixing " (2)", " (3)", … until the candidate is free.
///
/// Seeded with a bounded snapshot of existing catalog titles; claims made
/// for earlier parts in a batch are visible to later ones, so the first
/// part in array order wins the unsuffixed name.
#[derive(Debug, Default)]
pub struct TitleRegistry {
    taken: HashSet<String>,
}

impl TitleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an existing title without renaming it.
    pub fn seed(&mut self, title: &str) {
        self.taken.insert(normalize_title(title));
    }

    /// Resolve a candidate title to one that collides with nothing seen so
    /// far, record it, and return it.
    pub fn claim(&mut self, title: &str) -> String {
        let mut candidate = title.to_string();
        let mut suffix = 2u32;
        while self.taken.contains(&normalize_title(&candidate)) {
            candidate = format!("{} ({})", title, suffix);
            suffix += 1;
        }
        self.taken.insert(normalize_title(&candidate));
        candidate
    }
}

//! parts-gateway — server-side API of a CAD-part catalog site.
//!
//! Turns user-submitted batches of parts into pull requests against the
//! upstream catalog repository: sequential ID assignment, category
//! validation, duplicate-title suffixing, per-client rate limiting, bot
//! deflection, and a small admin surface for reviewing the resulting PRs.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

pub mod catalog;
pub mod rate_limit;
pub mod repo_host;
pub mod submission_service;
pub mod turnstile;

//! Plain data records passed between the lifecycle stages
//!
//! Nothing in here knows how records are stored. The `db` module maps them onto SQLite rows.

/// Local status of a submission and of an export record
pub mod state;
pub mod sequencing;
pub mod template;
pub mod submission;
/// Results of a completed submission
pub mod analysis;
pub mod export;

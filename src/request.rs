//! New sequencing data arrives as JSON messages dropped into a directory

/// Validate and parse a single message
pub mod message;
/// List message files in a directory
pub mod read;
/// Bundled message schema
pub mod schema;
/// Store message contents and launch automated pipelines
pub mod ingest;

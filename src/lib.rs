//! Automated launching and tracking of genomic analysis pipelines
//!
//! New sequencing data is matched against the analysis templates of every project containing its
//! sample ([automation]). Each runnable template becomes a submission ([submission]) that the
//! [execution] orchestrator drives through a remote execution manager ([galaxy]). Finished
//! results are attached back to the sequencing data ([reconcile]), and finished data sets can be
//! queued for upload to a public archive ([export]).

use std::path::PathBuf;

pub mod automation;
pub mod db;
pub mod error;
pub mod execution;
pub mod export;
pub mod galaxy;
pub mod model;
pub mod reconcile;
pub mod request;
pub mod schedule;
pub mod submission;
pub mod workflow;

/// Directory holding the database and other local state
#[derive(Debug, Clone)]
pub struct WorkingDirectory {
    pub path: PathBuf,
}

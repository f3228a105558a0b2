use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::state::ExportUploadState;

pub type ExportId = i64;

/// One sample's files in an archive export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSample {
    pub sample_name: String,
    pub library_name: String,
    pub files: Vec<PathBuf>,
}

/// A set of results queued for upload to the public sequence archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NcbiExportSubmission {
    pub id: ExportId,
    pub bio_project: String,
    pub namespace: String,
    pub submitter: String,
    pub samples: Vec<ExportSample>,
    pub upload_state: ExportUploadState,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewExport {
    pub bio_project: String,
    pub namespace: String,
    pub submitter: String,
    pub samples: Vec<ExportSample>,
}

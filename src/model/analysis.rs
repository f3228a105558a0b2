use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file produced by a remote run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOutputFile {
    path: PathBuf,
    label: String,
    execution_manager_file_id: String,
}

impl AnalysisOutputFile {
    pub fn new(path: PathBuf, label: String, execution_manager_file_id: String) -> Self {
        AnalysisOutputFile { path, label, execution_manager_file_id }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn execution_manager_file_id(&self) -> &str {
        &self.execution_manager_file_id
    }
}

/// Results of a completed submission.
///
/// Built exactly once when the submission finishes and never changed afterwards, so there are
/// no setters. Storage refuses a second analysis for the same submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    created_date: DateTime<Utc>,
    description: Option<String>,
    execution_manager_analysis_id: String,
    additional_properties: BTreeMap<String, String>,
    output_files: BTreeMap<String, AnalysisOutputFile>,
}

impl Analysis {
    pub fn new(execution_manager_analysis_id: String, output_files: BTreeMap<String, AnalysisOutputFile>) -> Self {
        Analysis::with_details(execution_manager_analysis_id, output_files, None, BTreeMap::new())
    }

    pub fn with_details(
        execution_manager_analysis_id: String,
        output_files: BTreeMap<String, AnalysisOutputFile>,
        description: Option<String>,
        additional_properties: BTreeMap<String, String>,
    ) -> Self {
        Analysis {
            created_date: Utc::now(),
            description,
            execution_manager_analysis_id,
            additional_properties,
            output_files,
        }
    }

    /// Rebuild a stored analysis, keeping its original creation time
    pub(crate) fn restore(
        created_date: DateTime<Utc>,
        execution_manager_analysis_id: String,
        output_files: BTreeMap<String, AnalysisOutputFile>,
        description: Option<String>,
        additional_properties: BTreeMap<String, String>,
    ) -> Self {
        Analysis {
            created_date,
            description,
            execution_manager_analysis_id,
            additional_properties,
            output_files,
        }
    }

    pub fn created_date(&self) -> DateTime<Utc> {
        self.created_date
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn execution_manager_analysis_id(&self) -> &str {
        &self.execution_manager_analysis_id
    }

    pub fn label(&self) -> &str {
        &self.execution_manager_analysis_id
    }

    pub fn additional_properties(&self) -> &BTreeMap<String, String> {
        &self.additional_properties
    }

    pub fn output_file(&self, key: &str) -> Option<&AnalysisOutputFile> {
        self.output_files.get(key)
    }

    pub fn output_files(&self) -> &BTreeMap<String, AnalysisOutputFile> {
        &self.output_files
    }

    pub fn output_file_names(&self) -> impl Iterator<Item = &str> {
        self.output_files.keys().map(String::as_str)
    }
}

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::model::sequencing::SequencingObjectId;
use crate::model::state::WorkflowState;
use crate::model::submission::SubmissionId;
use crate::model::template::TemplateId;

/// Workflow lookups against the installed workflow registry
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Workflow {0} is not installed")]
    NotFound(Uuid),

    #[error("No default workflow for analysis type {0}")]
    NoDefault(String),

    #[error("Invalid workflow configuration: {0}")]
    Config(String),
}

/// A submission that can't be built from the given inputs
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("A submission needs at least one input file")]
    NoInputFiles,

    #[error("Paired submission has {forward} forward and {reverse} reverse files")]
    MismatchedPairs { forward: usize, reverse: usize },

    #[error("Forward read of sequencing object {forward} is paired with a reverse read of sequencing object {reverse}")]
    CrossedPair { forward: i64, reverse: i64 },

    #[error("Workflow {workflow} expects paired input but sequencing object {sequencing_object} is single end")]
    IncompatibleInput { workflow: Uuid, sequencing_object: i64 },
}

/// Faults reported by the remote execution manager
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionManagerError {
    #[error("Upload of {path} failed: {reason}")]
    Upload { path: PathBuf, reason: String },

    #[error("No dataset for {0} in workspace after upload")]
    DatasetNotFound(String),

    #[error("Could not launch workflow {workflow}: {reason}")]
    Launch { workflow: Uuid, reason: String },

    #[error("Status query failed: {0}")]
    Query(String),

    #[error("Unrecognised remote state '{0}'")]
    UnknownState(String),

    #[error("No execution workspace for submission {0}")]
    NoExecutionWorkspace(SubmissionId),

    #[error("Could not collect outputs: {0}")]
    Collect(String),
}

impl ExecutionManagerError {
    /// Network-class faults are worth another attempt, everything else is final
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExecutionManagerError::Upload { .. }
                | ExecutionManagerError::Query(_)
                | ExecutionManagerError::Collect(_)
        )
    }
}

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Stored JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown stored state '{0}'")]
    State(String),

    #[error("Malformed stored timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("Malformed stored workflow id: {0}")]
    WorkflowId(#[from] uuid::Error),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Template {template} already has a live submission for sequencing object {sequencing_object}")]
    AlreadyLaunched {
        template: TemplateId,
        sequencing_object: SequencingObjectId,
    },
}

/// Failure of a single `advance` call
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Submission {0} does not exist")]
    MissingSubmission(SubmissionId),

    #[error("Submission {id} can't move from {from} to {to}")]
    IllegalTransition {
        id: SubmissionId,
        from: WorkflowState,
        to: WorkflowState,
    },

    #[error(transparent)]
    Remote(#[from] ExecutionManagerError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Failure of an export pass or a single export upload
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Archive upload failed for export {id}: {reason}")]
    Upload { id: i64, reason: String },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to render manifest: {0}")]
    Render(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// A new-data message that can't be turned into a sequencing object
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("Can't read message at '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Message is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Message fails validation: {0}")]
    Validation(String),

    #[error("Can't deserialise message: {0}")]
    Deserialise(#[source] serde_json::Error),
}

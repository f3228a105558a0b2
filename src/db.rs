//! All analysis state is stored in a SQLite database
//!
//! Components only see the repository traits defined here. [Database] implements all of them on
//! top of one rusqlite connection, and state changes go through conditional writes so a stale
//! reader can never move a record backwards.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::DatabaseError;
use crate::galaxy::{RemoteRunHandle, UploadedInput, WorkspaceHandle};
use crate::model::analysis::Analysis;
use crate::model::export::{ExportId, NcbiExportSubmission, NewExport};
use crate::model::sequencing::{
    Project, ProjectId, ProjectSampleJoin, ResultSlot, Sample, SampleId, SequenceFiles, SequencingObject,
    SequencingObjectId,
};
use crate::model::state::{ExportUploadState, WorkflowState};
use crate::model::submission::{AnalysisSubmission, NewSubmission, SubmissionId};
use crate::model::template::{AnalysisSubmissionTemplate, NewTemplate, TemplateId};

/// Connect to a SQLite database
pub mod open;
pub mod template;
pub mod sequencing;
pub mod submission;
pub mod analysis;
pub mod export;

/// Thread-safe database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap. All access is serialized through a `Mutex`.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    fn new(conn: Connection) -> Self {
        Database { conn: Arc::new(Mutex::new(conn)) }
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

pub trait TemplateRepository {
    fn insert_template(&self, template: &NewTemplate) -> Result<AnalysisSubmissionTemplate, DatabaseError>;

    fn find_template(&self, id: TemplateId) -> Result<Option<AnalysisSubmissionTemplate>, DatabaseError>;

    /// Enabled and disabled templates of a project, oldest first
    fn templates_for_project(&self, project: ProjectId) -> Result<Vec<AnalysisSubmissionTemplate>, DatabaseError>;

    /// Persist the two fields the automated-launch processor is allowed to change
    fn update_template_status(&self, id: TemplateId, enabled: bool, status_message: &str) -> Result<(), DatabaseError>;
}

pub trait SequencingRepository {
    fn insert_project(&self, name: &str) -> Result<Project, DatabaseError>;

    fn insert_sample(&self, name: &str) -> Result<Sample, DatabaseError>;

    fn add_sample_to_project(&self, project: ProjectId, sample: SampleId, owner: bool) -> Result<(), DatabaseError>;

    fn projects_for_sample(&self, sample: SampleId) -> Result<Vec<ProjectSampleJoin>, DatabaseError>;

    fn insert_sequencing_object(
        &self,
        sample: Option<SampleId>,
        files: &SequenceFiles,
    ) -> Result<SequencingObject, DatabaseError>;

    fn find_sequencing_object(&self, id: SequencingObjectId) -> Result<Option<SequencingObject>, DatabaseError>;

    /// `None` when the object was removed from its sample
    fn sample_for_sequencing_object(&self, id: SequencingObjectId) -> Result<Option<Sample>, DatabaseError>;

    fn detach_sequencing_object(&self, id: SequencingObjectId) -> Result<(), DatabaseError>;

    /// Point a result slot at a submission. Returns false when it already pointed there.
    fn attach_result(
        &self,
        id: SequencingObjectId,
        slot: ResultSlot,
        submission: SubmissionId,
    ) -> Result<bool, DatabaseError>;
}

/// Remote handles and message written together with a state change. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct SubmissionUpdate {
    pub workspace: Option<WorkspaceHandle>,
    pub datasets: Option<Vec<UploadedInput>>,
    pub run: Option<RemoteRunHandle>,
    pub status_message: Option<String>,
}

pub trait SubmissionRepository {
    /// Store a built submission, its inputs and its project share in one transaction.
    ///
    /// A template launches at most once per sequencing object: fails with
    /// [DatabaseError::AlreadyLaunched] while an earlier submission from the same template for any
    /// of the inputs is still live (not in `ERROR`).
    fn insert_submission(&self, submission: &NewSubmission) -> Result<AnalysisSubmission, DatabaseError>;

    fn find_submission(&self, id: SubmissionId) -> Result<Option<AnalysisSubmission>, DatabaseError>;

    fn submissions_with_states(&self, states: &[WorkflowState]) -> Result<Vec<AnalysisSubmission>, DatabaseError>;

    /// Compare-and-set on the stored state. Writes `next` and `update` only if the stored state is
    /// still `expected`, and returns whether the write happened.
    fn update_state_if(
        &self,
        id: SubmissionId,
        expected: WorkflowState,
        next: WorkflowState,
        update: &SubmissionUpdate,
    ) -> Result<bool, DatabaseError>;

    /// Take over a `Preparing` submission whose uploads were never recorded and that nobody has
    /// touched since `stale_before`. Refreshes its modified time and returns whether it was taken.
    fn reclaim_preparation(&self, id: SubmissionId, stale_before: DateTime<Utc>) -> Result<bool, DatabaseError>;

    /// Record the workspace and uploads of a `Preparing` submission. Only the first worker to
    /// record them wins.
    fn record_uploads(
        &self,
        id: SubmissionId,
        workspace: &WorkspaceHandle,
        datasets: &[UploadedInput],
    ) -> Result<bool, DatabaseError>;

    fn submissions_for_project(&self, project: ProjectId) -> Result<Vec<AnalysisSubmission>, DatabaseError>;
}

pub trait AnalysisRepository {
    /// Fails if the submission already has an analysis
    fn insert_analysis(&self, submission: SubmissionId, analysis: &Analysis) -> Result<i64, DatabaseError>;

    fn analysis_for_submission(&self, submission: SubmissionId) -> Result<Option<Analysis>, DatabaseError>;
}

pub trait ExportRepository {
    fn insert_export(&self, export: &NewExport) -> Result<NcbiExportSubmission, DatabaseError>;

    fn find_export(&self, id: ExportId) -> Result<Option<NcbiExportSubmission>, DatabaseError>;

    fn exports_with_state(&self, state: ExportUploadState) -> Result<Vec<NcbiExportSubmission>, DatabaseError>;

    /// Compare-and-set on the upload state, returns whether the write happened
    fn update_export_state_if(
        &self,
        id: ExportId,
        expected: ExportUploadState,
        next: ExportUploadState,
    ) -> Result<bool, DatabaseError>;
}

/// Everything the lifecycle components need from storage
pub trait Store:
    TemplateRepository + SequencingRepository + SubmissionRepository + AnalysisRepository + ExportRepository + Send + Sync
{
}

impl<T> Store for T where
    T: TemplateRepository
        + SequencingRepository
        + SubmissionRepository
        + AnalysisRepository
        + ExportRepository
        + Send
        + Sync
{
}

pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub(crate) fn parse_timestamp(value: &str) -> Result<chrono::DateTime<chrono::Utc>, DatabaseError> {
    Ok(chrono::DateTime::parse_from_rfc3339(value)?.with_timezone(&chrono::Utc))
}

//! Drive submissions through their lifecycle against the remote execution manager
//!
//! Nothing here runs on its own. A scheduler calls [ExecutionOrchestrator::advance] for a
//! submission (or [ExecutionOrchestrator::advance_all]) and each call performs at most one step
//! of the state machine:
//!
//! | stored state | step |
//! | --- | --- |
//! | `New` | claim as `Preparing`, create a workspace and upload every input file |
//! | `Preparing` | claim as `Submitted`, then launch the workflow and record the run handle. Without recorded uploads, upload again only once the earlier attempt has gone stale |
//! | `Submitted`, `Running` | poll the run; a finished run is claimed as `Completing` and completed |
//! | `Completing` | collect outputs into an analysis, mark `Completed`, reconcile results |
//!
//! Every state change is a conditional write on the stored state, so a stale caller (another
//! thread, another process, or a restarted one) can never move a submission backwards or launch
//! it twice.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, PoisonError};

use chrono::{Duration, Utc};
use log::{debug, error, info, warn};

use crate::db::{Store, SubmissionUpdate};
use crate::error::{ExecutionError, ExecutionManagerError};
use crate::galaxy::status::workflow_status;
use crate::galaxy::{
    ExecutionManager, RemoteOutput, RemoteRunHandle, UploadedDatasets, UploadedInput, WorkspaceHandle,
};
use crate::model::analysis::{Analysis, AnalysisOutputFile};
use crate::model::sequencing::SequenceFiles;
use crate::model::state::WorkflowState;
use crate::model::submission::{AnalysisSubmission, SubmissionId};
use crate::reconcile::ResultReconciler;
use crate::workflow::{WorkflowDescriptor, WorkflowRegistry};

pub mod lock;
pub mod retry;

use lock::SubmissionLocks;
pub use retry::RetryPolicy;

const DEFAULT_PREPARE_TIMEOUT_MINUTES: i64 = 30;

/// What a single `advance` call did
#[derive(Debug, Clone, PartialEq)]
pub struct Advance {
    pub id: SubmissionId,
    pub from: WorkflowState,
    pub to: WorkflowState,
    /// Reported while the remote run is polled
    pub percent_complete: Option<f32>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct AdvanceSummary {
    pub advanced: Vec<Advance>,
    pub failed: Vec<SubmissionId>,
}

pub struct ExecutionOrchestrator {
    store: Arc<dyn Store>,
    workflows: Arc<dyn WorkflowRegistry>,
    manager: Arc<dyn ExecutionManager>,
    reconciler: ResultReconciler,
    retry: RetryPolicy,
    prepare_timeout: Duration,
    locks: SubmissionLocks,
}

impl ExecutionOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        workflows: Arc<dyn WorkflowRegistry>,
        manager: Arc<dyn ExecutionManager>,
        retry: RetryPolicy,
    ) -> Self {
        let reconciler = ResultReconciler::new(store.clone(), workflows.clone());
        ExecutionOrchestrator {
            store,
            workflows,
            manager,
            reconciler,
            retry,
            prepare_timeout: Duration::minutes(DEFAULT_PREPARE_TIMEOUT_MINUTES),
            locks: SubmissionLocks::default(),
        }
    }

    /// How long an unfinished upload may go untouched before another worker starts it over
    pub fn with_prepare_timeout(mut self, timeout: Duration) -> Self {
        self.prepare_timeout = timeout;
        self
    }

    /// Perform the next step for one submission.
    ///
    /// Remote faults that should end the submission are recorded as `Error` with a status
    /// message and returned as `Ok`. An `Err` means nothing was changed and a later call may
    /// try again (for example a status query that keeps failing).
    pub fn advance(&self, id: SubmissionId) -> Result<Advance, ExecutionError> {
        let lock = self.locks.get(id);
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let submission = self.store.find_submission(id)?.ok_or(ExecutionError::MissingSubmission(id))?;
        let from = submission.state();
        let (to, percent_complete) = match from {
            WorkflowState::New => (self.prepare(&submission)?, None),
            WorkflowState::Preparing => (self.submit(&submission)?, None),
            WorkflowState::Submitted | WorkflowState::Running => self.poll(&submission)?,
            WorkflowState::Completing => (self.complete(&submission)?, None),
            WorkflowState::Completed | WorkflowState::Error => (from, None),
        };

        drop(guard);
        if to.is_terminal() {
            self.locks.release(id);
        }
        Ok(Advance { id, from, to, percent_complete })
    }

    /// Advance every submission that isn't finished. One failing submission doesn't stop the rest.
    pub fn advance_all(&self) -> Result<AdvanceSummary, ExecutionError> {
        let mut summary = AdvanceSummary::default();
        for submission in self.store.submissions_with_states(&WorkflowState::ACTIVE)? {
            match self.advance(submission.id()) {
                Ok(advance) => summary.advanced.push(advance),
                Err(err) => {
                    warn!("Could not advance submission {}: {}", submission.id(), err);
                    summary.failed.push(submission.id());
                }
            }
        }
        Ok(summary)
    }

    /// Claim a new submission and upload its inputs into a fresh workspace
    fn prepare(&self, submission: &AnalysisSubmission) -> Result<WorkflowState, ExecutionError> {
        if !self.claim(submission, WorkflowState::New, WorkflowState::Preparing, SubmissionUpdate::default())? {
            return self.current_state(submission.id());
        }
        self.upload(submission)
    }

    /// A `Preparing` submission without recorded uploads is either mid-upload somewhere else or was
    /// abandoned by a worker that died. Only the second kind is uploaded again.
    fn resume_prepare(&self, submission: &AnalysisSubmission) -> Result<WorkflowState, ExecutionError> {
        let stale_before = Utc::now() - self.prepare_timeout;
        if !self.store.reclaim_preparation(submission.id(), stale_before)? {
            debug!("Submission {}: inputs are still being uploaded", submission.id());
            return self.current_state(submission.id());
        }
        warn!("Submission {}: earlier upload was abandoned, uploading inputs again", submission.id());
        self.upload(submission)
    }

    fn upload(&self, submission: &AnalysisSubmission) -> Result<WorkflowState, ExecutionError> {
        let workflow = match self.workflows.resolve(&submission.workflow_id()) {
            Ok(workflow) => workflow,
            Err(err) => return self.fail(submission, WorkflowState::Preparing, err.to_string()),
        };

        let (workspace, datasets) = match self.upload_inputs(submission, &workflow) {
            Ok(uploaded) => uploaded,
            Err(err) => return self.fail(submission, WorkflowState::Preparing, err.to_string()),
        };
        info!("Submission {}: uploaded {} inputs to workspace {}", submission.id(), datasets.len(), workspace);

        if !self.store.record_uploads(submission.id(), &workspace, &datasets)? {
            warn!("Submission {}: uploads were already recorded, workspace {} is unused", submission.id(), workspace);
            return self.current_state(submission.id());
        }
        Ok(WorkflowState::Preparing)
    }

    fn upload_inputs(
        &self,
        submission: &AnalysisSubmission,
        workflow: &WorkflowDescriptor,
    ) -> Result<(WorkspaceHandle, Vec<UploadedInput>), ExecutionManagerError> {
        let workspace = self.retry.run("workspace creation", || self.manager.create_workspace())?;
        let upload = |path: &Path| {
            debug!("Uploading {} to workspace {}", path.display(), workspace);
            self.retry
                .run(&format!("upload of {}", path.display()), || {
                    self.manager.upload_file(path, &workflow.file_type, &workspace)
                })
        };

        let mut datasets = Vec::with_capacity(submission.inputs().len());
        for input in submission.inputs() {
            let uploaded = match &input.files {
                SequenceFiles::Single { file } => UploadedDatasets::Single { dataset: upload(file.as_path())? },
                SequenceFiles::Pair { forward, reverse } => {
                    UploadedDatasets::Pair { forward: upload(forward.as_path())?, reverse: upload(reverse.as_path())? }
                }
            };
            datasets.push(UploadedInput { sequencing_object_id: input.sequencing_object_id, datasets: uploaded });
        }
        Ok((workspace, datasets))
    }

    fn submit(&self, submission: &AnalysisSubmission) -> Result<WorkflowState, ExecutionError> {
        let remote = submission.remote();
        let Some(workspace) = remote.workspace.as_ref().filter(|_| !remote.datasets.is_empty()) else {
            return self.resume_prepare(submission);
        };

        if !self.manager.workspace_exists(workspace) {
            let err = ExecutionManagerError::NoExecutionWorkspace(submission.id());
            return self.fail(submission, WorkflowState::Preparing, err.to_string());
        }
        let workflow = match self.workflows.resolve(&submission.workflow_id()) {
            Ok(workflow) => workflow,
            Err(err) => return self.fail(submission, WorkflowState::Preparing, err.to_string()),
        };

        // claimed before launching: whoever loses the claim must not launch
        if !self.claim(submission, WorkflowState::Preparing, WorkflowState::Submitted, SubmissionUpdate::default())? {
            return self.current_state(submission.id());
        }

        match self.manager.launch_workflow(&workflow, workspace, &remote.datasets) {
            Ok(run) => {
                info!("Submission {}: launched workflow {} as run {}", submission.id(), workflow.id, run);
                let update = SubmissionUpdate { run: Some(run), ..Default::default() };
                self.transition(submission, WorkflowState::Submitted, WorkflowState::Submitted, update)
            }
            Err(err) => self.fail(submission, WorkflowState::Submitted, err.to_string()),
        }
    }

    fn poll(&self, submission: &AnalysisSubmission) -> Result<(WorkflowState, Option<f32>), ExecutionError> {
        let from = submission.state();
        let Some(run) = submission.remote().run.as_ref() else {
            let err = ExecutionManagerError::NoExecutionWorkspace(submission.id());
            return Ok((self.fail(submission, from, err.to_string())?, None));
        };

        let details = self.retry.run("status query", || self.manager.poll_status(run))?;
        let status = workflow_status(&details)?;
        debug!("Submission {}: remote state {} at {:.1}%", submission.id(), details.state, status.percent_complete);

        let state = match status.local_state() {
            WorkflowState::Completed => {
                if self.claim(submission, from, WorkflowState::Completing, SubmissionUpdate::default())? {
                    self.complete(submission)?
                } else {
                    self.current_state(submission.id())?
                }
            }
            WorkflowState::Error => {
                let message = format!("Remote run {} finished in state {}", run, details.state);
                self.fail(submission, from, message)?
            }
            _ => self.transition(submission, from, WorkflowState::Running, SubmissionUpdate::default())?,
        };
        Ok((state, Some(status.percent_complete)))
    }

    /// Store the analysis once, then finish the submission
    fn complete(&self, submission: &AnalysisSubmission) -> Result<WorkflowState, ExecutionError> {
        let id = submission.id();
        if self.store.analysis_for_submission(id)?.is_none() {
            let Some(run) = submission.remote().run.as_ref() else {
                let err = ExecutionManagerError::NoExecutionWorkspace(id);
                return self.fail(submission, WorkflowState::Completing, err.to_string());
            };
            let outputs = match self.retry.run("output collection", || self.manager.collect_outputs(run)) {
                Ok(outputs) => outputs,
                Err(err) => return self.fail(submission, WorkflowState::Completing, err.to_string()),
            };
            self.store.insert_analysis(id, &analysis_from_outputs(submission, run, outputs))?;
        }

        let state = self.transition(submission, WorkflowState::Completing, WorkflowState::Completed, SubmissionUpdate::default())?;
        if state == WorkflowState::Completed {
            // never holds up completion
            if let Err(err) = self.reconciler.reconcile(id) {
                error!("Could not reconcile results of submission {}: {}", id, err);
            }
        }
        Ok(state)
    }

    /// Record an unrecoverable fault on the submission
    fn fail(
        &self,
        submission: &AnalysisSubmission,
        from: WorkflowState,
        message: String,
    ) -> Result<WorkflowState, ExecutionError> {
        error!("Submission {} failed in state {}: {}", submission.id(), from, message);
        let update = SubmissionUpdate { status_message: Some(message), ..Default::default() };
        self.transition(submission, from, WorkflowState::Error, update)
    }

    /// Conditional write from `expected` to `next`, true if this call made it
    fn claim(
        &self,
        submission: &AnalysisSubmission,
        expected: WorkflowState,
        next: WorkflowState,
        update: SubmissionUpdate,
    ) -> Result<bool, ExecutionError> {
        let id = submission.id();
        if expected != next && !expected.can_advance_to(next) {
            return Err(ExecutionError::IllegalTransition { id, from: expected, to: next });
        }
        let written = self.store.update_state_if(id, expected, next, &update)?;
        if !written {
            debug!("Submission {} is no longer {}, not writing {}", id, expected, next);
        }
        Ok(written)
    }

    /// Like [Self::claim], but returns the state the submission ends up in, which is whatever
    /// someone else wrote if the stored state had already moved on
    fn transition(
        &self,
        submission: &AnalysisSubmission,
        expected: WorkflowState,
        next: WorkflowState,
        update: SubmissionUpdate,
    ) -> Result<WorkflowState, ExecutionError> {
        if self.claim(submission, expected, next, update)? {
            return Ok(next);
        }
        self.current_state(submission.id())
    }

    fn current_state(&self, id: SubmissionId) -> Result<WorkflowState, ExecutionError> {
        let current = self.store.find_submission(id)?.ok_or(ExecutionError::MissingSubmission(id))?;
        Ok(current.state())
    }
}

fn analysis_from_outputs(submission: &AnalysisSubmission, run: &RemoteRunHandle, outputs: Vec<RemoteOutput>) -> Analysis {
    let output_files: BTreeMap<String, AnalysisOutputFile> = outputs
        .into_iter()
        .map(|output| (output.key, AnalysisOutputFile::new(output.path, output.label, output.dataset_id)))
        .collect();
    let properties = BTreeMap::from([("workflow_id".to_string(), submission.workflow_id().to_string())]);
    Analysis::with_details(run.to_string(), output_files, Some(submission.name().to_string()), properties)
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, VecDeque};
    use std::path::PathBuf;
    use std::sync::Mutex;

    use uuid::Uuid;

    use super::*;
    use crate::db::{AnalysisRepository, Database, SequencingRepository, SubmissionRepository};
    use crate::galaxy::{DatasetHandle, HistoryDetails};
    use crate::model::sequencing::SequencingObject;
    use crate::submission::SubmissionBuilder;
    use crate::workflow::registry::InstalledWorkflows;
    use crate::workflow::{AnalysisType, InputLayout};

    #[derive(Default)]
    struct FakeGalaxy {
        missing_workspace: bool,
        upload_faults: Mutex<u32>,
        uploads: Mutex<Vec<PathBuf>>,
        launches: Mutex<u32>,
        histories: Mutex<VecDeque<HistoryDetails>>,
    }

    impl FakeGalaxy {
        /// Queue a poll answer; `ids` pairs a dataset state with a dataset id
        fn history(&self, state: &str, ids: &[(&str, &str)]) {
            let mut state_ids: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            for (key, id) in ids {
                state_ids.entry(key.to_string()).or_default().insert(id.to_string());
            }
            self.histories.lock().unwrap().push_back(HistoryDetails { state: state.to_string(), state_ids });
        }
    }

    impl ExecutionManager for FakeGalaxy {
        fn create_workspace(&self) -> Result<WorkspaceHandle, ExecutionManagerError> {
            Ok(WorkspaceHandle("history-1".to_string()))
        }

        fn workspace_exists(&self, _workspace: &WorkspaceHandle) -> bool {
            !self.missing_workspace
        }

        fn upload_file(
            &self,
            path: &Path,
            _file_type: &str,
            _workspace: &WorkspaceHandle,
        ) -> Result<DatasetHandle, ExecutionManagerError> {
            let mut faults = self.upload_faults.lock().unwrap();
            if *faults > 0 {
                *faults -= 1;
                return Err(ExecutionManagerError::Upload { path: path.to_path_buf(), reason: "reset".to_string() });
            }
            let mut uploads = self.uploads.lock().unwrap();
            uploads.push(path.to_path_buf());
            Ok(DatasetHandle(format!("dataset-{}", uploads.len())))
        }

        fn launch_workflow(
            &self,
            _workflow: &WorkflowDescriptor,
            _workspace: &WorkspaceHandle,
            _inputs: &[UploadedInput],
        ) -> Result<RemoteRunHandle, ExecutionManagerError> {
            *self.launches.lock().unwrap() += 1;
            Ok(RemoteRunHandle("invocation-1".to_string()))
        }

        fn poll_status(&self, _run: &RemoteRunHandle) -> Result<HistoryDetails, ExecutionManagerError> {
            self.histories.lock().unwrap().pop_front().ok_or_else(|| ExecutionManagerError::Query("no answer".to_string()))
        }

        fn collect_outputs(&self, _run: &RemoteRunHandle) -> Result<Vec<RemoteOutput>, ExecutionManagerError> {
            Ok(vec![RemoteOutput {
                key: "contigs".to_string(),
                label: "contigs.fasta".to_string(),
                dataset_id: "dataset-9".to_string(),
                path: PathBuf::from("/results/contigs.fasta"),
            }])
        }
    }

    struct Fixture {
        db: Arc<Database>,
        galaxy: Arc<FakeGalaxy>,
        orchestrator: ExecutionOrchestrator,
        object: SequencingObject,
        id: SubmissionId,
    }

    fn fixture(galaxy: FakeGalaxy, installed: bool) -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let workflows = Arc::new(InstalledWorkflows::default());
        let workflow = WorkflowDescriptor {
            id: Uuid::new_v4(),
            name: "assembly".to_string(),
            version: "1.0".to_string(),
            analysis_type: AnalysisType::assembly_annotation(),
            input: InputLayout::Paired,
            file_type: "fastqsanger".to_string(),
        };
        if installed {
            workflows.install(workflow.clone());
            workflows.set_default(&workflow.id).unwrap();
        }

        let sample = db.insert_sample("S1").unwrap();
        let files = SequenceFiles::Pair { forward: PathBuf::from("/data/S1_R1.fastq"), reverse: PathBuf::from("/data/S1_R2.fastq") };
        let object = db.insert_sequencing_object(Some(sample.id), &files).unwrap();
        let submission = SubmissionBuilder::new(workflow.id)
            .submitter("alice")
            .update_samples(true)
            .input_files(vec![object.clone()])
            .build()
            .unwrap();
        let id = db.insert_submission(&submission).unwrap().id();

        let galaxy = Arc::new(galaxy);
        let orchestrator = ExecutionOrchestrator::new(db.clone(), workflows, galaxy.clone(), RetryPolicy::new(3));
        Fixture { db, galaxy, orchestrator, object, id }
    }

    fn state(fx: &Fixture) -> WorkflowState {
        fx.db.find_submission(fx.id).unwrap().unwrap().state()
    }

    #[test]
    fn test_full_lifecycle() {
        let fx = fixture(FakeGalaxy::default(), true);
        fx.galaxy.history("running", &[("ok", "1"), ("running", "2")]);
        fx.galaxy.history("ok", &[("ok", "1"), ("ok", "2")]);

        let steps: Vec<Advance> = (0..5).map(|_| fx.orchestrator.advance(fx.id).unwrap()).collect();
        let states: Vec<WorkflowState> = steps.iter().map(|step| step.to).collect();
        assert_eq!(
            states,
            vec![
                WorkflowState::Preparing,
                WorkflowState::Submitted,
                WorkflowState::Running,
                WorkflowState::Completed,
                WorkflowState::Completed
            ]
        );
        assert_eq!(steps[2].percent_complete, Some(50.0));
        assert_eq!(steps[3].percent_complete, Some(100.0));

        assert_eq!(fx.galaxy.uploads.lock().unwrap().len(), 2);
        assert_eq!(*fx.galaxy.launches.lock().unwrap(), 1);
        let analysis = fx.db.analysis_for_submission(fx.id).unwrap().unwrap();
        assert_eq!(analysis.execution_manager_analysis_id(), "invocation-1");
        assert_eq!(analysis.output_file("contigs").unwrap().execution_manager_file_id(), "dataset-9");

        let object = fx.db.find_sequencing_object(fx.object.id).unwrap().unwrap();
        assert_eq!(object.automated_assembly, Some(fx.id));
        assert!(fx.orchestrator.locks.is_empty());
    }

    #[test]
    fn test_transient_upload_faults_are_retried() {
        let galaxy = FakeGalaxy { upload_faults: Mutex::new(2), ..Default::default() };
        let fx = fixture(galaxy, true);

        assert_eq!(fx.orchestrator.advance(fx.id).unwrap().to, WorkflowState::Preparing);
        let submission = fx.db.find_submission(fx.id).unwrap().unwrap();
        assert_eq!(submission.remote().datasets.len(), 1);
        assert_eq!(submission.remote().workspace, Some(WorkspaceHandle("history-1".to_string())));
    }

    #[test]
    fn test_exhausted_upload_retries_fail_submission() {
        let galaxy = FakeGalaxy { upload_faults: Mutex::new(10), ..Default::default() };
        let fx = fixture(galaxy, true);

        assert_eq!(fx.orchestrator.advance(fx.id).unwrap().to, WorkflowState::Error);
        let submission = fx.db.find_submission(fx.id).unwrap().unwrap();
        assert!(submission.status_message().unwrap().contains("S1_R1.fastq"));
    }

    #[test]
    fn test_uninstalled_workflow_fails_submission() {
        let fx = fixture(FakeGalaxy::default(), false);
        assert_eq!(fx.orchestrator.advance(fx.id).unwrap().to, WorkflowState::Error);
        assert!(fx.galaxy.uploads.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_workspace_is_not_retried() {
        let galaxy = FakeGalaxy { missing_workspace: true, ..Default::default() };
        let fx = fixture(galaxy, true);
        fx.orchestrator.advance(fx.id).unwrap();

        assert_eq!(fx.orchestrator.advance(fx.id).unwrap().to, WorkflowState::Error);
        assert_eq!(*fx.galaxy.launches.lock().unwrap(), 0);
        let submission = fx.db.find_submission(fx.id).unwrap().unwrap();
        assert_eq!(submission.status_message(), Some(format!("No execution workspace for submission {}", fx.id).as_str()));
    }

    #[test]
    fn test_query_fault_leaves_state_alone() {
        let fx = fixture(FakeGalaxy::default(), true);
        fx.orchestrator.advance(fx.id).unwrap();
        fx.orchestrator.advance(fx.id).unwrap();

        let result = fx.orchestrator.advance(fx.id);
        assert!(matches!(result, Err(ExecutionError::Remote(ExecutionManagerError::Query(_)))));
        assert_eq!(state(&fx), WorkflowState::Submitted);

        fx.galaxy.history("bogus", &[]);
        let result = fx.orchestrator.advance(fx.id);
        assert!(matches!(result, Err(ExecutionError::Remote(ExecutionManagerError::UnknownState(_)))));
        assert_eq!(state(&fx), WorkflowState::Submitted);
    }

    #[test]
    fn test_remote_error_fails_submission() {
        let fx = fixture(FakeGalaxy::default(), true);
        fx.orchestrator.advance(fx.id).unwrap();
        fx.orchestrator.advance(fx.id).unwrap();
        fx.galaxy.history("error", &[("error", "1")]);

        assert_eq!(fx.orchestrator.advance(fx.id).unwrap().to, WorkflowState::Error);
        assert!(fx.db.analysis_for_submission(fx.id).unwrap().is_none());
    }

    #[test]
    fn test_lost_claim_does_not_launch() {
        let fx = fixture(FakeGalaxy::default(), true);
        fx.orchestrator.advance(fx.id).unwrap();
        let stale = fx.db.find_submission(fx.id).unwrap().unwrap();

        // another worker launches first
        fx.orchestrator.advance(fx.id).unwrap();
        assert_eq!(fx.orchestrator.submit(&stale).unwrap(), WorkflowState::Submitted);
        assert_eq!(*fx.galaxy.launches.lock().unwrap(), 1);
    }

    #[test]
    fn test_running_never_goes_back() {
        let fx = fixture(FakeGalaxy::default(), true);
        fx.orchestrator.advance(fx.id).unwrap();
        let preparing = fx.db.find_submission(fx.id).unwrap().unwrap();
        fx.orchestrator.advance(fx.id).unwrap();
        fx.galaxy.history("queued", &[("queued", "1")]);
        fx.orchestrator.advance(fx.id).unwrap();
        assert_eq!(state(&fx), WorkflowState::Running);

        let result = fx.orchestrator.transition(&preparing, WorkflowState::Running, WorkflowState::Preparing, SubmissionUpdate::default());
        assert!(matches!(result, Err(ExecutionError::IllegalTransition { .. })));
        assert_eq!(fx.orchestrator.prepare(&preparing).unwrap(), WorkflowState::Running);
        assert_eq!(state(&fx), WorkflowState::Running);
    }

    #[test]
    fn test_upload_in_progress_elsewhere_is_left_alone() {
        let fx = fixture(FakeGalaxy::default(), true);
        // another process has claimed the submission and is still uploading
        fx.db
            .update_state_if(fx.id, WorkflowState::New, WorkflowState::Preparing, &SubmissionUpdate::default())
            .unwrap();

        assert_eq!(fx.orchestrator.advance(fx.id).unwrap().to, WorkflowState::Preparing);
        assert!(fx.galaxy.uploads.lock().unwrap().is_empty());
        assert_eq!(*fx.galaxy.launches.lock().unwrap(), 0);
        assert!(fx.db.find_submission(fx.id).unwrap().unwrap().remote().workspace.is_none());
    }

    #[test]
    fn test_abandoned_upload_is_redone() {
        let fx = fixture(FakeGalaxy::default(), true);
        let fx = Fixture { orchestrator: fx.orchestrator.with_prepare_timeout(Duration::zero()), ..fx };
        fx.db
            .update_state_if(fx.id, WorkflowState::New, WorkflowState::Preparing, &SubmissionUpdate::default())
            .unwrap();

        assert_eq!(fx.orchestrator.advance(fx.id).unwrap().to, WorkflowState::Preparing);
        assert_eq!(fx.galaxy.uploads.lock().unwrap().len(), 2);
        assert_eq!(fx.orchestrator.advance(fx.id).unwrap().to, WorkflowState::Submitted);
        assert_eq!(*fx.galaxy.launches.lock().unwrap(), 1);
    }

    #[test]
    fn test_advance_all_isolates_failures() {
        let fx = fixture(FakeGalaxy::default(), true);
        let summary = fx.orchestrator.advance_all().unwrap();
        assert_eq!(summary.advanced.len(), 1);

        fx.orchestrator.advance(fx.id).unwrap();
        let summary = fx.orchestrator.advance_all().unwrap();
        assert_eq!(summary.failed, vec![fx.id]);
    }
}

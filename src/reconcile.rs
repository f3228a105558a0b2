//! Attach finished automated results back to the sequencing data they were run on
//!
//! Only submissions that asked to update their samples are reconciled. Which result slot a
//! submission fills is decided by comparing its workflow with the current default workflow of
//! each known analysis type, so changing a default changes the matching with no extra config.

use std::sync::Arc;

use log::{error, info, warn};

use crate::db::Store;
use crate::error::DatabaseError;
use crate::model::sequencing::ResultSlot;
use crate::model::state::WorkflowState;
use crate::model::submission::SubmissionId;
use crate::workflow::{AnalysisType, WorkflowRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Missing, or not completed yet
    NotCompleted,
    /// The submission was not allowed to update its samples
    NotRequested,
    /// The workflow is not the default of any known analysis type
    NoMatchingType,
    /// `changed` counts the sequencing objects that didn't already point at the submission
    Attached { slot: ResultSlot, changed: usize },
}

pub struct ResultReconciler {
    store: Arc<dyn Store>,
    workflows: Arc<dyn WorkflowRegistry>,
}

impl ResultReconciler {
    pub fn new(store: Arc<dyn Store>, workflows: Arc<dyn WorkflowRegistry>) -> Self {
        ResultReconciler { store, workflows }
    }

    fn known_types() -> [(AnalysisType, ResultSlot); 2] {
        [
            (AnalysisType::assembly_annotation(), ResultSlot::AutomatedAssembly),
            (AnalysisType::sistr_typing(), ResultSlot::SistrTyping),
        ]
    }

    /// Safe to call any number of times, later calls change nothing
    pub fn reconcile(&self, id: SubmissionId) -> Result<Reconciliation, DatabaseError> {
        let Some(submission) = self.store.find_submission(id)? else {
            warn!("Submission {} disappeared before its results could be reconciled", id);
            return Ok(Reconciliation::NotCompleted);
        };
        if submission.state() != WorkflowState::Completed {
            return Ok(Reconciliation::NotCompleted);
        }
        if !submission.update_samples() {
            return Ok(Reconciliation::NotRequested);
        }

        let slot = Self::known_types().into_iter().find_map(|(analysis_type, slot)| {
            match self.workflows.default_for(&analysis_type) {
                Ok(default) if default.id == submission.workflow_id() => Some(slot),
                Ok(_) => None,
                Err(err) => {
                    error!("Skipping {} when reconciling submission {}: {}", analysis_type, id, err);
                    None
                }
            }
        });
        let Some(slot) = slot else {
            return Ok(Reconciliation::NoMatchingType);
        };

        let mut changed = 0;
        for input in submission.inputs() {
            if self.store.attach_result(input.sequencing_object_id, slot, id)? {
                changed += 1;
            }
        }
        if changed > 0 {
            info!("Submission {}: attached as {} to {} sequencing objects", id, slot.column(), changed);
        }
        Ok(Reconciliation::Attached { slot, changed })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::*;
    use crate::db::{Database, SequencingRepository, SubmissionRepository, SubmissionUpdate};
    use crate::model::sequencing::{SequenceFiles, SequencingObject};
    use crate::submission::SubmissionBuilder;
    use crate::workflow::registry::InstalledWorkflows;
    use crate::workflow::{InputLayout, WorkflowDescriptor};

    fn descriptor(analysis_type: AnalysisType) -> WorkflowDescriptor {
        WorkflowDescriptor {
            id: Uuid::new_v4(),
            name: analysis_type.to_string(),
            version: "0.3".to_string(),
            analysis_type,
            input: InputLayout::Paired,
            file_type: "fastqsanger".to_string(),
        }
    }

    struct Fixture {
        db: Arc<Database>,
        workflows: Arc<InstalledWorkflows>,
        reconciler: ResultReconciler,
        object: SequencingObject,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let workflows = Arc::new(InstalledWorkflows::default());
        let files = SequenceFiles::Pair { forward: PathBuf::from("/r1.fastq"), reverse: PathBuf::from("/r2.fastq") };
        let object = db.insert_sequencing_object(None, &files).unwrap();
        let reconciler = ResultReconciler::new(db.clone(), workflows.clone());
        Fixture { db, workflows, reconciler, object }
    }

    /// A stored submission moved straight to `state`
    fn submission(fx: &Fixture, workflow: Uuid, update_samples: bool, state: WorkflowState) -> SubmissionId {
        let built = SubmissionBuilder::new(workflow)
            .update_samples(update_samples)
            .input_files(vec![fx.object.clone()])
            .build()
            .unwrap();
        let id = fx.db.insert_submission(&built).unwrap().id();
        assert!(fx.db.update_state_if(id, WorkflowState::New, state, &SubmissionUpdate::default()).unwrap());
        id
    }

    fn install_default(fx: &Fixture, analysis_type: AnalysisType) -> WorkflowDescriptor {
        let workflow = descriptor(analysis_type);
        fx.workflows.install(workflow.clone());
        fx.workflows.set_default(&workflow.id).unwrap();
        workflow
    }

    #[test]
    fn test_typing_result_attached_once() {
        let fx = fixture();
        let sistr = install_default(&fx, AnalysisType::sistr_typing());
        let id = submission(&fx, sistr.id, true, WorkflowState::Completed);

        assert_eq!(
            fx.reconciler.reconcile(id).unwrap(),
            Reconciliation::Attached { slot: ResultSlot::SistrTyping, changed: 1 }
        );
        let first = fx.db.find_sequencing_object(fx.object.id).unwrap().unwrap();

        assert_eq!(
            fx.reconciler.reconcile(id).unwrap(),
            Reconciliation::Attached { slot: ResultSlot::SistrTyping, changed: 0 }
        );
        let second = fx.db.find_sequencing_object(fx.object.id).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(second.sistr_typing, Some(id));
        assert_eq!(second.automated_assembly, None);
    }

    #[test]
    fn test_missing_assembly_default_does_not_block_typing() {
        let fx = fixture();
        let sistr = install_default(&fx, AnalysisType::sistr_typing());
        let id = submission(&fx, sistr.id, true, WorkflowState::Completed);

        // no assembly default installed at all
        assert!(matches!(fx.reconciler.reconcile(id).unwrap(), Reconciliation::Attached { .. }));
    }

    #[test]
    fn test_update_samples_off_changes_nothing() {
        let fx = fixture();
        let assembly = install_default(&fx, AnalysisType::assembly_annotation());
        let id = submission(&fx, assembly.id, false, WorkflowState::Completed);

        assert_eq!(fx.reconciler.reconcile(id).unwrap(), Reconciliation::NotRequested);
        assert_eq!(fx.db.find_sequencing_object(fx.object.id).unwrap().unwrap().automated_assembly, None);
    }

    #[test]
    fn test_unknown_workflow_is_not_an_error() {
        let fx = fixture();
        install_default(&fx, AnalysisType::assembly_annotation());
        let id = submission(&fx, Uuid::new_v4(), true, WorkflowState::Completed);

        assert_eq!(fx.reconciler.reconcile(id).unwrap(), Reconciliation::NoMatchingType);
    }

    #[test]
    fn test_unfinished_submission_is_skipped() {
        let fx = fixture();
        let assembly = install_default(&fx, AnalysisType::assembly_annotation());
        let id = submission(&fx, assembly.id, true, WorkflowState::Running);

        assert_eq!(fx.reconciler.reconcile(id).unwrap(), Reconciliation::NotCompleted);
    }
}

//! Decide which automated pipelines to launch for newly arrived sequencing data
//!
//! Starting from a sequencing object, walk up to its sample and every project that contains the
//! sample, and collect each project's templates. Every template is checked against the workflow
//! registry each time it is used, since installed workflows change over time: a template whose
//! workflow is gone or no longer the default for its type is disabled with a status message.

use std::sync::Arc;

use log::{error, info, warn};

use crate::db::Store;
use crate::error::{DatabaseError, SubmissionError, WorkflowError};
use crate::model::sequencing::{Sample, SequencingObject};
use crate::model::submission::SubmissionId;
use crate::model::template::AnalysisSubmissionTemplate;
use crate::submission::SubmissionBuilder;
use crate::workflow::{WorkflowDescriptor, WorkflowRegistry};

/// Why a template was switched off
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisableReason {
    NotInstalled,
    NoDefault,
    OutOfDate,
}

impl DisableReason {
    pub fn status_message(&self) -> &'static str {
        match self {
            DisableReason::NotInstalled => "Disabled as workflow is not installed.",
            DisableReason::NoDefault => "Disabled as no default workflow exists for this type.",
            DisableReason::OutOfDate => {
                "Disabled as this workflow is out of date.  You must create a new automated pipeline."
            }
        }
    }
}

/// Result of checking one template against the installed workflows
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateCheck {
    Runnable(WorkflowDescriptor),
    Disabled(DisableReason),
}

/// A template that should run for a particular sample, with the workflow it resolved to
#[derive(Debug, Clone)]
pub struct ApplicableTemplate {
    pub template: AnalysisSubmissionTemplate,
    pub workflow: WorkflowDescriptor,
    pub sample: Sample,
}

/// What one call to [TemplateEvaluator::process] did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LaunchSummary {
    pub launched: Vec<SubmissionId>,
    pub skipped: usize,
    pub failed: usize,
}

pub struct TemplateEvaluator {
    store: Arc<dyn Store>,
    workflows: Arc<dyn WorkflowRegistry>,
}

impl TemplateEvaluator {
    pub fn new(store: Arc<dyn Store>, workflows: Arc<dyn WorkflowRegistry>) -> Self {
        TemplateEvaluator { store, workflows }
    }

    /// Check that a template's workflow is installed and still the default for its analysis type
    pub fn check(&self, template: &AnalysisSubmissionTemplate) -> TemplateCheck {
        let workflow = match self.workflows.resolve(&template.workflow_id) {
            Ok(workflow) => workflow,
            Err(_) => {
                warn!(
                    "Project {} attempted to run workflow {} but it does not exist. This template will be disabled.",
                    template.project_id, template.workflow_id
                );
                return TemplateCheck::Disabled(DisableReason::NotInstalled);
            }
        };

        match self.workflows.default_for(&workflow.analysis_type) {
            Ok(default) if default.id == workflow.id => TemplateCheck::Runnable(workflow),
            Ok(_) => {
                warn!(
                    "Project {} attempted to run workflow {} but it is no longer the default for {}. This template will be disabled.",
                    template.project_id, template.workflow_id, workflow.analysis_type
                );
                TemplateCheck::Disabled(DisableReason::OutOfDate)
            }
            Err(WorkflowError::NoDefault(analysis_type)) => {
                warn!(
                    "Project {} attempted to run workflow type {} but there is no default workflow for this type. This template will be disabled.",
                    template.project_id, analysis_type
                );
                TemplateCheck::Disabled(DisableReason::NoDefault)
            }
            Err(err) => {
                warn!("Can't look up default workflow for template {}: {}", template.id, err);
                TemplateCheck::Disabled(DisableReason::NoDefault)
            }
        }
    }

    /// Every enabled, currently valid template that applies to a sequencing object, ordered by project.
    ///
    /// Returns nothing when the object has been removed from its sample in the meantime. Templates
    /// that fail the workflow check are disabled in storage and left out.
    pub fn templates_for(&self, object: &SequencingObject) -> Result<Vec<ApplicableTemplate>, DatabaseError> {
        let Some(sample) = self.store.sample_for_sequencing_object(object.id)? else {
            warn!("Cannot find sample for sequencing object {}. Not running automated pipelines.", object.id);
            return Ok(Vec::new());
        };

        let mut applicable = Vec::new();
        for join in self.store.projects_for_sample(sample.id)? {
            for mut template in self.store.templates_for_project(join.project.id)? {
                if !template.enabled {
                    continue;
                }

                let workflow = match self.check(&template) {
                    TemplateCheck::Runnable(workflow) => workflow,
                    TemplateCheck::Disabled(reason) => {
                        // one template failing to save must not stop its siblings
                        if let Err(err) = self.store.update_template_status(template.id, false, reason.status_message()) {
                            error!("Could not disable template {}: {}", template.id, err);
                        }
                        continue;
                    }
                };

                template.name = format!("{} - {}", template.name, sample.name);
                // a project that only has a shared copy of the sample must not write to it
                if !join.owner {
                    template.update_samples = false;
                }
                applicable.push(ApplicableTemplate { template, workflow, sample: sample.clone() });
            }
        }
        Ok(applicable)
    }

    /// Launch every applicable template for newly arrived sequencing data.
    ///
    /// Never fails: problems are logged and counted, one template at a time.
    pub fn process(&self, object: &SequencingObject) -> LaunchSummary {
        let mut summary = LaunchSummary::default();

        let applicable = match self.templates_for(object) {
            Ok(applicable) => applicable,
            Err(err) => {
                error!("Could not load templates for sequencing object {}: {}", object.id, err);
                summary.failed += 1;
                return summary;
            }
        };

        for candidate in applicable {
            match self.launch(object, &candidate) {
                Ok(Some(id)) => summary.launched.push(id),
                Ok(None) => summary.skipped += 1,
                Err(err) => {
                    error!("Could not launch template {} for sequencing object {}: {}", candidate.template.id, object.id, err);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Sequencing object {}: {} automated submissions launched, {} skipped, {} failed",
            object.id,
            summary.launched.len(),
            summary.skipped,
            summary.failed
        );
        summary
    }

    fn launch(
        &self,
        object: &SequencingObject,
        candidate: &ApplicableTemplate,
    ) -> Result<Option<SubmissionId>, DatabaseError> {
        let template = &candidate.template;

        let built = SubmissionBuilder::from_template(template)
            .require_layout(candidate.workflow.input)
            .input_files(vec![object.clone()])
            .build();
        let submission = match built {
            Ok(submission) => submission,
            Err(err @ SubmissionError::IncompatibleInput { .. }) => {
                warn!("Not running template {}: {}", template.id, err);
                return Ok(None);
            }
            Err(err) => {
                warn!("Template {} produced an invalid submission: {}", template.id, err);
                return Ok(None);
            }
        };

        // stored and shared with the template's project together
        let stored = match self.store.insert_submission(&submission) {
            Ok(stored) => stored,
            Err(DatabaseError::AlreadyLaunched { .. }) => {
                info!("Template {} already launched for sequencing object {}, skipping", template.id, object.id);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let status_message = format!("Last launched for sample {}", candidate.sample.name);
        self.store.update_template_status(template.id, true, &status_message)?;

        Ok(Some(stored.id()))
    }
}

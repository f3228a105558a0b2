//! Turn a template or an ad-hoc request into a validated, unstored submission
//!
//! Building never touches storage. Whoever builds a submission decides when to commit it.

use std::path::PathBuf;

use log::debug;
use uuid::Uuid;

use crate::error::SubmissionError;
use crate::model::sequencing::{ProjectId, SequenceFiles, SequencingObject, SequencingObjectId};
use crate::model::submission::{NewSubmission, SubmissionInput};
use crate::model::template::{AnalysisSubmissionTemplate, TemplateId};
use crate::workflow::InputLayout;

/// One read file handed to [SubmissionBuilder::input_files_paired]
pub type ReadFile = (SequencingObjectId, PathBuf);

pub struct SubmissionBuilder {
    workflow_id: Uuid,
    name: Option<String>,
    submitter: String,
    update_samples: bool,
    inputs: Vec<SubmissionInput>,
    template_id: Option<TemplateId>,
    project_id: Option<ProjectId>,
    layout: Option<InputLayout>,
    error: Option<SubmissionError>,
}

impl SubmissionBuilder {
    /// Ad-hoc submission of a workflow
    pub fn new(workflow_id: Uuid) -> Self {
        SubmissionBuilder {
            workflow_id,
            name: None,
            submitter: String::new(),
            update_samples: false,
            inputs: Vec::new(),
            template_id: None,
            project_id: None,
            layout: None,
            error: None,
        }
    }

    /// Submission launched from a template, shared back to the template's project
    pub fn from_template(template: &AnalysisSubmissionTemplate) -> Self {
        SubmissionBuilder {
            name: Some(template.name.clone()),
            submitter: template.submitter.clone(),
            update_samples: template.update_samples,
            template_id: Some(template.id),
            project_id: Some(template.project_id),
            ..SubmissionBuilder::new(template.workflow_id)
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn submitter(mut self, submitter: &str) -> Self {
        self.submitter = submitter.to_string();
        self
    }

    pub fn update_samples(mut self, update_samples: bool) -> Self {
        self.update_samples = update_samples;
        self
    }

    /// Reject inputs that don't match what the workflow reads
    pub fn require_layout(mut self, layout: InputLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn input_files(mut self, objects: Vec<SequencingObject>) -> Self {
        self.inputs.extend(objects.into_iter().map(|object| SubmissionInput {
            sequencing_object_id: object.id,
            files: object.files,
        }));
        self
    }

    /// Paired reads given as separate forward and reverse lists, matched by position.
    /// Both reads of a pair must belong to the same sequencing object.
    pub fn input_files_paired(mut self, forward: Vec<ReadFile>, reverse: Vec<ReadFile>) -> Self {
        if forward.len() != reverse.len() {
            self.error.get_or_insert(SubmissionError::MismatchedPairs {
                forward: forward.len(),
                reverse: reverse.len(),
            });
            return self;
        }
        if let Some(((forward, _), (reverse, _))) = forward.iter().zip(&reverse).find(|((f, _), (r, _))| f != r) {
            self.error.get_or_insert(SubmissionError::CrossedPair { forward: *forward, reverse: *reverse });
            return self;
        }
        self.inputs.extend(forward.into_iter().zip(reverse).map(|((id, forward), (_, reverse))| SubmissionInput {
            sequencing_object_id: id,
            files: SequenceFiles::Pair { forward, reverse },
        }));
        self
    }

    pub fn build(self) -> Result<NewSubmission, SubmissionError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.inputs.is_empty() {
            return Err(SubmissionError::NoInputFiles);
        }
        if self.layout == Some(InputLayout::Paired) {
            if let Some(single) = self.inputs.iter().find(|input| !input.files.is_paired()) {
                return Err(SubmissionError::IncompatibleInput {
                    workflow: self.workflow_id,
                    sequencing_object: single.sequencing_object_id,
                });
            }
        }

        let name = self.name.unwrap_or_else(|| format!("{} {}", self.workflow_id, chrono::Utc::now().format("%Y-%m-%d %H:%M")));
        debug!("Built submission '{}' with {} inputs", name, self.inputs.len());
        Ok(NewSubmission {
            name,
            workflow_id: self.workflow_id,
            submitter: self.submitter,
            update_samples: self.update_samples,
            inputs: self.inputs,
            template_id: self.template_id,
            project_id: self.project_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(id: SequencingObjectId) -> SequencingObject {
        SequencingObject {
            id,
            sample_id: Some(1),
            files: SequenceFiles::Single { file: PathBuf::from(format!("/data/{id}.fastq")) },
            automated_assembly: None,
            sistr_typing: None,
        }
    }

    fn read(id: SequencingObjectId, suffix: &str) -> ReadFile {
        (id, PathBuf::from(format!("/data/{id}_{suffix}.fastq")))
    }

    #[test]
    fn test_no_inputs_is_invalid() {
        let result = SubmissionBuilder::new(Uuid::new_v4()).build();
        assert_eq!(result.unwrap_err(), SubmissionError::NoInputFiles);
    }

    #[test]
    fn test_mismatched_pairs_are_invalid() {
        let result = SubmissionBuilder::new(Uuid::new_v4())
            .input_files_paired(vec![read(1, "R1"), read(2, "R1")], vec![read(1, "R2")])
            .build();
        assert_eq!(result.unwrap_err(), SubmissionError::MismatchedPairs { forward: 2, reverse: 1 });
    }

    #[test]
    fn test_pair_from_two_objects_is_invalid() {
        let result = SubmissionBuilder::new(Uuid::new_v4())
            .input_files_paired(vec![read(1, "R1"), read(2, "R1")], vec![read(1, "R2"), read(3, "R2")])
            .build();
        assert_eq!(result.unwrap_err(), SubmissionError::CrossedPair { forward: 2, reverse: 3 });
    }

    #[test]
    fn test_matched_pairs() {
        let submission = SubmissionBuilder::new(Uuid::new_v4())
            .require_layout(InputLayout::Paired)
            .input_files_paired(vec![read(1, "R1")], vec![read(1, "R2")])
            .build()
            .unwrap();
        assert_eq!(
            submission.inputs()[0].files,
            SequenceFiles::Pair { forward: PathBuf::from("/data/1_R1.fastq"), reverse: PathBuf::from("/data/1_R2.fastq") }
        );
    }

    #[test]
    fn test_paired_workflow_rejects_single_end() {
        let workflow = Uuid::new_v4();
        let result = SubmissionBuilder::new(workflow).require_layout(InputLayout::Paired).input_files(vec![single(4)]).build();
        assert_eq!(result.unwrap_err(), SubmissionError::IncompatibleInput { workflow, sequencing_object: 4 });
    }

    #[test]
    fn test_from_template_copies_settings() {
        let template = AnalysisSubmissionTemplate {
            id: 3,
            project_id: 9,
            workflow_id: Uuid::new_v4(),
            name: "SISTR - S1".to_string(),
            enabled: true,
            status_message: None,
            update_samples: true,
            submitter: "alice".to_string(),
        };
        let submission = SubmissionBuilder::from_template(&template).input_files(vec![single(1)]).build().unwrap();
        assert_eq!(submission.name(), "SISTR - S1");
        assert_eq!(submission.workflow_id(), template.workflow_id);
        assert_eq!(submission.submitter(), "alice");
        assert!(submission.update_samples());
        assert_eq!(submission.template_id(), Some(3));
        assert_eq!(submission.project_id(), Some(9));
    }
}

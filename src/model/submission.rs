use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::galaxy::{RemoteRunHandle, UploadedInput, WorkspaceHandle};
use crate::model::sequencing::{ProjectId, SequenceFiles, SequencingObjectId};
use crate::model::state::WorkflowState;
use crate::model::template::TemplateId;

pub type SubmissionId = i64;

/// One input of a submission: a sequencing object and the files it had when the submission was built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionInput {
    pub sequencing_object_id: SequencingObjectId,
    pub files: SequenceFiles,
}

/// A validated submission that hasn't been stored yet. Only the submission builder creates these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubmission {
    pub(crate) name: String,
    pub(crate) workflow_id: Uuid,
    pub(crate) submitter: String,
    pub(crate) update_samples: bool,
    pub(crate) inputs: Vec<SubmissionInput>,
    pub(crate) template_id: Option<TemplateId>,
    pub(crate) project_id: Option<ProjectId>,
}

impl NewSubmission {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    pub fn submitter(&self) -> &str {
        &self.submitter
    }

    pub fn update_samples(&self) -> bool {
        self.update_samples
    }

    pub fn inputs(&self) -> &[SubmissionInput] {
        &self.inputs
    }

    pub fn template_id(&self) -> Option<TemplateId> {
        self.template_id
    }

    /// The project that should see this submission regardless of who submitted it
    pub fn project_id(&self) -> Option<ProjectId> {
        self.project_id
    }
}

/// Remote-side handles recorded while a submission moves through the execution manager
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteHandles {
    pub workspace: Option<WorkspaceHandle>,
    pub datasets: Vec<UploadedInput>,
    pub run: Option<RemoteRunHandle>,
}

/// A stored submission.
///
/// The inputs are fixed when the submission is built. Only the state, the remote handles and the
/// status message change afterwards, and only through conditional writes in the repository.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSubmission {
    pub(crate) id: SubmissionId,
    pub(crate) name: String,
    pub(crate) workflow_id: Uuid,
    pub(crate) submitter: String,
    pub(crate) update_samples: bool,
    pub(crate) inputs: Vec<SubmissionInput>,
    pub(crate) state: WorkflowState,
    pub(crate) remote: RemoteHandles,
    pub(crate) status_message: Option<String>,
    pub(crate) created_date: DateTime<Utc>,
}

impl AnalysisSubmission {
    pub fn id(&self) -> SubmissionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    pub fn submitter(&self) -> &str {
        &self.submitter
    }

    pub fn update_samples(&self) -> bool {
        self.update_samples
    }

    pub fn inputs(&self) -> &[SubmissionInput] {
        &self.inputs
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn remote(&self) -> &RemoteHandles {
        &self.remote
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn created_date(&self) -> DateTime<Utc> {
        self.created_date
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::sequencing::ProjectId;

pub type TemplateId = i64;

/// A project's rule for launching a workflow on every new piece of sequencing data.
///
/// Templates are owned by their project. The automated-launch processor only ever changes
/// `enabled` and `status_message` in storage; the label and `update_samples` adjustments it
/// makes for a particular sample stay on the in-memory copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSubmissionTemplate {
    pub id: TemplateId,
    pub project_id: ProjectId,
    pub workflow_id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub status_message: Option<String>,
    pub update_samples: bool,
    pub submitter: String,
}

/// Fields for a template that hasn't been stored yet
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub project_id: ProjectId,
    pub workflow_id: Uuid,
    pub name: String,
    pub update_samples: bool,
    pub submitter: String,
}

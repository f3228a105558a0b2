//! Resolve workflow identifiers and analysis types to installed workflows

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorkflowError;

/// Workflows loaded from a JSON definition file
pub mod registry;

/// An abstract kind of analysis, e.g. `ASSEMBLY_ANNOTATION`. Each type has at most one default workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisType(String);

impl AnalysisType {
    pub fn new(name: &str) -> Self {
        AnalysisType(name.to_string())
    }

    pub fn assembly_annotation() -> Self {
        AnalysisType::new("ASSEMBLY_ANNOTATION")
    }

    pub fn sistr_typing() -> Self {
        AnalysisType::new("SISTR_TYPING")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a workflow reads single files or forward/reverse pairs
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputLayout {
    Single,
    Paired,
}

/// An installed workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDescriptor {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub analysis_type: AnalysisType,
    pub input: InputLayout,
    /// Datatype given to the execution manager for uploaded reads, e.g. `fastqsanger`
    pub file_type: String,
}

/// Read-only view of the installed workflows
pub trait WorkflowRegistry: Send + Sync {
    fn resolve(&self, id: &Uuid) -> Result<WorkflowDescriptor, WorkflowError>;

    fn default_for(&self, analysis_type: &AnalysisType) -> Result<WorkflowDescriptor, WorkflowError>;
}

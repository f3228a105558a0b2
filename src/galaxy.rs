//! Contract with the remote execution manager (a Galaxy instance)
//!
//! The core never talks HTTP itself. Anything that can create workspaces (Galaxy histories),
//! upload files, launch workflows and report history state can drive submissions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ExecutionManagerError;
use crate::model::sequencing::SequencingObjectId;
use crate::workflow::WorkflowDescriptor;

/// Map raw history state onto local workflow state
pub mod status;

/// A remote container for one run's datasets (a Galaxy history)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceHandle(pub String);

/// A dataset uploaded into a workspace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetHandle(pub String);

/// A launched workflow invocation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteRunHandle(pub String);

macro_rules! display_handle {
    ($($handle:ty),*) => {
        $(impl fmt::Display for $handle {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_handle!(WorkspaceHandle, DatasetHandle, RemoteRunHandle);

/// Uploaded datasets for one submission input, laid out like its sequence files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum UploadedDatasets {
    Single { dataset: DatasetHandle },
    Pair { forward: DatasetHandle, reverse: DatasetHandle },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedInput {
    pub sequencing_object_id: SequencingObjectId,
    pub datasets: UploadedDatasets,
}

/// Raw history state as reported remotely: an overall state string plus dataset ids grouped by state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryDetails {
    pub state: String,
    pub state_ids: BTreeMap<String, BTreeSet<String>>,
}

/// A dataset produced by a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOutput {
    pub key: String,
    pub label: String,
    pub dataset_id: String,
    pub path: PathBuf,
}

/// Every call blocks until the remote side answers
pub trait ExecutionManager: Send + Sync {
    fn create_workspace(&self) -> Result<WorkspaceHandle, ExecutionManagerError>;

    fn workspace_exists(&self, workspace: &WorkspaceHandle) -> bool;

    fn upload_file(
        &self,
        path: &Path,
        file_type: &str,
        workspace: &WorkspaceHandle,
    ) -> Result<DatasetHandle, ExecutionManagerError>;

    fn launch_workflow(
        &self,
        workflow: &WorkflowDescriptor,
        workspace: &WorkspaceHandle,
        inputs: &[UploadedInput],
    ) -> Result<RemoteRunHandle, ExecutionManagerError>;

    fn poll_status(&self, run: &RemoteRunHandle) -> Result<HistoryDetails, ExecutionManagerError>;

    fn collect_outputs(&self, run: &RemoteRunHandle) -> Result<Vec<RemoteOutput>, ExecutionManagerError>;
}

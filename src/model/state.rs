use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;

/// Where a submission is in its lifecycle.
///
/// States only move forward: `New -> Preparing -> Submitted -> Running -> Completing -> Completed`.
/// `Error` can be entered from any state that isn't terminal. `Completing` is the optional
/// post-processing step where remote outputs are collected into an [Analysis](crate::model::analysis::Analysis).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    New,
    Preparing,
    Submitted,
    Running,
    Completing,
    Completed,
    Error,
}

impl WorkflowState {
    /// Every state that still needs a call to `advance`
    pub const ACTIVE: [WorkflowState; 5] = [
        WorkflowState::New,
        WorkflowState::Preparing,
        WorkflowState::Submitted,
        WorkflowState::Running,
        WorkflowState::Completing,
    ];

    pub const ALL: [WorkflowState; 7] = [
        WorkflowState::New,
        WorkflowState::Preparing,
        WorkflowState::Submitted,
        WorkflowState::Running,
        WorkflowState::Completing,
        WorkflowState::Completed,
        WorkflowState::Error,
    ];

    fn rank(&self) -> u8 {
        match self {
            WorkflowState::New => 0,
            WorkflowState::Preparing => 1,
            WorkflowState::Submitted => 2,
            WorkflowState::Running => 3,
            WorkflowState::Completing => 4,
            WorkflowState::Completed => 5,
            WorkflowState::Error => 6,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Completed | WorkflowState::Error)
    }

    /// Forward-only transition check
    pub fn can_advance_to(&self, next: WorkflowState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            WorkflowState::Error => true,
            _ => next.rank() > self.rank(),
        }
    }

    /// db column values are upper case
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::New => "NEW",
            WorkflowState::Preparing => "PREPARING",
            WorkflowState::Submitted => "SUBMITTED",
            WorkflowState::Running => "RUNNING",
            WorkflowState::Completing => "COMPLETING",
            WorkflowState::Completed => "COMPLETED",
            WorkflowState::Error => "ERROR",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WorkflowState {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkflowState::ALL
            .iter()
            .find(|state| state.as_str() == s)
            .copied()
            .ok_or_else(|| DatabaseError::State(s.to_string()))
    }
}

/// Upload state of an export record
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportUploadState {
    New,
    Processing,
    Complete,
    Error,
}

impl ExportUploadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportUploadState::New => "NEW",
            ExportUploadState::Processing => "PROCESSING",
            ExportUploadState::Complete => "COMPLETE",
            ExportUploadState::Error => "ERROR",
        }
    }
}

impl fmt::Display for ExportUploadState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExportUploadState {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(ExportUploadState::New),
            "PROCESSING" => Ok(ExportUploadState::Processing),
            "COMPLETE" => Ok(ExportUploadState::Complete),
            "ERROR" => Ok(ExportUploadState::Error),
            _ => Err(DatabaseError::State(s.to_string())),
        }
    }
}

use std::str::FromStr;

use crate::error::ExecutionManagerError;
use crate::galaxy::HistoryDetails;
use crate::model::state::WorkflowState;

/// History and dataset states reported by Galaxy
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RemoteState {
    Ok,
    Running,
    Queued,
    New,
    Upload,
    SettingMetadata,
    Paused,
    Deferred,
    Empty,
    Error,
    FailedMetadata,
    Discarded,
}

impl RemoteState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteState::Ok => "ok",
            RemoteState::Running => "running",
            RemoteState::Queued => "queued",
            RemoteState::New => "new",
            RemoteState::Upload => "upload",
            RemoteState::SettingMetadata => "setting_metadata",
            RemoteState::Paused => "paused",
            RemoteState::Deferred => "deferred",
            RemoteState::Empty => "empty",
            RemoteState::Error => "error",
            RemoteState::FailedMetadata => "failed_metadata",
            RemoteState::Discarded => "discarded",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RemoteState::Error | RemoteState::FailedMetadata | RemoteState::Discarded)
    }
}

impl FromStr for RemoteState {
    type Err = ExecutionManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let state = match s {
            "ok" => RemoteState::Ok,
            "running" => RemoteState::Running,
            "queued" => RemoteState::Queued,
            "new" => RemoteState::New,
            "upload" => RemoteState::Upload,
            "setting_metadata" => RemoteState::SettingMetadata,
            "paused" => RemoteState::Paused,
            "deferred" => RemoteState::Deferred,
            "empty" => RemoteState::Empty,
            "error" => RemoteState::Error,
            "failed_metadata" => RemoteState::FailedMetadata,
            "discarded" => RemoteState::Discarded,
            other => return Err(ExecutionManagerError::UnknownState(other.to_string())),
        };
        Ok(state)
    }
}

/// Overall remote state plus how far along the run is
#[derive(Clone, Debug, PartialEq)]
pub struct WorkflowStatus {
    pub state: RemoteState,
    pub percent_complete: f32,
    pending: usize,
}

impl WorkflowStatus {
    /// The local state this remote status maps onto.
    ///
    /// Any running or queued dataset keeps the submission running, whatever the overall state
    /// says. With nothing pending, `ok` means done and the failure states mean failed.
    pub fn local_state(&self) -> WorkflowState {
        if self.pending > 0 {
            return WorkflowState::Running;
        }
        match self.state {
            RemoteState::Ok => WorkflowState::Completed,
            state if state.is_failure() => WorkflowState::Error,
            _ => WorkflowState::Running,
        }
    }
}

/// Build a [WorkflowStatus] from raw history details.
///
/// Percent complete is `ok ids / all ids * 100`. A history that tracks no ids at all reports 0%.
pub fn workflow_status(details: &HistoryDetails) -> Result<WorkflowStatus, ExecutionManagerError> {
    let state: RemoteState = details.state.parse()?;

    let count = |key: RemoteState| details.state_ids.get(key.as_str()).map_or(0, |ids| ids.len());
    let total: usize = details.state_ids.values().map(|ids| ids.len()).sum();
    let completed = count(RemoteState::Ok);
    let pending = count(RemoteState::Running) + count(RemoteState::Queued);

    let percent_complete = match total {
        0 => 0.0,
        _ => completed as f32 / total as f32 * 100.0,
    };

    Ok(WorkflowStatus { state, percent_complete, pending })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    const DELTA: f32 = 0.00001;

    fn details(state: &str, ok: &[&str], running: &[&str], queued: &[&str]) -> HistoryDetails {
        let ids = |ids: &[&str]| ids.iter().map(|id| id.to_string()).collect::<BTreeSet<String>>();
        HistoryDetails {
            state: state.to_string(),
            state_ids: [("ok", ids(ok)), ("running", ids(running)), ("queued", ids(queued))]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    #[test]
    fn test_ok_state_is_complete() {
        let status = workflow_status(&details("ok", &["1", "2"], &[], &[])).unwrap();
        assert_eq!(status.state, RemoteState::Ok);
        assert!((status.percent_complete - 100.0).abs() < DELTA);
        assert_eq!(status.local_state(), WorkflowState::Completed);
    }

    #[test]
    fn test_partially_complete_is_running() {
        let status = workflow_status(&details("running", &["1"], &["2"], &[])).unwrap();
        assert!((status.percent_complete - 50.0).abs() < DELTA);
        assert_eq!(status.local_state(), WorkflowState::Running);
    }

    #[test]
    fn test_nothing_complete_is_running() {
        let status = workflow_status(&details("running", &[], &["1", "2"], &[])).unwrap();
        assert!(status.percent_complete.abs() < DELTA);
        assert_eq!(status.local_state(), WorkflowState::Running);
    }

    #[test]
    fn test_queued_ids_keep_ok_history_running() {
        let status = workflow_status(&details("ok", &["1"], &[], &["2"])).unwrap();
        assert_eq!(status.local_state(), WorkflowState::Running);
    }

    #[test]
    fn test_no_ids_reports_zero_percent() {
        let status = workflow_status(&details("queued", &[], &[], &[])).unwrap();
        assert!(status.percent_complete.abs() < DELTA);
        assert_eq!(status.local_state(), WorkflowState::Running);
    }

    #[test]
    fn test_remote_error_maps_to_error() {
        let status = workflow_status(&details("error", &["1"], &[], &[])).unwrap();
        assert_eq!(status.local_state(), WorkflowState::Error);
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        let err = workflow_status(&details("exploded", &[], &[], &[])).unwrap_err();
        assert_eq!(err, ExecutionManagerError::UnknownState("exploded".to_string()));
    }
}

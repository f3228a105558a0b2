use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::model::submission::SubmissionId;

/// One mutex per submission, so `advance` calls for the same id run one at a time while
/// different ids proceed in parallel
#[derive(Default)]
pub struct SubmissionLocks {
    locks: Mutex<HashMap<SubmissionId, Arc<Mutex<()>>>>,
}

impl SubmissionLocks {
    pub fn get(&self, id: SubmissionId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(id).or_default().clone()
    }

    /// Forget the lock of a submission that reached a terminal state
    pub fn release(&self, id: SubmissionId) {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

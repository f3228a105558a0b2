//! Upload queued exports to the public sequence archive
//!
//! A pass picks up every export still in `New`, claims it as `Processing`, hands it to an
//! [ExportUploader] and marks it `Complete`. Only one pass runs at a time in this process, and the
//! claim is a conditional write, so a second process running passes against the same database
//! can't upload a record twice either.
//!
//! A failed upload leaves its record in `Processing`. Nothing here puts it back to `New`: the
//! partial upload has to be looked at first.

use std::sync::{Arc, Mutex, TryLockError};

use log::{debug, info, warn};

use crate::db::Store;
use crate::error::ExportError;
use crate::model::export::{ExportId, NcbiExportSubmission};
use crate::model::state::ExportUploadState;

/// Archive the export's files somewhere
pub mod archive;

pub trait ExportUploader: Send + Sync {
    fn upload(&self, export: &NcbiExportSubmission) -> Result<(), ExportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportPass {
    /// Another pass is running
    Busy,
    Ran {
        completed: Vec<ExportId>,
        /// Left in `Processing`
        faulted: Vec<ExportId>,
        /// Claimed by someone else first
        skipped: Vec<ExportId>,
    },
}

pub struct ExportQueue {
    store: Arc<dyn Store>,
    uploader: Arc<dyn ExportUploader>,
    flight: Mutex<()>,
}

impl ExportQueue {
    pub fn new(store: Arc<dyn Store>, uploader: Arc<dyn ExportUploader>) -> Self {
        ExportQueue { store, uploader, flight: Mutex::new(()) }
    }

    /// Run one upload pass, or return [ExportPass::Busy] straight away if one is already running
    pub fn run_pass(&self) -> Result<ExportPass, ExportError> {
        let _flight = match self.flight.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("Export pass already running");
                return Ok(ExportPass::Busy);
            }
        };

        let pending = self.store.exports_with_state(ExportUploadState::New)?;
        debug!("{} exports waiting for upload", pending.len());

        let mut completed = Vec::new();
        let mut faulted = Vec::new();
        let mut skipped = Vec::new();
        for export in pending {
            if !self.store.update_export_state_if(export.id, ExportUploadState::New, ExportUploadState::Processing)? {
                skipped.push(export.id);
                continue;
            }

            match self.uploader.upload(&export) {
                Ok(()) => {
                    self.store.update_export_state_if(export.id, ExportUploadState::Processing, ExportUploadState::Complete)?;
                    completed.push(export.id);
                }
                Err(err) => {
                    warn!("Upload of export {} failed, leaving it in {}: {}", export.id, ExportUploadState::Processing, err);
                    faulted.push(export.id);
                }
            }
        }

        if !completed.is_empty() || !faulted.is_empty() {
            info!("Export pass finished: {} uploaded, {} failed", completed.len(), faulted.len());
        }
        Ok(ExportPass::Ran { completed, faulted, skipped })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::mpsc;
    use std::thread;

    use super::*;
    use crate::db::{Database, ExportRepository};
    use crate::model::export::{ExportSample, NewExport};

    fn queue_export(db: &Database, bio_project: &str) -> NcbiExportSubmission {
        db.insert_export(&NewExport {
            bio_project: bio_project.to_string(),
            namespace: "irida".to_string(),
            submitter: "alice".to_string(),
            samples: vec![ExportSample {
                sample_name: "S1".to_string(),
                library_name: "S1-lib".to_string(),
                files: vec![PathBuf::from("/data/S1.fastq")],
            }],
        })
        .unwrap()
    }

    /// Fails for one BioProject, succeeds for the rest
    struct FlakyUploader {
        broken: String,
    }

    impl ExportUploader for FlakyUploader {
        fn upload(&self, export: &NcbiExportSubmission) -> Result<(), ExportError> {
            if export.bio_project == self.broken {
                return Err(ExportError::Upload { id: export.id, reason: "connection reset".to_string() });
            }
            Ok(())
        }
    }

    /// Blocks inside the upload until told to carry on
    struct GatedUploader {
        entered: Mutex<mpsc::Sender<ExportId>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl ExportUploader for GatedUploader {
        fn upload(&self, export: &NcbiExportSubmission) -> Result<(), ExportError> {
            self.entered.lock().unwrap().send(export.id).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            Ok(())
        }
    }

    #[test]
    fn test_pass_completes_exports() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let export = queue_export(&db, "PRJNA1");
        let queue = ExportQueue::new(db.clone(), Arc::new(FlakyUploader { broken: String::new() }));

        let pass = queue.run_pass().unwrap();
        assert_eq!(pass, ExportPass::Ran { completed: vec![export.id], faulted: vec![], skipped: vec![] });
        assert_eq!(db.find_export(export.id).unwrap().unwrap().upload_state, ExportUploadState::Complete);
    }

    #[test]
    fn test_fault_stays_processing() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let broken = queue_export(&db, "PRJNA1");
        let fine = queue_export(&db, "PRJNA2");
        let queue = ExportQueue::new(db.clone(), Arc::new(FlakyUploader { broken: "PRJNA1".to_string() }));

        let pass = queue.run_pass().unwrap();
        assert_eq!(pass, ExportPass::Ran { completed: vec![fine.id], faulted: vec![broken.id], skipped: vec![] });
        assert_eq!(db.find_export(broken.id).unwrap().unwrap().upload_state, ExportUploadState::Processing);

        // not retried by the next pass
        assert_eq!(queue.run_pass().unwrap(), ExportPass::Ran { completed: vec![], faulted: vec![], skipped: vec![] });
        assert_eq!(db.find_export(broken.id).unwrap().unwrap().upload_state, ExportUploadState::Processing);
    }

    #[test]
    fn test_concurrent_pass_is_busy() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let export = queue_export(&db, "PRJNA1");
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let uploader = GatedUploader { entered: Mutex::new(entered_tx), release: Mutex::new(release_rx) };
        let queue = Arc::new(ExportQueue::new(db.clone(), Arc::new(uploader)));

        let first = {
            let queue = queue.clone();
            thread::spawn(move || queue.run_pass().unwrap())
        };
        assert_eq!(entered_rx.recv().unwrap(), export.id);

        assert_eq!(queue.run_pass().unwrap(), ExportPass::Busy);
        release_tx.send(()).unwrap();

        let pass = first.join().unwrap();
        assert_eq!(pass, ExportPass::Ran { completed: vec![export.id], faulted: vec![], skipped: vec![] });
    }

    #[test]
    fn test_separate_queues_never_share_a_record() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ids: HashSet<ExportId> = (0..8).map(|i| queue_export(&db, &format!("PRJNA{i}")).id).collect();

        // two queues stand in for two processes sharing the database
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let queue = ExportQueue::new(db.clone(), Arc::new(FlakyUploader { broken: String::new() }));
                thread::spawn(move || match queue.run_pass().unwrap() {
                    ExportPass::Ran { completed, .. } => completed,
                    ExportPass::Busy => vec![],
                })
            })
            .collect();

        let mut uploaded = Vec::new();
        for handle in handles {
            uploaded.extend(handle.join().unwrap());
        }
        assert_eq!(uploaded.len(), ids.len());
        assert_eq!(uploaded.into_iter().collect::<HashSet<_>>(), ids);
    }
}

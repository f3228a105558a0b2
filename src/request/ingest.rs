use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use jsonschema::JSONSchema;
use log::{error, info, warn};

use crate::automation::TemplateEvaluator;
use crate::db::Store;
use crate::request::message::Message;
use crate::request::read::get_message_paths;
use crate::request::schema::load_schema;
use crate::workflow::WorkflowRegistry;

/// Totals for one pass over a message directory
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub stored: usize,
    pub launched: usize,
    pub invalid: usize,
    pub failed: usize,
    /// Handled but couldn't be renamed, so they will be seen again
    pub unmarked: usize,
}

/// Turns new-data messages into sequencing objects and runs automated pipelines for them.
///
/// Each message file is renamed once handled so it is never picked up again:
/// - `.done` after the data was stored (whether or not anything was launched)
/// - `.invalid` when the message can't be read or fails validation
/// - `.failed` when the data couldn't be stored
pub struct MessageIngest {
    store: Arc<dyn Store>,
    evaluator: TemplateEvaluator,
    compiled_schema: JSONSchema,
}

impl MessageIngest {
    pub fn new(store: Arc<dyn Store>, workflows: Arc<dyn WorkflowRegistry>) -> Result<Self> {
        let compiled_schema = load_schema()?;
        let evaluator = TemplateEvaluator::new(store.clone(), workflows);
        Ok(MessageIngest { store, evaluator, compiled_schema })
    }

    pub fn ingest_dir(&self, dir: &Path) -> Result<IngestSummary> {
        let paths = get_message_paths(dir).with_context(|| format!("Can't list messages in {}", dir.display()))?;
        let mut summary = IngestSummary::default();
        for path in paths {
            let suffix = self.ingest_message(&path, &mut summary);
            if let Err(err) = mark(&path, suffix) {
                error!("{:#}", err);
                summary.unmarked += 1;
            }
        }

        if summary != IngestSummary::default() {
            info!(
                "Ingested {} messages from {}: {} automated submissions, {} invalid, {} failed",
                summary.stored,
                dir.display(),
                summary.launched,
                summary.invalid,
                summary.failed
            );
        }
        Ok(summary)
    }

    /// Returns the suffix the message file gets
    fn ingest_message(&self, path: &Path, summary: &mut IngestSummary) -> &'static str {
        let message = Message { path: path.to_path_buf(), compiled_schema: &self.compiled_schema };
        let request = match message.read() {
            Ok(request) => request,
            Err(err) => {
                warn!("Skipping message {}: {}", path.display(), err);
                summary.invalid += 1;
                return "invalid";
            }
        };

        let object = match self.store.insert_sequencing_object(Some(request.sample_id), &request.files) {
            Ok(object) => object,
            Err(err) => {
                error!("Can't store sequencing data from {}: {}", path.display(), err);
                summary.failed += 1;
                return "failed";
            }
        };
        summary.stored += 1;

        let launch = self.evaluator.process(&object);
        summary.launched += launch.launched.len();
        "done"
    }
}

fn mark(path: &Path, suffix: &str) -> Result<()> {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    let marked = PathBuf::from(name);
    fs::rename(path, &marked).with_context(|| format!("Can't rename {} to {}", path.display(), marked.display()))
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::db::{Database, SequencingRepository, SubmissionRepository, TemplateRepository};
    use crate::model::template::NewTemplate;
    use crate::workflow::registry::InstalledWorkflows;
    use crate::workflow::{AnalysisType, InputLayout, WorkflowDescriptor};

    #[test]
    fn test_ingest_directory() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let workflows = Arc::new(InstalledWorkflows::default());
        let workflow = WorkflowDescriptor {
            id: Uuid::new_v4(),
            name: "SISTR".to_string(),
            version: "1.1".to_string(),
            analysis_type: AnalysisType::sistr_typing(),
            input: InputLayout::Single,
            file_type: "fastqsanger".to_string(),
        };
        workflows.install(workflow.clone());
        workflows.set_default(&workflow.id).unwrap();

        let project = db.insert_project("outbreak").unwrap();
        let sample = db.insert_sample("S1").unwrap();
        db.add_sample_to_project(project.id, sample.id, true).unwrap();
        db.insert_template(&NewTemplate {
            project_id: project.id,
            workflow_id: workflow.id,
            name: "SISTR".to_string(),
            update_samples: true,
            submitter: "alice".to_string(),
        })
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let good = format!(r#"{{"sample_id": {}, "files": {{"layout": "single", "file": "/data/S1.fastq"}}}}"#, sample.id);
        fs::write(dir.path().join("1.json"), good).unwrap();
        fs::write(dir.path().join("2.json"), r#"{"sample_id": 1}"#).unwrap();
        fs::write(dir.path().join("3.json"), r#"{"sample_id": 999, "files": {"layout": "single", "file": "/x.fastq"}}"#)
            .unwrap();

        let ingest = MessageIngest::new(db.clone(), workflows).unwrap();
        let summary = ingest.ingest_dir(dir.path()).unwrap();
        assert_eq!(summary, IngestSummary { stored: 1, launched: 1, invalid: 1, failed: 1, unmarked: 0 });

        assert!(dir.path().join("1.json.done").exists());
        assert!(dir.path().join("2.json.invalid").exists());
        assert!(dir.path().join("3.json.failed").exists());
        assert_eq!(db.submissions_for_project(project.id).unwrap().len(), 1);

        // nothing left to pick up
        assert_eq!(ingest.ingest_dir(dir.path()).unwrap(), IngestSummary::default());
    }

    #[test]
    fn test_rename_failure_does_not_stop_the_pass() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let workflows = Arc::new(InstalledWorkflows::default());
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("1.json"), r#"{"sample_id": 1}"#).unwrap();
        fs::write(dir.path().join("2.json"), r#"{"sample_id": 1}"#).unwrap();
        // a non-empty directory in the way of the first rename
        fs::create_dir(dir.path().join("1.json.invalid")).unwrap();
        fs::write(dir.path().join("1.json.invalid").join("keep"), "").unwrap();

        let ingest = MessageIngest::new(db, workflows).unwrap();
        let summary = ingest.ingest_dir(dir.path()).unwrap();
        assert_eq!(summary, IngestSummary { invalid: 2, unmarked: 1, ..IngestSummary::default() });

        assert!(dir.path().join("1.json").exists());
        assert!(dir.path().join("2.json.invalid").exists());
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;
use tinytemplate::TinyTemplate;

use crate::error::ExportError;
use crate::export::ExportUploader;
use crate::model::export::NcbiExportSubmission;

/// included archive submission manifest template
static SUBMISSION: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/submission.xml"));

/// Stages each export in its own directory of an outbox, ready for a transfer agent to pick up.
///
/// For export `id` the directory `<outbox>/<id>` holds:
/// - `submission.xml`: the archive submission manifest
/// - `export.json`: the export record itself
pub struct DirectoryArchive {
    outbox: PathBuf,
}

impl DirectoryArchive {
    pub fn new(outbox: &Path) -> Self {
        DirectoryArchive { outbox: outbox.to_path_buf() }
    }

    pub fn export_dir(&self, export: &NcbiExportSubmission) -> PathBuf {
        self.outbox.join(export.id.to_string())
    }
}

impl ExportUploader for DirectoryArchive {
    fn upload(&self, export: &NcbiExportSubmission) -> Result<(), ExportError> {
        let dir = self.export_dir(export);
        fs::create_dir_all(&dir).map_err(|source| ExportError::Write { path: dir.clone(), source })?;

        write(&dir.join("submission.xml"), &render_manifest(export)?)?;
        let record = serde_json::to_string_pretty(export).map_err(|err| ExportError::Render(err.to_string()))?;
        write(&dir.join("export.json"), &record)?;

        info!("Staged export {} in {}", export.id, dir.display());
        Ok(())
    }
}

/// Rendering context for the manifest
#[derive(Serialize)]
struct ManifestContext {
    id: i64,
    namespace: String,
    submitter: String,
    release_date: String,
    samples: Vec<SampleContext>,
}

/// Loop bodies only see the loop variable, so shared values are copied into each sample
#[derive(Serialize)]
struct SampleContext {
    sample_name: String,
    library_name: String,
    bio_project: String,
    namespace: String,
    files: Vec<String>,
}

fn render_manifest(export: &NcbiExportSubmission) -> Result<String, ExportError> {
    let mut tt = TinyTemplate::new();
    tt.add_template("submission", SUBMISSION).map_err(|err| ExportError::Render(err.to_string()))?;

    let samples = export
        .samples
        .iter()
        .map(|sample| SampleContext {
            sample_name: sample.sample_name.clone(),
            library_name: sample.library_name.clone(),
            bio_project: export.bio_project.clone(),
            namespace: export.namespace.clone(),
            files: sample.files.iter().map(|file| file.display().to_string()).collect(),
        })
        .collect();
    let context = ManifestContext {
        id: export.id,
        namespace: export.namespace.clone(),
        submitter: export.submitter.clone(),
        release_date: export.created_date.format("%Y-%m-%d").to_string(),
        samples,
    };

    tt.render("submission", &context).map_err(|err| ExportError::Render(err.to_string()))
}

fn write(path: &Path, contents: &str) -> Result<(), ExportError> {
    fs::write(path, contents).map_err(|source| ExportError::Write { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::model::export::ExportSample;
    use crate::model::state::ExportUploadState;

    fn export() -> NcbiExportSubmission {
        NcbiExportSubmission {
            id: 7,
            bio_project: "PRJNA42".to_string(),
            namespace: "irida".to_string(),
            submitter: "Lab <A&B>".to_string(),
            samples: vec![ExportSample {
                sample_name: "S1".to_string(),
                library_name: "S1-lib".to_string(),
                files: vec![PathBuf::from("/data/S1_R1.fastq"), PathBuf::from("/data/S1_R2.fastq")],
            }],
            upload_state: ExportUploadState::Processing,
            created_date: Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_manifest_lists_every_file() {
        let manifest = render_manifest(&export()).unwrap();
        assert!(manifest.contains(r#"<File file_path="/data/S1_R1.fastq">"#));
        assert!(manifest.contains(r#"<File file_path="/data/S1_R2.fastq">"#));
        assert!(manifest.contains("<PrimaryId>PRJNA42</PrimaryId>"));
        assert!(manifest.contains(r#"<SPUID spuid_namespace="irida">S1</SPUID>"#));
        assert!(manifest.contains(r#"<Hold release_date="2023-06-01"/>"#));
    }

    #[test]
    fn test_manifest_escapes_text() {
        let manifest = render_manifest(&export()).unwrap();
        assert!(manifest.contains("<Name>Lab &lt;A&amp;B&gt;</Name>"));
    }

    #[test]
    fn test_upload_stages_directory() {
        let outbox = tempfile::tempdir().unwrap();
        let archive = DirectoryArchive::new(outbox.path());
        archive.upload(&export()).unwrap();

        let dir = outbox.path().join("7");
        assert!(dir.join("submission.xml").exists());
        let record: NcbiExportSubmission =
            serde_json::from_str(&fs::read_to_string(dir.join("export.json")).unwrap()).unwrap();
        assert_eq!(record, export());
    }
}

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::submission::SubmissionId;

pub type ProjectId = i64;
pub type SampleId = i64;
pub type SequencingObjectId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub id: SampleId,
    pub name: String,
}

/// A project's view of a sample. Only the owning project may write results back to the sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSampleJoin {
    pub project: Project,
    pub sample: Sample,
    pub owner: bool,
}

/// Read files of one sequencing run, single or paired end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum SequenceFiles {
    Single { file: PathBuf },
    Pair { forward: PathBuf, reverse: PathBuf },
}

impl SequenceFiles {
    pub fn is_paired(&self) -> bool {
        matches!(self, SequenceFiles::Pair { .. })
    }

    pub fn paths(&self) -> Vec<&Path> {
        match self {
            SequenceFiles::Single { file } => vec![file.as_path()],
            SequenceFiles::Pair { forward, reverse } => vec![forward.as_path(), reverse.as_path()],
        }
    }
}

/// Newly arrived sequencing data. `sample_id` is `None` once the data is detached from its sample.
///
/// The two result slots are filled by the result reconciler when an automated assembly or
/// typing submission completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencingObject {
    pub id: SequencingObjectId,
    pub sample_id: Option<SampleId>,
    pub files: SequenceFiles,
    pub automated_assembly: Option<SubmissionId>,
    pub sistr_typing: Option<SubmissionId>,
}

/// Which result slot of a sequencing object a submission fills
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResultSlot {
    AutomatedAssembly,
    SistrTyping,
}

impl ResultSlot {
    pub fn column(&self) -> &'static str {
        match self {
            ResultSlot::AutomatedAssembly => "automated_assembly",
            ResultSlot::SistrTyping => "sistr_typing",
        }
    }
}

impl SequencingObject {
    pub fn result(&self, slot: ResultSlot) -> Option<SubmissionId> {
        match slot {
            ResultSlot::AutomatedAssembly => self.automated_assembly,
            ResultSlot::SistrTyping => self.sistr_typing,
        }
    }
}

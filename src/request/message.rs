use std::fs;
use std::path::{Path, PathBuf};

use jsonschema::JSONSchema;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MessageError;
use crate::model::sequencing::{SampleId, SequenceFiles};

/// Sequencing data that has just been written to disk for a sample
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NewDataMessage {
    pub sample_id: SampleId,
    pub files: SequenceFiles,
}

pub struct Message<'a> {
    pub path: PathBuf,
    pub compiled_schema: &'a JSONSchema,
}

impl Message<'_> {
    pub fn read(&self) -> Result<NewDataMessage, MessageError> {
        let json: Value = self.parse_untyped_json()?;

        match self.validate(&json) {
            Ok(_) => {
                info!("Message is valid");
                self.parse_json(json)
            }
            Err(err) => {
                warn!("Message {} fails validation", self.path.display());
                Err(err)
            }
        }
    }

    fn validate(&self, json: &Value) -> Result<(), MessageError> {
        info!("Validating raw message against JSON schema");
        match self.compiled_schema.validate(json) {
            Ok(_) => Ok(()),
            Err(errors) => {
                let reasons: Vec<String> = errors.map(|err| err.to_string()).collect();
                Err(MessageError::Validation(reasons.join("; ")))
            }
        }
    }

    fn read_file(&self) -> Result<String, MessageError> {
        let path: &Path = self.path.as_path();
        info!("Reading message at {}", path.display());
        fs::read_to_string(path).map_err(|source| {
            warn!("Can't read message at path {}: {}", path.display(), source);
            MessageError::Read { path: path.to_path_buf(), source }
        })
    }

    fn parse_json(&self, value: Value) -> Result<NewDataMessage, MessageError> {
        // from_value is a generic function, so request NewDataMessage specifically
        serde_json::from_value::<NewDataMessage>(value).map_err(MessageError::Deserialise)
    }

    fn parse_untyped_json(&self) -> Result<Value, MessageError> {
        let json_string = self.read_file()?;
        serde_json::from_str::<Value>(&json_string).map_err(MessageError::Decode)
    }
}

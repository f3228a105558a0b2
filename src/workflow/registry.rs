use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use jsonschema::JSONSchema;
use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::workflow::{AnalysisType, InputLayout, WorkflowDescriptor, WorkflowRegistry};

/// included definition schema
static SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/schema/workflows.json"));

#[derive(Debug, Deserialize)]
struct DefinitionFile {
    workflows: Vec<WorkflowDefinition>,
}

/// One entry of the definition file
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub analysis_type: AnalysisType,
    pub input: InputLayout,
    pub file_type: String,
    #[serde(default)]
    pub default: bool,
}

impl WorkflowDefinition {
    fn descriptor(&self) -> WorkflowDescriptor {
        WorkflowDescriptor {
            id: self.id,
            name: self.name.clone(),
            version: self.version.clone(),
            analysis_type: self.analysis_type.clone(),
            input: self.input,
            file_type: self.file_type.clone(),
        }
    }
}

#[derive(Default)]
struct Installed {
    workflows: HashMap<Uuid, WorkflowDescriptor>,
    defaults: HashMap<AnalysisType, Uuid>,
}

/// Workflows installed in the execution manager.
///
/// Installations change while the service runs, so the set can be updated in place. Every lookup
/// reads the current set; nothing is cached by callers.
#[derive(Default)]
pub struct InstalledWorkflows {
    inner: RwLock<Installed>,
}

impl InstalledWorkflows {
    /// Build from definitions. Two defaults for one analysis type is a configuration error.
    pub fn from_definitions(definitions: Vec<WorkflowDefinition>) -> Result<Self, WorkflowError> {
        let mut installed = Installed::default();
        for definition in definitions {
            if installed.workflows.contains_key(&definition.id) {
                return Err(WorkflowError::Config(format!("workflow {} is defined twice", definition.id)));
            }
            if definition.default {
                if let Some(other) = installed.defaults.insert(definition.analysis_type.clone(), definition.id) {
                    return Err(WorkflowError::Config(format!(
                        "analysis type {} has two default workflows: {} and {}",
                        definition.analysis_type, other, definition.id
                    )));
                }
            }
            installed.workflows.insert(definition.id, definition.descriptor());
        }
        Ok(InstalledWorkflows { inner: RwLock::new(installed) })
    }

    /// Read and validate a workflow definition file
    pub fn load(path: &Path) -> Result<Self, WorkflowError> {
        info!("Reading workflow definitions from {}", path.display());
        let json_string = fs::read_to_string(path).map_err(|err| {
            warn!("Can't read workflow definitions at path {}: {}", path.display(), err);
            WorkflowError::Config(format!("can't read {}: {}", path.display(), err))
        })?;
        let json: Value = serde_json::from_str(&json_string)
            .map_err(|err| WorkflowError::Config(format!("invalid JSON: {}", err)))?;
        validate(&json)?;

        let file: DefinitionFile = serde_json::from_value(json)
            .map_err(|err| WorkflowError::Config(format!("can't deserialise definitions: {}", err)))?;
        let registry = Self::from_definitions(file.workflows)?;
        info!("Loaded {} installed workflows", registry.len());
        Ok(registry)
    }

    /// Install or replace a workflow. A replacement that changes the analysis type stops being the
    /// default for its old type.
    pub fn install(&self, workflow: WorkflowDescriptor) {
        let mut installed = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        installed
            .defaults
            .retain(|analysis_type, default| *default != workflow.id || *analysis_type == workflow.analysis_type);
        installed.workflows.insert(workflow.id, workflow);
    }

    /// Remove a workflow, dropping it as default for its type too
    pub fn uninstall(&self, id: &Uuid) {
        let mut installed = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        installed.workflows.remove(id);
        installed.defaults.retain(|_, default| default != id);
    }

    /// Make an installed workflow the default for its analysis type, replacing any previous default
    pub fn set_default(&self, id: &Uuid) -> Result<(), WorkflowError> {
        let mut installed = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let analysis_type = installed
            .workflows
            .get(id)
            .map(|workflow| workflow.analysis_type.clone())
            .ok_or(WorkflowError::NotFound(*id))?;
        installed.defaults.insert(analysis_type, *id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WorkflowRegistry for InstalledWorkflows {
    fn resolve(&self, id: &Uuid) -> Result<WorkflowDescriptor, WorkflowError> {
        let installed = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        installed.workflows.get(id).cloned().ok_or(WorkflowError::NotFound(*id))
    }

    fn default_for(&self, analysis_type: &AnalysisType) -> Result<WorkflowDescriptor, WorkflowError> {
        let installed = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        installed
            .defaults
            .get(analysis_type)
            .and_then(|id| installed.workflows.get(id))
            .cloned()
            .ok_or_else(|| WorkflowError::NoDefault(analysis_type.to_string()))
    }
}

fn validate(json: &Value) -> Result<(), WorkflowError> {
    info!("Validating workflow definitions against JSON schema");
    let schema_json: Value = serde_json::from_str(SCHEMA)
        .map_err(|err| WorkflowError::Config(format!("bundled schema is invalid: {}", err)))?;
    let compiled = JSONSchema::compile(&schema_json)
        .map_err(|err| WorkflowError::Config(format!("bundled schema doesn't compile: {}", err)))?;

    let result = match compiled.validate(json) {
        Ok(_) => Ok(()),
        Err(errors) => {
            let reasons: Vec<String> = errors.map(|err| err.to_string()).collect();
            Err(WorkflowError::Config(reasons.join("; ")))
        }
    };
    result
}

use jsonschema::JSONSchema;
use serde_json::Value;

use crate::error::MessageError;

/// included message schema
static MESSAGE_SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/schema/message.json"));

pub fn load_schema() -> Result<JSONSchema, MessageError> {
    let schema: Value = serde_json::from_str(MESSAGE_SCHEMA).map_err(MessageError::Decode)?;
    let compiled = JSONSchema::compile(&schema)
        .map_err(|err| MessageError::Validation(format!("bundled schema doesn't compile: {}", err)));
    compiled
}

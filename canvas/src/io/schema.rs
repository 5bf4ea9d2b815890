//! JSON Schema check for persisted documents.

use anyhow::{Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;

/// Schema for persisted session documents.
pub const SHARED_STATE_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/shared_state/v1.schema.json"
));

/// Validate `document` against [`SHARED_STATE_SCHEMA`].
pub fn validate_document(document: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(SHARED_STATE_SCHEMA)
        .map_err(|err| anyhow!("parse shared state schema: {}", err))?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(document) {
        let messages = compiled
            .iter_errors(document)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "state schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

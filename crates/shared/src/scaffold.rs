//! The structured-generation schema for project scaffolding.
//!
//! The scaffold model is asked for a JSON object matching
//! [`ScaffoldSpec`]; the reply is untrusted and goes through
//! [`ScaffoldSpec::from_value`] before anything else sees it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One generated file descriptor inside a scaffold reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaffoldFile {
    pub name: String,
    pub content: String,
    pub language: String,
}

/// The JSON shape the scaffold model must produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaffoldSpec {
    pub description: String,
    pub files: Vec<ScaffoldFile>,
}

impl ScaffoldSpec {
    /// Response schema sent with the structured-generation request, in the
    /// uppercase type notation the Gemini API uses.
    pub fn response_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "description": { "type": "STRING" },
                "files": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "name": { "type": "STRING" },
                            "content": { "type": "STRING" },
                            "language": { "type": "STRING" }
                        },
                        "required": ["name", "content", "language"]
                    }
                }
            },
            "required": ["description", "files"]
        })
    }

    /// Validate a decoded reply. Missing fields, wrong types, an empty file
    /// list, or unnamed files are all rejected as `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        let spec: ScaffoldSpec = serde_json::from_value(value).ok()?;
        if spec.files.is_empty() {
            return None;
        }
        if spec.files.iter().any(|f| f.name.trim().is_empty()) {
            return None;
        }
        Some(spec)
    }
}

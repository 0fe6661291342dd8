use serde::{Deserialize, Serialize};

use crate::sandbox::Limits;

/// Names the transpiled code uses for element and fragment construction.
/// Both must be bound in the capability namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JsxPragma {
    pub factory: String,
    pub fragment: String,
}

impl Default for JsxPragma {
    fn default() -> Self {
        Self {
            factory: "h".to_string(),
            fragment: "Fragment".to_string(),
        }
    }
}

/// Engine configuration. Every field has a default, so hosts may pass `{}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineOptions {
    pub jsx: JsxPragma,
    /// Interpreter steps allowed for one component render.
    pub max_steps: u64,
    /// Nested call limit inside the sandbox.
    pub max_call_depth: usize,
    /// How deeply statements, expressions and rendered children may nest.
    pub max_nesting_depth: usize,
    /// Longest string sandboxed code may build, in bytes.
    pub max_string_length: usize,
    pub max_array_length: usize,
    /// Reuse normalized + transpiled output for unchanged files.
    pub cache: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            jsx: JsxPragma::default(),
            max_steps: limits.max_steps,
            max_call_depth: limits.max_call_depth,
            max_nesting_depth: limits.max_nesting_depth,
            max_string_length: limits.max_string_length,
            max_array_length: limits.max_array_length,
            cache: true,
        }
    }
}

impl EngineOptions {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

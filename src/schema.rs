use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One position claim produced by the extraction model, prior to validation.
/// Treated strictly as untrusted input: every invariant is re-checked by
/// reconciliation regardless of what the model asserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedClaim {
    #[schemars(
        description = "A standardized position code copied verbatim from the list supplied in the request. Inventing a code that is not in the list is a contract violation."
    )]
    pub code: String,

    #[schemars(
        description = "Numeric value for the most recent period present in the sheet, or null when the sheet shows no value for that period. Never calculate or guess a missing value."
    )]
    pub current: Option<f64>,

    #[schemars(
        description = "Numeric value for the period immediately preceding the current one, or null when absent."
    )]
    pub previous: Option<f64>,

    #[schemars(
        description = "Short justification naming the source row label(s) this value was taken from."
    )]
    pub justification: String,
}

/// A candidate label the model considered but did not map to any standardized
/// code, with its rationale. This channel is mandatory so an audit can
/// distinguish 'no evidence' from 'evidence rejected'. Diagnostics only,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExcludedClaim {
    #[schemars(description = "The original label or code as it appeared in the sheet or claim.")]
    pub label: String,

    #[schemars(description = "Why this label was not mapped to a standardized position.")]
    pub reason: String,
}

impl ExcludedClaim {
    pub fn new(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            reason: reason.into(),
        }
    }
}

/// The complete structured output contract for one extraction call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SheetExtraction {
    #[schemars(
        description = "One claim per standardized code the sheet shows evidence for. At most one claim per code."
    )]
    pub positions: Vec<ExtractedClaim>,

    #[schemars(
        description = "Every candidate label that was considered and rejected, each with a rationale. Must be present even when empty."
    )]
    pub excluded: Vec<ExcludedClaim>,
}

impl SheetExtraction {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(SheetExtraction)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }

    /// Generates a Gemini-compatible JSON schema (no $ref, $schema, or
    /// definitions). Gemini's `responseSchema` accepts only a flattened
    /// OpenAPI subset, so every referenced definition is inlined.
    pub fn gemini_response_schema() -> Result<serde_json::Value, serde_json::Error> {
        clean_schema(Self::generate_json_schema())
    }
}

fn clean_schema(root: schemars::schema::RootSchema) -> Result<serde_json::Value, serde_json::Error> {
    let mut schema = serde_json::to_value(root)?;

    let definitions = schema
        .as_object_mut()
        .and_then(|map| map.remove("definitions"))
        .and_then(|defs| defs.as_object().cloned())
        .unwrap_or_default();
    if let Some(map) = schema.as_object_mut() {
        map.remove("$schema");
    }

    inline_refs(&mut schema, &definitions);
    Ok(schema)
}

fn inline_refs(value: &mut serde_json::Value, definitions: &serde_json::Map<String, serde_json::Value>) {
    match value {
        serde_json::Value::Object(map) => {
            let referenced = map
                .get("$ref")
                .and_then(|r| r.as_str())
                .and_then(|r| r.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name))
                .cloned();
            if let Some(mut inlined) = referenced {
                inline_refs(&mut inlined, definitions);
                *value = inlined;
                return;
            }
            for nested in map.values_mut() {
                inline_refs(nested, definitions);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                inline_refs(item, definitions);
            }
        }
        _ => {}
    }
}

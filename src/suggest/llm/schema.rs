//! Declared output schemas, in Gemini's OpenAPI subset (`OBJECT`, `ARRAY`, `STRING`).

use serde_json::{json, Value};

/// `{suggestedIcd: [{code, rationale}], suggestedCpt: [{code, modifiers, units, rationale}]}`
pub fn confident_codes_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "suggestedIcd": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "code": { "type": "STRING" },
                        "rationale": { "type": "STRING" }
                    },
                    "required": ["code", "rationale"]
                }
            },
            "suggestedCpt": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "code": { "type": "STRING" },
                        "modifiers": { "type": "ARRAY", "items": { "type": "STRING" } },
                        "units": { "type": "STRING" },
                        "rationale": { "type": "STRING" }
                    },
                    "required": ["code", "units", "rationale"]
                }
            }
        }
    })
}

fn analysis_subsection_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "text_mention": { "type": "STRING" },
                "related_codes": { "type": "ARRAY", "items": { "type": "STRING" } },
                "rationale": { "type": "STRING" },
                "source_snippet": { "type": "STRING" }
            },
            "required": ["text_mention", "rationale", "source_snippet"]
        }
    })
}

/// Four ordered sections of `{text_mention, related_codes, rationale, source_snippet}`.
pub fn sectional_analysis_schema() -> Value {
    let section = analysis_subsection_schema();
    json!({
        "type": "OBJECT",
        "properties": {
            "diagnoses": section.clone(),
            "symptoms": section.clone(),
            "medications": section.clone(),
            "procedures": section
        }
    })
}

/// `{alerts: [string]}`
pub fn alerts_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "alerts": { "type": "ARRAY", "items": { "type": "STRING" } }
        }
    })
}

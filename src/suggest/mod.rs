//! Coding suggestions from chart text.
//!
//! [`CodingAssistant`] holds the process-wide pieces (model client, loaded
//! templates, generation settings) and runs every operation as a single pass:
//! render prompt, one remote call, recover JSON, parse, map into a result.
//! Nothing is cached between calls and no call is retried.
//!
//! `generate_suggestions` and `generate_analysis` surface failures as a
//! [`CodingError`]. `generate_rationale` and `generate_alerts` degrade to a
//! fallback value instead; only their input preconditions can error.

pub mod error;
pub mod llm;
pub mod types;

#[cfg(test)]
mod tests;

use error::CodingError;
use llm::client::{truncate_str, TextGenerator};
use llm::models::{GenerationConfig, ModelRequest};
use llm::parse::{parse_recovered, recover};
use llm::prompts::{rationale_prompt, PromptTemplates, TemplateKind};
use llm::schema::{alerts_schema, confident_codes_schema, sectional_analysis_schema};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use types::{
    AnalysisEntry, AnalysisMention, AnalysisResult, AnalysisSection, CodeRationales,
    ConfidentCpt, ConfidentIcd, CptSuggestion, IcdSuggestion, RationaleResult, SelectedCode,
    SkippedItem, SuggestionResult,
};

/// Characters of prompt/response text included in debug logs
const LOG_PREVIEW_CHARS: usize = 200;

const CPT_RELATED_LINK: &str = "#";
const CPT_AAPC_GUIDANCE: &str = "Verify documentation";
const RATIONALE_ERROR: &str = "Error";
const RATIONALE_ERROR_OVERALL: &str = "Error generating rationale";
const RATIONALE_MISSING_OVERALL: &str = "No overall rationale provided";

const SUGGESTION_SECTIONS: [&str; 2] = ["suggestedIcd", "suggestedCpt"];

pub struct CodingAssistant {
    generator: Arc<dyn TextGenerator>,
    templates: PromptTemplates,
    model: String,
    generation: GenerationConfig,
}

impl CodingAssistant {
    /// Template load failures are logged here and reported again by each
    /// operation that needs the missing template.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        templates: PromptTemplates,
        model: impl Into<String>,
        generation: GenerationConfig,
    ) -> Self {
        for (kind, reason) in templates.load_errors() {
            tracing::error!("Error loading prompt template {}: {}", kind.file_name(), reason);
        }
        Self {
            generator,
            templates,
            model: model.into(),
            generation,
        }
    }

    /// Confident ICD/CPT codes for a chart.
    pub async fn generate_suggestions(
        &self,
        chart_text: &str,
    ) -> Result<SuggestionResult, CodingError> {
        tracing::info!(
            "Starting generate_suggestions with chart text: {}...",
            truncate_str(chart_text, LOG_PREVIEW_CHARS)
        );
        let prompt = self.render(TemplateKind::ConfidentCodes, chart_text)?;
        let value = self
            .call_model("Confident Codes", prompt, Some(confident_codes_schema()))
            .await?;
        let object = expect_object(&value)?;
        require_any_section(object, &SUGGESTION_SECTIONS)?;
        Ok(map_suggestions(object))
    }

    /// Diagnoses, symptoms, medications and procedures mentioned in a chart.
    pub async fn generate_analysis(&self, chart_text: &str) -> Result<AnalysisResult, CodingError> {
        let prompt = self.render(TemplateKind::SectionalAnalysis, chart_text)?;
        let value = self
            .call_model("Analysis", prompt, Some(sectional_analysis_schema()))
            .await?;
        let object = expect_object(&value)?;
        let keys = AnalysisSection::ALL.map(|section| section.key());
        require_any_section(object, &keys)?;
        Ok(map_analysis(object))
    }

    /// Explanation for a set of selected codes.
    ///
    /// Errors only when both lists are empty. Any later failure yields a
    /// result where every supplied code maps to `"Error"`.
    pub async fn generate_rationale(
        &self,
        cpt_codes: &[SelectedCode],
        icd_codes: &[SelectedCode],
    ) -> Result<RationaleResult, CodingError> {
        if cpt_codes.is_empty() && icd_codes.is_empty() {
            return Err(CodingError::InvalidInput(
                "At least one code is required".to_string(),
            ));
        }

        let prompt = match rationale_prompt(cpt_codes, icd_codes) {
            Ok(prompt) => prompt,
            Err(err) => {
                tracing::warn!("Failed to build rationale prompt: {}", err);
                return Ok(rationale_fallback(cpt_codes, icd_codes));
            }
        };

        let mapped = self
            .call_model("Rationale", prompt, None)
            .await
            .and_then(|value| {
                map_rationale(&value).ok_or_else(|| {
                    CodingError::UnparsableResponse(
                        "Invalid response format: expected a JSON object".to_string(),
                    )
                })
            });

        match mapped {
            Ok(result) => Ok(result),
            Err(err) => {
                tracing::warn!("Rationale generation failed, returning fallback: {}", err);
                Ok(rationale_fallback(cpt_codes, icd_codes))
            }
        }
    }

    /// Coding alerts for a chart; empty on any failure.
    pub async fn generate_alerts(&self, chart_text: &str) -> Vec<String> {
        match self.try_generate_alerts(chart_text).await {
            Ok(alerts) => alerts,
            Err(err) => {
                tracing::warn!("Alert generation failed, returning no alerts: {}", err);
                Vec::new()
            }
        }
    }

    async fn try_generate_alerts(&self, chart_text: &str) -> Result<Vec<String>, CodingError> {
        let prompt = self.render(TemplateKind::CodingAlerts, chart_text)?;
        let value = self
            .call_model("Alerts", prompt, Some(alerts_schema()))
            .await?;
        let object = expect_object(&value)?;
        let alerts = match object.get("alerts") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        Ok(alerts)
    }

    fn render(&self, kind: TemplateKind, chart_text: &str) -> Result<String, CodingError> {
        let template = self.templates.get(kind)?;
        if chart_text.trim().is_empty() {
            return Err(CodingError::InvalidInput("Chart text is required".to_string()));
        }
        Ok(template.render(chart_text))
    }

    /// One remote round-trip followed by recovery and parsing.
    async fn call_model(
        &self,
        label: &str,
        prompt: String,
        schema: Option<Value>,
    ) -> Result<Value, CodingError> {
        tracing::info!("Making model call for {} using {}", label, self.model);
        tracing::debug!("Prompt text: {}...", truncate_str(&prompt, LOG_PREVIEW_CHARS));

        let mut request = ModelRequest::new(&self.model, prompt, self.generation);
        if let Some(schema) = schema {
            request = request.with_schema(schema);
        }

        let raw = self.generator.generate(&request).await.map_err(|err| {
            tracing::error!("Error in model call ({}): {:#}", label, err);
            CodingError::remote(err)
        })?;
        tracing::debug!("Raw model response: {}", truncate_str(&raw, LOG_PREVIEW_CHARS));

        let cleaned = recover(&raw);
        tracing::debug!("Cleaned JSON text: {}", truncate_str(&cleaned, LOG_PREVIEW_CHARS));

        parse_recovered(&cleaned).inspect_err(|err| {
            tracing::error!("Unusable response for {}: {}", label, err);
        })
    }
}

fn expect_object(value: &Value) -> Result<&Map<String, Value>, CodingError> {
    value.as_object().ok_or_else(|| {
        CodingError::UnparsableResponse(format!(
            "Invalid response format: expected a JSON object, got {}",
            json_kind(value)
        ))
    })
}

/// An object carrying none of the expected keys is some other payload (often
/// an element recovered out of a top-level array), not an empty result.
fn require_any_section(object: &Map<String, Value>, keys: &[&str]) -> Result<(), CodingError> {
    if keys.iter().any(|key| object.contains_key(*key)) {
        return Ok(());
    }
    Err(CodingError::UnparsableResponse(format!(
        "Invalid response format: expected at least one of {}",
        keys.join(", ")
    )))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn record_skip(
    skipped: &mut Vec<SkippedItem>,
    section: &'static str,
    index: Option<usize>,
    reason: String,
) {
    match index {
        Some(i) => tracing::warn!("Error processing {} item {}: {}", section, i, reason),
        None => tracing::warn!("Invalid {} format: {}", section, reason),
    }
    skipped.push(SkippedItem {
        section,
        index,
        reason,
    });
}

/// Deserialize each element of `object[key]` and map it, dropping (and
/// recording) elements that don't fit. A missing or null section is empty;
/// a non-array section is empty and recorded once.
fn map_section<T, U>(
    object: &Map<String, Value>,
    key: &'static str,
    skipped: &mut Vec<SkippedItem>,
    mut map: impl FnMut(usize, T) -> U,
) -> Vec<U>
where
    T: DeserializeOwned,
{
    let items = match object.get(key) {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => {
            record_skip(
                skipped,
                key,
                None,
                format!("expected an array, got {}", json_kind(other)),
            );
            return Vec::new();
        }
    };

    let mut mapped = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match T::deserialize(item) {
            Ok(parsed) => mapped.push(map(index, parsed)),
            Err(err) => record_skip(skipped, key, Some(index), err.to_string()),
        }
    }
    mapped
}

/// IDs come from each element's position in the response, so they are only
/// stable within one response.
fn map_suggestions(object: &Map<String, Value>) -> SuggestionResult {
    let mut skipped = Vec::new();

    let cpt_codes = map_section(object, "suggestedCpt", &mut skipped, |index, cpt: ConfidentCpt| {
        CptSuggestion {
            id: format!("cpt-ai-{}", index + 1),
            code: cpt.code,
            description: String::new(),
            unit: cpt.units,
            modifiers: cpt.modifiers.join(","),
            rationale: cpt.rationale,
            related_link: CPT_RELATED_LINK.to_string(),
            aapc_guidance: CPT_AAPC_GUIDANCE.to_string(),
        }
    });

    let icd_codes = map_section(object, "suggestedIcd", &mut skipped, |index, icd: ConfidentIcd| {
        IcdSuggestion {
            id: format!("icd-ai-{}", index + 1),
            code: icd.code,
            description: String::new(),
            rationale: icd.rationale,
            related_series_codes: Vec::new(),
        }
    });

    SuggestionResult {
        cpt_codes,
        icd_codes,
        skipped,
    }
}

fn map_analysis(object: &Map<String, Value>) -> AnalysisResult {
    let mut analysis = AnalysisResult::default();
    for section in AnalysisSection::ALL {
        let entries = map_section(
            object,
            section.key(),
            &mut analysis.skipped,
            |_, mention: AnalysisMention| AnalysisEntry {
                code: mention
                    .related_codes
                    .and_then(|codes| codes.into_iter().next()),
                description: mention.text_mention.unwrap_or_default(),
                rationale: mention.rationale.unwrap_or_default(),
            },
        );
        *analysis.section_mut(section) = entries;
    }
    analysis
}

/// `None` when the response is not an object.
fn map_rationale(value: &Value) -> Option<RationaleResult> {
    let object = value.as_object()?;

    let overall_rationale = match object.get("overallRationale") {
        Some(Value::String(text)) => text.clone(),
        _ => RATIONALE_MISSING_OVERALL.to_string(),
    };
    let code_rationales = object.get("codeRationales");

    Some(RationaleResult {
        overall_rationale,
        code_rationales: CodeRationales {
            cpt: rationale_map(code_rationales.and_then(|c| c.get("cpt"))),
            icd: rationale_map(code_rationales.and_then(|c| c.get("icd"))),
        },
    })
}

fn rationale_map(value: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Object(entries)) = value else {
        return BTreeMap::new();
    };
    entries
        .iter()
        .map(|(code, text)| {
            let text = match text {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (code.clone(), text)
        })
        .collect()
}

fn rationale_fallback(cpt_codes: &[SelectedCode], icd_codes: &[SelectedCode]) -> RationaleResult {
    let errors = |codes: &[SelectedCode]| {
        codes
            .iter()
            .map(|code| (code.code.clone(), RATIONALE_ERROR.to_string()))
            .collect()
    };
    RationaleResult {
        overall_rationale: RATIONALE_ERROR_OVERALL.to_string(),
        code_rationales: CodeRationales {
            cpt: errors(cpt_codes),
            icd: errors(icd_codes),
        },
    }
}

//! Result shapes handed to callers, and the model-side shapes they are mapped from.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ═══════════════════════════════════════════════════════════════════════════
//  CALLER-FACING RESULTS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IcdSuggestion {
    pub id: String,
    pub code: String,
    pub description: String,
    pub rationale: String,
    pub related_series_codes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CptSuggestion {
    pub id: String,
    pub code: String,
    pub description: String,
    pub unit: String,
    /// Comma-joined modifier list, e.g. `"25,59"`
    pub modifiers: String,
    pub rationale: String,
    pub related_link: String,
    pub aapc_guidance: String,
}

/// Confident-code suggestions for one chart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionResult {
    pub cpt_codes: Vec<CptSuggestion>,
    pub icd_codes: Vec<IcdSuggestion>,
    /// Response elements dropped during mapping.
    #[serde(skip)]
    pub skipped: Vec<SkippedItem>,
}

/// One mention in the sectional analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisEntry {
    /// First related code, if the model linked any
    pub code: Option<String>,
    pub description: String,
    pub rationale: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub symptoms: Vec<AnalysisEntry>,
    pub diagnoses: Vec<AnalysisEntry>,
    pub medications: Vec<AnalysisEntry>,
    pub procedures: Vec<AnalysisEntry>,
    #[serde(skip)]
    pub skipped: Vec<SkippedItem>,
}

impl AnalysisResult {
    pub(crate) fn section_mut(&mut self, section: AnalysisSection) -> &mut Vec<AnalysisEntry> {
        match section {
            AnalysisSection::Symptoms => &mut self.symptoms,
            AnalysisSection::Diagnoses => &mut self.diagnoses,
            AnalysisSection::Medications => &mut self.medications,
            AnalysisSection::Procedures => &mut self.procedures,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisSection {
    Symptoms,
    Diagnoses,
    Medications,
    Procedures,
}

impl AnalysisSection {
    pub const ALL: [AnalysisSection; 4] = [
        AnalysisSection::Symptoms,
        AnalysisSection::Diagnoses,
        AnalysisSection::Medications,
        AnalysisSection::Procedures,
    ];

    /// Key used in both the model response and the result JSON
    pub fn key(&self) -> &'static str {
        match self {
            AnalysisSection::Symptoms => "symptoms",
            AnalysisSection::Diagnoses => "diagnoses",
            AnalysisSection::Medications => "medications",
            AnalysisSection::Procedures => "procedures",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRationales {
    pub cpt: BTreeMap<String, String>,
    pub icd: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RationaleResult {
    pub overall_rationale: String,
    pub code_rationales: CodeRationales,
}

/// A response element that could not be mapped and was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    /// Response key the element came from (`suggestedIcd`, `symptoms`, ...)
    pub section: &'static str,
    /// Zero-based position in that array; `None` when the whole section was unusable
    pub index: Option<usize>,
    pub reason: String,
}

/// A code the caller has selected, as sent for rationale generation.
///
/// Only `code` is required; any other fields ride along into the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedCode {
    pub code: String,
    #[serde(flatten)]
    pub details: serde_json::Map<String, Value>,
}

impl SelectedCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            details: serde_json::Map::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  MODEL-SIDE SHAPES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub(crate) struct ConfidentIcd {
    pub code: String,
    pub rationale: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConfidentCpt {
    pub code: String,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub units: String,
    pub rationale: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnalysisMention {
    #[serde(default)]
    pub text_mention: Option<String>,
    #[serde(default)]
    pub related_codes: Option<Vec<String>>,
    #[serde(default)]
    pub rationale: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

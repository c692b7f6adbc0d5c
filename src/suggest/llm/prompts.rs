use crate::suggest::error::CodingError;
use crate::suggest::types::SelectedCode;
use std::fs;
use std::path::Path;

/// Substitution slot every chart template must contain.
pub const EMR_TEXT_PLACEHOLDER: &str = "{emr_text}";

/// The three named template resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    ConfidentCodes,
    SectionalAnalysis,
    CodingAlerts,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 3] = [
        TemplateKind::ConfidentCodes,
        TemplateKind::SectionalAnalysis,
        TemplateKind::CodingAlerts,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            TemplateKind::ConfidentCodes => "confident_codes.txt",
            TemplateKind::SectionalAnalysis => "sectional_analysis.txt",
            TemplateKind::CodingAlerts => "coding_alerts.txt",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TemplateKind::ConfidentCodes => "confident codes",
            TemplateKind::SectionalAnalysis => "sectional analysis",
            TemplateKind::CodingAlerts => "coding alerts",
        }
    }
}

/// Immutable prompt text with an `{emr_text}` slot.
///
/// `{{` and `}}` render as literal braces so templates can show JSON examples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn parse(text: impl Into<String>) -> Result<Self, String> {
        let text = text.into();
        let (_, slots) = substitute(&text, "");
        if slots == 0 {
            return Err(format!("template has no {} placeholder", EMR_TEXT_PLACEHOLDER));
        }
        Ok(Self { text })
    }

    pub fn render(&self, emr_text: &str) -> String {
        substitute(&self.text, emr_text).0
    }
}

/// Render `template`, returning the text and how many slots were filled.
fn substitute(template: &str, emr_text: &str) -> (String, usize) {
    let mut out = String::with_capacity(template.len() + emr_text.len());
    let mut slots = 0;
    let mut rest = template;

    while let Some(ch) = rest.chars().next() {
        if let Some(after) = rest.strip_prefix(EMR_TEXT_PLACEHOLDER) {
            out.push_str(emr_text);
            slots += 1;
            rest = after;
        } else if let Some(after) = rest.strip_prefix("{{") {
            out.push('{');
            rest = after;
        } else if let Some(after) = rest.strip_prefix("}}") {
            out.push('}');
            rest = after;
        } else {
            out.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
    }

    (out, slots)
}

/// Templates loaded once at startup. A slot that failed to load keeps the
/// failure message so later operations can report it.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    confident_codes: Result<PromptTemplate, String>,
    sectional_analysis: Result<PromptTemplate, String>,
    coding_alerts: Result<PromptTemplate, String>,
}

impl PromptTemplates {
    /// Read all three templates from `dir`. Never fails as a whole.
    pub fn load(dir: &Path) -> Self {
        Self {
            confident_codes: load_template(dir, TemplateKind::ConfidentCodes),
            sectional_analysis: load_template(dir, TemplateKind::SectionalAnalysis),
            coding_alerts: load_template(dir, TemplateKind::CodingAlerts),
        }
    }

    pub fn from_parts(
        confident_codes: Result<PromptTemplate, String>,
        sectional_analysis: Result<PromptTemplate, String>,
        coding_alerts: Result<PromptTemplate, String>,
    ) -> Self {
        Self {
            confident_codes,
            sectional_analysis,
            coding_alerts,
        }
    }

    fn slot(&self, kind: TemplateKind) -> &Result<PromptTemplate, String> {
        match kind {
            TemplateKind::ConfidentCodes => &self.confident_codes,
            TemplateKind::SectionalAnalysis => &self.sectional_analysis,
            TemplateKind::CodingAlerts => &self.coding_alerts,
        }
    }

    pub fn get(&self, kind: TemplateKind) -> Result<&PromptTemplate, CodingError> {
        self.slot(kind).as_ref().map_err(|reason| {
            CodingError::Configuration(format!("{} template not loaded: {}", kind.label(), reason))
        })
    }

    /// Every template that failed to load, with its reason.
    pub fn load_errors(&self) -> Vec<(TemplateKind, &str)> {
        TemplateKind::ALL
            .into_iter()
            .filter_map(|kind| match self.slot(kind) {
                Ok(_) => None,
                Err(reason) => Some((kind, reason.as_str())),
            })
            .collect()
    }
}

fn load_template(dir: &Path, kind: TemplateKind) -> Result<PromptTemplate, String> {
    let path = dir.join(kind.file_name());
    let text = fs::read_to_string(&path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    PromptTemplate::parse(text).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Free-text rationale prompt embedding both code lists as JSON.
pub fn rationale_prompt(
    cpt_codes: &[SelectedCode],
    icd_codes: &[SelectedCode],
) -> Result<String, serde_json::Error> {
    let cpt = serde_json::to_string_pretty(cpt_codes)?;
    let icd = serde_json::to_string_pretty(icd_codes)?;
    Ok(format!(
        r#"Analyze the following selected codes and provide a comprehensive coding rationale:

CPT Codes:
{cpt}

ICD Codes:
{icd}

Please provide your analysis in the following JSON format:
{{
    "overallRationale": "Overall explanation of code selection",
    "codeRationales": {{
        "cpt": {{
            "code": "Rationale for this code"
        }},
        "icd": {{
            "code": "Rationale for this code"
        }}
    }}
}}"#
    ))
}

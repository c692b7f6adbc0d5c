use super::error::CodingError;
use super::llm::client::TextGenerator;
use super::llm::models::{GenerationConfig, ModelRequest};
use super::llm::prompts::{PromptTemplate, PromptTemplates};
use super::types::SelectedCode;
use super::CodingAssistant;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

type Reply = Box<dyn Fn(&ModelRequest) -> anyhow::Result<String> + Send + Sync>;

/// Stands in for the remote model: answers from a closure and records every request.
struct ScriptedGenerator {
    reply: Reply,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedGenerator {
    fn new(reply: impl Fn(&ModelRequest) -> anyhow::Result<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            reply: Box::new(reply),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn answering(text: &'static str) -> Arc<Self> {
        Self::new(move |_| Ok(text.to_string()))
    }

    fn failing(message: &'static str) -> Arc<Self> {
        Self::new(move |_| Err(anyhow::anyhow!(message)))
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> ModelRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &ModelRequest) -> anyhow::Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        tokio::task::yield_now().await;
        (self.reply)(request)
    }
}

fn templates() -> PromptTemplates {
    PromptTemplates::from_parts(
        PromptTemplate::parse("Suggest codes for:\n{emr_text}"),
        PromptTemplate::parse("Analyze sections of:\n{emr_text}"),
        PromptTemplate::parse("List alerts for:\n{emr_text}"),
    )
}

fn assistant(generator: Arc<ScriptedGenerator>) -> CodingAssistant {
    CodingAssistant::new(generator, templates(), "test-model", GenerationConfig::default())
}

const CHART: &str = "Patient presents with elevated blood pressure 150/95.";

// ═══════════════════════════════════════════════════════════════════════════
//  SUGGESTIONS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_suggestions_map_icd_codes() {
    let generator = ScriptedGenerator::answering(
        r#"{"suggestedIcd":[{"code":"I10","rationale":"BP 150/95"}],"suggestedCpt":[]}"#,
    );
    let result = assistant(generator.clone())
        .generate_suggestions(CHART)
        .await
        .unwrap();

    assert_eq!(result.icd_codes.len(), 1);
    let icd = &result.icd_codes[0];
    assert_eq!(icd.id, "icd-ai-1");
    assert_eq!(icd.code, "I10");
    assert_eq!(icd.description, "");
    assert_eq!(icd.rationale, "BP 150/95");
    assert!(icd.related_series_codes.is_empty());
    assert!(result.cpt_codes.is_empty());
    assert!(result.skipped.is_empty());

    let request = generator.last_request();
    assert_eq!(request.model, "test-model");
    assert!(request.prompt.contains(CHART));
    assert!(request.response_schema.is_some());
}

#[tokio::test]
async fn test_suggestions_map_cpt_codes() {
    let generator = ScriptedGenerator::answering(
        r#"{"suggestedIcd":[],"suggestedCpt":[
            {"code":"99213","modifiers":["25","59"],"units":"1","rationale":"Office visit"},
            {"code":"96372","units":2,"rationale":"Injection"}
        ]}"#,
    );
    let result = assistant(generator).generate_suggestions(CHART).await.unwrap();

    assert_eq!(result.cpt_codes.len(), 2);
    let visit = &result.cpt_codes[0];
    assert_eq!(visit.id, "cpt-ai-1");
    assert_eq!(visit.modifiers, "25,59");
    assert_eq!(visit.unit, "1");
    assert_eq!(visit.related_link, "#");
    assert_eq!(visit.aapc_guidance, "Verify documentation");

    let injection = &result.cpt_codes[1];
    assert_eq!(injection.id, "cpt-ai-2");
    assert_eq!(injection.modifiers, "");
    assert_eq!(injection.unit, "2");
}

#[tokio::test]
async fn test_malformed_item_is_skipped_and_ids_keep_positions() {
    let generator = ScriptedGenerator::answering(
        r#"{"suggestedIcd":[
            {"code":"I10","rationale":"a"},
            {"code":"E11.9"},
            {"code":"J45.909","rationale":"c"}
        ]}"#,
    );
    let result = assistant(generator).generate_suggestions(CHART).await.unwrap();

    let ids: Vec<&str> = result.icd_codes.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["icd-ai-1", "icd-ai-3"]);
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].section, "suggestedIcd");
    assert_eq!(result.skipped[0].index, Some(1));
    assert!(result.cpt_codes.is_empty());
}

#[tokio::test]
async fn test_non_array_section_is_recorded() {
    let generator =
        ScriptedGenerator::answering(r#"{"suggestedIcd":"I10","suggestedCpt":null}"#);
    let result = assistant(generator).generate_suggestions(CHART).await.unwrap();

    assert!(result.icd_codes.is_empty());
    assert!(result.cpt_codes.is_empty());
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].index, None);
}

#[tokio::test]
async fn test_suggestions_accept_fenced_response() {
    let generator = ScriptedGenerator::answering(
        "Here are the codes:\n```json\n{\"suggestedIcd\":[{\"code\":\"I10\",\"rationale\":\"r\"}]}\n```\nDone.",
    );
    let result = assistant(generator).generate_suggestions(CHART).await.unwrap();
    assert_eq!(result.icd_codes[0].code, "I10");
}

#[tokio::test]
async fn test_truncated_suggestions_are_salvaged() {
    let generator = ScriptedGenerator::answering(
        r#"{"suggestedCpt":[],"suggestedIcd":[{"code":"I10","rationale":"a"},{"code":"E11.9","rationale":"b"},{"code":"J45"#,
    );
    let result = assistant(generator).generate_suggestions(CHART).await.unwrap();
    let codes: Vec<&str> = result.icd_codes.iter().map(|c| c.code.as_str()).collect();
    assert_eq!(codes, vec!["I10", "E11.9"]);
}

#[tokio::test]
async fn test_missing_template_fails_without_remote_call() {
    let generator = ScriptedGenerator::answering(r#"{"diagnoses":[]}"#);
    let templates = PromptTemplates::from_parts(
        Err("failed to read prompts/confident_codes.txt".to_string()),
        PromptTemplate::parse("{emr_text}"),
        PromptTemplate::parse("{emr_text}"),
    );
    let assistant = CodingAssistant::new(
        generator.clone(),
        templates,
        "test-model",
        GenerationConfig::default(),
    );

    let err = assistant.generate_suggestions(CHART).await.unwrap_err();
    assert!(matches!(err, CodingError::Configuration(_)));
    assert_eq!(generator.calls(), 0);

    // Other templates are unaffected
    assert!(assistant.generate_analysis(CHART).await.is_ok());
}

#[tokio::test]
async fn test_empty_chart_is_rejected() {
    let generator = ScriptedGenerator::answering("{}");
    let err = assistant(generator.clone())
        .generate_suggestions("   \n")
        .await
        .unwrap_err();
    assert_eq!(err, CodingError::InvalidInput("Chart text is required".into()));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_remote_failure_surfaces() {
    let generator = ScriptedGenerator::failing("Gemini quota or rate limit exceeded");
    let err = assistant(generator).generate_suggestions(CHART).await.unwrap_err();
    assert_eq!(err.kind(), "remote_call");
    assert!(err.to_string().contains("quota"));
}

#[tokio::test]
async fn test_garbage_response_is_unparsable() {
    let generator = ScriptedGenerator::answering("I cannot help with that request.");
    let err = assistant(generator).generate_suggestions(CHART).await.unwrap_err();
    assert!(matches!(err, CodingError::UnparsableResponse(_)));
}

#[tokio::test]
async fn test_suggestions_reject_object_without_code_lists() {
    let generator =
        ScriptedGenerator::answering(r#"[{"code":"I10","rationale":"BP 150/95"}]"#);
    let err = assistant(generator).generate_suggestions(CHART).await.unwrap_err();
    assert!(matches!(err, CodingError::UnparsableResponse(_)));
    assert!(err.to_string().contains("suggestedIcd"));
}

#[tokio::test]
async fn test_empty_response_is_unparsable() {
    let generator = ScriptedGenerator::answering("");
    let err = assistant(generator).generate_suggestions(CHART).await.unwrap_err();
    assert!(matches!(err, CodingError::UnparsableResponse(_)));
}

// ═══════════════════════════════════════════════════════════════════════════
//  ANALYSIS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_analysis_maps_sections() {
    let generator = ScriptedGenerator::answering(
        r#"{
            "diagnoses":[{"text_mention":"hypertension","related_codes":["I10","I11.9"],"rationale":"BP","source_snippet":"150/95"}],
            "symptoms":[{"text_mention":"headache","related_codes":[],"rationale":"reported"}],
            "medications":[{"text_mention":"lisinopril","rationale":"prescribed"}]
        }"#,
    );
    let analysis = assistant(generator).generate_analysis(CHART).await.unwrap();

    assert_eq!(analysis.diagnoses.len(), 1);
    assert_eq!(analysis.diagnoses[0].code.as_deref(), Some("I10"));
    assert_eq!(analysis.diagnoses[0].description, "hypertension");
    assert_eq!(analysis.symptoms[0].code, None);
    assert_eq!(analysis.medications[0].code, None);
    assert_eq!(analysis.medications[0].rationale, "prescribed");
    assert!(analysis.procedures.is_empty());
    assert!(analysis.skipped.is_empty());
}

#[tokio::test]
async fn test_analysis_rejects_top_level_array() {
    let generator = ScriptedGenerator::answering(r#"["cough", "fever"]"#);
    let err = assistant(generator).generate_analysis(CHART).await.unwrap_err();
    assert!(matches!(err, CodingError::UnparsableResponse(_)));
}

#[tokio::test]
async fn test_analysis_rejects_array_of_mentions() {
    // The longest object inside the array is a bare mention, not an analysis
    let generator = ScriptedGenerator::answering(r#"[{"text_mention":"cough"}]"#);
    let err = assistant(generator).generate_analysis(CHART).await.unwrap_err();
    assert!(matches!(err, CodingError::UnparsableResponse(_)));
    assert!(err.to_string().contains("symptoms"));
}

#[tokio::test]
async fn test_analysis_accepts_single_known_section() {
    let generator = ScriptedGenerator::answering(r#"{"procedures":[]}"#);
    let analysis = assistant(generator).generate_analysis(CHART).await.unwrap();
    assert!(analysis.procedures.is_empty());
    assert!(analysis.skipped.is_empty());
}

#[tokio::test]
async fn test_analysis_skips_non_object_mentions() {
    let generator = ScriptedGenerator::answering(
        r#"{"symptoms":["cough",{"text_mention":"fever","rationale":"temp 101"}],"procedures":{"x":1}}"#,
    );
    let analysis = assistant(generator).generate_analysis(CHART).await.unwrap();

    assert_eq!(analysis.symptoms.len(), 1);
    assert_eq!(analysis.symptoms[0].description, "fever");
    assert!(analysis.procedures.is_empty());
    let sections: Vec<&str> = analysis.skipped.iter().map(|s| s.section).collect();
    assert_eq!(sections, vec!["symptoms", "procedures"]);
}

// ═══════════════════════════════════════════════════════════════════════════
//  RATIONALE
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_rationale_requires_codes() {
    let generator = ScriptedGenerator::answering("{}");
    let err = assistant(generator.clone())
        .generate_rationale(&[], &[])
        .await
        .unwrap_err();
    assert_eq!(err, CodingError::InvalidInput("At least one code is required".into()));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_rationale_maps_response_without_schema() {
    let generator = ScriptedGenerator::answering(
        r#"{"overallRationale":"Visit supports hypertension management",
            "codeRationales":{"cpt":{"99213":"Established patient"},"icd":{"I10":"Documented BP","E11.9":3}}}"#,
    );
    let result = assistant(generator.clone())
        .generate_rationale(&[SelectedCode::new("99213")], &[SelectedCode::new("I10")])
        .await
        .unwrap();

    assert_eq!(result.overall_rationale, "Visit supports hypertension management");
    assert_eq!(result.code_rationales.cpt["99213"], "Established patient");
    assert_eq!(result.code_rationales.icd["I10"], "Documented BP");
    assert_eq!(result.code_rationales.icd["E11.9"], "3");

    let request = generator.last_request();
    assert!(request.response_schema.is_none());
    assert!(request.prompt.contains("99213"));
}

#[tokio::test]
async fn test_rationale_defaults_missing_overall() {
    let generator = ScriptedGenerator::answering(r#"{"codeRationales":{}}"#);
    let result = assistant(generator)
        .generate_rationale(&[], &[SelectedCode::new("I10")])
        .await
        .unwrap();
    assert_eq!(result.overall_rationale, "No overall rationale provided");
    assert!(result.code_rationales.icd.is_empty());
}

#[tokio::test]
async fn test_rationale_falls_back_on_remote_failure() {
    let generator = ScriptedGenerator::failing("connection reset");
    let result = assistant(generator)
        .generate_rationale(
            &[SelectedCode::new("99213"), SelectedCode::new("96372")],
            &[SelectedCode::new("I10")],
        )
        .await
        .unwrap();

    assert_eq!(result.overall_rationale, "Error generating rationale");
    assert_eq!(result.code_rationales.cpt.len(), 2);
    assert_eq!(result.code_rationales.cpt["96372"], "Error");
    assert_eq!(result.code_rationales.icd["I10"], "Error");
}

#[tokio::test]
async fn test_rationale_falls_back_on_unparsable_response() {
    let generator = ScriptedGenerator::answering("not json at all");
    let result = assistant(generator)
        .generate_rationale(&[SelectedCode::new("99213")], &[])
        .await
        .unwrap();
    assert_eq!(result.overall_rationale, "Error generating rationale");
    assert_eq!(result.code_rationales.cpt["99213"], "Error");
    assert!(result.code_rationales.icd.is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
//  ALERTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_alerts_keep_string_items() {
    let generator = ScriptedGenerator::answering(
        r#"{"alerts":["Laterality not documented",42,"Missing time for E/M"]}"#,
    );
    let alerts = assistant(generator).generate_alerts(CHART).await;
    assert_eq!(
        alerts,
        vec!["Laterality not documented", "Missing time for E/M"]
    );
}

#[tokio::test]
async fn test_alerts_are_empty_on_any_failure() {
    assert!(assistant(ScriptedGenerator::failing("timeout"))
        .generate_alerts(CHART)
        .await
        .is_empty());
    assert!(assistant(ScriptedGenerator::answering("garbage"))
        .generate_alerts(CHART)
        .await
        .is_empty());
    assert!(assistant(ScriptedGenerator::answering("{}"))
        .generate_alerts("")
        .await
        .is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONCURRENCY
// ═══════════════════════════════════════════════════════════════════════════

/// Code named after `CODE:` in the chart embedded in a prompt.
fn chart_code(prompt: &str) -> String {
    prompt
        .split("CODE:")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or("NONE")
        .to_string()
}

#[tokio::test]
async fn test_concurrent_operations_keep_their_own_inputs() {
    let generator = ScriptedGenerator::new(|request| {
        let code = chart_code(&request.prompt);
        let reply = if request.prompt.starts_with("Suggest") {
            format!(r#"{{"suggestedIcd":[{{"code":"{code}","rationale":"r"}}]}}"#)
        } else if request.prompt.starts_with("Analyze") {
            format!(r#"{{"diagnoses":[{{"text_mention":"dx","related_codes":["{code}"],"rationale":"r"}}]}}"#)
        } else {
            format!(r#"{{"alerts":["Check {code}"]}}"#)
        };
        Ok(reply)
    });
    let assistant = assistant(generator.clone());

    let (hypertension, diabetes, asthma, alerts) = tokio::join!(
        assistant.generate_suggestions("Elevated BP. CODE:I10 follow up"),
        assistant.generate_suggestions("A1c 8.1%. CODE:E11.9 diet counseling"),
        assistant.generate_analysis("Wheezing. CODE:J45.909 inhaler refilled"),
        assistant.generate_alerts("Injection given. CODE:96372 site not documented"),
    );

    assert_eq!(hypertension.unwrap().icd_codes[0].code, "I10");
    assert_eq!(diabetes.unwrap().icd_codes[0].code, "E11.9");
    assert_eq!(asthma.unwrap().diagnoses[0].code.as_deref(), Some("J45.909"));
    assert_eq!(alerts, vec!["Check 96372"]);
    assert_eq!(generator.calls(), 4);
}

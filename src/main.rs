use anyhow::{Context, Result};
use chart_coder::catalog;
use chart_coder::config::{self, Config, API_KEY_ENV};
use chart_coder::suggest::llm::{GeminiClient, PromptTemplates};
use chart_coder::suggest::types::SelectedCode;
use chart_coder::CodingAssistant;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Env var holding the tracing filter directive
const LOG_ENV: &str = "CHART_CODER_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "chart-coder",
    about = "CPT/ICD coding suggestions for clinical charts",
    version
)]
struct Args {
    /// Log debug output (prompt and response previews) to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Suggest confident ICD and CPT codes for a chart
    Suggest(ChartInput),
    /// Break a chart into symptoms, diagnoses, medications and procedures
    Analyze(ChartInput),
    /// List coding alerts for a chart
    Alerts(ChartInput),
    /// Explain a set of selected codes
    Rationale {
        /// JSON file with {"cptCodes": [...], "icdCodes": [...]}
        #[arg(long)]
        codes: PathBuf,
    },
    /// Search the built-in ICD-10 catalog
    SearchIcd { query: String },
    /// Search the built-in CPT catalog
    SearchCpt { query: String },
    /// Store the Gemini API key
    Setup,
}

#[derive(clap::Args, Debug)]
struct ChartInput {
    /// Read chart text from a file instead of stdin
    #[arg(short, long)]
    file: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct SelectedCodes {
    cpt_codes: Vec<SelectedCode>,
    icd_codes: Vec<SelectedCode>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(err) = run(args.command).await {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Suggest(input) => {
            let chart = read_chart(&input)?;
            let result = build_assistant()?.generate_suggestions(&chart).await?;
            print_json(&result)
        }
        Command::Analyze(input) => {
            let chart = read_chart(&input)?;
            let result = build_assistant()?.generate_analysis(&chart).await?;
            print_json(&result)
        }
        Command::Alerts(input) => {
            let chart = read_chart(&input)?;
            let alerts = build_assistant()?.generate_alerts(&chart).await;
            print_json(&alerts)
        }
        Command::Rationale { codes } => {
            let selected = read_selected_codes(&codes)?;
            let result = build_assistant()?
                .generate_rationale(&selected.cpt_codes, &selected.icd_codes)
                .await?;
            print_json(&result)
        }
        Command::SearchIcd { query } => print_json(&catalog::search_icd(&query)?),
        Command::SearchCpt { query } => print_json(&catalog::search_cpt(&query)?),
        Command::Setup => {
            config::setup_api_key_interactive().map_err(anyhow::Error::msg)?;
            Ok(())
        }
    }
}

fn build_assistant() -> Result<CodingAssistant> {
    let config = Config::load();
    let api_key = config.api_key().with_context(|| {
        format!(
            "No Gemini API key configured. Run 'chart-coder setup' or set {}.",
            API_KEY_ENV
        )
    })?;

    let client = GeminiClient::new(api_key, config.request_timeout_secs)?;
    let templates = PromptTemplates::load(&config.prompts_dir);
    tracing::debug!(
        "Using model {} with prompts from {}",
        config.model,
        config.prompts_dir.display()
    );

    Ok(CodingAssistant::new(
        Arc::new(client),
        templates,
        config.model.clone(),
        config.generation_config(),
    ))
}

fn read_chart(input: &ChartInput) -> Result<String> {
    match &input.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read chart file {}", path.display())),
        None => {
            let mut chart = String::new();
            io::stdin()
                .read_to_string(&mut chart)
                .context("Failed to read chart text from stdin")?;
            Ok(chart)
        }
    }
}

fn read_selected_codes(path: &Path) -> Result<SelectedCodes> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read codes file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid codes file {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

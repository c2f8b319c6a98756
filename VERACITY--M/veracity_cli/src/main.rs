use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::{JsonLogger, LogLevel, LogRecord};
use tokio::runtime::Runtime;
use veracity_analysis::{
    AnalysisConfig, AnalysisError, AnalysisResult, AnalysisRuntime, AnalysisTelemetry, Verdict,
};

#[derive(Parser, Debug)]
#[command(name = "veracity", version, about = "Misinformation analysis assistant")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyzes one piece of text.
    Analyze(AnalyzeArgs),
    /// Runs every case of a JSON suite and reports a tally.
    Batch(BatchArgs),
    /// Reports whether the configuration is ready for deployment.
    Check {
        /// TOML configuration file; environment values override it.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct RuntimeArgs {
    /// TOML configuration file; environment values override it.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Skips the generative model and uses the deterministic pipeline only.
    #[arg(long)]
    offline: bool,
    /// Appends JSON log lines to this file instead of stderr.
    #[arg(long)]
    log_path: Option<PathBuf>,
    /// Minimum level written to the log.
    #[arg(long, default_value = "warn", value_parser = parse_log_level)]
    log_level: LogLevel,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Text to analyze; read from stdin when neither --text nor --file is set.
    #[arg(long, conflicts_with = "file")]
    text: Option<String>,
    /// File holding the text to analyze.
    #[arg(long)]
    file: Option<PathBuf>,
    /// Prints the result as JSON.
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    runtime: RuntimeArgs,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// JSON array of `{ "name", "content" }` cases.
    #[arg(long)]
    file: PathBuf,
    /// Prints the outcomes as JSON.
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    runtime: RuntimeArgs,
}

#[derive(Debug, Clone, Deserialize)]
struct BatchCase {
    name: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct BatchOutcome {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl BatchOutcome {
    fn succeeded(&self) -> bool {
        self.result
            .as_ref()
            .is_some_and(|result| result.verdict != Verdict::Error)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze(args) => handle_analyze(args),
        Commands::Batch(args) => handle_batch(args),
        Commands::Check { config } => handle_check(config.as_deref()),
    }
}

fn handle_analyze(args: AnalyzeArgs) -> Result<()> {
    let content = match (args.text, &args.file) {
        (Some(text), _) => text,
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            buffer
        }
    };
    let analysis = build_runtime(&args.runtime)?;
    let runtime = Runtime::new()?;
    let result = match runtime.block_on(analysis.run_analysis(&content)) {
        Ok(result) => result,
        Err(AnalysisError::EmptyContent) => bail!("nothing to analyze: content is empty"),
        Err(err) => return Err(err.into()),
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_summary(&result));
    }
    Ok(())
}

fn handle_batch(args: BatchArgs) -> Result<()> {
    let cases = read_cases(&args.file)?;
    let analysis = build_runtime(&args.runtime)?;
    let runtime = Runtime::new()?;
    let total = cases.len();
    let mut outcomes = Vec::with_capacity(total);
    for (index, case) in cases.into_iter().enumerate() {
        let outcome = match runtime.block_on(analysis.run_analysis(&case.content)) {
            Ok(result) => BatchOutcome {
                name: case.name,
                result: Some(result),
                error: None,
            },
            Err(err) => BatchOutcome {
                name: case.name,
                result: None,
                error: Some(err.to_string()),
            },
        };
        if !args.json {
            println!("[{}/{total}] {}", index + 1, outcome_line(&outcome));
        }
        outcomes.push(outcome);
    }
    let passed = outcomes.iter().filter(|o| o.succeeded()).count();
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "passed": passed,
                "total": total,
                "cases": outcomes,
            }))?
        );
    } else {
        println!("{passed}/{total} analyses succeeded");
    }
    if let Some(path) = &args.runtime.log_path {
        log_cli_event(
            path,
            LogLevel::Info,
            "veracity.batch.complete",
            json!({ "passed": passed, "total": total }),
        )?;
    }
    if passed < total {
        bail!("{} of {total} analyses failed", total - passed);
    }
    Ok(())
}

fn handle_check(config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    if config.is_configured() {
        println!("mode: generative ({})", config.model);
    } else {
        println!("mode: fallback-only (GEMINI_API_KEY not set)");
    }
    println!("endpoint: {}", config.endpoint);
    println!("max claims: {}", config.max_claims);
    println!("timeout: {}s", config.timeout.as_secs());
    println!(
        "retrieval latency: {}ms + {}ms per entry",
        config.retrieval.request_latency_ms, config.retrieval.per_entry_latency_ms
    );
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => AnalysisConfig::from_env().context("invalid configuration in environment"),
    }
}

fn build_runtime(args: &RuntimeArgs) -> Result<AnalysisRuntime> {
    let config = load_config(args.config.as_deref())?;
    let mut telemetry = AnalysisTelemetry::builder("veracity").min_level(args.log_level);
    telemetry = match &args.log_path {
        Some(path) => telemetry.log_path(path),
        None => telemetry.stderr(true),
    };
    let mut builder = AnalysisRuntime::builder(config).telemetry(telemetry.build()?);
    if args.offline {
        builder = builder.without_model();
    }
    Ok(builder.build()?)
}

fn read_cases(path: &Path) -> Result<Vec<BatchCase>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let cases: Vec<BatchCase> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of cases", path.display()))?;
    if cases.is_empty() {
        bail!("{} contains no cases", path.display());
    }
    Ok(cases)
}

fn render_summary(result: &AnalysisResult) -> String {
    let mut out = format!(
        "Verdict: {}\nCredibility score: {:.2}\n\
         Claims analyzed: {} | Sources consulted: {}\n\n{}\n",
        result.verdict,
        result.credibility_score,
        result.claims_analyzed,
        result.sources_consulted,
        result.explanation
    );
    if !result.sources.is_empty() {
        out.push_str("\nSources:\n");
        for source in &result.sources {
            out.push_str(&format!(
                "  - {} <{}> credibility={} relevance={}\n",
                source.title, source.url, source.credibility, source.relevance
            ));
        }
    }
    out
}

fn outcome_line(outcome: &BatchOutcome) -> String {
    match (&outcome.result, &outcome.error) {
        (Some(result), _) => format!(
            "{}: {} (score {:.2}, {} claims)",
            outcome.name, result.verdict, result.credibility_score, result.claims_analyzed
        ),
        (None, Some(error)) => format!("{}: failed: {error}", outcome.name),
        (None, None) => format!("{}: no result", outcome.name),
    }
}

fn log_cli_event(
    path: &Path,
    level: LogLevel,
    message: &str,
    metadata: serde_json::Value,
) -> Result<()> {
    let logger = JsonLogger::new(path)?;
    let mut record = LogRecord::new("veracity", level, message);
    if let serde_json::Value::Object(fields) = metadata {
        record.metadata = fields;
    }
    logger.log(&record)
}

fn parse_log_level(raw: &str) -> Result<LogLevel, String> {
    raw.parse().map_err(|err: anyhow::Error| err.to_string())
}

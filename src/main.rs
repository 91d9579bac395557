//! trackbench CLI
//!
//! Runs two-track evaluations of models answering questions about documents.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use trackbench::{
    aggregate::{OverallPolicy, ScoreAggregator, ScoredItem},
    config::Config,
    dataset::{self, GoldenSet, PrecomputedAnswer},
    document::{FsDocumentStore, MemoryDocumentStore},
    llm::LlmClient,
    model::Track,
    persistence::{
        DEFAULT_LOG_FILENAME, DEFAULT_REPORT_FILENAME, discover_logs, latest_records, load_run_logs,
        save_report, save_run_log,
    },
    pipeline::{Pipeline, RunOutput, RunRecord},
    telemetry,
};

/// trackbench - two-track LLM evaluation for document question answering
#[derive(Parser)]
#[command(name = "trackbench")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file (default: ~/.config/trackbench/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask every model every question, judge the answers and score them
    Run {
        /// Questions file (JSONL)
        #[arg(short, long)]
        questions: PathBuf,

        /// Golden answers file (JSONL)
        #[arg(short, long)]
        golden: PathBuf,

        /// Source document name or path
        #[arg(short, long)]
        document: String,

        /// Directory searched for documents given by name
        #[arg(long, default_value = "data/documents")]
        documents_dir: PathBuf,

        /// Track for questions that don't name one (A/structural, B/contextual)
        #[arg(short, long)]
        track: Option<Track>,

        /// Model to evaluate (repeatable; defaults to the configured models)
        #[arg(short, long = "model")]
        models: Vec<String>,

        /// Judge model (overrides config)
        #[arg(long)]
        judge: Option<String>,

        /// Maximum items in flight
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Only evaluate the first N questions
        #[arg(long)]
        max_items: Option<usize>,

        #[command(flatten)]
        outputs: OutputArgs,
    },

    /// Judge precomputed answers without asking any model
    Judge {
        /// Answers file (JSONL)
        #[arg(short, long)]
        answers: PathBuf,

        /// Golden answers file (JSONL)
        #[arg(short, long)]
        golden: PathBuf,

        /// Questions file; without it, questions are taken from the golden file
        #[arg(short, long)]
        questions: Option<PathBuf>,

        /// Track for entries that don't name one
        #[arg(short, long)]
        track: Option<Track>,

        /// Model name for answers that don't carry one
        #[arg(short, long)]
        model: Option<String>,

        /// Judge model (overrides config)
        #[arg(long)]
        judge: Option<String>,

        /// Maximum items in flight
        #[arg(short, long)]
        concurrency: Option<usize>,

        #[command(flatten)]
        outputs: OutputArgs,
    },

    /// Re-aggregate existing run logs
    Report {
        /// Run log files (JSONL)
        logs: Vec<PathBuf>,

        /// Aggregate every *.jsonl under this directory
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Pool all verdicts for the overall score instead of averaging tracks
        #[arg(long)]
        weighted: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Also write the report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the built-in sample set against the configured models
    Sample {
        /// Model to evaluate (repeatable; defaults to the configured models)
        #[arg(short, long = "model")]
        models: Vec<String>,

        #[command(flatten)]
        outputs: OutputArgs,
    },

    /// Test the judge connection
    Test,
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Directory for the run log and report
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,

    /// Run log path (default: <results-dir>/run_log.jsonl)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Report path (default: <results-dir>/report.json)
    #[arg(short, long)]
    report: Option<PathBuf>,
}

impl OutputArgs {
    fn log_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.results_dir.join(DEFAULT_LOG_FILENAME))
    }

    fn report_path(&self) -> PathBuf {
        self.report
            .clone()
            .unwrap_or_else(|| self.results_dir.join(DEFAULT_REPORT_FILENAME))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_json, telemetry::level_for(cli.verbose));

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run {
            questions,
            golden,
            document,
            documents_dir,
            track,
            models,
            judge,
            concurrency,
            max_items,
            outputs,
        } => {
            let config = load_config(config_path, &models, judge, concurrency)?;
            let questions =
                dataset::load_questions(&questions, track).context("Failed to load questions")?;
            let golden = dataset::load_golden(&golden).context("Failed to load golden answers")?;
            let mut set = GoldenSet::join(questions, golden);
            if let Some(n) = max_items {
                set = set.take(n);
            }

            let documents = Arc::new(FsDocumentStore::new(documents_dir));
            cmd_run(&config, set, documents, Some(&document), &outputs).await
        }
        Commands::Judge {
            answers,
            golden,
            questions,
            track,
            model,
            judge,
            concurrency,
            outputs,
        } => {
            let config = load_config(config_path, &[], judge, concurrency)?;
            let golden = dataset::load_golden(&golden).context("Failed to load golden answers")?;
            let set = match questions {
                Some(path) => GoldenSet::join(
                    dataset::load_questions(&path, track).context("Failed to load questions")?,
                    golden,
                ),
                None => GoldenSet::from_golden(golden, track),
            };
            let answers = dataset::load_answers(&answers, model.as_deref())
                .context("Failed to load answers")?;
            let set = set.with_issues(answers.issues);
            cmd_judge(&config, set, answers.entries, &outputs).await
        }
        Commands::Report {
            logs,
            dir,
            weighted,
            json,
            output,
        } => cmd_report(config_path, logs, dir, weighted, json, output),
        Commands::Sample { models, outputs } => {
            let config = load_config(config_path, &models, None, None)?;
            let (set, document) = dataset::sample_set();
            let name = document.name.clone();
            let documents = Arc::new(MemoryDocumentStore::new().with(document));
            cmd_run(&config, set, documents, Some(&name), &outputs).await
        }
        Commands::Test => cmd_test(config_path).await,
    }
}

fn load_config(
    path: Option<&Path>,
    models: &[String],
    judge: Option<String>,
    concurrency: Option<usize>,
) -> Result<Config> {
    let mut config = Config::load(path).context("Failed to load configuration")?;
    config.ensure_models(models);
    if !models.is_empty() {
        config.models.retain(|m| models.contains(&m.name));
    }
    if let Some(judge) = judge {
        config.judge.model = judge;
    }
    if let Some(n) = concurrency {
        config.run.concurrency = n;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Token cancelled on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, finishing with partial results...");
            trigger.cancel();
        }
    });
    token
}

async fn cmd_run(
    config: &Config,
    set: GoldenSet,
    documents: Arc<dyn trackbench::DocumentStore>,
    document: Option<&str>,
    outputs: &OutputArgs,
) -> Result<()> {
    let models: Vec<String> = config.models.iter().map(|m| m.name.clone()).collect();
    if models.is_empty() {
        anyhow::bail!("No models to evaluate. Pass --model or add `models` to the config file.");
    }

    println!("Evaluation Run");
    println!("{}", "─".repeat(60));
    println!("  Questions:    {} ({} rejected)", set.len(), set.issues.len());
    println!("  Models:       {}", models.join(", "));
    println!("  Judge:        {}", config.judge.model);
    println!("  Concurrency:  {}", config.run.concurrency);
    print_issues(&set);
    println!();

    let start = Instant::now();
    let pipeline = Pipeline::from_config(config, documents);
    let output = pipeline.run(&set, &models, document, cancel_on_ctrl_c()).await;

    finish(output, start, outputs)
}

async fn cmd_judge(
    config: &Config,
    set: GoldenSet,
    answers: Vec<PrecomputedAnswer>,
    outputs: &OutputArgs,
) -> Result<()> {
    if answers.is_empty() {
        anyhow::bail!("Answers file contains no usable entries.");
    }

    let missing = answers.iter().filter(|a| a.answer.is_err()).count();
    println!("Judging Precomputed Answers");
    println!("{}", "─".repeat(60));
    println!("  Answers:      {} ({} without an answer)", answers.len(), missing);
    println!("  Questions:    {} ({} rejected)", set.len(), set.issues.len());
    println!("  Judge:        {}", config.judge.model);
    print_issues(&set);
    println!();

    let start = Instant::now();
    let pipeline = Pipeline::from_config(config, Arc::new(MemoryDocumentStore::new()));
    let output = pipeline
        .judge_precomputed(&set, answers, cancel_on_ctrl_c())
        .await;

    finish(output, start, outputs)
}

fn print_issues(set: &GoldenSet) {
    for issue in &set.issues {
        println!("  Rejected:     {}: {}", issue.question_id, issue.reason);
    }
}

fn finish(output: RunOutput, start: Instant, outputs: &OutputArgs) -> Result<()> {
    let elapsed = start.elapsed();

    output.report.print_summary();

    println!("Outcomes:");
    for (label, count) in output.outcome_counts() {
        println!("  {:<22} {}", label, count);
    }
    println!("  Elapsed:               {:.2?}", elapsed);

    let log_path = outputs.log_path();
    save_run_log(&output.records, &log_path).context("Failed to write run log")?;
    let report_path = outputs.report_path();
    save_report(&output.report, &report_path).context("Failed to write report")?;

    println!();
    println!("Run log saved to: {}", log_path.display());
    println!("Report saved to:  {}", report_path.display());

    Ok(())
}

fn cmd_report(
    config_path: Option<&Path>,
    mut logs: Vec<PathBuf>,
    dir: Option<PathBuf>,
    weighted: bool,
    json: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    if let Some(dir) = dir {
        logs.extend(discover_logs(&dir).context("Failed to scan results directory")?);
    }
    logs.sort();
    logs.dedup();
    if logs.is_empty() {
        anyhow::bail!("No run logs given. Pass log files or --dir <results>.");
    }

    let config = Config::load(config_path).context("Failed to load configuration")?;
    let mut policy = config.scoring;
    if weighted {
        policy.overall = OverallPolicy::Weighted;
    }
    policy.validate().context("Invalid scoring policy")?;

    let loaded = load_run_logs(&logs).context("Failed to load run logs")?;
    let total = loaded.len();
    let records = latest_records(loaded);
    let scored: Vec<ScoredItem> = records.iter().filter_map(RunRecord::scored).collect();
    let report = ScoreAggregator::new(policy).aggregate(&scored);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else {
        println!("Aggregated {} records from {} log(s)", records.len(), logs.len());
        if total > records.len() {
            println!(
                "Ignored {} superseded record(s) for repeated (model, question) pairs",
                total - records.len()
            );
        }
        report.print_summary();
    }

    if let Some(path) = output {
        save_report(&report, &path).context("Failed to write report")?;
        if !json {
            println!("Report saved to: {}", path.display());
        }
    }

    Ok(())
}

async fn cmd_test(config_path: Option<&Path>) -> Result<()> {
    println!("Testing judge connection...\n");

    let config = Config::load(config_path).context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  API Base:  {}", config.judge.api_base);
    println!("  Model:     {}", config.judge.model);
    println!(
        "  API Key:   {}...",
        config.judge.api_key.chars().take(8).collect::<String>()
    );
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::new(config.judge);

    println!("Sending test request...");
    match client.test_connection().await {
        Ok(()) => println!("Connection successful!"),
        Err(e) => println!("Connection failed: {}", e),
    }

    Ok(())
}

//! trackbench - two-track LLM evaluation of document question answering.
//!
//! Models under evaluation answer questions about a source document. A
//! judge grades every answer against a golden answer and the grades are
//! rolled up per model and per track:
//!
//! - **Structural fidelity**: extracting values from tables, charts and figures
//! - **Contextual reasoning**: synthesis and inference over the document
//!
//! # Quick Start
//!
//! ```no_run
//! use trackbench::{
//!     config::Config,
//!     dataset::{GoldenSet, load_golden, load_questions},
//!     document::FsDocumentStore,
//!     persistence::save_run_log,
//!     pipeline::Pipeline,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     config.validate()?;
//!
//!     let questions = load_questions(Path::new("questions.jsonl"), None)?;
//!     let golden = load_golden(Path::new("golden.jsonl"))?;
//!     let set = GoldenSet::join(questions, golden);
//!
//!     let documents = Arc::new(FsDocumentStore::new("documents"));
//!     let pipeline = Pipeline::from_config(&config, documents);
//!     let models: Vec<String> = config.models.iter().map(|m| m.name.clone()).collect();
//!
//!     let output = pipeline
//!         .run(&set, &models, Some("annual-report"), CancellationToken::new())
//!         .await;
//!
//!     output.report.print_summary();
//!     save_run_log(&output.records, Path::new("results/run.jsonl"))?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Judge**: tolerance pre-check, one arbiter call, tolerant verdict parsing
//! - **ScoreAggregator**: order-independent per-track and overall scores
//! - **Pipeline**: bounded-concurrency answer → judge fan-out with cancellation
//! - **ProviderRegistry**: model name → answering adapter, from configuration

pub mod aggregate;
pub mod config;
pub mod dataset;
pub mod document;
pub mod error;
pub mod judge;
pub mod llm;
pub mod model;
pub mod persistence;
pub mod pipeline;
pub mod providers;
pub mod telemetry;

// Re-export commonly used types
pub use aggregate::{AggregateReport, AggregateResult, ScoreAggregator, ScoringPolicy};
pub use config::Config;
pub use dataset::{GoldenSet, PrecomputedAnswer};
pub use document::{DocumentStore, FsDocumentStore, SourceDocument};
pub use error::{EvalError, Result};
pub use judge::{Arbiter, Judge};
pub use llm::LlmClient;
pub use model::{EvalItem, GoldenAnswer, Grade, ModelAnswer, Question, Track, Verdict};
pub use persistence::{load_run_log, save_report, save_run_log};
pub use pipeline::{Outcome, Pipeline, RunOutput, RunRecord};
pub use providers::{ModelAnswering, ProviderRegistry};

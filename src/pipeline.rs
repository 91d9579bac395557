//! End-to-end evaluation runs.
//!
//! A run fans every evaluable question out to every target model, asks for
//! an answer, hands it to the [`Judge`] and collects one [`RunRecord`] per
//! (question, model). Per-item failures become outcomes in the log; they
//! never abort the run.

use crate::aggregate::{AggregateReport, ScoreAggregator, ScoredItem, ScoringPolicy};
use crate::config::{Config, RunConfig};
use crate::dataset::{ConfigIssue, GoldenSet, PrecomputedAnswer};
use crate::document::{DocumentStore, SourceDocument};
use crate::error::{EvalError, Result};
use crate::judge::Judge;
use crate::model::{EvalItem, Grade, ModelAnswer, Question, Track, Verdict};
use crate::providers::{LlmArbiter, ModelAnswering, ProviderRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one (question, model) item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Judged { verdict: Verdict },
    AnswerUnavailable { reason: String },
    ArbiterUnavailable { reason: String },
    JudgeParseError { reason: String, raw: String },
    ConfigurationError { reason: String },
    Cancelled { reason: String },
}

impl Outcome {
    pub fn grade(&self) -> Option<Grade> {
        match self {
            Outcome::Judged { verdict } => Some(verdict.grade),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Judged { .. } => "judged",
            Outcome::AnswerUnavailable { .. } => "answer_unavailable",
            Outcome::ArbiterUnavailable { .. } => "arbiter_unavailable",
            Outcome::JudgeParseError { .. } => "judge_parse_error",
            Outcome::ConfigurationError { .. } => "configuration_error",
            Outcome::Cancelled { .. } => "cancelled",
        }
    }

    fn cancelled() -> Self {
        Outcome::Cancelled {
            reason: "run cancelled".to_string(),
        }
    }
}

/// One line of the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub question_id: String,
    pub model: String,
    /// Absent only for entries rejected before a track was known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<Track>,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
}

impl RunRecord {
    fn new(question: &Question, model: &str, answer: Option<&ModelAnswer>, outcome: Outcome) -> Self {
        Self {
            question_id: question.id.clone(),
            model: model.to_string(),
            track: Some(question.track),
            category: question.category_or_default().to_string(),
            raw_answer: answer.map(|a| a.text.clone()),
            rationale: answer.and_then(|a| a.rationale.clone()),
            outcome,
            timestamp: Utc::now(),
        }
    }

    fn for_issue(issue: &ConfigIssue, model: &str) -> Self {
        Self {
            question_id: issue.question_id.clone(),
            model: model.to_string(),
            track: issue.track,
            category: issue
                .category
                .clone()
                .unwrap_or_else(|| "Uncategorized".to_string()),
            raw_answer: None,
            rationale: None,
            outcome: Outcome::ConfigurationError {
                reason: issue.reason.clone(),
            },
            timestamp: Utc::now(),
        }
    }

    pub fn grade(&self) -> Option<Grade> {
        self.outcome.grade()
    }

    /// Aggregation input for this record; `None` when it has no track.
    pub fn scored(&self) -> Option<ScoredItem> {
        Some(ScoredItem {
            model: self.model.clone(),
            track: self.track?,
            question_id: self.question_id.clone(),
            category: self.category.clone(),
            grade: self.grade(),
        })
    }
}

/// Records of a run, in (question, model) order, and their aggregate.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub records: Vec<RunRecord>,
    pub report: AggregateReport,
}

impl RunOutput {
    /// Number of records per outcome label.
    pub fn outcome_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.outcome.label()).or_insert(0) += 1;
        }
        counts
    }

    pub fn failures(&self) -> usize {
        self.records.iter().filter(|r| r.grade().is_none()).count()
    }
}

enum JobInput {
    Ask(Arc<SourceDocument>),
    Precomputed(ModelAnswer),
}

struct Job {
    seq: usize,
    item: Arc<EvalItem>,
    model: String,
    input: JobInput,
}

impl Job {
    fn record(&self, answer: Option<&ModelAnswer>, outcome: Outcome) -> RunRecord {
        RunRecord::new(&self.item.question, &self.model, answer, outcome)
    }
}

/// The part of a pipeline each spawned task needs.
#[derive(Clone)]
struct Worker {
    answerer: Arc<dyn ModelAnswering>,
    judge: Judge,
    run: RunConfig,
}

impl Worker {
    /// Run `call` under the per-call timeout, retrying transient failures.
    async fn with_retries<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let limit = self.run.call_timeout();
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(limit, call()).await {
                Ok(result) => result,
                Err(_) => Err(EvalError::Timeout(limit)),
            };
            match result {
                Err(e) if e.is_transient() && attempt < self.run.max_attempts => {
                    debug!(attempt, error = %e, "retrying call");
                    tokio::time::sleep(self.run.retry_backoff(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn process(&self, job: &Job) -> RunRecord {
        let question = &job.item.question;

        let answer = match &job.input {
            JobInput::Precomputed(answer) => answer.clone(),
            JobInput::Ask(document) => {
                let asked = self
                    .with_retries(|| self.answerer.ask(question, &job.model, document))
                    .await;
                match asked {
                    Ok(answer) => answer,
                    Err(EvalError::Configuration(reason)) => {
                        warn!(question = %question.id, model = %job.model, reason = %reason, "cannot ask model");
                        return job.record(None, Outcome::ConfigurationError { reason });
                    }
                    Err(e) => {
                        warn!(question = %question.id, model = %job.model, error = %e, "answer unavailable");
                        return job.record(
                            None,
                            Outcome::AnswerUnavailable {
                                reason: e.to_string(),
                            },
                        );
                    }
                }
            }
        };

        let judged = self
            .with_retries(|| self.judge.evaluate(question, &job.item.golden, &answer))
            .await;

        let outcome = match judged {
            Ok(verdict) => {
                debug!(question = %question.id, model = %job.model, grade = %verdict.grade, "judged");
                Outcome::Judged { verdict }
            }
            Err(EvalError::JudgeParse { message, raw }) => {
                warn!(question = %question.id, model = %job.model, raw = %raw, "unparsable arbiter verdict");
                Outcome::JudgeParseError {
                    reason: message,
                    raw,
                }
            }
            Err(e) => {
                warn!(question = %question.id, model = %job.model, error = %e, "arbiter unavailable");
                Outcome::ArbiterUnavailable {
                    reason: e.to_string(),
                }
            }
        };

        job.record(Some(&answer), outcome)
    }
}

/// Orchestrates answering and judging over a golden set.
pub struct Pipeline {
    worker: Worker,
    documents: Arc<dyn DocumentStore>,
    aggregator: ScoreAggregator,
}

impl Pipeline {
    pub fn new(
        answerer: Arc<dyn ModelAnswering>,
        judge: Judge,
        documents: Arc<dyn DocumentStore>,
        run: RunConfig,
        policy: ScoringPolicy,
    ) -> Self {
        Self {
            worker: Worker {
                answerer,
                judge,
                run,
            },
            documents,
            aggregator: ScoreAggregator::new(policy),
        }
    }

    /// Pipeline over the configured providers and arbiter.
    pub fn from_config(config: &Config, documents: Arc<dyn DocumentStore>) -> Self {
        let answerer = Arc::new(ProviderRegistry::from_config(config));
        let judge = Judge::new(Arc::new(LlmArbiter::new(config.judge.clone())));
        Self::new(
            answerer,
            judge,
            documents,
            config.run.clone(),
            config.scoring.clone(),
        )
    }

    pub fn judge(&self) -> &Judge {
        &self.worker.judge
    }

    /// Evaluate every item of `set` against every model.
    ///
    /// Questions name their own document; `default_document` covers those
    /// that don't. Records come back sorted by question then model order,
    /// whatever order the items finished in.
    pub async fn run(
        &self,
        set: &GoldenSet,
        models: &[String],
        default_document: Option<&str>,
        cancel: CancellationToken,
    ) -> RunOutput {
        let requested = models.len();
        let models = distinct_models(models);
        if models.len() < requested {
            warn!(requested, distinct = models.len(), "repeated model names are evaluated once");
        }
        info!(
            questions = set.len(),
            rejected = set.issues.len(),
            models = models.len(),
            concurrency = self.worker.run.concurrency,
            judge = %self.worker.judge.judge_model(),
            "starting evaluation run"
        );

        let mut documents: HashMap<String, std::result::Result<Arc<SourceDocument>, String>> =
            HashMap::new();
        let mut jobs = Vec::new();
        let mut records = Vec::new();

        for (qi, item) in set.items.iter().enumerate() {
            let item = Arc::new(item.clone());
            let name = item.question.document.as_deref().or(default_document);

            let document = match name {
                Some(name) => documents
                    .entry(name.to_string())
                    .or_insert_with(|| self.documents.get(name).map_err(|e| e.to_string()))
                    .clone(),
                None => Err(format!("no source document for question '{}'", item.question.id)),
            };

            for (mi, model) in models.iter().enumerate() {
                let seq = qi * models.len() + mi;
                match &document {
                    Ok(doc) => jobs.push(Job {
                        seq,
                        item: Arc::clone(&item),
                        model: model.clone(),
                        input: JobInput::Ask(Arc::clone(doc)),
                    }),
                    Err(reason) => records.push((
                        seq,
                        RunRecord::new(
                            &item.question,
                            model,
                            None,
                            Outcome::ConfigurationError {
                                reason: reason.clone(),
                            },
                        ),
                    )),
                }
            }
        }

        for (ii, issue) in set.issues.iter().enumerate() {
            for (mi, model) in models.iter().enumerate() {
                let seq = (set.items.len() + ii) * models.len() + mi;
                records.push((seq, RunRecord::for_issue(issue, model)));
            }
        }

        records.extend(self.execute(jobs, cancel).await);
        self.finish(records)
    }

    /// Judge answers produced elsewhere; no model is asked.
    ///
    /// Answers are matched to items by question id, then question text.
    /// Answers with no matching item are skipped, and only the first answer
    /// per (question, model) is kept. Missing answers are recorded as
    /// unavailable without calling the arbiter. Records keep the order of
    /// `answers`, followed by the set's issues for every model seen.
    pub async fn judge_precomputed(
        &self,
        set: &GoldenSet,
        answers: Vec<PrecomputedAnswer>,
        cancel: CancellationToken,
    ) -> RunOutput {
        info!(
            answers = answers.len(),
            rejected = set.issues.len(),
            judge = %self.worker.judge.judge_model(),
            "judging precomputed answers"
        );

        let models = distinct_models(answers.iter().map(|a| &a.model));
        let mut seen = HashSet::new();
        let mut jobs = Vec::new();
        let mut records = Vec::new();

        for (seq, entry) in answers.iter().enumerate() {
            let Some(item) = set.find(&entry.question_id) else {
                warn!(question = %entry.question_id, model = %entry.model, "no golden answer, skipping");
                continue;
            };
            if !seen.insert((item.question.id.clone(), entry.model.clone())) {
                warn!(question = %item.question.id, model = %entry.model, "duplicate answer, keeping the first");
                continue;
            }

            match &entry.answer {
                Ok(answer) => {
                    let mut answer = answer.clone();
                    answer.question_id = item.question.id.clone();
                    jobs.push(Job {
                        seq,
                        item: Arc::new(item.clone()),
                        model: entry.model.clone(),
                        input: JobInput::Precomputed(answer),
                    });
                }
                Err(reason) => {
                    debug!(question = %item.question.id, model = %entry.model, reason = %reason, "no answer to judge");
                    records.push((
                        seq,
                        RunRecord::new(
                            &item.question,
                            &entry.model,
                            None,
                            Outcome::AnswerUnavailable {
                                reason: reason.clone(),
                            },
                        ),
                    ));
                }
            }
        }

        for (ii, issue) in set.issues.iter().enumerate() {
            for (mi, model) in models.iter().enumerate() {
                let seq = answers.len() + ii * models.len() + mi;
                records.push((seq, RunRecord::for_issue(issue, model)));
            }
        }

        records.extend(self.execute(jobs, cancel).await);
        self.finish(records)
    }

    /// Run jobs with bounded concurrency until done or cancelled.
    async fn execute(&self, jobs: Vec<Job>, cancel: CancellationToken) -> Vec<(usize, RunRecord)> {
        if jobs.is_empty() {
            return Vec::new();
        }

        let cancel = cancel.child_token();
        let deadline = self.worker.run.run_timeout().map(|limit| {
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                warn!(?limit, "run deadline reached, cancelling remaining items");
                token.cancel();
            })
        });

        // Every slot starts out cancelled and is overwritten when its task reports.
        let mut slots: Vec<(usize, RunRecord)> = jobs
            .iter()
            .map(|job| {
                (
                    job.seq,
                    job.record(
                        None,
                        Outcome::Cancelled {
                            reason: "item did not complete".to_string(),
                        },
                    ),
                )
            })
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.worker.run.concurrency.max(1)));
        let (tx, mut rx) = mpsc::channel::<(usize, RunRecord)>(self.worker.run.concurrency.max(1) * 2);

        for (slot, job) in jobs.into_iter().enumerate() {
            let worker = self.worker.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let record = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => job.record(None, Outcome::cancelled()),
                    record = async {
                        let _permit = semaphore.acquire_owned().await.ok();
                        worker.process(&job).await
                    } => record,
                };
                let _ = tx.send((slot, record)).await;
            });
        }
        drop(tx);

        while let Some((slot, record)) = rx.recv().await {
            slots[slot].1 = record;
        }

        if let Some(handle) = deadline {
            handle.abort();
        }

        slots
    }

    fn finish(&self, mut records: Vec<(usize, RunRecord)>) -> RunOutput {
        records.sort_by_key(|(seq, _)| *seq);
        let records: Vec<RunRecord> = records.into_iter().map(|(_, r)| r).collect();

        let scored: Vec<ScoredItem> = records.iter().filter_map(RunRecord::scored).collect();
        let report = self.aggregator.aggregate(&scored);

        let output = RunOutput { records, report };
        info!(
            records = output.records.len(),
            failures = output.failures(),
            "evaluation run finished"
        );
        output
    }
}

/// Model names in first-seen order, without repeats.
fn distinct_models<'a>(models: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut distinct = Vec::new();
    for model in models {
        if seen.insert(model.as_str()) {
            distinct.push(model.clone());
        }
    }
    distinct
}

//! Roll-up of per-question verdicts into per-track and per-model scores.
//!
//! Aggregation is a pure function of the multiset of scored items: it
//! counts grades per group and derives sums from the counts, so any input
//! order gives bit-identical output.

use crate::error::{EvalError, Result};
use crate::model::{Grade, Track};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How per-track percentages roll up into a model's overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallPolicy {
    /// Mean of the track percentages; every track counts the same.
    #[default]
    Unweighted,
    /// Pooled over all verdicts; larger tracks count more.
    Weighted,
}

/// Score table and roll-up rules shared by every group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Score awarded for a partial grade.
    pub partial_credit: f64,
    pub overall: OverallPolicy,
    /// Groups with fewer verdicts are reported as insufficient data.
    pub min_verdicts: usize,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            partial_credit: 0.5,
            overall: OverallPolicy::Unweighted,
            min_verdicts: 1,
        }
    }
}

impl ScoringPolicy {
    /// Normalized score for a grade.
    pub fn score(&self, grade: Grade) -> f64 {
        match grade {
            Grade::Correct => 1.0,
            Grade::Partial => self.partial_credit,
            Grade::Incorrect => 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.partial_credit > 0.0 && self.partial_credit < 1.0) {
            return Err(EvalError::Config(format!(
                "scoring.partial_credit must be between 0 and 1 (exclusive), got {}",
                self.partial_credit
            )));
        }
        if self.min_verdicts == 0 {
            return Err(EvalError::Config(
                "scoring.min_verdicts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// One aggregation input: a question answered (or not) by a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem {
    pub model: String,
    pub track: Track,
    pub question_id: String,
    pub category: String,
    /// `None` when no verdict exists; excluded from the denominator.
    pub grade: Option<Grade>,
}

/// Number of verdicts per grade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeCounts {
    pub correct: usize,
    pub partial: usize,
    pub incorrect: usize,
}

impl GradeCounts {
    fn add(&mut self, grade: Grade) {
        match grade {
            Grade::Correct => self.correct += 1,
            Grade::Partial => self.partial += 1,
            Grade::Incorrect => self.incorrect += 1,
        }
    }

    pub fn count(&self) -> usize {
        self.correct + self.partial + self.incorrect
    }

    pub fn score_sum(&self, policy: &ScoringPolicy) -> f64 {
        self.correct as f64 * policy.score(Grade::Correct)
            + self.partial as f64 * policy.score(Grade::Partial)
            + self.incorrect as f64 * policy.score(Grade::Incorrect)
    }

    fn percentage(&self, policy: &ScoringPolicy) -> Option<f64> {
        let count = self.count();
        (count >= policy.min_verdicts && count > 0)
            .then(|| 100.0 * self.score_sum(policy) / count as f64)
    }
}

/// Whether a percentage could be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreStatus {
    Scored,
    InsufficientData,
}

impl ScoreStatus {
    fn of(pct: Option<f64>) -> Self {
        if pct.is_some() {
            ScoreStatus::Scored
        } else {
            ScoreStatus::InsufficientData
        }
    }
}

/// Score for one category inside a (model, track) group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub count: usize,
    pub score_pct: Option<f64>,
}

/// Statistics for one (model, track) group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub model: String,
    pub track: Track,
    /// Questions with a verdict.
    pub count: usize,
    /// Questions without a verdict (failures, cancellations).
    pub unscored: usize,
    pub score_sum: f64,
    pub score_pct: Option<f64>,
    pub status: ScoreStatus,
    pub grades: GradeCounts,
    /// Sorted ids of the questions with a verdict.
    pub question_ids: Vec<String>,
    pub categories: BTreeMap<String, CategoryScore>,
}

/// Roll-up for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReport {
    pub model: String,
    pub tracks: Vec<AggregateResult>,
    pub overall_pct: Option<f64>,
    pub status: ScoreStatus,
}

impl ModelReport {
    pub fn track(&self, track: Track) -> Option<&AggregateResult> {
        self.tracks.iter().find(|t| t.track == track)
    }
}

/// Final report: every model, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub policy: ScoringPolicy,
    pub models: Vec<ModelReport>,
}

impl AggregateReport {
    pub fn model(&self, model: &str) -> Option<&ModelReport> {
        self.models.iter().find(|m| m.model == model)
    }

    pub fn get(&self, model: &str, track: Track) -> Option<&AggregateResult> {
        self.model(model).and_then(|m| m.track(track))
    }

    /// Print summary to stdout.
    pub fn print_summary(&self) {
        println!("\n=========== Evaluation Results ===========");
        if self.models.is_empty() {
            println!("No results.");
        }
        for model in &self.models {
            println!("Model: {}", model.model);
            for track in &model.tracks {
                println!(
                    "  {:<22} {}  ({} scored, {} unscored)",
                    track.track.label(),
                    format_pct(track.score_pct),
                    track.count,
                    track.unscored
                );
                for (category, score) in &track.categories {
                    println!(
                        "      {:<18} {}  ({})",
                        category,
                        format_pct(score.score_pct),
                        score.count
                    );
                }
            }
            println!("  {:<22} {}", "overall", format_pct(model.overall_pct));
            println!("------------------------------------------");
        }
        println!(
            "Partial credit: {}  Overall: {:?}",
            self.policy.partial_credit, self.policy.overall
        );
        println!("==========================================\n");
    }
}

fn format_pct(pct: Option<f64>) -> String {
    match pct {
        Some(p) => format!("{:>6.1}%", p),
        None => "insufficient data".to_string(),
    }
}

#[derive(Default)]
struct GroupAccumulator {
    grades: GradeCounts,
    unscored: usize,
    question_ids: Vec<String>,
    categories: BTreeMap<String, GradeCounts>,
}

/// Reduces scored items into an [`AggregateReport`].
#[derive(Debug, Clone, Default)]
pub struct ScoreAggregator {
    policy: ScoringPolicy,
}

impl ScoreAggregator {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Aggregate items by (model, track) and roll up per model.
    pub fn aggregate<'a, I>(&self, items: I) -> AggregateReport
    where
        I: IntoIterator<Item = &'a ScoredItem>,
    {
        let mut groups: BTreeMap<(String, Track), GroupAccumulator> = BTreeMap::new();

        for item in items {
            let acc = groups
                .entry((item.model.clone(), item.track))
                .or_default();
            match item.grade {
                Some(grade) => {
                    acc.grades.add(grade);
                    acc.question_ids.push(item.question_id.clone());
                    acc.categories
                        .entry(item.category.clone())
                        .or_default()
                        .add(grade);
                }
                None => acc.unscored += 1,
            }
        }

        let mut by_model: BTreeMap<String, Vec<AggregateResult>> = BTreeMap::new();
        for ((model, track), mut acc) in groups {
            acc.question_ids.sort();
            let score_pct = acc.grades.percentage(&self.policy);
            let categories = acc
                .categories
                .iter()
                .map(|(name, counts)| {
                    (
                        name.clone(),
                        CategoryScore {
                            count: counts.count(),
                            score_pct: counts.percentage(&self.policy),
                        },
                    )
                })
                .collect();

            by_model.entry(model.clone()).or_default().push(AggregateResult {
                model,
                track,
                count: acc.grades.count(),
                unscored: acc.unscored,
                score_sum: acc.grades.score_sum(&self.policy),
                score_pct,
                status: ScoreStatus::of(score_pct),
                grades: acc.grades,
                question_ids: acc.question_ids,
                categories,
            });
        }

        let models = by_model
            .into_iter()
            .map(|(model, tracks)| {
                let overall_pct = self.overall(&tracks);
                ModelReport {
                    model,
                    tracks,
                    overall_pct,
                    status: ScoreStatus::of(overall_pct),
                }
            })
            .collect();

        AggregateReport {
            policy: self.policy.clone(),
            models,
        }
    }

    fn overall(&self, tracks: &[AggregateResult]) -> Option<f64> {
        let scored: Vec<&AggregateResult> =
            tracks.iter().filter(|t| t.score_pct.is_some()).collect();
        if scored.is_empty() {
            return None;
        }

        match self.policy.overall {
            OverallPolicy::Unweighted => {
                let sum: f64 = scored.iter().filter_map(|t| t.score_pct).sum();
                Some(sum / scored.len() as f64)
            }
            OverallPolicy::Weighted => {
                let mut pooled = GradeCounts::default();
                for t in &scored {
                    pooled.correct += t.grades.correct;
                    pooled.partial += t.grades.partial;
                    pooled.incorrect += t.grades.incorrect;
                }
                let count = pooled.count();
                Some(100.0 * pooled.score_sum(&self.policy) / count as f64)
            }
        }
    }
}

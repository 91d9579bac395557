//! Core data types: questions, golden answers, model answers and verdicts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EvalError;

/// Evaluation track a question belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    /// Extraction of tables, charts and figures from the document.
    #[serde(alias = "A", alias = "a", alias = "vision")]
    StructuralFidelity,
    /// Synthesis, inference and cross-referencing over the document.
    #[serde(alias = "B", alias = "b", alias = "semantic")]
    ContextualReasoning,
}

impl Track {
    /// All tracks in report order.
    pub const ALL: [Track; 2] = [Track::StructuralFidelity, Track::ContextualReasoning];

    pub fn label(&self) -> &'static str {
        match self {
            Track::StructuralFidelity => "structural_fidelity",
            Track::ContextualReasoning => "contextual_reasoning",
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Track {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "a" | "vision" | "structural" | "structural_fidelity" => Ok(Track::StructuralFidelity),
            "b" | "semantic" | "contextual" | "contextual_reasoning" => {
                Ok(Track::ContextualReasoning)
            }
            other => Err(EvalError::Configuration(format!("unknown track '{}'", other))),
        }
    }
}

/// A question asked about the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub track: Track,
    /// Page or table reference inside the source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    /// Finer-grained grouping inside a track.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Name of the source document, if not given per run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

impl Question {
    pub fn new(id: impl Into<String>, text: impl Into<String>, track: Track) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            track,
            locator: None,
            category: None,
            document: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }

    /// Category used for breakdowns.
    pub fn category_or_default(&self) -> &str {
        self.category.as_deref().unwrap_or("Uncategorized")
    }
}

/// Numeric golden value with an absolute tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericTolerance {
    pub value: f64,
    pub tolerance: f64,
}

impl NumericTolerance {
    pub fn new(value: f64, tolerance: f64) -> Self {
        Self {
            value,
            tolerance: tolerance.abs(),
        }
    }

    /// Whether `candidate` lies within `value ± tolerance` (inclusive).
    pub fn contains(&self, candidate: f64) -> bool {
        (candidate - self.value).abs() <= self.tolerance + f64::EPSILON * self.value.abs().max(1.0)
    }
}

/// Canonical answer for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenAnswer {
    pub question_id: String,
    #[serde(alias = "ground_truth_answer")]
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    /// Acceptable equivalent phrasings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<NumericTolerance>,
}

impl GoldenAnswer {
    pub fn new(question_id: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            answer: answer.into(),
            rationale: None,
            variants: Vec::new(),
            tolerance: None,
        }
    }

    pub fn with_tolerance(mut self, value: f64, tolerance: f64) -> Self {
        self.tolerance = Some(NumericTolerance::new(value, tolerance));
        self
    }

    /// Explicit tolerance, or one written inline as `42 ± 1` / `42 +/- 1`.
    pub fn numeric_tolerance(&self) -> Option<NumericTolerance> {
        self.tolerance
            .or_else(|| crate::judge::tolerance::parse_inline_tolerance(&self.answer))
    }
}

/// A question joined with its golden answer: the unit of evaluation work.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalItem {
    pub question: Question,
    pub golden: GoldenAnswer,
}

impl EvalItem {
    pub fn track(&self) -> Track {
        self.question.track
    }
}

/// Free-text response of one model to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAnswer {
    pub question_id: String,
    pub model: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ModelAnswer {
    pub fn new(
        question_id: impl Into<String>,
        model: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            question_id: question_id.into(),
            model: model.into(),
            text: text.into(),
            rationale: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

/// Ordinal correctness grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Incorrect,
    Partial,
    Correct,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Grade::Incorrect => "incorrect",
            Grade::Partial => "partial",
            Grade::Correct => "correct",
        };
        f.write_str(s)
    }
}

/// How a verdict was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictMethod {
    /// The arbiter model graded the answer.
    Arbiter,
    /// The answer matched a numeric golden value within tolerance.
    Tolerance,
}

/// Normalized judgement for one (question, model) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub question_id: String,
    pub model: String,
    pub grade: Grade,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    pub judge_model: String,
    pub method: VerdictMethod,
    pub timestamp: DateTime<Utc>,
}

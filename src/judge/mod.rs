//! LLM-as-judge grading of model answers against golden answers.
//!
//! A [`Judge`] turns one (question, golden answer, model answer) triple
//! into a [`Verdict`]. Numeric answers inside the golden tolerance are
//! settled locally; everything else goes to the [`Arbiter`] exactly once.

pub mod parse;
pub mod tolerance;

use crate::error::{EvalError, Result};
use crate::llm::Prompts;
use crate::model::{GoldenAnswer, Grade, ModelAnswer, Question, Verdict, VerdictMethod};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

pub use parse::ArbiterOutput;

/// External model that grades prompts and replies with raw text.
#[async_trait]
pub trait Arbiter: Send + Sync {
    /// Identifier recorded on every verdict.
    fn model_id(&self) -> &str;

    /// Send one grading prompt and return the raw reply.
    async fn judge(&self, prompt: &str) -> Result<String>;
}

/// Grades model answers.
#[derive(Clone)]
pub struct Judge {
    arbiter: Arc<dyn Arbiter>,
}

impl Judge {
    /// Create a new judge backed by the given arbiter.
    pub fn new(arbiter: Arc<dyn Arbiter>) -> Self {
        Self { arbiter }
    }

    pub fn judge_model(&self) -> &str {
        self.arbiter.model_id()
    }

    /// Grade `answer` against `golden`.
    ///
    /// Fails with [`EvalError::ArbiterUnavailable`] when the arbiter call
    /// fails and [`EvalError::JudgeParse`] when its reply has no accepted
    /// label. Neither is retried here.
    pub async fn evaluate(
        &self,
        question: &Question,
        golden: &GoldenAnswer,
        answer: &ModelAnswer,
    ) -> Result<Verdict> {
        if let Some(tol) = golden.numeric_tolerance() {
            if let Some(value) = tolerance::match_within_tolerance(&answer.text, &tol) {
                debug!(
                    question = %question.id,
                    model = %answer.model,
                    value,
                    "answer within numeric tolerance, arbiter skipped"
                );
                return Ok(self.verdict(
                    answer,
                    Grade::Correct,
                    Some(format!(
                        "{} is within {} ± {}",
                        value, tol.value, tol.tolerance
                    )),
                    VerdictMethod::Tolerance,
                ));
            }
        }

        let prompt = Self::build_prompt(question, golden, answer);

        let raw = self.arbiter.judge(&prompt).await.map_err(|e| match e {
            EvalError::ArbiterUnavailable(_) => e,
            other => EvalError::ArbiterUnavailable(other.to_string()),
        })?;

        let output = ArbiterOutput::parse(&raw);
        if matches!(output, ArbiterOutput::NearMiss { .. }) {
            debug!(question = %question.id, model = %answer.model, "arbiter verdict normalized");
        }
        let (grade, justification) = output.into_result()?;

        Ok(self.verdict(answer, grade, justification, VerdictMethod::Arbiter))
    }

    fn verdict(
        &self,
        answer: &ModelAnswer,
        grade: Grade,
        justification: Option<String>,
        method: VerdictMethod,
    ) -> Verdict {
        Verdict {
            question_id: answer.question_id.clone(),
            model: answer.model.clone(),
            grade,
            justification,
            judge_model: self.judge_model().to_string(),
            method,
            timestamp: Utc::now(),
        }
    }

    /// Fill the track's judge template.
    pub fn build_prompt(question: &Question, golden: &GoldenAnswer, answer: &ModelAnswer) -> String {
        let variants = if golden.variants.is_empty() {
            "(none)".to_string()
        } else {
            golden.variants.join("; ")
        };

        Prompts::fill(
            Prompts::judge_for(question.track),
            &[
                ("question", question.text.as_str()),
                ("golden_answer", golden.answer.as_str()),
                (
                    "golden_rationale",
                    golden.rationale.as_deref().unwrap_or("(none)"),
                ),
                ("variants", variants.as_str()),
                ("model_answer", answer.text.as_str()),
                (
                    "model_rationale",
                    answer.rationale.as_deref().unwrap_or("(none)"),
                ),
            ],
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::Track;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Arbiter returning a fixed reply and counting calls.
    pub(crate) struct ScriptedArbiter {
        reply: Result<String>,
        pub calls: AtomicUsize,
    }

    impl ScriptedArbiter {
        pub(crate) fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing(message: &str) -> Self {
            Self {
                reply: Err(EvalError::LlmApi(message.to_string())),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Arbiter for ScriptedArbiter {
        fn model_id(&self) -> &str {
            "scripted-judge"
        }

        async fn judge(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(EvalError::LlmApi(e.to_string())),
            }
        }
    }

    fn triple(golden: &str, answer: &str) -> (Question, GoldenAnswer, ModelAnswer) {
        (
            Question::new("q1", "What was the reported figure?", Track::StructuralFidelity),
            GoldenAnswer::new("q1", golden),
            ModelAnswer::new("q1", "model-a", answer),
        )
    }

    #[tokio::test]
    async fn test_tolerance_short_circuit() {
        let arbiter = Arc::new(ScriptedArbiter::replying("incorrect"));
        let judge = Judge::new(arbiter.clone());
        let (q, g, a) = triple("42 ± 1", "42.5");

        let verdict = judge.evaluate(&q, &g, &a).await.unwrap();
        assert_eq!(verdict.grade, Grade::Correct);
        assert_eq!(verdict.method, VerdictMethod::Tolerance);
        assert_eq!(arbiter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_out_of_tolerance_defers_to_arbiter() {
        let arbiter = Arc::new(ScriptedArbiter::replying(
            r#"{"verdict": "incorrect", "justification": "off by 8"}"#,
        ));
        let judge = Judge::new(arbiter.clone());
        let (q, g, a) = triple("42 ± 1", "50");

        let verdict = judge.evaluate(&q, &g, &a).await.unwrap();
        assert_eq!(verdict.grade, Grade::Incorrect);
        assert_eq!(verdict.method, VerdictMethod::Arbiter);
        assert_eq!(verdict.justification.as_deref(), Some("off by 8"));
        assert_eq!(verdict.judge_model, "scripted-judge");
        assert_eq!(arbiter.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_near_miss_matches_canonical_verdict() {
        let (q, g, a) = triple("Net zero by 2040", "2040");

        let loose = Judge::new(Arc::new(ScriptedArbiter::replying("Score: CORRECT ")));
        let strict = Judge::new(Arc::new(ScriptedArbiter::replying("correct")));

        let v1 = tokio_test::block_on(loose.evaluate(&q, &g, &a)).unwrap();
        let v2 = tokio_test::block_on(strict.evaluate(&q, &g, &a)).unwrap();
        assert_eq!(v1.grade, v2.grade);
        assert_eq!(v1.justification, v2.justification);
        assert_eq!(v1.method, v2.method);
    }

    #[tokio::test]
    async fn test_unparsable_reply() {
        let judge = Judge::new(Arc::new(ScriptedArbiter::replying("I cannot determine this")));
        let (q, g, a) = triple("Net zero by 2040", "2040");

        match judge.evaluate(&q, &g, &a).await {
            Err(EvalError::JudgeParse { raw, .. }) => assert_eq!(raw, "I cannot determine this"),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_arbiter_failure_maps_to_unavailable() {
        let arbiter = Arc::new(ScriptedArbiter::failing("connection reset"));
        let judge = Judge::new(arbiter.clone());
        let (q, g, a) = triple("Net zero by 2040", "2040");

        let err = judge.evaluate(&q, &g, &a).await.unwrap_err();
        assert!(matches!(err, EvalError::ArbiterUnavailable(_)));
        assert_eq!(arbiter.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_build_prompt() {
        let question = Question::new("q7", "Why did emissions fall?", Track::ContextualReasoning);
        let mut golden = GoldenAnswer::new("q7", "Renewable procurement");
        golden.variants = vec!["green energy contracts".to_string()];
        let answer = ModelAnswer::new("q7", "m", "They bought renewables").with_rationale("p. 12");

        let prompt = Judge::build_prompt(&question, &golden, &answer);
        assert!(prompt.contains("REASONING"));
        assert!(prompt.contains("Why did emissions fall?"));
        assert!(prompt.contains("Reference answer: Renewable procurement"));
        assert!(prompt.contains("Also acceptable: green energy contracts"));
        assert!(prompt.contains("Candidate rationale: p. 12"));
        assert!(prompt.contains("Reference rationale: (none)"));
        assert!(!prompt.contains("{question}"));
    }

    #[test]
    fn test_build_prompt_keeps_answer_text_literal() {
        let question = Question::new("q8", "What does {golden_answer} mean?", Track::StructuralFidelity);
        let golden = GoldenAnswer::new("q8", "SECRET");
        let answer = ModelAnswer::new("q8", "m", "see {model_rationale}").with_rationale("p. 3");

        let prompt = Judge::build_prompt(&question, &golden, &answer);
        assert!(prompt.contains("What does {golden_answer} mean?"));
        assert!(prompt.contains("Candidate answer: see {model_rationale}"));
        assert!(prompt.contains("Candidate rationale: p. 3"));
        assert_eq!(prompt.matches("SECRET").count(), 1);
    }
}

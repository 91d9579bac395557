//! Normalization of raw arbiter replies into grades.
//!
//! Only a fixed set of labels is accepted. Anything outside the table is
//! rejected rather than guessed at.

use crate::error::{EvalError, Result};
use crate::llm::extract_json;
use crate::model::Grade;
use serde_json::{Map, Value};

/// Labels the arbiter is asked to use.
const CANONICAL_LABELS: [(&str, Grade); 3] = [
    ("correct", Grade::Correct),
    ("partial", Grade::Partial),
    ("incorrect", Grade::Incorrect),
];

/// Every accepted spelling, after case folding and whitespace collapsing.
const ACCEPTED_LABELS: [(&str, Grade); 15] = [
    ("correct", Grade::Correct),
    ("right", Grade::Correct),
    ("yes", Grade::Correct),
    ("true", Grade::Correct),
    ("pass", Grade::Correct),
    ("partial", Grade::Partial),
    ("partially correct", Grade::Partial),
    ("partially_correct", Grade::Partial),
    ("partial credit", Grade::Partial),
    ("incorrect", Grade::Incorrect),
    ("wrong", Grade::Incorrect),
    ("no", Grade::Incorrect),
    ("false", Grade::Incorrect),
    ("fail", Grade::Incorrect),
    ("not correct", Grade::Incorrect),
];

const LABEL_PREFIXES: [&str; 4] = ["score:", "verdict:", "grade:", "label:"];
const LABEL_FIELDS: [&str; 4] = ["verdict", "grade", "label", "score"];
const JUSTIFICATION_FIELDS: [&str; 4] = ["justification", "judge_reasoning", "reasoning", "rationale"];

/// Classified arbiter reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ArbiterOutput {
    /// Exactly the requested format.
    WellFormed {
        grade: Grade,
        justification: Option<String>,
    },
    /// Recognizable after normalization (case, whitespace, fences, prefixes).
    NearMiss {
        grade: Grade,
        justification: Option<String>,
    },
    /// No accepted label could be found.
    Unparsable { raw: String },
}

impl ArbiterOutput {
    /// Classify a raw arbiter reply.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let Some(grade) = canonical_label(trimmed) {
            return ArbiterOutput::WellFormed {
                grade,
                justification: None,
            };
        }

        let json_str = extract_json(trimmed);
        if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(&json_str) {
            let exact = json_str == trimmed;
            return Self::from_object(&obj, exact, raw);
        }

        Self::from_text(trimmed, raw)
    }

    /// Grade and justification, or a [`EvalError::JudgeParse`] carrying the raw text.
    pub fn into_result(self) -> Result<(Grade, Option<String>)> {
        match self {
            ArbiterOutput::WellFormed {
                grade,
                justification,
            }
            | ArbiterOutput::NearMiss {
                grade,
                justification,
            } => Ok((grade, justification)),
            ArbiterOutput::Unparsable { raw } => Err(EvalError::judge_parse(
                "no accepted verdict label in arbiter output",
                raw,
            )),
        }
    }

    fn from_object(obj: &Map<String, Value>, exact: bool, raw: &str) -> Self {
        let justification = JUSTIFICATION_FIELDS
            .iter()
            .find_map(|field| obj.get(*field).and_then(Value::as_str))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        for field in LABEL_FIELDS {
            match obj.get(field) {
                Some(Value::String(label)) => {
                    if let Some(grade) = canonical_label(label).filter(|_| exact) {
                        return ArbiterOutput::WellFormed {
                            grade,
                            justification,
                        };
                    }
                    return match normalize_label(label) {
                        Some(grade) => ArbiterOutput::NearMiss {
                            grade,
                            justification,
                        },
                        None => ArbiterOutput::Unparsable {
                            raw: raw.to_string(),
                        },
                    };
                }
                Some(Value::Number(n)) => {
                    return match n.as_f64().and_then(grade_from_score) {
                        Some(grade) => ArbiterOutput::NearMiss {
                            grade,
                            justification,
                        },
                        None => ArbiterOutput::Unparsable {
                            raw: raw.to_string(),
                        },
                    };
                }
                _ => {}
            }
        }

        // Older rubric format: {"is_correct": bool, "question_score": 0|0.5|1}
        if let Some(score) = obj.get("question_score").and_then(Value::as_f64) {
            if let Some(grade) = grade_from_score(score) {
                return ArbiterOutput::NearMiss {
                    grade,
                    justification,
                };
            }
        }
        if let Some(is_correct) = obj.get("is_correct").and_then(Value::as_bool) {
            let grade = if is_correct {
                Grade::Correct
            } else {
                Grade::Incorrect
            };
            return ArbiterOutput::NearMiss {
                grade,
                justification,
            };
        }

        ArbiterOutput::Unparsable {
            raw: raw.to_string(),
        }
    }

    fn from_text(trimmed: &str, raw: &str) -> Self {
        let mut lines = trimmed.lines().map(str::trim).filter(|l| !l.is_empty());

        let Some(first) = lines.next() else {
            return ArbiterOutput::Unparsable {
                raw: raw.to_string(),
            };
        };

        match normalize_label(first) {
            Some(grade) => {
                let rest = lines.collect::<Vec<_>>().join("\n");
                ArbiterOutput::NearMiss {
                    grade,
                    justification: (!rest.is_empty()).then_some(rest),
                }
            }
            None => ArbiterOutput::Unparsable {
                raw: raw.to_string(),
            },
        }
    }
}

fn canonical_label(label: &str) -> Option<Grade> {
    CANONICAL_LABELS
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, grade)| *grade)
}

/// Map a label to a grade after tolerant normalization.
pub fn normalize_label(label: &str) -> Option<Grade> {
    let mut s = label.trim().to_lowercase();

    for prefix in LABEL_PREFIXES {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.to_string();
            break;
        }
    }

    let s = s
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*'))
        .trim_end_matches(['.', '!'])
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    ACCEPTED_LABELS
        .iter()
        .find(|(name, _)| *name == s)
        .map(|(_, grade)| *grade)
}

fn grade_from_score(score: f64) -> Option<Grade> {
    if score == 1.0 {
        Some(Grade::Correct)
    } else if score == 0.5 {
        Some(Grade::Partial)
    } else if score == 0.0 {
        Some(Grade::Incorrect)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_json() {
        let out = ArbiterOutput::parse(r#"{"verdict": "partial", "justification": "Missing unit"}"#);
        assert_eq!(
            out,
            ArbiterOutput::WellFormed {
                grade: Grade::Partial,
                justification: Some("Missing unit".to_string()),
            }
        );
    }

    #[test]
    fn test_bare_label_is_well_formed() {
        assert!(matches!(
            ArbiterOutput::parse("correct"),
            ArbiterOutput::WellFormed {
                grade: Grade::Correct,
                ..
            }
        ));
    }

    #[test]
    fn test_score_prefix_with_case_and_whitespace() {
        let near = ArbiterOutput::parse("Score: CORRECT ");
        assert!(matches!(
            near,
            ArbiterOutput::NearMiss {
                grade: Grade::Correct,
                ..
            }
        ));
        assert_eq!(
            near.into_result().unwrap(),
            ArbiterOutput::parse("correct").into_result().unwrap()
        );
    }

    #[test]
    fn test_fenced_json_is_near_miss() {
        let raw = "```json\n{\"verdict\": \"Incorrect\", \"justification\": \"Wrong year\"}\n```";
        assert_eq!(
            ArbiterOutput::parse(raw),
            ArbiterOutput::NearMiss {
                grade: Grade::Incorrect,
                justification: Some("Wrong year".to_string()),
            }
        );
    }

    #[test]
    fn test_label_line_with_justification() {
        let out = ArbiterOutput::parse("Verdict: Partially Correct.\nOnly one of two figures given.");
        assert_eq!(
            out,
            ArbiterOutput::NearMiss {
                grade: Grade::Partial,
                justification: Some("Only one of two figures given.".to_string()),
            }
        );
    }

    #[test]
    fn test_legacy_rubric_fields() {
        let out = ArbiterOutput::parse(
            r#"{"is_correct": false, "question_score": 0.5, "judge_reasoning": "half"}"#,
        );
        assert_eq!(
            out,
            ArbiterOutput::NearMiss {
                grade: Grade::Partial,
                justification: Some("half".to_string()),
            }
        );

        let out = ArbiterOutput::parse(r#"{"is_correct": true}"#);
        assert!(matches!(
            out,
            ArbiterOutput::NearMiss {
                grade: Grade::Correct,
                ..
            }
        ));
    }

    #[test]
    fn test_unparsable_output() {
        let out = ArbiterOutput::parse("I cannot determine this");
        assert_eq!(
            out,
            ArbiterOutput::Unparsable {
                raw: "I cannot determine this".to_string()
            }
        );
        assert!(matches!(
            out.into_result(),
            Err(EvalError::JudgeParse { .. })
        ));
    }

    #[test]
    fn test_unknown_labels_are_rejected() {
        assert!(matches!(
            ArbiterOutput::parse(r#"{"verdict": "mostly fine"}"#),
            ArbiterOutput::Unparsable { .. }
        ));
        assert!(matches!(
            ArbiterOutput::parse(r#"{"score": 0.7}"#),
            ArbiterOutput::Unparsable { .. }
        ));
        assert!(matches!(ArbiterOutput::parse("   "), ArbiterOutput::Unparsable { .. }));
        assert!(matches!(
            ArbiterOutput::parse("The answer is correct"),
            ArbiterOutput::Unparsable { .. }
        ));
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  **Correct**  "), Some(Grade::Correct));
        assert_eq!(normalize_label("GRADE: wrong!"), Some(Grade::Incorrect));
        assert_eq!(normalize_label("partial   credit"), Some(Grade::Partial));
        assert_eq!(normalize_label("maybe"), None);
    }
}

//! Loading questions, golden answers and precomputed model answers.
//!
//! All inputs are JSON Lines. Entries are keyed by `id` when present and by
//! the trimmed question text otherwise, so golden files that only repeat
//! the question text still join.
//!
//! A bad entry never fails the file: it is set aside as a [`ConfigIssue`]
//! and the remaining entries load normally.

use crate::document::SourceDocument;
use crate::error::{EvalError, Result};
use crate::model::{EvalItem, GoldenAnswer, ModelAnswer, NumericTolerance, Question, Track};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawQuestion {
    #[serde(default)]
    id: Option<String>,
    #[serde(alias = "text")]
    question: String,
    #[serde(default)]
    track: Option<Track>,
    #[serde(default, alias = "page")]
    locator: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    document: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawGolden {
    #[serde(default, alias = "id")]
    question_id: Option<String>,
    #[serde(default)]
    question: Option<String>,
    #[serde(alias = "ground_truth_answer", alias = "ground_truth")]
    answer: String,
    #[serde(default, alias = "ground_truth_rationale")]
    rationale: Option<String>,
    #[serde(default)]
    variants: Vec<String>,
    #[serde(default)]
    tolerance: Option<NumericTolerance>,
    #[serde(default)]
    track: Option<Track>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default, alias = "page")]
    locator: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAnswer {
    #[serde(default)]
    question_id: Option<String>,
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    model_answer: Option<Value>,
    #[serde(default)]
    answer: Option<Value>,
    #[serde(default)]
    rationale: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

/// A golden answer as read from disk, before it is joined with a question.
#[derive(Debug, Clone, PartialEq)]
pub struct GoldenRecord {
    /// Join key: the question id, or the question text when no id is given.
    pub key: String,
    pub question: Option<String>,
    pub track: Option<Track>,
    pub category: Option<String>,
    pub locator: Option<String>,
    pub golden: GoldenAnswer,
}

/// An entry that cannot be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigIssue {
    /// Question id or text; `file:line` when the entry names neither.
    pub question_id: String,
    /// Unknown when the entry itself is what lacks a track.
    pub track: Option<Track>,
    pub category: Option<String>,
    pub reason: String,
}

impl ConfigIssue {
    pub fn new(question_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            track: None,
            category: None,
            reason: reason.into(),
        }
    }

    pub fn for_question(question: &Question, reason: impl Into<String>) -> Self {
        Self {
            question_id: question.id.clone(),
            track: Some(question.track),
            category: question.category.clone(),
            reason: reason.into(),
        }
    }
}

/// Entries read from one input plus the ones set aside.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub entries: Vec<T>,
    pub issues: Vec<ConfigIssue>,
}

impl<T> Default for Loaded<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            issues: Vec::new(),
        }
    }
}

impl<T> From<Vec<T>> for Loaded<T> {
    fn from(entries: Vec<T>) -> Self {
        Self {
            entries,
            issues: Vec::new(),
        }
    }
}

/// Evaluable items plus the entries rejected while loading and joining.
#[derive(Debug, Clone, Default)]
pub struct GoldenSet {
    pub items: Vec<EvalItem>,
    pub issues: Vec<ConfigIssue>,
}

fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Loaded<(String, T)>> {
    let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    Ok(parse_jsonl(&content, &path.display().to_string()))
}

/// Entries paired with their `source:line` location. Lines that do not
/// deserialize become issues keyed by that location.
fn parse_jsonl<T: DeserializeOwned>(content: &str, source: &str) -> Loaded<(String, T)> {
    let mut out = Loaded::default();
    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let location = format!("{}:{}", source, line_num + 1);
        match serde_json::from_str(line) {
            Ok(entry) => out.entries.push((location, entry)),
            Err(e) => out.issues.push(ConfigIssue::new(
                location.clone(),
                format!("{location}: {e}"),
            )),
        }
    }
    out
}

/// Load questions from a JSONL file.
///
/// `default_track` applies to entries without a `track` field; entries left
/// without a track are set aside as issues.
pub fn load_questions(path: &Path, default_track: Option<Track>) -> Result<Loaded<Question>> {
    Ok(questions_from_raw(read_jsonl(path)?, default_track))
}

/// Parse questions from JSONL text.
pub fn parse_questions(content: &str, default_track: Option<Track>) -> Loaded<Question> {
    questions_from_raw(parse_jsonl(content, "<questions>"), default_track)
}

fn questions_from_raw(
    raw: Loaded<(String, RawQuestion)>,
    default_track: Option<Track>,
) -> Loaded<Question> {
    let mut out = Loaded {
        entries: Vec::new(),
        issues: raw.issues,
    };

    for (_, q) in raw.entries {
        let text = q.question.trim().to_string();
        let id = q.id.unwrap_or_else(|| text.clone());
        let Some(track) = q.track.or(default_track) else {
            out.issues.push(ConfigIssue {
                reason: format!("question '{}' has no track", id),
                question_id: id,
                track: None,
                category: q.category,
            });
            continue;
        };
        out.entries.push(Question {
            id,
            text,
            track,
            locator: q.locator,
            category: q.category,
            document: q.document,
        });
    }

    out
}

/// Load golden answers from a JSONL file.
pub fn load_golden(path: &Path) -> Result<Loaded<GoldenRecord>> {
    Ok(golden_from_raw(read_jsonl(path)?))
}

/// Parse golden answers from JSONL text.
pub fn parse_golden(content: &str) -> Loaded<GoldenRecord> {
    golden_from_raw(parse_jsonl(content, "<golden>"))
}

fn golden_from_raw(raw: Loaded<(String, RawGolden)>) -> Loaded<GoldenRecord> {
    let mut out = Loaded {
        entries: Vec::new(),
        issues: raw.issues,
    };

    for (location, g) in raw.entries {
        let question = g
            .question
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());
        let Some(key) = g.question_id.clone().or_else(|| question.clone()) else {
            out.issues.push(ConfigIssue {
                track: g.track,
                category: g.category,
                ..ConfigIssue::new(
                    location,
                    format!("golden answer '{}' has neither question_id nor question", g.answer),
                )
            });
            continue;
        };
        out.entries.push(GoldenRecord {
            golden: GoldenAnswer {
                question_id: key.clone(),
                answer: g.answer,
                rationale: g.rationale,
                variants: g.variants,
                tolerance: g.tolerance,
            },
            key,
            question,
            track: g.track,
            category: g.category,
            locator: g.locator,
        });
    }

    out
}

impl GoldenSet {
    /// Join questions with golden answers, keeping question order.
    ///
    /// A golden answer matches a question by id first, then by question
    /// text. Questions without a match, or repeating an earlier id, become
    /// [`ConfigIssue`]s, after any issues carried in from loading.
    pub fn join(
        questions: impl Into<Loaded<Question>>,
        golden: impl Into<Loaded<GoldenRecord>>,
    ) -> Self {
        let questions = questions.into();
        let golden = golden.into();

        let mut by_key: HashMap<String, GoldenRecord> = HashMap::new();
        let mut by_text: HashMap<String, String> = HashMap::new();
        for record in golden.entries {
            if let Some(text) = &record.question {
                by_text.insert(text.clone(), record.key.clone());
            }
            by_key.insert(record.key.clone(), record);
        }

        let mut set = GoldenSet {
            items: Vec::new(),
            issues: questions.issues,
        };
        let mut seen = HashSet::new();

        for mut question in questions.entries {
            if !seen.insert(question.id.clone()) {
                let reason = format!("duplicate question id '{}'", question.id);
                set.issues.push(ConfigIssue::for_question(&question, reason));
                continue;
            }

            let record = by_key.get(&question.id).or_else(|| {
                by_text
                    .get(question.text.trim())
                    .and_then(|key| by_key.get(key))
            });

            match record {
                Some(record) => {
                    if question.category.is_none() {
                        question.category = record.category.clone();
                    }
                    if question.locator.is_none() {
                        question.locator = record.locator.clone();
                    }
                    let mut golden = record.golden.clone();
                    golden.question_id = question.id.clone();
                    set.items.push(EvalItem { question, golden });
                }
                None => {
                    let reason = format!("no golden answer for question '{}'", question.id);
                    set.issues.push(ConfigIssue::for_question(&question, reason));
                }
            }
        }

        set.issues.extend(golden.issues);
        set
    }

    /// Build items from golden records that carry their own question text.
    ///
    /// Records without question text or a track become issues.
    pub fn from_golden(
        golden: impl Into<Loaded<GoldenRecord>>,
        default_track: Option<Track>,
    ) -> Self {
        let golden = golden.into();
        let mut questions: Loaded<Question> = Loaded::default();

        for record in &golden.entries {
            let issue = |reason: String| ConfigIssue {
                track: record.track.or(default_track),
                category: record.category.clone(),
                ..ConfigIssue::new(record.key.clone(), reason)
            };
            let Some(text) = record.question.clone() else {
                questions.issues.push(issue(format!(
                    "golden answer '{}' carries no question text",
                    record.key
                )));
                continue;
            };
            let Some(track) = record.track.or(default_track) else {
                questions
                    .issues
                    .push(issue(format!("golden answer '{}' has no track", record.key)));
                continue;
            };
            questions.entries.push(Question {
                id: record.key.clone(),
                text,
                track,
                locator: None,
                category: None,
                document: None,
            });
        }

        Self::join(questions, golden)
    }

    /// Append issues found outside the question and golden inputs.
    pub fn with_issues(mut self, issues: impl IntoIterator<Item = ConfigIssue>) -> Self {
        self.issues.extend(issues);
        self
    }

    /// Item whose question id or text equals `key`.
    pub fn find(&self, key: &str) -> Option<&EvalItem> {
        let key = key.trim();
        self.items
            .iter()
            .find(|item| item.question.id == key)
            .or_else(|| self.items.iter().find(|item| item.question.text == key))
    }

    /// Keep only the first `n` items (for quick runs).
    pub fn take(mut self, n: usize) -> Self {
        self.items.truncate(n);
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One precomputed entry: the recorded answer, or why there is none.
#[derive(Debug, Clone, PartialEq)]
pub struct PrecomputedAnswer {
    pub question_id: String,
    pub model: String,
    pub answer: std::result::Result<ModelAnswer, String>,
}

impl PrecomputedAnswer {
    pub fn answered(answer: ModelAnswer) -> Self {
        Self {
            question_id: answer.question_id.clone(),
            model: answer.model.clone(),
            answer: Ok(answer),
        }
    }

    pub fn missing(
        question_id: impl Into<String>,
        model: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            question_id: question_id.into(),
            model: model.into(),
            answer: Err(reason.into()),
        }
    }
}

/// Load precomputed answers from a JSONL file.
///
/// Accepts `{"question_id" | "question", "model", "model_answer": {"answer",
/// "rationale"}}` as well as `answer`/`rationale` at the top level. The model
/// name falls back to `metadata.extractor_model`, then to `default_model`.
/// Entries with `metadata.error` or without a non-blank answer load as
/// missing answers.
pub fn load_answers(path: &Path, default_model: Option<&str>) -> Result<Loaded<PrecomputedAnswer>> {
    Ok(answers_from_raw(read_jsonl(path)?, default_model))
}

/// Parse precomputed answers from JSONL text.
pub fn parse_answers(content: &str, default_model: Option<&str>) -> Loaded<PrecomputedAnswer> {
    answers_from_raw(parse_jsonl(content, "<answers>"), default_model)
}

fn answers_from_raw(
    raw: Loaded<(String, RawAnswer)>,
    default_model: Option<&str>,
) -> Loaded<PrecomputedAnswer> {
    let mut out = Loaded {
        entries: Vec::new(),
        issues: raw.issues,
    };

    for (location, entry) in raw.entries {
        let Some(key) = entry
            .question_id
            .or_else(|| entry.question.map(|q| q.trim().to_string()))
            .filter(|k| !k.is_empty())
        else {
            out.issues
                .push(ConfigIssue::new(location, "answer entry has no question"));
            continue;
        };

        let metadata = entry.metadata.as_ref();
        let Some(model) = entry
            .model
            .or_else(|| {
                metadata
                    .and_then(|m| m.get("extractor_model"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .or_else(|| default_model.map(str::to_string))
        else {
            let reason = format!("answer for '{}' names no model", key);
            out.issues.push(ConfigIssue::new(key, reason));
            continue;
        };

        let failure = metadata
            .and_then(|m| m.get("error"))
            .filter(|e| !e.is_null())
            .map(|e| match e {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        if let Some(error) = failure {
            out.entries.push(PrecomputedAnswer::missing(
                key,
                model,
                format!("extraction failed: {error}"),
            ));
            continue;
        }

        let (answer, rationale) = match entry.model_answer {
            Some(Value::Object(obj)) => (
                obj.get("answer").cloned(),
                obj.get("rationale").and_then(Value::as_str).map(str::to_string),
            ),
            Some(other) => (Some(other), entry.rationale),
            None => (entry.answer, entry.rationale),
        };

        let text = match answer {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        if text.is_empty() {
            out.entries
                .push(PrecomputedAnswer::missing(key, model, "no answer recorded"));
            continue;
        }

        let mut answer = ModelAnswer::new(key, model, text);
        answer.rationale = rationale.filter(|r| !r.trim().is_empty());
        out.entries.push(PrecomputedAnswer::answered(answer));
    }

    out
}

/// Name of the built-in sample document.
pub const SAMPLE_DOCUMENT: &str = "sample-sustainability-report";

/// A small golden set over a built-in text document, for smoke runs.
pub fn sample_set() -> (GoldenSet, SourceDocument) {
    let document = SourceDocument::from_text(
        SAMPLE_DOCUMENT,
        r#"
Northwind Logistics - 2024 Sustainability Report

Table 1: Greenhouse gas emissions (tCO2e)
| Scope   | 2022    | 2023    | 2024    |
|---------|---------|---------|---------|
| Scope 1 | 48,200  | 45,900  | 41,300  |
| Scope 2 | 12,400  | 9,800   | 6,100   |
| Total   | 60,600  | 55,700  | 47,400  |

Renewable electricity reached 78% of purchased power in 2024, up from 52%
in 2023, after three new power purchase agreements came into force.

The company targets net-zero operational emissions by 2040. Fleet
electrification is the main lever for Scope 1; the first 400 electric
trucks entered service in the second half of 2024.
"#,
    );

    let questions = vec![
        Question::new(
            "sample_1",
            "What were total Scope 1 and 2 emissions in 2024, in tCO2e?",
            Track::StructuralFidelity,
        )
        .with_locator("Table 1")
        .with_category("Emissions"),
        Question::new(
            "sample_2",
            "What share of purchased electricity was renewable in 2024?",
            Track::StructuralFidelity,
        )
        .with_category("Energy"),
        Question::new(
            "sample_3",
            "Why did Scope 2 emissions fall between 2023 and 2024?",
            Track::ContextualReasoning,
        )
        .with_category("Energy"),
        Question::new(
            "sample_4",
            "By what year does the company target net-zero operational emissions, and what is the main lever for Scope 1?",
            Track::ContextualReasoning,
        )
        .with_category("Targets"),
    ];

    let golden = vec![
        GoldenAnswer::new("sample_1", "47,400 tCO2e").with_tolerance(47_400.0, 50.0),
        GoldenAnswer::new("sample_2", "78%").with_tolerance(78.0, 0.5),
        GoldenAnswer {
            rationale: Some(
                "Renewable share rose from 52% to 78% after new power purchase agreements."
                    .to_string(),
            ),
            variants: vec!["More renewable electricity from new PPAs".to_string()],
            ..GoldenAnswer::new(
                "sample_3",
                "Renewable electricity purchases increased through new power purchase agreements",
            )
        },
        GoldenAnswer {
            rationale: Some("Both facts appear in the final paragraph.".to_string()),
            ..GoldenAnswer::new("sample_4", "2040; fleet electrification")
        },
    ];

    let items = questions
        .into_iter()
        .zip(golden)
        .map(|(question, golden)| EvalItem { question, golden })
        .collect();

    (
        GoldenSet {
            items,
            issues: Vec::new(),
        },
        document,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_questions() {
        let content = r#"
{"id": "q1", "question": " What is Scope 1? ", "track": "structural_fidelity", "page": "p. 4"}

{"question": "Why?", "category": "Energy"}
"#;
        let questions = parse_questions(content, Some(Track::ContextualReasoning));
        assert!(questions.issues.is_empty());
        let questions = questions.entries;
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].id, "q1");
        assert_eq!(questions[0].text, "What is Scope 1?");
        assert_eq!(questions[0].locator.as_deref(), Some("p. 4"));
        assert_eq!(questions[1].id, "Why?");
        assert_eq!(questions[1].track, Track::ContextualReasoning);
    }

    #[test]
    fn test_question_without_track_is_set_aside() {
        let content = r#"{"id": "q1", "question": "How much?", "track": "A"}
{"id": "q2", "question": "No track?", "category": "Energy"}"#;
        let questions = parse_questions(content, None);

        assert_eq!(questions.entries.len(), 1);
        assert_eq!(questions.entries[0].id, "q1");
        assert_eq!(questions.issues.len(), 1);
        assert_eq!(questions.issues[0].question_id, "q2");
        assert_eq!(questions.issues[0].track, None);
        assert_eq!(questions.issues[0].category.as_deref(), Some("Energy"));
        assert!(questions.issues[0].reason.contains("no track"));
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let questions = parse_questions("{\"question\": \"a\", \"track\": \"A\"}\nnot json", None);
        assert_eq!(questions.entries.len(), 1);
        assert_eq!(questions.issues.len(), 1);
        assert_eq!(questions.issues[0].question_id, "<questions>:2");
    }

    #[test]
    fn test_bad_golden_entries_do_not_sink_the_set() {
        let questions = vec![
            Question::new("q1", "First?", Track::StructuralFidelity),
            Question::new("q2", "Second?", Track::ContextualReasoning),
        ];
        let golden = parse_golden(
            r#"{"question_id": "q1", "answer": "one"}
{"answer": "orphan", "track": "B"}
{"question_id": "q2"}"#,
        );
        assert_eq!(golden.entries.len(), 1);
        assert_eq!(golden.issues.len(), 2);
        let keyless = golden
            .issues
            .iter()
            .find(|issue| issue.question_id == "<golden>:2")
            .unwrap();
        assert_eq!(keyless.track, Some(Track::ContextualReasoning));

        let set = GoldenSet::join(questions, golden);
        assert_eq!(set.len(), 1);
        assert_eq!(set.items[0].question.id, "q1");

        let mut ids: Vec<&str> = set.issues.iter().map(|i| i.question_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["<golden>:2", "<golden>:3", "q2"]);
    }

    #[test]
    fn test_join_carries_question_issues() {
        let questions = parse_questions(
            r#"{"id": "q1", "question": "First?", "track": "A"}
{"id": "q2", "question": "Second?"}"#,
            None,
        );
        let golden = parse_golden(
            r#"{"question_id": "q1", "answer": "one"}
{"question_id": "q2", "answer": "two"}"#,
        );

        let set = GoldenSet::join(questions, golden);
        assert_eq!(set.len(), 1);
        assert_eq!(set.issues.len(), 1);
        assert_eq!(set.issues[0].question_id, "q2");
    }

    #[test]
    fn test_join_by_id_and_text() {
        let questions = vec![
            Question::new("q1", "First?", Track::StructuralFidelity),
            Question::new("q2", "Second?", Track::ContextualReasoning),
            Question::new("q3", "Third?", Track::ContextualReasoning),
        ];
        let golden = parse_golden(
            r#"{"question_id": "q1", "answer": "one", "category": "Numbers"}
{"question": "Second?", "ground_truth_answer": "two", "variants": ["2"]}"#,
        );

        let set = GoldenSet::join(questions, golden);
        assert_eq!(set.len(), 2);
        assert_eq!(set.items[0].question.category.as_deref(), Some("Numbers"));
        assert_eq!(set.items[1].golden.question_id, "q2");
        assert_eq!(set.items[1].golden.variants, vec!["2"]);

        assert_eq!(set.issues.len(), 1);
        assert_eq!(set.issues[0].question_id, "q3");
        assert_eq!(set.issues[0].track, Some(Track::ContextualReasoning));
        assert!(set.issues[0].reason.contains("no golden answer"));
    }

    #[test]
    fn test_join_rejects_duplicate_ids() {
        let questions = vec![
            Question::new("q1", "First?", Track::StructuralFidelity),
            Question::new("q1", "Again?", Track::StructuralFidelity),
        ];
        let golden = parse_golden(r#"{"question_id": "q1", "answer": "one"}"#);

        let set = GoldenSet::join(questions, golden);
        assert_eq!(set.len(), 1);
        assert_eq!(set.issues.len(), 1);
        assert!(set.issues[0].reason.contains("duplicate"));
    }

    #[test]
    fn test_from_golden() {
        let golden = parse_golden(
            r#"{"question": "How much?", "answer": "42 ± 1", "track": "A", "category": "Figures"}"#,
        );
        let set = GoldenSet::from_golden(golden, None);

        let item = set.find("How much?").unwrap();
        assert_eq!(item.track(), Track::StructuralFidelity);
        assert_eq!(item.question.category_or_default(), "Figures");
        assert!(item.golden.numeric_tolerance().is_some());
    }

    #[test]
    fn test_from_golden_sets_aside_incomplete_records() {
        let golden = parse_golden(
            r#"{"question": "How much?", "answer": "42", "track": "A"}
{"question": "Untracked?", "answer": "7"}
{"question_id": "g3", "answer": "no text", "track": "B"}"#,
        );
        let set = GoldenSet::from_golden(golden, None);

        assert_eq!(set.len(), 1);
        assert!(set.find("How much?").is_some());
        assert_eq!(set.issues.len(), 2);
        assert_eq!(set.issues[0].question_id, "Untracked?");
        assert!(set.issues[0].reason.contains("no track"));
        assert_eq!(set.issues[1].question_id, "g3");
        assert_eq!(set.issues[1].track, Some(Track::ContextualReasoning));
    }

    #[test]
    fn test_parse_answers_formats() {
        let content = r#"
{"question": "How much?", "model_answer": {"answer": 42, "rationale": "Table 2"}, "metadata": {"extractor_model": "vendor/a"}}
{"question_id": "q2", "model": "vendor/b", "answer": " yes ", "rationale": ""}
{"question_id": "q3", "answer": "no"}
"#;
        let loaded = parse_answers(content, Some("fallback"));
        assert!(loaded.issues.is_empty());
        let answers: Vec<ModelAnswer> = loaded
            .entries
            .into_iter()
            .map(|entry| entry.answer.unwrap())
            .collect();
        assert_eq!(answers.len(), 3);

        assert_eq!(answers[0].question_id, "How much?");
        assert_eq!(answers[0].model, "vendor/a");
        assert_eq!(answers[0].text, "42");
        assert_eq!(answers[0].rationale.as_deref(), Some("Table 2"));

        assert_eq!(answers[1].model, "vendor/b");
        assert_eq!(answers[1].text, "yes");
        assert!(answers[1].rationale.is_none());

        assert_eq!(answers[2].model, "fallback");
    }

    #[test]
    fn test_failed_extractions_load_as_missing() {
        let content = r#"
{"question": "Q1?", "model_answer": null, "metadata": {"extractor_model": "m", "error": "boom"}}
{"question_id": "q2", "model": "m", "model_answer": {"answer": null, "rationale": "none"}}
{"question_id": "q3", "model": "m", "answer": "   "}
{"question_id": "q4", "model": "m"}
"#;
        let loaded = parse_answers(content, None);
        assert!(loaded.issues.is_empty());
        assert_eq!(loaded.entries.len(), 4);

        assert_eq!(loaded.entries[0].question_id, "Q1?");
        assert_eq!(loaded.entries[0].model, "m");
        match &loaded.entries[0].answer {
            Err(reason) => assert!(reason.contains("boom")),
            other => panic!("unexpected answer {other:?}"),
        }
        assert!(loaded.entries.iter().all(|entry| entry.answer.is_err()));
    }

    #[test]
    fn test_answer_without_model_is_set_aside() {
        let loaded = parse_answers(
            r#"{"question_id": "q1", "answer": "x"}
{"question_id": "q2", "model": "m", "answer": "y"}
{"model": "m", "answer": "z"}"#,
            None,
        );
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].question_id, "q2");

        let ids: Vec<&str> = loaded.issues.iter().map(|i| i.question_id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "<answers>:3"]);
    }

    #[test]
    fn test_load_from_files() {
        let dir = TempDir::new().unwrap();
        let questions_path = dir.path().join("questions.jsonl");
        let golden_path = dir.path().join("golden.jsonl");
        fs::write(
            &questions_path,
            "{\"id\": \"q1\", \"question\": \"What?\", \"track\": \"B\"}\n",
        )
        .unwrap();
        fs::write(&golden_path, "{\"question_id\": \"q1\", \"answer\": \"That\"}\n").unwrap();

        let questions = load_questions(&questions_path, None).unwrap();
        let golden = load_golden(&golden_path).unwrap();
        let set = GoldenSet::join(questions, golden);
        assert_eq!(set.len(), 1);
        assert!(set.issues.is_empty());

        assert!(load_questions(&dir.path().join("missing.jsonl"), None).is_err());
    }

    #[test]
    fn test_sample_set() {
        let (set, document) = sample_set();
        assert_eq!(set.len(), 4);
        assert!(set.issues.is_empty());
        assert_eq!(document.name, SAMPLE_DOCUMENT);
        assert!(document.text().unwrap().contains("47,400"));
        for track in Track::ALL {
            assert!(set.items.iter().any(|item| item.track() == track));
        }
        assert_eq!(set.take(1).len(), 1);
    }
}

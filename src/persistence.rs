//! Persistence layer for run logs and aggregate reports.
//!
//! Run logs are JSON Lines (one [`RunRecord`] per line) so partial runs can
//! be concatenated and re-aggregated; reports are pretty-printed JSON.

use crate::aggregate::AggregateReport;
use crate::error::{EvalError, Result};
use crate::pipeline::RunRecord;
use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Default filename for a run log.
pub const DEFAULT_LOG_FILENAME: &str = "run_log.jsonl";

/// Default filename for an aggregate report.
pub const DEFAULT_REPORT_FILENAME: &str = "report.json";

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
        }
    }
    Ok(())
}

/// Write records as JSON Lines, replacing any existing file.
pub fn save_run_log(records: &[RunRecord], path: &Path) -> Result<()> {
    ensure_parent(path)?;

    let file = fs::File::create(path).map_err(|e| EvalError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|e| EvalError::Serialization(e.to_string()))?;
        writeln!(writer, "{}", line).map_err(|e| EvalError::io(path, e))?;
    }
    writer.flush().map_err(|e| EvalError::io(path, e))?;

    Ok(())
}

/// Read a JSON Lines run log. Blank lines are ignored.
pub fn load_run_log(path: &Path) -> Result<Vec<RunRecord>> {
    let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;

    let mut records = Vec::new();
    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|e| {
            EvalError::Serialization(format!("{}:{}: {}", path.display(), line_num + 1, e))
        })?;
        records.push(record);
    }

    Ok(records)
}

/// Read and concatenate several run logs, in the order given.
pub fn load_run_logs(paths: &[PathBuf]) -> Result<Vec<RunRecord>> {
    let mut records = Vec::new();
    for path in paths {
        records.extend(load_run_log(path)?);
    }
    Ok(records)
}

/// One record per (model, question), keeping the most recent.
///
/// Overlapping logs, such as a rerun saved next to the original, would
/// otherwise count the same question twice. Ties on timestamp go to the
/// record with the greater outcome label and grade, so the result does not
/// depend on the order logs were read. Records keep first-seen order.
pub fn latest_records(records: Vec<RunRecord>) -> Vec<RunRecord> {
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut kept: Vec<RunRecord> = Vec::with_capacity(records.len());

    for record in records {
        let key = (record.model.clone(), record.question_id.clone());
        match index.get(&key) {
            Some(&i) => {
                if supersedes(&record, &kept[i]) {
                    kept[i] = record;
                }
            }
            None => {
                index.insert(key, kept.len());
                kept.push(record);
            }
        }
    }

    kept
}

fn supersedes(candidate: &RunRecord, current: &RunRecord) -> bool {
    (candidate.timestamp, candidate.outcome.label(), candidate.grade())
        > (current.timestamp, current.outcome.label(), current.grade())
}

/// Save an aggregate report as pretty JSON.
pub fn save_report(report: &AggregateReport, path: &Path) -> Result<()> {
    ensure_parent(path)?;

    let data = serde_json::to_string_pretty(report)
        .map_err(|e| EvalError::Serialization(e.to_string()))?;
    fs::write(path, data).map_err(|e| EvalError::io(path, e))?;

    Ok(())
}

/// Load an aggregate report.
pub fn load_report(path: &Path) -> Result<AggregateReport> {
    let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| EvalError::Serialization(e.to_string()))
}

/// All `*.jsonl` files under `dir`, sorted by path.
pub fn discover_logs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(EvalError::io(
            dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let mut logs: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("jsonl"))
        .collect();
    logs.sort();

    Ok(logs)
}

/// Default log path for a model under a results directory.
///
/// Slashes in provider-qualified names (`vendor/model`) are replaced.
pub fn log_path_for(dir: &Path, label: &str) -> PathBuf {
    let safe: String = label
        .chars()
        .map(|c| if c == '/' || c == ':' || c.is_whitespace() { '_' } else { c })
        .collect();
    dir.join(format!("{}.jsonl", safe))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{ScoreAggregator, ScoredItem, ScoringPolicy};
    use crate::model::{Grade, Question, Track, Verdict, VerdictMethod};
    use crate::pipeline::Outcome;
    use chrono::Utc;
    use tempfile::TempDir;

    fn judged(id: &str, model: &str, grade: Grade) -> RunRecord {
        RunRecord {
            question_id: id.to_string(),
            model: model.to_string(),
            track: Some(Track::StructuralFidelity),
            category: "Emissions".to_string(),
            raw_answer: Some("42".to_string()),
            rationale: None,
            outcome: Outcome::Judged {
                verdict: Verdict {
                    question_id: id.to_string(),
                    model: model.to_string(),
                    grade,
                    justification: None,
                    judge_model: "judge".to_string(),
                    method: VerdictMethod::Arbiter,
                    timestamp: Utc::now(),
                },
            },
            timestamp: Utc::now(),
        }
    }

    fn unavailable(id: &str, model: &str) -> RunRecord {
        let question = Question::new(id, "?", Track::ContextualReasoning);
        RunRecord {
            question_id: question.id,
            model: model.to_string(),
            track: Some(question.track),
            category: "Uncategorized".to_string(),
            raw_answer: None,
            rationale: None,
            outcome: Outcome::AnswerUnavailable {
                reason: "timeout".to_string(),
            },
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_save_and_load_run_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("run.jsonl");

        let records = vec![
            judged("q1", "m1", Grade::Correct),
            unavailable("q2", "m1"),
        ];
        save_run_log(&records, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("\"status\":\"judged\""));

        let loaded = load_run_log(&path).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_load_run_log_reports_bad_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.jsonl");
        fs::write(&path, "\n{\"oops\": 1}\n").unwrap();

        match load_run_log(&path) {
            Err(EvalError::Serialization(msg)) => assert!(msg.contains(":2:")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_reaggregate_multiple_logs() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.jsonl");
        let b = dir.path().join("sub").join("b.jsonl");
        save_run_log(&[judged("q1", "m1", Grade::Correct)], &a).unwrap();
        save_run_log(
            &[judged("q2", "m1", Grade::Partial), unavailable("q3", "m1")],
            &b,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let logs = discover_logs(dir.path()).unwrap();
        assert_eq!(logs, vec![a, b]);

        let records = load_run_logs(&logs).unwrap();
        let scored: Vec<ScoredItem> = records.iter().filter_map(RunRecord::scored).collect();
        let report = ScoreAggregator::new(ScoringPolicy::default()).aggregate(&scored);

        let result = report.get("m1", Track::StructuralFidelity).unwrap();
        assert_eq!(result.count, 2);
        assert_eq!(result.score_pct, Some(75.0));
    }

    #[test]
    fn test_overlapping_logs_count_each_question_once() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first.jsonl");
        let rerun = dir.path().join("rerun.jsonl");

        let mut stale = judged("q1", "m1", Grade::Incorrect);
        stale.timestamp = Utc::now() - chrono::Duration::hours(1);
        save_run_log(&[stale, judged("q2", "m1", Grade::Correct)], &first).unwrap();
        save_run_log(&[judged("q1", "m1", Grade::Correct)], &rerun).unwrap();

        for logs in [
            vec![first.clone(), rerun.clone()],
            vec![rerun.clone(), first.clone()],
        ] {
            let records = latest_records(load_run_logs(&logs).unwrap());
            assert_eq!(records.len(), 2);

            let scored: Vec<ScoredItem> = records.iter().filter_map(RunRecord::scored).collect();
            let report = ScoreAggregator::new(ScoringPolicy::default()).aggregate(&scored);
            let result = report.get("m1", Track::StructuralFidelity).unwrap();
            assert_eq!(result.count, 2);
            assert_eq!(result.score_pct, Some(100.0));
        }
    }

    #[test]
    fn test_latest_records_keeps_other_models() {
        let records = latest_records(vec![
            judged("q1", "m1", Grade::Correct),
            judged("q1", "m2", Grade::Partial),
            unavailable("q2", "m1"),
        ]);
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_save_and_load_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");

        let scored: Vec<ScoredItem> = judged("q1", "m1", Grade::Correct).scored().into_iter().collect();
        let report = ScoreAggregator::new(ScoringPolicy::default()).aggregate(&scored);
        save_report(&report, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"score_pct\""));
        assert!(content.contains("\"overall_pct\""));

        let loaded = load_report(&path).unwrap();
        assert_eq!(loaded, report);
    }

    #[test]
    fn test_discover_logs_missing_dir() {
        assert!(discover_logs(Path::new("/nonexistent/results")).is_err());
    }

    #[test]
    fn test_log_path_for() {
        let path = log_path_for(Path::new("results"), "openai/gpt-5.1");
        assert_eq!(path, PathBuf::from("results/openai_gpt-5.1.jsonl"));
    }
}

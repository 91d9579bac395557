//! Error types for trackbench.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors that can occur while loading, answering, judging or reporting.
///
/// The first four variants are per-item outcomes: the pipeline turns them
/// into log entries and never lets them abort a run.
#[derive(Error, Debug)]
pub enum EvalError {
    /// The model under evaluation failed or timed out for one question.
    #[error("Answer unavailable: {0}")]
    AnswerUnavailable(String),

    /// The judge's external model call failed.
    #[error("Arbiter unavailable: {0}")]
    ArbiterUnavailable(String),

    /// The arbiter answered but its verdict could not be normalized.
    #[error("Failed to parse judge verdict: {message}")]
    JudgeParse { message: String, raw: String },

    /// Invalid question or golden-answer data.
    #[error("Invalid evaluation data: {0}")]
    Configuration(String),

    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The source document could not be located.
    #[error("Document not found: '{0}'")]
    DocumentNotFound(String),

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// LLM response parsing error.
    #[error("Failed to parse LLM response: {0}")]
    LlmParse(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// An external call exceeded its time budget.
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EvalError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a judge parse error that keeps the raw arbiter text.
    pub fn judge_parse(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::JudgeParse {
            message: message.into(),
            raw: raw.into(),
        }
    }

    /// Whether retrying the same call could produce a different result.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EvalError::AnswerUnavailable(_)
                | EvalError::ArbiterUnavailable(_)
                | EvalError::LlmApi(_)
                | EvalError::Http(_)
                | EvalError::Timeout(_)
        )
    }
}

impl From<reqwest::Error> for EvalError {
    fn from(err: reqwest::Error) -> Self {
        EvalError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        EvalError::LlmParse(err.to_string())
    }
}

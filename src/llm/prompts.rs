//! LLM prompts for answering and judging.
//!
//! Templates use `{placeholder}` markers that callers fill with `str::replace`.

use crate::model::Track;

/// Collection of prompts used for extraction and judging.
pub struct Prompts;

impl Prompts {
    /// System prompt for the model under evaluation.
    pub fn extractor_system() -> &'static str {
        r#"You are a high-accuracy document extraction agent.
A document (or a slice of one) is attached. Use ONLY its contents.
Follow the user's question exactly, whether it asks for a structured list, a figure, or a semantic boundary.

Navigation rules:
- "On page X" refers to the page number printed on the page (headers, footers, corners), not the file index.
- Search the whole page for that printed number before answering; do not assume where it appears.

Respond with VALID JSON ONLY in this format:
{
  "answer": <value copied or derived from the document>,
  "rationale": "<brief explanation pointing to the relevant content>"
}

"answer" may be a string, number, list or object depending on the question.
Always include a rationale grounded in what you saw. Do not add markdown or commentary."#
    }

    /// System prompt for the arbiter.
    pub fn judge_system() -> &'static str {
        "You are an evaluation judge. You compare a candidate answer against a reference answer and reply with a machine-readable verdict only."
    }

    /// Judge prompt for the structural fidelity track.
    pub fn judge_structural() -> &'static str {
        r#"You are grading an answer that was EXTRACTED from tables, charts or figures in a document.

Question: {question}

Reference answer: {golden_answer}
Reference rationale: {golden_rationale}
Also acceptable: {variants}

Candidate answer: {model_answer}
Candidate rationale: {model_rationale}

Grading rules:
- "correct": every value matches the reference (formatting, thousands separators and equivalent units are fine).
- "partial": some but not all requested values are right, or the right value is given with a wrong unit or period.
- "incorrect": the values are wrong, missing, or invented.

Respond in JSON format:
{
    "verdict": "<correct|partial|incorrect>",
    "justification": "<one or two sentences>"
}

Respond with only the JSON, no other text."#
    }

    /// Judge prompt for the contextual reasoning track.
    pub fn judge_contextual() -> &'static str {
        r#"You are grading an answer that requires REASONING over a document: synthesis, inference or cross-referencing.

Question: {question}

Reference answer: {golden_answer}
Reference rationale: {golden_rationale}
Also acceptable: {variants}

Candidate answer: {model_answer}
Candidate rationale: {model_rationale}

Grading rules:
- "correct": the candidate reaches the same conclusion as the reference; wording may differ.
- "partial": the conclusion is incomplete or only part of the required reasoning is right.
- "incorrect": the conclusion contradicts the reference or is unsupported.

Respond in JSON format:
{
    "verdict": "<correct|partial|incorrect>",
    "justification": "<one or two sentences>"
}

Respond with only the JSON, no other text."#
    }

    /// Judge template for a track.
    pub fn judge_for(track: Track) -> &'static str {
        match track {
            Track::StructuralFidelity => Self::judge_structural(),
            Track::ContextualReasoning => Self::judge_contextual(),
        }
    }

    /// Prompt used to verify connectivity.
    pub fn connection_check() -> &'static str {
        "Say 'hello' and nothing else."
    }

    /// Substitute `{name}` placeholders in one pass over `template`.
    ///
    /// Substituted text is never scanned again, so values may contain
    /// braces or placeholder names. Unknown `{...}` spans are kept as is.
    pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let value = after.find('}').and_then(|close| {
                let name = &after[..close];
                values
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| (close, *value))
            });
            match value {
                Some((close, value)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        out
    }
}

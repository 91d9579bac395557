//! Numeric pre-check that settles answers without asking the arbiter.

use crate::model::NumericTolerance;
use regex::Regex;
use std::sync::LazyLock;

const NUMBER: &str = r"[-+−]?(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?|[-+−]?\.\d+";

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(NUMBER).expect("number pattern is valid"));

static INLINE_TOLERANCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\s*({NUMBER})\s*%?\s*(?:±|\+/-|\+-)\s*({NUMBER})\s*%?\s*$"))
        .expect("tolerance pattern is valid")
});

fn parse_number(token: &str) -> Option<f64> {
    token.replace(',', "").replace('−', "-").parse().ok()
}

/// All numbers appearing in `text`, in order.
///
/// Digits glued to a preceding letter belong to a name or unit (`CO2`,
/// `Q3`, `FY2024`) and are not numbers.
pub fn extract_numbers(text: &str) -> Vec<f64> {
    NUMBER_RE
        .find_iter(text)
        .filter(|m| {
            !text[..m.start()]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphabetic() || c == '_')
        })
        .filter_map(|m| parse_number(m.as_str()))
        .collect()
}

/// Parse a golden answer written as `42 ± 1` or `42 +/- 1`.
pub fn parse_inline_tolerance(text: &str) -> Option<NumericTolerance> {
    let caps = INLINE_TOLERANCE_RE.captures(text)?;
    let value = parse_number(caps.get(1)?.as_str())?;
    let tolerance = parse_number(caps.get(2)?.as_str())?;
    Some(NumericTolerance::new(value, tolerance))
}

/// The answer's number, if it has exactly one distinct number and that
/// number is within tolerance.
///
/// Answers mentioning several different numbers are left to the arbiter,
/// since a year or a table index would otherwise match by accident.
pub fn match_within_tolerance(answer: &str, tolerance: &NumericTolerance) -> Option<f64> {
    let mut numbers = extract_numbers(answer);
    numbers.sort_by(f64::total_cmp);
    numbers.dedup();
    match numbers.as_slice() {
        [only] if tolerance.contains(*only) => Some(*only),
        _ => None,
    }
}

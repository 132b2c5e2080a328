//! Structured report model.
//!
//! The analysis service has no type tag for structured results. A JSON object is
//! treated as a report when it carries at least one of `summary`,
//! `abnormalFindings` or `urgency` (see [`is_structured_report`]). The list
//! sections may arrive either as arrays or as delimited strings; [`to_list`]
//! flattens both into clean lines.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

const SUMMARY_KEYS: &[&str] = &["summary"];
const FINDINGS_KEYS: &[&str] = &["abnormalFindings", "abnormal_findings"];
const TESTS_KEYS: &[&str] = &["recommendedTests", "recommended_tests"];
const LIFESTYLE_KEYS: &[&str] = &["lifestyleSuggestions", "lifestyle_suggestions"];
const URGENCY_KEYS: &[&str] = &["urgency"];

/// A list-valued report section as sent by the service: a delimited string or an array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListField {
    Text(String),
    Items(Vec<Value>),
}

/// A normalized medical analysis result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, alias = "abnormal_findings", skip_serializing_if = "Option::is_none")]
    pub abnormal_findings: Option<ListField>,
    #[serde(default, alias = "recommended_tests", skip_serializing_if = "Option::is_none")]
    pub recommended_tests: Option<ListField>,
    #[serde(default, alias = "lifestyle_suggestions", skip_serializing_if = "Option::is_none")]
    pub lifestyle_suggestions: Option<ListField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<String>,
}

impl StructuredReport {
    /// Build a report from a JSON object without failing on unexpected field types.
    ///
    /// `null` counts as absent and non-string scalars are stringified.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        Self {
            summary: text_field(object, SUMMARY_KEYS),
            abnormal_findings: list_field(object, FINDINGS_KEYS),
            recommended_tests: list_field(object, TESTS_KEYS),
            lifestyle_suggestions: list_field(object, LIFESTYLE_KEYS),
            urgency: text_field(object, URGENCY_KEYS),
        }
    }

    pub fn abnormal_findings(&self) -> Vec<String> {
        to_list(self.abnormal_findings.as_ref())
    }

    pub fn recommended_tests(&self) -> Vec<String> {
        to_list(self.recommended_tests.as_ref())
    }

    pub fn lifestyle_suggestions(&self) -> Vec<String> {
        to_list(self.lifestyle_suggestions.as_ref())
    }

    pub fn urgency_level(&self) -> Urgency {
        self.urgency
            .as_deref()
            .map(Urgency::classify)
            .unwrap_or(Urgency::Unknown)
    }
}

/// Shape predicate deciding whether a JSON value is a structured report.
///
/// True when `value` is an object with a non-null `summary`, `abnormalFindings`
/// (or `abnormal_findings`) or `urgency` field. `recommendedTests` and
/// `lifestyleSuggestions` alone do not qualify.
pub fn is_structured_report(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };

    SUMMARY_KEYS
        .iter()
        .chain(FINDINGS_KEYS)
        .chain(URGENCY_KEYS)
        .any(|key| object.get(*key).is_some_and(|v| !v.is_null()))
}

/// Flatten a list section into display lines.
///
/// Arrays keep their order with falsy entries dropped. Strings are split on
/// newlines and semicolons, a leading `-`, `•` or `*` bullet is removed and
/// blank segments are skipped.
pub fn to_list(value: Option<&ListField>) -> Vec<String> {
    match value {
        None => Vec::new(),
        Some(ListField::Items(items)) => items.iter().filter_map(item_text).collect(),
        Some(ListField::Text(text)) => text
            .split(['\n', ';'])
            .map(|segment| strip_bullet(segment.trim()).trim())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

fn strip_bullet(segment: &str) -> &str {
    let mut chars = segment.chars();
    match (chars.next(), chars.next()) {
        (Some('-' | '•' | '*'), Some(c)) if c.is_whitespace() => chars.as_str(),
        _ => segment,
    }
}

fn item_text(item: &Value) -> Option<String> {
    match item {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

fn lookup<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|v| !v.is_null())
}

fn text_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    lookup(object, keys).map(|value| match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn list_field(object: &Map<String, Value>, keys: &[&str]) -> Option<ListField> {
    lookup(object, keys).map(|value| match value {
        Value::String(s) => ListField::Text(s.clone()),
        Value::Array(items) => ListField::Items(items.clone()),
        other => ListField::Text(other.to_string()),
    })
}

/// Coarse urgency level derived from the service's free-text urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Urgency {
    Low,
    Moderate,
    High,
    Unknown,
}

const HIGH_WORDS: &[&str] = &[
    "urgent", "urgently", "immediate", "immediately", "emergency", "critical", "severe", "high",
];
const MODERATE_WORDS: &[&str] = &[
    "moderate", "medium", "soon", "follow", "followup", "attention", "abnormal",
];
const LOW_WORDS: &[&str] = &["low", "routine", "normal", "none", "minimal"];
const NEGATIONS: &[&str] = &["not", "no", "non", "without"];
/// How many tokens before a high-urgency word a negation may appear
const NEGATION_WINDOW: usize = 2;

impl Urgency {
    /// Classify by whole words, so "abnormal" never reads as "normal" and
    /// "below" never reads as "low". A negated high-urgency word ("not
    /// immediately urgent") counts as low.
    pub fn classify(text: &str) -> Self {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let negated = |index: usize| {
            tokens[index.saturating_sub(NEGATION_WINDOW)..index]
                .iter()
                .any(|t| NEGATIONS.contains(t))
        };
        let has = |words: &[&str]| tokens.iter().any(|t| words.contains(t));

        let mut high = false;
        let mut negated_high = false;
        for (index, token) in tokens.iter().enumerate() {
            if HIGH_WORDS.contains(token) {
                if negated(index) {
                    negated_high = true;
                } else {
                    high = true;
                }
            }
        }

        if high {
            Urgency::High
        } else if has(MODERATE_WORDS) {
            Urgency::Moderate
        } else if negated_high || has(LOW_WORDS) {
            Urgency::Low
        } else {
            Urgency::Unknown
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Urgency::Low => "low",
            Urgency::Moderate => "moderate",
            Urgency::High => "high",
            Urgency::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

//! Predicates that gate conditional groups

use crate::core::context::StepInput;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure raised while evaluating a predicate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredicateError {
    #[error("no previous output to evaluate")]
    NoPreviousOutput,

    #[error("previous output has no structured content")]
    NoStructuredContent,

    #[error("field '{0}' not found in structured content")]
    MissingField(String),

    #[error("{0}")]
    Custom(String),
}

/// What a conditional group does when its predicate fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateFailurePolicy {
    /// Log the failure and skip the group
    #[default]
    TreatAsFalse,
    /// Abort the run with the predicate error
    Fail,
}

/// A predicate over the output that precedes a conditional group
///
/// Implementations must be pure: they see only the [`StepInput`] and are
/// evaluated exactly once per run.
pub trait Condition: Send + Sync {
    fn evaluate(&self, input: &StepInput) -> Result<bool, PredicateError>;

    /// Human-readable description for logs and validation output
    fn describe(&self) -> String {
        "custom predicate".to_string()
    }
}

/// Pattern for matching stage output
#[derive(Debug, Clone)]
pub enum ConditionPattern {
    /// Case-sensitive substring match
    Simple(String),
    /// Substring match ignoring case (needle stored lowercased)
    CaseInsensitive(String),
    /// Regular expression match
    Regex(Regex),
}

impl ConditionPattern {
    /// Build a substring pattern
    pub fn substring(needle: &str, case_insensitive: bool) -> Self {
        if case_insensitive {
            ConditionPattern::CaseInsensitive(needle.to_lowercase())
        } else {
            ConditionPattern::Simple(needle.to_string())
        }
    }

    /// Compile a regex pattern
    pub fn regex(pattern: &str, case_insensitive: bool) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()?;
        Ok(ConditionPattern::Regex(regex))
    }

    /// Check if the pattern matches the given text
    pub fn matches(&self, text: &str) -> bool {
        match self {
            ConditionPattern::Simple(pattern) => text.contains(pattern.as_str()),
            ConditionPattern::CaseInsensitive(pattern) => {
                text.to_lowercase().contains(pattern.as_str())
            }
            ConditionPattern::Regex(regex) => regex.is_match(text),
        }
    }
}

impl fmt::Display for ConditionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionPattern::Simple(s) => write!(f, "\"{}\"", s),
            ConditionPattern::CaseInsensitive(s) => write!(f, "\"{}\" (any case)", s),
            ConditionPattern::Regex(r) => write!(f, "/{}/", r.as_str()),
        }
    }
}

/// Equality check on a structured field
#[derive(Debug, Clone)]
pub struct FieldMatch {
    /// JSON pointer into the structured content
    pub pointer: String,
    pub expected: Value,
    pub case_insensitive: bool,
}

impl FieldMatch {
    /// Accepts a JSON pointer (`/forno/status`) or a dotted path (`forno.status`)
    pub fn new(field: &str, expected: Value, case_insensitive: bool) -> Self {
        let pointer = if field.starts_with('/') {
            field.to_string()
        } else {
            format!("/{}", field.replace('.', "/"))
        };
        Self {
            pointer,
            expected,
            case_insensitive,
        }
    }

    fn matches(&self, actual: &Value) -> bool {
        match (actual, &self.expected) {
            (Value::String(a), Value::String(e)) if self.case_insensitive => {
                a.to_lowercase() == e.to_lowercase()
            }
            (a, e) => a == e,
        }
    }
}

/// Declarative predicate over the previous output
///
/// All supplied criteria must hold; `negate` inverts the combined result.
/// Evaluation errors are returned before negation.
#[derive(Debug, Clone, Default)]
pub struct OutputCondition {
    pub any_of: Vec<ConditionPattern>,
    pub all_of: Vec<ConditionPattern>,
    pub field: Option<FieldMatch>,
    pub negate: bool,
}

impl OutputCondition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds when the previous text contains any of `needles`
    pub fn contains_any<I, S>(needles: I, case_insensitive: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            any_of: needles
                .into_iter()
                .map(|n| ConditionPattern::substring(n.as_ref(), case_insensitive))
                .collect(),
            ..Self::default()
        }
    }

    /// Holds when a structured field equals `expected`
    pub fn field_equals(field: &str, expected: Value) -> Self {
        Self {
            field: Some(FieldMatch::new(field, expected, true)),
            ..Self::default()
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.any_of.is_empty() && self.all_of.is_empty() && self.field.is_none()
    }
}

impl Condition for OutputCondition {
    fn evaluate(&self, input: &StepInput) -> Result<bool, PredicateError> {
        let previous = input
            .previous_content
            .as_ref()
            .ok_or(PredicateError::NoPreviousOutput)?;

        let mut holds = true;

        if !self.any_of.is_empty() {
            holds &= self.any_of.iter().any(|p| p.matches(&previous.text));
        }

        if !self.all_of.is_empty() {
            holds &= self.all_of.iter().all(|p| p.matches(&previous.text));
        }

        if let Some(field) = &self.field {
            let structured = previous
                .structured
                .as_ref()
                .ok_or(PredicateError::NoStructuredContent)?;
            let actual = structured
                .pointer(&field.pointer)
                .ok_or_else(|| PredicateError::MissingField(field.pointer.clone()))?;
            holds &= field.matches(actual);
        }

        Ok(holds != self.negate)
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.any_of.is_empty() {
            let list: Vec<String> = self.any_of.iter().map(|p| p.to_string()).collect();
            parts.push(format!("contains any of [{}]", list.join(", ")));
        }
        if !self.all_of.is_empty() {
            let list: Vec<String> = self.all_of.iter().map(|p| p.to_string()).collect();
            parts.push(format!("contains all of [{}]", list.join(", ")));
        }
        if let Some(field) = &self.field {
            parts.push(format!("{} == {}", field.pointer, field.expected));
        }
        let description = parts.join(" and ");
        if self.negate {
            format!("not ({})", description)
        } else {
            description
        }
    }
}

type PredicateFn = dyn Fn(&StepInput) -> Result<bool, PredicateError> + Send + Sync;

/// Predicate backed by a closure
#[derive(Clone)]
pub struct FnCondition {
    description: String,
    predicate: Arc<PredicateFn>,
}

impl FnCondition {
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&StepInput) -> Result<bool, PredicateError> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }
}

impl fmt::Debug for FnCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCondition")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl Condition for FnCondition {
    fn evaluate(&self, input: &StepInput) -> Result<bool, PredicateError> {
        (self.predicate)(input)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

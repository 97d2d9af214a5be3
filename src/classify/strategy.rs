use serde::{Deserialize, Serialize};

use super::{Classification, normalize_code};
use crate::registry::SourceSpec;

/// What one strategy asks a source for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Criterion {
    /// `field:"value"`
    Field { field: String, value: String },
    /// `f1:"value" OR f2:"value" ...`
    AnyOf { fields: Vec<String>, value: String },
}

impl Criterion {
    pub fn value(&self) -> &str {
        match self {
            Criterion::Field { value, .. } | Criterion::AnyOf { value, .. } => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStrategy {
    pub source: String,
    pub criterion: Criterion,
    /// Lower runs first.
    pub priority: u32,
}

impl SearchStrategy {
    /// Field name for single-field strategies; `None` for the disjunctive fallback.
    pub fn field(&self) -> Option<&str> {
        match &self.criterion {
            Criterion::Field { field, .. } => Some(field),
            Criterion::AnyOf { .. } => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.criterion, Criterion::AnyOf { .. })
    }

    /// Short human form used in logs and reports, e.g. `k_number:"K123456"`.
    pub fn describe(&self) -> String {
        match &self.criterion {
            Criterion::Field { field, value } => format!("{field}:\"{value}\""),
            Criterion::AnyOf { fields, value } => format!("any of [{}]:\"{value}\"", fields.join(", ")),
        }
    }
}

/// Ranked strategies for `term` against `source`. Never empty: the broad
/// disjunctive fallback is always the last entry.
pub fn plan(term: &str, classification: &Classification, source: &SourceSpec) -> Vec<SearchStrategy> {
    let cleaned = term.split_whitespace().collect::<Vec<_>>().join(" ");
    let value = match classification.code {
        Some(code) => normalize_code(&cleaned, code),
        None => cleaned,
    };

    let mut strategies: Vec<SearchStrategy> = source
        .fields
        .ranked(classification.entity_type, classification.code)
        .iter()
        .map(|field| Criterion::Field {
            field: (*field).to_string(),
            value: value.clone(),
        })
        .enumerate()
        .map(|(rank, criterion)| SearchStrategy {
            source: source.name.to_string(),
            criterion,
            priority: rank as u32,
        })
        .collect();

    let fallback = SearchStrategy {
        source: source.name.to_string(),
        criterion: Criterion::AnyOf {
            fields: source.fields.fallback.iter().map(|f| f.to_string()).collect(),
            value,
        },
        priority: strategies.len() as u32,
    };
    strategies.push(fallback);
    strategies
}

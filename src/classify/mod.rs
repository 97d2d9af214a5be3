//! Query classification: entity-type guess for a free-text term plus the
//! ordered search strategies it implies for each registry.

mod patterns;
pub mod strategy;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use strategy::{Criterion, SearchStrategy, plan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Drug,
    Device,
    Company,
    Condition,
    Unknown,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Drug => "drug",
            EntityType::Device => "device",
            EntityType::Company => "company",
            EntityType::Condition => "condition",
            EntityType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drug" => Ok(EntityType::Drug),
            "device" => Ok(EntityType::Device),
            "company" => Ok(EntityType::Company),
            "condition" => Ok(EntityType::Condition),
            "unknown" => Ok(EntityType::Unknown),
            other => Err(format!(
                "unknown entity type '{other}' (expected drug, device, company, condition, or unknown)"
            )),
        }
    }
}

/// Which classifier branch produced the entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Basis {
    ExplicitHint,
    PatternMatch,
    KeywordHeuristic,
    CallerDefault,
}

/// Fixed-format registry identifiers recognized before any heuristic runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
    /// 510(k) clearance number, e.g. `K123456`.
    KNumber,
    /// Premarket approval number, e.g. `P950037`.
    PmaNumber,
    /// NDA/ANDA/BLA application number, e.g. `NDA021436`.
    ApplicationNumber,
    /// National Drug Code product segment, e.g. `0002-3227`.
    Ndc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    pub entity_type: EntityType,
    pub basis: Basis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeKind>,
}

/// A raw term and the caller's optional entity-type hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerm {
    raw: String,
    hint: Option<EntityType>,
}

impl SearchTerm {
    pub fn new(raw: impl Into<String>, hint: Option<EntityType>) -> Self {
        Self {
            raw: raw.into(),
            hint,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn hint(&self) -> Option<EntityType> {
        self.hint
    }

    pub fn classify(&self, default: EntityType) -> Classification {
        classify(&self.raw, self.hint, default)
    }
}

/// Classify `term` in strict priority order: explicit hint, identifier
/// pattern, company indicator word, drug suffix or dosage form, condition
/// vocabulary, then `default`.
pub fn classify(term: &str, hint: Option<EntityType>, default: EntityType) -> Classification {
    if let Some(entity_type) = hint {
        return Classification {
            entity_type,
            basis: Basis::ExplicitHint,
            code: None,
        };
    }

    let term = term.trim();

    if let Some((code, entity_type)) = patterns::match_code(term) {
        return Classification {
            entity_type,
            basis: Basis::PatternMatch,
            code: Some(code),
        };
    }

    if patterns::is_company(term) {
        return Classification {
            entity_type: EntityType::Company,
            basis: Basis::KeywordHeuristic,
            code: None,
        };
    }

    if patterns::is_drug(term) {
        return Classification {
            entity_type: EntityType::Drug,
            basis: Basis::PatternMatch,
            code: None,
        };
    }

    if patterns::is_condition(term) {
        return Classification {
            entity_type: EntityType::Condition,
            basis: Basis::KeywordHeuristic,
            code: None,
        };
    }

    Classification {
        entity_type: default,
        basis: Basis::CallerDefault,
        code: None,
    }
}

/// Canonical form of an identifier for exact-match fields (`k123456` → `K123456`).
pub fn normalize_code(term: &str, code: CodeKind) -> String {
    let upper = term.trim().to_ascii_uppercase();
    match code {
        CodeKind::ApplicationNumber => upper.split_whitespace().collect(),
        _ => upper,
    }
}

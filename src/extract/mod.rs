//! Rule-table text extraction.
//!
//! A [`Ruleset`] is an ordered list of `{field, pattern, max_count}` rules.
//! Matches are trimmed, deduplicated case-insensitively, unioned per field in
//! rule order, then truncated. Rulesets that declare corroborating keywords
//! also grade each field's confidence.

mod rules;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use rules::{BIOMARKER_CORROBORATION, BIOMARKER_RULES, REGULATORY_RULES};

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unknown ruleset '{0}' (expected biomarker or regulatory)")]
    UnknownRuleset(String),

    #[error("invalid pattern for field '{field}': {source}")]
    InvalidPattern {
        field: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulesetName {
    Biomarker,
    Regulatory,
}

impl RulesetName {
    pub fn as_str(self) -> &'static str {
        match self {
            RulesetName::Biomarker => "biomarker",
            RulesetName::Regulatory => "regulatory",
        }
    }

    /// The compiled built-in ruleset for this name.
    pub fn ruleset(self) -> &'static Ruleset {
        match self {
            RulesetName::Biomarker => &BIOMARKER,
            RulesetName::Regulatory => &REGULATORY,
        }
    }
}

impl fmt::Display for RulesetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RulesetName {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "biomarker" | "biomarkers" => Ok(RulesetName::Biomarker),
            "regulatory" => Ok(RulesetName::Regulatory),
            other => Err(ExtractError::UnknownRuleset(other.to_string())),
        }
    }
}

/// What a matching rule contributes to its field.
#[derive(Debug, Clone, Copy)]
pub enum Emit {
    /// The whole match.
    Match,
    /// One capture group, passed through a normalizer.
    Group(usize, fn(&str) -> String),
    /// A fixed label, emitted once if the pattern occurs anywhere.
    Label(&'static str),
}

/// Declarative rule as written in a table.
#[derive(Debug, Clone, Copy)]
pub struct RuleDef {
    pub field: &'static str,
    pub pattern: &'static str,
    pub max_count: usize,
    pub emit: Emit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    VeryHigh,
}

#[derive(Debug)]
struct Rule {
    field: &'static str,
    regex: Regex,
    max_count: usize,
    emit: Emit,
}

/// Field name plus the keywords whose presence anywhere in the text raises
/// that field to [`Confidence::VeryHigh`].
pub type Corroboration = (&'static str, &'static [&'static str]);

#[derive(Debug)]
pub struct Ruleset {
    rules: Vec<Rule>,
    corroboration: Vec<(&'static str, Regex)>,
}

impl Ruleset {
    pub fn compile(defs: &[RuleDef], corroboration: &[Corroboration]) -> Result<Self, ExtractError> {
        let rules = defs
            .iter()
            .map(|def| {
                Regex::new(def.pattern)
                    .map(|regex| Rule {
                        field: def.field,
                        regex,
                        max_count: def.max_count,
                        emit: def.emit,
                    })
                    .map_err(|source| ExtractError::InvalidPattern {
                        field: def.field.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let corroboration = corroboration
            .iter()
            .map(|(field, keywords)| {
                let escaped: Vec<String> = keywords.iter().map(|k| regex::escape(k)).collect();
                Regex::new(&format!(r"(?i)\b(?:{})\b", escaped.join("|")))
                    .map(|re| (*field, re))
                    .map_err(|source| ExtractError::InvalidPattern {
                        field: (*field).to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rules,
            corroboration,
        })
    }

    /// Smallest `max_count` declared by any rule for `field`.
    fn cap_for(&self, field: &str) -> usize {
        self.rules
            .iter()
            .filter(|r| r.field == field)
            .map(|r| r.max_count)
            .min()
            .unwrap_or(0)
    }
}

static BIOMARKER: LazyLock<Ruleset> = LazyLock::new(|| {
    Ruleset::compile(BIOMARKER_RULES, BIOMARKER_CORROBORATION)
        .expect("biomarker rule table compiles")
});

static REGULATORY: LazyLock<Ruleset> = LazyLock::new(|| {
    Ruleset::compile(REGULATORY_RULES, &[]).expect("regulatory rule table compiles")
});

/// Facts pulled from one piece of text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub fields: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub confidence: BTreeMap<String, Confidence>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// Additive merge: values are appended without duplicates and confidence
    /// only ever rises.
    pub fn merge(&mut self, other: Extraction) {
        for (field, values) in other.fields {
            let existing = self.fields.entry(field).or_default();
            for value in values {
                if !existing.iter().any(|v| v.eq_ignore_ascii_case(&value)) {
                    existing.push(value);
                }
            }
        }
        for (field, grade) in other.confidence {
            let slot = self.confidence.entry(field).or_insert(grade);
            *slot = (*slot).max(grade);
        }
    }
}

/// Apply `ruleset` to `text`. Fields with no match are omitted.
pub fn extract(text: &str, ruleset: &Ruleset) -> Extraction {
    let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut seen: HashSet<(&str, String)> = HashSet::new();

    for rule in &ruleset.rules {
        for value in rule_matches(rule, text) {
            let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
            if value.is_empty() || !seen.insert((rule.field, value.to_lowercase())) {
                continue;
            }
            fields.entry(rule.field.to_string()).or_default().push(value);
        }
    }

    for (field, values) in fields.iter_mut() {
        values.truncate(ruleset.cap_for(field));
    }
    fields.retain(|_, values| !values.is_empty());

    let confidence = fields
        .keys()
        .filter_map(|field| {
            ruleset
                .corroboration
                .iter()
                .find(|(f, _)| f == field)
                .map(|(_, keywords)| {
                    let grade = if keywords.is_match(text) {
                        Confidence::VeryHigh
                    } else {
                        Confidence::High
                    };
                    (field.clone(), grade)
                })
        })
        .collect();

    Extraction { fields, confidence }
}

fn rule_matches(rule: &Rule, text: &str) -> Vec<String> {
    match rule.emit {
        Emit::Match => rule
            .regex
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect(),
        Emit::Group(group, normalize) => rule
            .regex
            .captures_iter(text)
            .filter_map(|caps| caps.get(group).map(|m| normalize(m.as_str())))
            .collect(),
        Emit::Label(label) => {
            if rule.max_count > 0 && rule.regex.is_match(text) {
                vec![label.to_string()]
            } else {
                Vec::new()
            }
        }
    }
}

/// Standalone entry point for document annotation.
pub fn extract_facts(text: &str, ruleset: &str) -> Result<Extraction, ExtractError> {
    let name: RulesetName = ruleset.parse()?;
    Ok(extract(text, name.ruleset()))
}

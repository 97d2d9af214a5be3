//! Cross-registry synonym resolution.

mod authorities;
mod types;

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::registry::RegistryError;

pub use authorities::HttpNameLookup;

const MIN_LEN: usize = 3;
const MAX_LEN: usize = 50;
pub const MAX_CANDIDATES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameType {
    Generic,
    Brand,
    Chemical,
    Code,
    Synonym,
}

/// Naming authorities consulted by [`resolve_synonyms`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    RxNorm,
    OpenFdaLabel,
    PubChem,
    Chembl,
}

impl Authority {
    pub const ALL: [Authority; 4] = [
        Authority::RxNorm,
        Authority::OpenFdaLabel,
        Authority::PubChem,
        Authority::Chembl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Authority::RxNorm => "rxnorm",
            Authority::OpenFdaLabel => "openfda_label",
            Authority::PubChem => "pubchem",
            Authority::Chembl => "chembl",
        }
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymCandidate {
    pub name: String,
    pub name_type: NameType,
    pub origin_registry: Authority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_id: Option<String>,
}

impl SynonymCandidate {
    pub fn new(
        name: impl Into<String>,
        name_type: NameType,
        origin_registry: Authority,
        registry_id: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            name_type,
            origin_registry,
            registry_id,
        }
    }
}

/// Name lookup against one authority.
/// Implemented by `HttpNameLookup` for production; mock implementations used in tests.
pub trait NameLookup {
    async fn lookup(
        &self,
        authority: Authority,
        term: &str,
    ) -> Result<Vec<SynonymCandidate>, RegistryError>;
}

// Pure identifier shapes: CAS-style triplets and LETTERS+DIGITS codes.
static HYPHEN_TRIPLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]+-[A-Z0-9]+-[A-Z0-9]+$").unwrap());
static LETTERS_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]+\d+$").unwrap());
static CODE_LIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Z]+\s\d+").unwrap());

/// Query every authority concurrently and merge the answers into a ranked,
/// deduplicated candidate list that never contains `term` itself.
pub async fn resolve_synonyms<N: NameLookup>(lookup: &N, term: &str) -> Vec<SynonymCandidate> {
    let term = term.trim();
    if term.is_empty() {
        return Vec::new();
    }

    let outcomes = join_all(
        Authority::ALL
            .iter()
            .map(|&authority| async move { (authority, lookup.lookup(authority, term).await) }),
    )
    .await;

    let mut raw = Vec::new();
    for (authority, outcome) in outcomes {
        match outcome {
            Ok(found) => {
                debug!(authority = %authority, names = found.len(), "synonyms received");
                raw.extend(found);
            }
            Err(e) => warn!(authority = %authority, error = %e, "synonym lookup failed"),
        }
    }

    rank_candidates(term, raw)
}

/// Deduplicate, filter, score and truncate raw candidates.
pub fn rank_candidates(term: &str, raw: Vec<SynonymCandidate>) -> Vec<SynonymCandidate> {
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(term.trim().to_lowercase());

    let mut kept: Vec<SynonymCandidate> = raw
        .into_iter()
        .filter_map(|mut c| {
            c.name = c.name.trim().to_string();
            (is_usable(&c.name) && seen.insert(c.name.to_lowercase())).then_some(c)
        })
        .collect();

    kept.sort_by_key(|c| promise_score(&c.name));
    kept.truncate(MAX_CANDIDATES);
    kept
}

fn is_usable(name: &str) -> bool {
    let len = name.chars().count();
    (MIN_LEN..=MAX_LEN).contains(&len)
        && !HYPHEN_TRIPLET.is_match(name)
        && !LETTERS_DIGITS.is_match(name)
}

/// Lower is more promising: short code-like names first, then short plain names.
fn promise_score(name: &str) -> u8 {
    if name.contains(' ') && CODE_LIKE.is_match(name) {
        1
    } else if name.chars().count() < 15 {
        2
    } else {
        3
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Canned answers per authority; authorities without one fail.
    #[derive(Default)]
    pub struct MockLookup {
        pub answers: HashMap<Authority, Vec<SynonymCandidate>>,
        pub queries: Mutex<Vec<(Authority, String)>>,
    }

    impl MockLookup {
        pub fn with(mut self, authority: Authority, names: &[(&str, NameType)]) -> Self {
            self.answers.insert(
                authority,
                names
                    .iter()
                    .map(|(n, t)| SynonymCandidate::new(*n, *t, authority, None))
                    .collect(),
            );
            self
        }
    }

    impl NameLookup for MockLookup {
        async fn lookup(
            &self,
            authority: Authority,
            term: &str,
        ) -> Result<Vec<SynonymCandidate>, RegistryError> {
            self.queries
                .lock()
                .unwrap()
                .push((authority, term.to_string()));
            self.answers
                .get(&authority)
                .cloned()
                .ok_or(RegistryError::Status {
                    code: 503,
                    message: format!("{authority} unavailable"),
                })
        }
    }
}

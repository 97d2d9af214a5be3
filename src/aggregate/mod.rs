//! Fan a classified term out to every requested source, attach extracted
//! facts, and memoize the merged answer.

pub mod cache;
pub mod format;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info};

use crate::cascade::{self, SourceResult};
use crate::classify::{Classification, EntityType, SearchTerm, classify, plan};
use crate::config::Settings;
use crate::extract::extract;
use crate::harvest::Harvester;
use crate::registry::{RegistryClient, SourceRecord, SourceSpec, default_sources, find};
use crate::synonyms::{NameLookup, resolve_synonyms};

pub use cache::{Clock, ManualClock, SystemClock, TtlCache};

const EXPANSION_CONCURRENCY: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("Search term is empty")]
    EmptyTerm,

    #[error("Unknown source: {0}")]
    UnknownSource(String),
}

/// When synonym expansion runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Expansion {
    #[default]
    Off,
    /// Resolve synonyms first and search the term plus the top candidates.
    Upfront,
    /// Resolve only when the primary fan-out came back empty.
    Reactive,
}

impl Expansion {
    pub fn as_str(self) -> &'static str {
        match self {
            Expansion::Off => "off",
            Expansion::Upfront => "upfront",
            Expansion::Reactive => "reactive",
        }
    }
}

impl fmt::Display for Expansion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Expansion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Expansion::Off),
            "upfront" => Ok(Expansion::Upfront),
            "reactive" => Ok(Expansion::Reactive),
            other => Err(format!(
                "unknown expansion mode '{other}' (expected off, upfront or reactive)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Entity type used when nothing in the term decides it.
    pub default_type: EntityType,
    /// Per-source record cap; `None` uses `Settings::result_cap`.
    pub cap: Option<usize>,
    pub expansion: Expansion,
    pub max_expansion_terms: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            default_type: EntityType::Unknown,
            cap: None,
            expansion: Expansion::Off,
            max_expansion_terms: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub reason: String,
}

/// Merged answer for one term across all consulted sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedResult {
    pub term: String,
    pub classification: Classification,
    pub sources: Vec<SourceResult>,
    pub counts: BTreeMap<String, usize>,
    pub succeeded: Vec<String>,
    pub failed: Vec<SourceFailure>,
    pub total_records: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expanded_with: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub regulation_numbers: Vec<String>,
}

impl UnifiedResult {
    fn assemble(
        term: String,
        classification: Classification,
        sources: Vec<SourceResult>,
        specs: &[&'static SourceSpec],
        expanded_with: Vec<String>,
    ) -> Self {
        let mut counts = BTreeMap::new();
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut regulation_numbers = BTreeSet::new();

        for (result, spec) in sources.iter().zip(specs) {
            counts.insert(result.source.clone(), result.records.len());
            if result.is_failure() {
                failed.push(SourceFailure {
                    source: result.source.clone(),
                    reason: result.last_error.clone().unwrap_or_default(),
                });
            } else {
                succeeded.push(result.source.clone());
            }
            for record in &result.records {
                regulation_numbers.extend(spec.regulation_numbers(&record.raw));
            }
        }

        Self {
            term,
            classification,
            total_records: counts.values().sum(),
            sources,
            counts,
            succeeded,
            failed,
            expanded_with,
            regulation_numbers: regulation_numbers.into_iter().collect(),
        }
    }
}

/// Sources named by the caller, or the entity type's defaults when none are.
pub fn resolve_sources(
    names: &[&str],
    entity: EntityType,
) -> Result<Vec<&'static SourceSpec>, AggregateError> {
    if names.is_empty() {
        return Ok(default_sources(entity));
    }
    let mut seen = HashSet::new();
    let mut specs = Vec::new();
    for name in names {
        let spec = find(name.trim()).ok_or_else(|| AggregateError::UnknownSource(name.to_string()))?;
        if seen.insert(spec.name) {
            specs.push(spec);
        }
    }
    Ok(specs)
}

pub struct Aggregator<R, N> {
    registry: R,
    names: N,
    settings: Settings,
    cache: TtlCache<UnifiedResult>,
}

impl<R: RegistryClient, N: NameLookup> Aggregator<R, N> {
    pub fn new(registry: R, names: N, settings: Settings) -> Self {
        let cache = TtlCache::new(settings.cache_ttl);
        Self::with_cache(registry, names, settings, cache)
    }

    pub fn with_cache(registry: R, names: N, settings: Settings, cache: TtlCache<UnifiedResult>) -> Self {
        Self {
            registry,
            names,
            settings,
            cache,
        }
    }

    pub fn names(&self) -> &N {
        &self.names
    }

    /// Classify `term`, search `sources` (entity defaults when empty) and
    /// merge the answers. Repeated calls within the cache TTL return the
    /// stored result without touching upstream.
    pub async fn classify_and_search(
        &self,
        term: &SearchTerm,
        sources: &[&str],
        options: &SearchOptions,
    ) -> Result<UnifiedResult, AggregateError> {
        let raw = term.raw().split_whitespace().collect::<Vec<_>>().join(" ");
        if raw.is_empty() {
            return Err(AggregateError::EmptyTerm);
        }
        let classification = classify(&raw, term.hint(), options.default_type);
        let specs = resolve_sources(sources, classification.entity_type)?;
        let cap = options.cap.unwrap_or(self.settings.result_cap).max(1);

        let key = cache_key(&raw, term.hint(), &specs, cap, options);
        if let Some(hit) = self.cache.get(&key) {
            debug!(term = %raw, "cache hit");
            return Ok(hit);
        }

        info!(
            term = %raw,
            entity = %classification.entity_type,
            basis = ?classification.basis,
            sources = specs.len(),
            cap,
            "aggregating"
        );
        let harvester = Harvester::new(&self.registry, &self.settings);

        let mut expanded_with = Vec::new();
        if options.expansion == Expansion::Upfront {
            expanded_with = self.expansion_terms(&raw, options.max_expansion_terms).await;
        }

        let mut results = fan_out(&harvester, &raw, &classification, &specs, cap).await;

        let starved = results.iter().all(|r| r.records.is_empty());
        if options.expansion == Expansion::Reactive
            && starved
            && matches!(classification.entity_type, EntityType::Drug | EntityType::Unknown)
        {
            info!(term = %raw, "primary search empty; expanding with synonyms");
            expanded_with = self.expansion_terms(&raw, options.max_expansion_terms).await;
        }

        if !expanded_with.is_empty() {
            let entity = classification.entity_type;
            let mut batches: Vec<(usize, Vec<SourceResult>)> =
                stream::iter(expanded_with.iter().enumerate())
                    .map(|(index, alias)| {
                        let harvester = &harvester;
                        let specs = &specs;
                        async move {
                            let alias_class = classify(alias, Some(entity), entity);
                            (index, fan_out(harvester, alias, &alias_class, specs, cap).await)
                        }
                    })
                    .buffer_unordered(EXPANSION_CONCURRENCY)
                    .collect()
                    .await;
            batches.sort_by_key(|(index, _)| *index);
            for (_, batch) in batches {
                merge_expansion(&mut results, batch, cap);
            }
        }

        for (result, spec) in results.iter_mut().zip(&specs) {
            attach_facts(spec, &mut result.records);
        }

        let unified = UnifiedResult::assemble(raw, classification, results, &specs, expanded_with);
        info!(
            term = %unified.term,
            records = unified.total_records,
            succeeded = unified.succeeded.len(),
            failed = unified.failed.len(),
            "aggregation complete"
        );
        self.cache.insert(key, unified.clone());
        Ok(unified)
    }

    async fn expansion_terms(&self, term: &str, limit: usize) -> Vec<String> {
        resolve_synonyms(&self.names, term)
            .await
            .into_iter()
            .take(limit)
            .map(|c| c.name)
            .collect()
    }
}

/// One cascade per source, concurrently; output order follows `specs`.
async fn fan_out<C: RegistryClient>(
    harvester: &Harvester<'_, C>,
    term: &str,
    classification: &Classification,
    specs: &[&'static SourceSpec],
    cap: usize,
) -> Vec<SourceResult> {
    join_all(specs.iter().map(|spec| async move {
        let strategies = plan(term, classification, spec);
        cascade::execute(harvester, spec, &strategies, cap).await
    }))
    .await
}

fn merge_expansion(results: &mut [SourceResult], batch: Vec<SourceResult>, cap: usize) {
    for (slot, extra) in results.iter_mut().zip(batch) {
        slot.attempts += extra.attempts;
        if slot.strategy.is_none() {
            slot.strategy = extra.strategy;
        }
        if slot.last_error.is_none() {
            slot.last_error = extra.last_error;
        }
        let mut seen: HashSet<String> = slot.records.iter().map(|r| r.external_id.clone()).collect();
        for record in extra.records {
            if slot.records.len() >= cap {
                break;
            }
            if seen.insert(record.external_id.clone()) {
                slot.records.push(record);
            }
        }
    }
}

fn attach_facts(spec: &SourceSpec, records: &mut [SourceRecord]) {
    let Some(name) = spec.ruleset else {
        return;
    };
    let ruleset = name.ruleset();
    for record in records {
        let text = spec.text_of(&record.raw);
        if !text.is_empty() {
            record.facts.merge(extract(&text, ruleset));
        }
    }
}

fn cache_key(
    term: &str,
    hint: Option<EntityType>,
    specs: &[&'static SourceSpec],
    cap: usize,
    options: &SearchOptions,
) -> String {
    let sources: Vec<&str> = specs.iter().map(|s| s.name).collect();
    format!(
        "{}|{}|{}|{}|{}|{}|{}",
        term.to_lowercase(),
        hint.map_or("-", EntityType::as_str),
        options.default_type,
        sources.join(","),
        cap,
        options.expansion,
        options.max_expansion_terms,
    )
}

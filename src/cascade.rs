//! Per-source cascade: try strategies in priority order until one yields
//! records, then fall back to the broad disjunctive query.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::SearchStrategy;
use crate::harvest::Harvester;
use crate::registry::{RegistryClient, SourceRecord, SourceSpec};

/// Result for one source. Empty `records` with `last_error` set means the
/// source could not be consulted; without it, the source simply had no data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceResult {
    pub source: String,
    pub records: Vec<SourceRecord>,
    /// The strategy that produced `records`; `None` when nothing matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<SearchStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_reported: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Harvests issued, fallback included.
    pub attempts: usize,
}

impl SourceResult {
    pub fn is_failure(&self) -> bool {
        self.records.is_empty() && self.last_error.is_some()
    }
}

/// Run `strategies` against `source` sequentially. Never fails.
pub async fn execute<C: RegistryClient>(
    harvester: &Harvester<'_, C>,
    source: &SourceSpec,
    strategies: &[SearchStrategy],
    cap: usize,
) -> SourceResult {
    let mut ordered: Vec<&SearchStrategy> = strategies.iter().collect();
    ordered.sort_by_key(|s| (s.is_fallback(), s.priority));
    let split = ordered.iter().position(|s| s.is_fallback()).unwrap_or(ordered.len());
    let (primary, fallback) = ordered.split_at(split);

    let mut result = SourceResult {
        source: source.name.to_string(),
        records: Vec::new(),
        strategy: None,
        total_reported: None,
        last_error: None,
        attempts: 0,
    };
    let mut tried: Vec<Vec<(String, String)>> = Vec::new();

    for strategy in primary.iter().chain(fallback.first()) {
        let params = source.protocol.search_params(&strategy.criterion);
        if tried.contains(&params) {
            debug!(source = source.name, strategy = %strategy.describe(), "query already tried");
            continue;
        }

        let harvest = harvester.harvest(source, &params, cap).await;
        result.attempts += 1;
        tried.push(params);

        if let Some(e) = &harvest.error {
            warn!(
                source = source.name,
                strategy = %strategy.describe(),
                error = %e,
                "strategy failed"
            );
            result.last_error = Some(e.to_string());
        }

        if !harvest.records.is_empty() {
            info!(
                source = source.name,
                strategy = %strategy.describe(),
                records = harvest.records.len(),
                fallback = strategy.is_fallback(),
                "strategy matched"
            );
            result.records = harvest.records;
            result.total_reported = harvest.total_reported;
            result.strategy = Some((*strategy).clone());
            return result;
        }

        debug!(source = source.name, strategy = %strategy.describe(), "no records");
    }

    result
}

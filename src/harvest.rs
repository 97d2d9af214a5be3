//! Paginated harvesting of one query against one source.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::Settings;
use crate::registry::{PageRequest, RegistryClient, RegistryError, SourceRecord, SourceSpec};
use crate::retry::{RetryPolicy, with_retry};

/// Outcome of one harvest. `error` is set when a page fetch failed after
/// retries; `records` still holds everything collected before it.
#[derive(Debug)]
pub struct Harvest {
    pub records: Vec<SourceRecord>,
    pub total_reported: Option<u64>,
    pub pages: usize,
    pub error: Option<RegistryError>,
}

/// Pagination cursor; lives for a single [`Harvester::harvest`] call.
#[derive(Debug)]
struct FetchState {
    offset: usize,
    page_size: usize,
    collected: Vec<SourceRecord>,
    seen: HashSet<String>,
    total_reported: Option<u64>,
    page_token: Option<String>,
    exhausted: bool,
}

impl FetchState {
    fn new(page_size: usize) -> Self {
        Self {
            offset: 0,
            page_size,
            collected: Vec::new(),
            seen: HashSet::new(),
            total_reported: None,
            page_token: None,
            exhausted: false,
        }
    }
}

pub struct Harvester<'a, C> {
    client: &'a C,
    policy: RetryPolicy,
    page_size: usize,
    page_delay: Duration,
}

impl<'a, C: RegistryClient> Harvester<'a, C> {
    pub fn new(client: &'a C, settings: &Settings) -> Self {
        Self {
            client,
            policy: RetryPolicy::new(settings.max_retries, settings.backoff_unit),
            page_size: settings.page_size.max(1),
            page_delay: settings.page_delay,
        }
    }

    /// Collect up to `cap` records for the rendered query `params`.
    ///
    /// Stops on a short page, when the source-reported total is reached, when
    /// `cap` is reached, or when a token-paged source hands back no token.
    pub async fn harvest(
        &self,
        source: &SourceSpec,
        params: &[(String, String)],
        cap: usize,
    ) -> Harvest {
        let mut state = FetchState::new(self.page_size);
        let mut pages = 0;
        let mut error = None;

        while !state.exhausted && state.collected.len() < cap {
            if pages > 0 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let request = PageRequest {
                params: params.to_vec(),
                offset: state.offset,
                limit: state.page_size,
                page_token: state.page_token.clone(),
            };
            let page = match with_retry(&self.policy, || self.client.fetch_page(source, &request))
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        source = source.name,
                        offset = state.offset,
                        collected = state.collected.len(),
                        error = %e,
                        "page fetch failed; keeping partial results"
                    );
                    error = Some(e);
                    break;
                }
            };
            pages += 1;

            // Dropped summaries do not make a page short.
            let received = page.listed.unwrap_or(page.records.len());
            if page.total.is_some() {
                state.total_reported = page.total;
            }
            for raw in page.records {
                let record = source.to_record(raw, state.offset + state.collected.len());
                if state.seen.insert(record.external_id.clone()) {
                    state.collected.push(record);
                }
            }
            state.offset += state.page_size;
            state.page_token = page.next_token;

            let reached_total = state
                .total_reported
                .is_some_and(|total| state.collected.len() as u64 >= total);
            let token_missing = source.protocol.uses_page_token() && state.page_token.is_none();
            state.exhausted = received < state.page_size || reached_total || token_missing;

            debug!(
                source = source.name,
                page = pages,
                received,
                collected = state.collected.len(),
                exhausted = state.exhausted,
                "harvested page"
            );
        }

        state.collected.truncate(cap);
        Harvest {
            records: state.collected,
            total_reported: state.total_reported,
            pages,
            error,
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use serde_json::{Value, json};

    use crate::registry::{Page, PageRequest, RegistryClient, RegistryError, SourceSpec};

    /// A registry that serves `available` numbered records by offset, or
    /// replays scripted outcomes first when any are queued.
    pub struct MockRegistry {
        pub available: usize,
        pub total: Option<u64>,
        pub scripted: Mutex<VecDeque<Result<Page, RegistryError>>>,
        pub requests: Mutex<Vec<(String, PageRequest)>>,
    }

    impl MockRegistry {
        pub fn serving(available: usize) -> Self {
            Self {
                available,
                total: Some(available as u64),
                scripted: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn scripted(outcomes: Vec<Result<Page, RegistryError>>) -> Self {
            Self {
                scripted: Mutex::new(outcomes.into()),
                ..Self::serving(0)
            }
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn numbered(range: std::ops::Range<usize>) -> Vec<Value> {
            range.map(|i| json!({"k_number": format!("K{i:06}")})).collect()
        }
    }

    impl RegistryClient for MockRegistry {
        async fn fetch_page(
            &self,
            source: &SourceSpec,
            request: &PageRequest,
        ) -> Result<Page, RegistryError> {
            self.requests
                .lock()
                .unwrap()
                .push((source.name.to_string(), request.clone()));
            if let Some(outcome) = self.scripted.lock().unwrap().pop_front() {
                return outcome;
            }
            let start = request.offset.min(self.available);
            let end = (request.offset + request.limit).min(self.available);
            Ok(Page {
                records: Self::numbered(start..end),
                total: self.total,
                next_token: None,
                listed: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockRegistry;
    use super::*;
    use crate::registry::{Page, find};
    use tokio::time::Instant;

    fn settings(page_size: usize) -> Settings {
        Settings {
            page_size,
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),
            page_delay: Duration::from_millis(100),
            ..Settings::default()
        }
    }

    fn params() -> Vec<(String, String)> {
        vec![("search".into(), "device_name:\"cement\"".into())]
    }

    #[tokio::test(start_paused = true)]
    async fn cap_bounds_collection() {
        let registry = MockRegistry::serving(500);
        let harvester = Harvester::new(&registry, &settings(20));
        let source = find("device_510k").unwrap();

        let harvest = harvester.harvest(source, &params(), 50).await;

        assert_eq!(harvest.records.len(), 50);
        assert_eq!(registry.calls(), 3);
        assert!(harvest.error.is_none());
        assert_eq!(harvest.total_reported, Some(500));
    }

    #[tokio::test(start_paused = true)]
    async fn short_page_stops_harvest() {
        let registry = MockRegistry {
            total: None,
            ..MockRegistry::serving(45)
        };
        let harvester = Harvester::new(&registry, &settings(20));
        let source = find("device_510k").unwrap();

        let harvest = harvester.harvest(source, &params(), 1000).await;

        assert_eq!(harvest.records.len(), 45);
        assert_eq!(harvest.pages, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn reported_total_stops_on_full_page() {
        let registry = MockRegistry::serving(40);
        let harvester = Harvester::new(&registry, &settings(20));
        let source = find("device_510k").unwrap();

        let harvest = harvester.harvest(source, &params(), 1000).await;

        assert_eq!(harvest.records.len(), 40);
        assert_eq!(registry.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn offsets_advance_by_page_size() {
        let registry = MockRegistry::serving(60);
        let harvester = Harvester::new(&registry, &settings(20));
        let source = find("device_510k").unwrap();

        harvester.harvest(source, &params(), 1000).await;

        let offsets: Vec<_> = registry
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.offset)
            .collect();
        assert_eq!(offsets, vec![0, 20, 40]);
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_delay_between_pages_only() {
        let registry = MockRegistry::serving(60);
        let harvester = Harvester::new(&registry, &settings(20));
        let source = find("device_510k").unwrap();
        let started = Instant::now();

        harvester.harvest(source, &params(), 1000).await;

        // Three pages, two gaps.
        assert_eq!(started.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_after_retries_keeps_partial_results() {
        let first = Page {
            records: MockRegistry::numbered(0..20),
            total: Some(100),
            next_token: None,
            listed: None,
        };
        let registry = MockRegistry::scripted(vec![
            Ok(first),
            Err(RegistryError::RateLimited),
            Err(RegistryError::RateLimited),
            Err(RegistryError::RateLimited),
            Err(RegistryError::RateLimited),
        ]);
        let harvester = Harvester::new(&registry, &settings(20));
        let source = find("device_510k").unwrap();

        let harvest = harvester.harvest(source, &params(), 1000).await;

        assert_eq!(harvest.records.len(), 20);
        assert!(matches!(harvest.error, Some(RegistryError::RateLimited)));
        assert_eq!(registry.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_twice_then_success_backs_off_two_plus_four_units() {
        let page = Page {
            records: MockRegistry::numbered(0..3),
            total: Some(3),
            next_token: None,
            listed: None,
        };
        let registry = MockRegistry::scripted(vec![
            Err(RegistryError::RateLimited),
            Err(RegistryError::RateLimited),
            Ok(page),
        ]);
        let harvester = Harvester::new(&registry, &settings(20));
        let source = find("device_510k").unwrap();
        let started = Instant::now();

        let harvest = harvester.harvest(source, &params(), 1000).await;

        assert_eq!(harvest.records.len(), 3);
        assert!(harvest.error.is_none());
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_ids_are_collapsed() {
        let dup = Page {
            records: vec![
                serde_json::json!({"k_number": "K000001"}),
                serde_json::json!({"k_number": "K000001"}),
            ],
            total: None,
            next_token: None,
            listed: None,
        };
        let registry = MockRegistry::scripted(vec![Ok(dup)]);
        let harvester = Harvester::new(&registry, &settings(20));
        let source = find("device_510k").unwrap();

        let harvest = harvester.harvest(source, &params(), 1000).await;

        assert_eq!(harvest.records.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_summaries_do_not_end_paging() {
        let page = |uids: &[&str]| Page {
            records: uids.iter().map(|uid| serde_json::json!({"uid": uid})).collect(),
            total: Some(10),
            next_token: None,
            listed: Some(2),
        };
        let registry = MockRegistry::scripted(vec![Ok(page(&["1"])), Ok(page(&["3", "4"]))]);
        let harvester = Harvester::new(&registry, &settings(2));
        let source = find("pubmed").unwrap();

        let harvest = harvester.harvest(source, &params(), 1000).await;

        let ids: Vec<_> = harvest.records.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, ["1", "3", "4"]);
        assert_eq!(registry.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn token_paging_follows_next_token() {
        let page = |id: &str, token: Option<&str>| Page {
            records: vec![serde_json::json!({
                "protocolSection": {"identificationModule": {"nctId": id}}
            })],
            total: Some(10),
            next_token: token.map(String::from),
            listed: None,
        };
        let registry = MockRegistry::scripted(vec![
            Ok(page("NCT01", Some("t2"))),
            Ok(page("NCT02", None)),
        ]);
        let harvester = Harvester::new(&registry, &settings(1));
        let source = find("clinical_trials").unwrap();

        let harvest = harvester.harvest(source, &params(), 1000).await;

        assert_eq!(harvest.records.len(), 2);
        let tokens: Vec<_> = registry
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.page_token.clone())
            .collect();
        assert_eq!(tokens, vec![None, Some("t2".to_string())]);
    }
}

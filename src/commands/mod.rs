mod errors;
mod params;

pub use errors::CommandError;
pub use params::{ExtractParams, RegulationParams, SearchParams, SynonymParams};

use std::time::Duration;

use reqwest::Client;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::aggregate::format::{format_extraction, format_regulation, format_result, format_synonyms};
use crate::aggregate::{Aggregator, SearchOptions};
use crate::classify::SearchTerm;
use crate::config::Settings;
use crate::extract::extract_facts;
use crate::markdown::table_cell;
use crate::registry::{HttpRegistry, SOURCES};
use crate::regulation::lookup_regulation;
use crate::synonyms::{HttpNameLookup, MAX_CANDIDATES, resolve_synonyms};

/// TCP connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Global HTTP client timeout covering DNS + connect + response body.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Command-level timeout for synonym resolution and regulation lookup.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(60);
/// Maximum redirect hops before aborting.
const MAX_REDIRECTS: usize = 5;
/// Extraction input larger than this is refused.
const MAX_EXTRACT_BYTES: usize = 10_000_000;

/// Command handlers behind the `regintel` binary.
///
/// Configuration is read once from the environment; see [`Settings::from_env`].
pub struct Regintel {
    http: Client,
    settings: Settings,
    aggregator: Aggregator<HttpRegistry, HttpNameLookup>,
}

impl Regintel {
    pub fn new(settings: Settings) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(HTTP_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        let aggregator = Aggregator::new(
            HttpRegistry::new(http.clone(), &settings),
            HttpNameLookup::new(http.clone(), &settings),
            settings.clone(),
        );
        Ok(Self {
            http,
            settings,
            aggregator,
        })
    }

    pub async fn search(&self, params: SearchParams) -> Result<String, CommandError> {
        if params.term.trim().is_empty() {
            return Err(CommandError::InvalidArgs("term must not be empty".into()));
        }

        info!(term = %params.term, hint = ?params.hint, sources = params.sources.len(), "command:search");

        let term = SearchTerm::new(params.term, params.hint);
        let sources: Vec<&str> = params.sources.iter().map(String::as_str).collect();
        let options = SearchOptions {
            default_type: params.default,
            cap: params.cap,
            expansion: params.expand,
            max_expansion_terms: params.expand_terms.clamp(1, MAX_CANDIDATES),
        };
        let limit = Duration::from_secs(params.timeout.max(1));

        // Dropping the aggregation future on timeout cancels every request still in flight.
        let result = tokio::time::timeout(
            limit,
            self.aggregator.classify_and_search(&term, &sources, &options),
        )
        .await
        .map_err(|_| CommandError::Timeout(format!("search timed out after {}s", limit.as_secs())))??;

        if !result.failed.is_empty() {
            warn!(failed = result.failed.len(), "some sources could not be consulted");
        }

        if params.json {
            Ok(serde_json::to_string_pretty(&result)?)
        } else {
            Ok(format_result(&result, params.show))
        }
    }

    pub async fn synonyms(&self, params: SynonymParams) -> Result<String, CommandError> {
        let term = params.term.trim();
        if term.is_empty() {
            return Err(CommandError::InvalidArgs("term must not be empty".into()));
        }

        info!(term, "command:synonyms");

        let candidates = tokio::time::timeout(LOOKUP_TIMEOUT, resolve_synonyms(self.aggregator.names(), term))
            .await
            .map_err(|_| {
                CommandError::Timeout(format!(
                    "synonym lookup timed out after {}s",
                    LOOKUP_TIMEOUT.as_secs()
                ))
            })?;

        info!(candidates = candidates.len(), "synonyms complete");
        if params.json {
            Ok(serde_json::to_string_pretty(&candidates)?)
        } else {
            Ok(format_synonyms(term, &candidates))
        }
    }

    pub async fn extract(&self, params: ExtractParams) -> Result<String, CommandError> {
        let text = match &params.file {
            Some(path) => tokio::fs::read_to_string(path).await?,
            None => {
                let mut buf = String::new();
                tokio::io::stdin()
                    .take(MAX_EXTRACT_BYTES as u64 + 1)
                    .read_to_string(&mut buf)
                    .await?;
                buf
            }
        };
        if text.len() > MAX_EXTRACT_BYTES {
            return Err(CommandError::InvalidArgs(format!(
                "input exceeds {MAX_EXTRACT_BYTES} bytes"
            )));
        }

        info!(ruleset = %params.ruleset, bytes = text.len(), "command:extract");

        let facts = extract_facts(&text, &params.ruleset)?;
        if params.json {
            Ok(serde_json::to_string_pretty(&facts)?)
        } else {
            Ok(format_extraction(&params.ruleset, &facts))
        }
    }

    pub async fn regulation(&self, params: RegulationParams) -> Result<String, CommandError> {
        info!(citation = %params.citation, "command:regulation");

        let summary = tokio::time::timeout(
            LOOKUP_TIMEOUT,
            lookup_regulation(&self.http, &self.settings, &params.citation),
        )
        .await
        .map_err(|_| {
            CommandError::Timeout(format!(
                "regulation lookup timed out after {}s",
                LOOKUP_TIMEOUT.as_secs()
            ))
        })??;

        if params.json {
            Ok(serde_json::to_string_pretty(&summary)?)
        } else {
            Ok(format_regulation(&summary))
        }
    }

    pub fn sources(&self) -> String {
        let mut output = String::from("| Source | Registry | Ruleset |\n|---|---|---|\n");
        for source in SOURCES {
            output.push_str(&format!(
                "| {} | {} | {} |\n",
                source.name,
                table_cell(source.label),
                source.ruleset.map_or("-", |r| r.as_str())
            ));
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Expansion;
    use crate::classify::EntityType;
    use crate::config::Endpoints;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn regintel(base: &str) -> Regintel {
        let settings = Settings {
            endpoints: Endpoints::all_at(base),
            max_retries: 0,
            page_delay: Duration::ZERO,
            ..Settings::default()
        };
        Regintel::new(settings).unwrap()
    }

    fn search(term: &str, sources: &[&str], json: bool) -> SearchParams {
        SearchParams {
            term: term.into(),
            hint: None,
            default: EntityType::Unknown,
            sources: sources.iter().map(|s| s.to_string()).collect(),
            cap: None,
            expand: Expansion::Off,
            expand_terms: 3,
            show: 10,
            timeout: 30,
            json,
        }
    }

    #[tokio::test]
    async fn search_k_number_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/device/510k.json"))
            .and(query_param("search", "k_number:\"K123456\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"results": {"total": 1}},
                "results": [{
                    "k_number": "K123456",
                    "device_name": "Dental cement",
                    "openfda": {"regulation_number": "872.3275"}
                }]
            })))
            .mount(&server)
            .await;

        let output = regintel(&server.uri())
            .search(search("k123456", &["device_510k"], false))
            .await
            .unwrap();

        assert!(output.contains("Classified as **device** (identifier pattern), 510(k) number"));
        assert!(output.contains("| device_510k | 1 | `k_number:\"K123456\"` |"));
        assert!(output.contains("Dental cement `K123456`"));
        assert!(output.contains("- 21 CFR 872.3275"));
    }

    #[tokio::test]
    async fn search_json_reports_failed_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": "BAD_REQUEST", "message": "Invalid search"}
            })))
            .mount(&server)
            .await;

        let output = regintel(&server.uri())
            .search(search("K123456", &["device_510k"], true))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["failed"][0]["source"], "device_510k");
        assert_eq!(value["total_records"], 0);
    }

    #[tokio::test]
    async fn empty_term_is_invalid() {
        let err = regintel("http://127.0.0.1:9")
            .search(search("  ", &[], false))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn extract_reads_file() {
        let path = std::env::temp_dir().join(format!("regintel-extract-{}.txt", std::process::id()));
        tokio::fs::write(&path, "Class II (special controls). Biocompatibility testing per ISO 10993-1.")
            .await
            .unwrap();

        let output = regintel("http://127.0.0.1:9")
            .extract(ExtractParams {
                ruleset: "regulatory".into(),
                file: Some(path.clone()),
                json: false,
            })
            .await
            .unwrap();
        tokio::fs::remove_file(&path).await.ok();

        assert!(output.contains("device_class: II"));
        assert!(output.contains("ISO 10993-1"));
    }

    #[tokio::test]
    async fn extract_unknown_ruleset_is_invalid() {
        let path = std::env::temp_dir().join(format!("regintel-ruleset-{}.txt", std::process::id()));
        tokio::fs::write(&path, "text").await.unwrap();

        let err = regintel("http://127.0.0.1:9")
            .extract(ExtractParams {
                ruleset: "astrology".into(),
                file: Some(path.clone()),
                json: false,
            })
            .await
            .unwrap_err();
        tokio::fs::remove_file(&path).await.ok();

        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn sources_lists_catalogue() {
        let output = regintel("http://127.0.0.1:9").sources();
        assert_eq!(output.lines().count(), SOURCES.len() + 2);
        assert!(output.contains("| pubmed |"));
    }
}

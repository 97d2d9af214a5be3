pub mod sources;
pub mod types;

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::{ApiKey, Endpoints, Settings};
use crate::retry::Retryable;

pub use sources::{Protocol, SOURCES, SourceSpec, default_sources, find};
pub use types::{Page, PageRequest, SourceRecord};
use types::{ESearchResponse, ESummaryResponse, OpenFdaResponse, StudiesResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors returned by upstream registry calls.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream rate limit exceeded")]
    RateLimited,

    #[error("Upstream error ({code}): {message}")]
    Status { code: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl Retryable for RegistryError {
    fn is_retryable(&self) -> bool {
        match self {
            RegistryError::RateLimited => true,
            RegistryError::Status { code, .. } => (500..=599).contains(code),
            RegistryError::Network(e) => !e.is_builder() && !e.is_decode(),
            RegistryError::NotFound(_)
            | RegistryError::Malformed(_)
            | RegistryError::InvalidEndpoint(_) => false,
        }
    }
}

/// One page fetch against a registry.
/// Implemented by `HttpRegistry` for production; mock implementations used in tests.
pub trait RegistryClient {
    async fn fetch_page(
        &self,
        source: &SourceSpec,
        request: &PageRequest,
    ) -> Result<Page, RegistryError>;
}

/// HTTP client for openFDA, NCBI E-utilities and ClinicalTrials.gov.
#[derive(Clone)]
pub struct HttpRegistry {
    http: Client,
    endpoints: Endpoints,
    openfda_key: Option<ApiKey>,
    ncbi_key: Option<ApiKey>,
}

impl HttpRegistry {
    pub fn new(http: Client, settings: &Settings) -> Self {
        if settings.openfda_key.is_none() {
            debug!("No OPENFDA_API_KEY set; openFDA allows 1000 requests/day without one");
        }
        Self {
            http,
            endpoints: settings.endpoints.clone(),
            openfda_key: settings.openfda_key.clone(),
            ncbi_key: settings.ncbi_key.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            endpoints: Endpoints::all_at(base_url),
            openfda_key: None,
            ncbi_key: None,
        }
    }

    async fn openfda_page(
        &self,
        source: &SourceSpec,
        request: &PageRequest,
    ) -> Result<Page, RegistryError> {
        let mut url = endpoint(&self.endpoints.openfda, source.path)?;
        {
            let mut query = url.query_pairs_mut();
            query.extend_pairs(&request.params);
            query
                .append_pair("limit", &request.limit.to_string())
                .append_pair("skip", &request.offset.to_string());
            if let Some(key) = &self.openfda_key {
                query.append_pair("api_key", key.expose());
            }
        }

        let body: OpenFdaResponse = match get_json(&self.http, url).await {
            Ok(value) => parse(value)?,
            // openFDA answers "no matches" with 404.
            Err(RegistryError::NotFound(_)) => return Ok(Page::empty()),
            Err(e) => return Err(e),
        };
        Ok(Page {
            total: body
                .meta
                .and_then(|m| m.results)
                .and_then(|r| r.total),
            records: body.results,
            next_token: None,
            listed: None,
        })
    }

    async fn pubmed_page(
        &self,
        source: &SourceSpec,
        request: &PageRequest,
    ) -> Result<Page, RegistryError> {
        let mut url = endpoint(&self.endpoints.ncbi, "/esearch.fcgi")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("db", source.path)
                .extend_pairs(&request.params)
                .append_pair("retstart", &request.offset.to_string())
                .append_pair("retmax", &request.limit.to_string())
                .append_pair("retmode", "json");
            if let Some(key) = &self.ncbi_key {
                query.append_pair("api_key", key.expose());
            }
        }
        let search: ESearchResponse = parse(get_json(&self.http, url).await?)?;
        let total = search
            .esearchresult
            .count
            .as_deref()
            .and_then(|c| c.parse::<u64>().ok());
        let ids = search.esearchresult.idlist;
        if ids.is_empty() {
            return Ok(Page {
                total,
                ..Page::empty()
            });
        }

        let mut url = endpoint(&self.endpoints.ncbi, "/esummary.fcgi")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("db", source.path)
                .append_pair("id", &ids.join(","))
                .append_pair("retmode", "json");
            if let Some(key) = &self.ncbi_key {
                query.append_pair("api_key", key.expose());
            }
        }
        let summary: ESummaryResponse = parse(get_json(&self.http, url).await?)?;
        let result = summary.result.unwrap_or_default();
        // Summaries keyed by uid; keep esearch ranking order.
        let records = ids
            .iter()
            .filter_map(|id| result.get(id).cloned())
            .collect();
        Ok(Page {
            records,
            total,
            next_token: None,
            listed: Some(ids.len()),
        })
    }

    async fn trials_page(
        &self,
        source: &SourceSpec,
        request: &PageRequest,
    ) -> Result<Page, RegistryError> {
        let mut url = endpoint(&self.endpoints.ctgov, source.path)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .extend_pairs(&request.params)
                .append_pair("pageSize", &request.limit.to_string())
                .append_pair("countTotal", "true")
                .append_pair("format", "json");
            if let Some(token) = &request.page_token {
                query.append_pair("pageToken", token);
            }
        }
        let body: StudiesResponse = parse(get_json(&self.http, url).await?)?;
        Ok(Page {
            records: body.studies,
            total: body.total_count,
            next_token: body.next_page_token,
            listed: None,
        })
    }
}

impl RegistryClient for HttpRegistry {
    async fn fetch_page(
        &self,
        source: &SourceSpec,
        request: &PageRequest,
    ) -> Result<Page, RegistryError> {
        let page = match source.protocol {
            Protocol::OpenFda => self.openfda_page(source, request).await,
            Protocol::PubMed => self.pubmed_page(source, request).await,
            Protocol::ClinicalTrials => self.trials_page(source, request).await,
        }?;
        debug!(
            source = source.name,
            offset = request.offset,
            records = page.records.len(),
            total = ?page.total,
            "page fetched"
        );
        Ok(page)
    }
}

pub(crate) fn endpoint(base: &str, path: &str) -> Result<Url, RegistryError> {
    Url::parse(&format!("{base}{path}"))
        .map_err(|e| RegistryError::InvalidEndpoint(format!("{base}{path}: {e}")))
}

/// GET `url` and decode the body as JSON, mapping status codes onto [`RegistryError`].
pub(crate) async fn get_json(http: &Client, url: Url) -> Result<Value, RegistryError> {
    let path = url.path().to_string();
    let response = http
        .get(url)
        .header("Accept", "application/json")
        .header("User-Agent", crate::USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await?;

    let status = response.status();
    match status.as_u16() {
        200..=299 => {
            let text = response.text().await?;
            serde_json::from_str(&text).map_err(|e| RegistryError::Malformed(e.to_string()))
        }
        404 => Err(RegistryError::NotFound(path)),
        429 => {
            warn!(path = %path, "upstream rate limited");
            Err(RegistryError::RateLimited)
        }
        code => {
            let message = extract_error_message(
                &response
                    .text()
                    .await
                    .unwrap_or_else(|_| format!("HTTP {status}")),
            );
            Err(RegistryError::Status { code, message })
        }
    }
}

pub(crate) fn parse<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, RegistryError> {
    serde_json::from_value(value).map_err(|e| RegistryError::Malformed(e.to_string()))
}

/// Pull a human-readable message out of the error bodies the registries return:
/// `{"error": {"message": ..}}` (openFDA), `{"message": ..}`, `{"ERROR": ..}` (E-utilities).
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .or_else(|| v.get("ERROR"))
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

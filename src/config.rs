use std::env;
use std::time::Duration;

use tracing::debug;

const OPENFDA_BASE: &str = "https://api.fda.gov";
const NCBI_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const CTGOV_BASE: &str = "https://clinicaltrials.gov/api/v2";
const RXNAV_BASE: &str = "https://rxnav.nlm.nih.gov/REST";
const PUBCHEM_BASE: &str = "https://pubchem.ncbi.nlm.nih.gov/rest/pug";
const CHEMBL_BASE: &str = "https://www.ebi.ac.uk/chembl/api/data";
const ECFR_BASE: &str = "https://www.ecfr.gov";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be an integer of at least {min}, got '{value}'")]
    InvalidNumber {
        var: &'static str,
        value: String,
        min: u64,
    },

    #[error("{var} is not a valid URL: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Clone, Default)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Base URL of every upstream registry. Overridable so tests can point at a mock server.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub openfda: String,
    pub ncbi: String,
    pub ctgov: String,
    pub rxnav: String,
    pub pubchem: String,
    pub chembl: String,
    pub ecfr: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            openfda: OPENFDA_BASE.to_string(),
            ncbi: NCBI_BASE.to_string(),
            ctgov: CTGOV_BASE.to_string(),
            rxnav: RXNAV_BASE.to_string(),
            pubchem: PUBCHEM_BASE.to_string(),
            chembl: CHEMBL_BASE.to_string(),
            ecfr: ECFR_BASE.to_string(),
        }
    }
}

impl Endpoints {
    /// Every registry served from one origin; used by wiremock tests.
    pub fn all_at(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            openfda: base.clone(),
            ncbi: base.clone(),
            ctgov: base.clone(),
            rxnav: base.clone(),
            pubchem: base.clone(),
            chembl: base.clone(),
            ecfr: base,
        }
    }
}

/// Runtime knobs for harvesting, retry, and caching.
///
/// Configuration via environment variables (all optional):
/// - `OPENFDA_API_KEY`, `NCBI_API_KEY`: raise upstream rate limits
/// - `REGINTEL_CACHE_TTL_SECS`, `REGINTEL_PAGE_SIZE`, `REGINTEL_RESULT_CAP`,
///   `REGINTEL_MAX_RETRIES`, `REGINTEL_BACKOFF_UNIT_MS`, `REGINTEL_PAGE_DELAY_MS`
/// - `REGINTEL_<REGISTRY>_URL`: base URL overrides
#[derive(Debug, Clone)]
pub struct Settings {
    pub openfda_key: Option<ApiKey>,
    pub ncbi_key: Option<ApiKey>,
    pub endpoints: Endpoints,
    pub cache_ttl: Duration,
    pub page_size: usize,
    pub result_cap: usize,
    pub max_retries: u32,
    pub backoff_unit: Duration,
    pub page_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openfda_key: None,
            ncbi_key: None,
            endpoints: Endpoints::default(),
            cache_ttl: Duration::from_secs(30 * 60),
            page_size: 100,
            result_cap: 1000,
            max_retries: 3,
            backoff_unit: Duration::from_millis(1000),
            page_delay: Duration::from_millis(100),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let endpoints = Endpoints {
            openfda: url_var("REGINTEL_OPENFDA_URL", defaults.endpoints.openfda)?,
            ncbi: url_var("REGINTEL_NCBI_URL", defaults.endpoints.ncbi)?,
            ctgov: url_var("REGINTEL_CTGOV_URL", defaults.endpoints.ctgov)?,
            rxnav: url_var("REGINTEL_RXNAV_URL", defaults.endpoints.rxnav)?,
            pubchem: url_var("REGINTEL_PUBCHEM_URL", defaults.endpoints.pubchem)?,
            chembl: url_var("REGINTEL_CHEMBL_URL", defaults.endpoints.chembl)?,
            ecfr: url_var("REGINTEL_ECFR_URL", defaults.endpoints.ecfr)?,
        };

        let settings = Self {
            openfda_key: string_var("OPENFDA_API_KEY").map(ApiKey),
            ncbi_key: string_var("NCBI_API_KEY").map(ApiKey),
            endpoints,
            cache_ttl: Duration::from_secs(number_var(
                "REGINTEL_CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
                1,
            )?),
            page_size: number_var("REGINTEL_PAGE_SIZE", defaults.page_size as u64, 1)? as usize,
            result_cap: number_var("REGINTEL_RESULT_CAP", defaults.result_cap as u64, 1)? as usize,
            max_retries: number_var(
                "REGINTEL_MAX_RETRIES",
                u64::from(defaults.max_retries),
                0,
            )?
            .min(u64::from(u32::MAX)) as u32,
            backoff_unit: Duration::from_millis(number_var(
                "REGINTEL_BACKOFF_UNIT_MS",
                defaults.backoff_unit.as_millis() as u64,
                0,
            )?),
            page_delay: Duration::from_millis(number_var(
                "REGINTEL_PAGE_DELAY_MS",
                defaults.page_delay.as_millis() as u64,
                0,
            )?),
        };

        debug!(
            openfda_key = settings.openfda_key.is_some(),
            ncbi_key = settings.ncbi_key.is_some(),
            ttl_secs = settings.cache_ttl.as_secs(),
            "settings loaded"
        );
        Ok(settings)
    }
}

fn string_var(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn number_var(var: &'static str, default: u64, min: u64) -> Result<u64, ConfigError> {
    match string_var(var) {
        None => Ok(default),
        Some(value) => parse_number(var, &value, min),
    }
}

fn parse_number(var: &'static str, value: &str, min: u64) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(n) if n >= min => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            var,
            value: value.to_string(),
            min,
        }),
    }
}

fn url_var(var: &'static str, default: String) -> Result<String, ConfigError> {
    match string_var(var) {
        None => Ok(default),
        Some(value) => {
            url::Url::parse(&value).map_err(|source| ConfigError::InvalidUrl { var, source })?;
            Ok(value.trim_end_matches('/').to_string())
        }
    }
}

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::types::{
    AllRelatedResponse, CidResponse, LabelResponse, MoleculeSearch, RxcuiResponse,
    SynonymsResponse,
};
use super::{Authority, NameLookup, NameType, SynonymCandidate};
use crate::config::{ApiKey, Endpoints, Settings};
use crate::registry::{RegistryError, endpoint, get_json, parse};
use crate::retry::{RetryPolicy, with_retry};

const LABEL_LIMIT: usize = 5;
const CHEMBL_LIMIT: usize = 5;
const PUBCHEM_KEEP: usize = 30;
const PUBCHEM_MAX_LEN: usize = 100;
const PUBCHEM_NOISE: &[&str] = &["UNII", "CHEBI", "DTXSID", "DTXCID", "SCHEMBL"];

/// RxNorm term types worth offering as alternate names.
const RXNORM_TTYS: &[&str] = &["IN", "PIN", "MIN", "BN"];

/// HTTP lookups against RxNorm, openFDA labels, PubChem and ChEMBL.
#[derive(Clone)]
pub struct HttpNameLookup {
    http: Client,
    endpoints: Endpoints,
    openfda_key: Option<ApiKey>,
    policy: RetryPolicy,
}

impl HttpNameLookup {
    pub fn new(http: Client, settings: &Settings) -> Self {
        Self {
            http,
            endpoints: settings.endpoints.clone(),
            openfda_key: settings.openfda_key.clone(),
            policy: RetryPolicy::new(settings.max_retries, settings.backoff_unit),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            endpoints: Endpoints::all_at(base_url),
            openfda_key: None,
            policy: RetryPolicy::new(0, std::time::Duration::ZERO),
        }
    }

    /// GET with retry; a 404 means the authority does not know the name.
    async fn get(&self, url: Url) -> Result<Option<Value>, RegistryError> {
        match with_retry(&self.policy, || get_json(&self.http, url.clone())).await {
            Ok(value) => Ok(Some(value)),
            Err(RegistryError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn rxnorm(&self, term: &str) -> Result<Vec<SynonymCandidate>, RegistryError> {
        let mut url = endpoint(&self.endpoints.rxnav, "/rxcui.json")?;
        url.query_pairs_mut()
            .append_pair("name", term)
            .append_pair("search", "1");
        let Some(value) = self.get(url).await? else {
            return Ok(Vec::new());
        };
        let ids: RxcuiResponse = parse(value)?;
        let Some(rxcui) = ids.id_group.and_then(|g| g.rxnorm_id.into_iter().next()) else {
            return Ok(Vec::new());
        };

        let url = endpoint(
            &self.endpoints.rxnav,
            &format!("/rxcui/{}/allrelated.json", encode(&rxcui)),
        )?;
        let Some(value) = self.get(url).await? else {
            return Ok(Vec::new());
        };
        let related: AllRelatedResponse = parse(value)?;

        Ok(related
            .all_related_group
            .map(|g| g.concept_group)
            .unwrap_or_default()
            .into_iter()
            .filter(|group| RXNORM_TTYS.contains(&group.tty.as_str()))
            .flat_map(|group| {
                let name_type = match group.tty.as_str() {
                    "BN" => NameType::Brand,
                    _ => NameType::Generic,
                };
                group.concept_properties.into_iter().map(move |c| {
                    SynonymCandidate::new(c.name, name_type, Authority::RxNorm, Some(c.rxcui))
                })
            })
            .collect())
    }

    async fn openfda_label(&self, term: &str) -> Result<Vec<SynonymCandidate>, RegistryError> {
        let term = term.replace('"', "");
        let mut url = endpoint(&self.endpoints.openfda, "/drug/label.json")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair(
                    "search",
                    &format!("openfda.generic_name:\"{term}\" OR openfda.brand_name:\"{term}\""),
                )
                .append_pair("limit", &LABEL_LIMIT.to_string());
            if let Some(key) = &self.openfda_key {
                query.append_pair("api_key", key.expose());
            }
        }
        let Some(value) = self.get(url).await? else {
            return Ok(Vec::new());
        };
        let labels: LabelResponse = parse(value)?;

        let mut out = Vec::new();
        for label in labels.results {
            let id = label.set_id;
            let openfda = label.openfda;
            let groups = [
                (openfda.generic_name, NameType::Generic),
                (openfda.brand_name, NameType::Brand),
                (openfda.substance_name, NameType::Chemical),
                (openfda.application_number, NameType::Code),
            ];
            for (names, name_type) in groups {
                out.extend(names.into_iter().map(|n| {
                    SynonymCandidate::new(n, name_type, Authority::OpenFdaLabel, id.clone())
                }));
            }
        }
        Ok(out)
    }

    async fn pubchem(&self, term: &str) -> Result<Vec<SynonymCandidate>, RegistryError> {
        let url = endpoint(
            &self.endpoints.pubchem,
            &format!("/compound/name/{}/cids/JSON", encode(term)),
        )?;
        let Some(value) = self.get(url).await? else {
            return Ok(Vec::new());
        };
        let cids: CidResponse = parse(value)?;
        let Some(cid) = cids.identifier_list.and_then(|l| l.cid.into_iter().next()) else {
            return Ok(Vec::new());
        };

        let url = endpoint(
            &self.endpoints.pubchem,
            &format!("/compound/cid/{cid}/synonyms/JSON"),
        )?;
        let Some(value) = self.get(url).await? else {
            return Ok(Vec::new());
        };
        let synonyms: SynonymsResponse = parse(value)?;
        let registry_id = Some(format!("CID{cid}"));

        Ok(synonyms
            .information_list
            .and_then(|l| l.information.into_iter().next())
            .map(|info| info.synonym)
            .unwrap_or_default()
            .into_iter()
            .filter(|s| s.len() < PUBCHEM_MAX_LEN)
            .filter(|s| !PUBCHEM_NOISE.iter().any(|p| s.to_uppercase().starts_with(p)))
            .take(PUBCHEM_KEEP)
            .map(|s| SynonymCandidate::new(s, NameType::Chemical, Authority::PubChem, registry_id.clone()))
            .collect())
    }

    async fn chembl(&self, term: &str) -> Result<Vec<SynonymCandidate>, RegistryError> {
        let mut url = endpoint(&self.endpoints.chembl, "/molecule/search.json")?;
        url.query_pairs_mut()
            .append_pair("q", term)
            .append_pair("limit", &CHEMBL_LIMIT.to_string());
        let Some(value) = self.get(url).await? else {
            return Ok(Vec::new());
        };
        let search: MoleculeSearch = parse(value)?;

        let mut out = Vec::new();
        for molecule in search.molecules {
            let id = Some(molecule.molecule_chembl_id);
            if let Some(pref) = molecule.pref_name {
                out.push(SynonymCandidate::new(pref, NameType::Generic, Authority::Chembl, id.clone()));
            }
            for syn in molecule.molecule_synonyms {
                let name_type = match syn.syn_type.as_deref() {
                    Some("TRADE_NAME") => NameType::Brand,
                    Some("INN" | "USAN" | "BAN" | "JAN") => NameType::Generic,
                    Some("RESEARCH_CODE") => NameType::Code,
                    _ => NameType::Synonym,
                };
                out.push(SynonymCandidate::new(
                    syn.molecule_synonym,
                    name_type,
                    Authority::Chembl,
                    id.clone(),
                ));
            }
        }
        Ok(out)
    }
}

impl NameLookup for HttpNameLookup {
    async fn lookup(
        &self,
        authority: Authority,
        term: &str,
    ) -> Result<Vec<SynonymCandidate>, RegistryError> {
        let found = match authority {
            Authority::RxNorm => self.rxnorm(term).await,
            Authority::OpenFdaLabel => self.openfda_label(term).await,
            Authority::PubChem => self.pubchem(term).await,
            Authority::Chembl => self.chembl(term).await,
        }?;
        debug!(authority = %authority, names = found.len(), "name lookup complete");
        Ok(found)
    }
}

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string()
}

#[cfg(test)]
mod http_tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn rxnorm_maps_term_types() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rxcui.json"))
            .and(query_param("name", "atorvastatin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "idGroup": {"name": "atorvastatin", "rxnormId": ["83367"]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rxcui/83367/allrelated.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "allRelatedGroup": {"conceptGroup": [
                    {"tty": "IN", "conceptProperties": [{"rxcui": "83367", "name": "atorvastatin"}]},
                    {"tty": "BN", "conceptProperties": [{"rxcui": "153165", "name": "Lipitor"}]},
                    {"tty": "SCD", "conceptProperties": [{"rxcui": "617310", "name": "atorvastatin 20 MG Oral Tablet"}]},
                    {"tty": "DF"}
                ]}
            })))
            .mount(&server)
            .await;

        let lookup = HttpNameLookup::with_base_url(Client::new(), &server.uri());
        let found = lookup.lookup(Authority::RxNorm, "atorvastatin").await.unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[1].name, "Lipitor");
        assert_eq!(found[1].name_type, NameType::Brand);
        assert_eq!(found[1].registry_id.as_deref(), Some("153165"));
    }

    #[tokio::test]
    async fn rxnorm_unknown_name_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rxcui.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"idGroup": {}})))
            .mount(&server)
            .await;

        let lookup = HttpNameLookup::with_base_url(Client::new(), &server.uri());
        let found = lookup.lookup(Authority::RxNorm, "zzzz").await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn openfda_label_collects_name_kinds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drug/label.json"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "set_id": "c6e131fe",
                    "openfda": {
                        "generic_name": ["ATORVASTATIN CALCIUM"],
                        "brand_name": ["LIPITOR"],
                        "substance_name": ["ATORVASTATIN CALCIUM TRIHYDRATE"],
                        "application_number": ["NDA020702"]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let lookup = HttpNameLookup::with_base_url(Client::new(), &server.uri());
        let found = lookup
            .lookup(Authority::OpenFdaLabel, "atorvastatin")
            .await
            .unwrap();

        let kinds: Vec<_> = found.iter().map(|c| c.name_type).collect();
        assert_eq!(
            kinds,
            vec![
                NameType::Generic,
                NameType::Brand,
                NameType::Chemical,
                NameType::Code
            ]
        );
        assert!(found.iter().all(|c| c.registry_id.as_deref() == Some("c6e131fe")));
    }

    #[tokio::test]
    async fn openfda_label_404_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drug/label.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let lookup = HttpNameLookup::with_base_url(Client::new(), &server.uri());
        let found = lookup.lookup(Authority::OpenFdaLabel, "zzzz").await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn pubchem_drops_registry_noise_and_long_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compound/name/aspirin/cids/JSON"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "IdentifierList": {"CID": [2244]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compound/cid/2244/synonyms/JSON"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "InformationList": {"Information": [{
                    "CID": 2244,
                    "Synonym": [
                        "aspirin",
                        "Acetylsalicylic acid",
                        "UNII-R16CO5Y76E",
                        "CHEBI:15365",
                        "DTXSID5020108",
                        "x".repeat(120)
                    ]
                }]}
            })))
            .mount(&server)
            .await;

        let lookup = HttpNameLookup::with_base_url(Client::new(), &server.uri());
        let found = lookup.lookup(Authority::PubChem, "aspirin").await.unwrap();

        let names: Vec<_> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["aspirin", "Acetylsalicylic acid"]);
        assert_eq!(found[0].registry_id.as_deref(), Some("CID2244"));
    }

    #[tokio::test]
    async fn chembl_maps_trade_names_to_brand() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/molecule/search.json"))
            .and(query_param("q", "atorvastatin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "molecules": [{
                    "molecule_chembl_id": "CHEMBL1487",
                    "pref_name": "ATORVASTATIN",
                    "molecule_synonyms": [
                        {"molecule_synonym": "Lipitor", "syn_type": "TRADE_NAME"},
                        {"molecule_synonym": "CI-981", "syn_type": "RESEARCH_CODE"}
                    ]
                }]
            })))
            .mount(&server)
            .await;

        let lookup = HttpNameLookup::with_base_url(Client::new(), &server.uri());
        let found = lookup.lookup(Authority::Chembl, "atorvastatin").await.unwrap();

        assert_eq!(found.len(), 3);
        assert_eq!(found[0].name_type, NameType::Generic);
        assert_eq!(found[1].name_type, NameType::Brand);
        assert_eq!(found[2].name_type, NameType::Code);
        assert_eq!(found[1].registry_id.as_deref(), Some("CHEMBL1487"));
    }

    #[tokio::test]
    async fn server_error_surfaces_as_registry_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/molecule/search.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let lookup = HttpNameLookup::with_base_url(Client::new(), &server.uri());
        let result = lookup.lookup(Authority::Chembl, "atorvastatin").await;
        assert!(matches!(result, Err(RegistryError::Status { code: 500, .. })));
    }
}

use serde::Deserialize;

// RxNav: /rxcui.json?name=..&search=1
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RxcuiResponse {
    pub id_group: Option<IdGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IdGroup {
    #[serde(default)]
    pub rxnorm_id: Vec<String>,
}

// RxNav: /rxcui/{id}/allrelated.json
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AllRelatedResponse {
    pub all_related_group: Option<AllRelatedGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AllRelatedGroup {
    #[serde(default)]
    pub concept_group: Vec<ConceptGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConceptGroup {
    pub tty: String,
    #[serde(default)]
    pub concept_properties: Vec<ConceptProperty>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConceptProperty {
    pub rxcui: String,
    pub name: String,
}

// openFDA drug label, openfda block only.
#[derive(Debug, Deserialize)]
pub(crate) struct LabelResponse {
    #[serde(default)]
    pub results: Vec<LabelRecord>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LabelRecord {
    #[serde(default)]
    pub set_id: Option<String>,
    #[serde(default)]
    pub openfda: LabelOpenFda,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LabelOpenFda {
    #[serde(default)]
    pub generic_name: Vec<String>,
    #[serde(default)]
    pub brand_name: Vec<String>,
    #[serde(default)]
    pub substance_name: Vec<String>,
    #[serde(default)]
    pub application_number: Vec<String>,
}

// PubChem PUG REST
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct CidResponse {
    pub identifier_list: Option<IdentifierList>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdentifierList {
    #[serde(rename = "CID", default)]
    pub cid: Vec<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct SynonymsResponse {
    pub information_list: Option<InformationList>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct InformationList {
    #[serde(default)]
    pub information: Vec<Information>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Information {
    #[serde(rename = "Synonym", default)]
    pub synonym: Vec<String>,
}

// ChEMBL molecule search
#[derive(Debug, Deserialize)]
pub(crate) struct MoleculeSearch {
    #[serde(default)]
    pub molecules: Vec<Molecule>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Molecule {
    pub molecule_chembl_id: String,
    #[serde(default)]
    pub pref_name: Option<String>,
    #[serde(default)]
    pub molecule_synonyms: Vec<MoleculeSynonym>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MoleculeSynonym {
    pub molecule_synonym: String,
    #[serde(default)]
    pub syn_type: Option<String>,
}

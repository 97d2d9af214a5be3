//! Static catalogue of upstream registries.
//!
//! Every source is a table entry: how to render a query, which fields to try
//! per entity type, and where the id, name, free text, and regulation number
//! live in its records. Adding a source means adding an entry here.

use serde_json::Value;

use super::types::SourceRecord;
use crate::classify::{CodeKind, Criterion, EntityType};
use crate::extract::{Extraction, RulesetName};

/// Query dialect and pagination scheme of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// openFDA: `search=field:"v"`, `skip`/`limit`, `meta.results.total`.
    OpenFda,
    /// NCBI E-utilities: `term="v"[Field]`, `retstart`/`retmax`, then esummary.
    PubMed,
    /// ClinicalTrials.gov v2: `query.<area>=v`, `pageSize` + `pageToken`.
    ClinicalTrials,
}

impl Protocol {
    /// Render one criterion as query parameters.
    pub fn search_params(self, criterion: &Criterion) -> Vec<(String, String)> {
        match self {
            Protocol::OpenFda => {
                let search = match criterion {
                    Criterion::Field { field, value } => openfda_clause(field, value),
                    Criterion::AnyOf { fields, value } => disjunction(fields, value, openfda_clause),
                };
                vec![("search".to_string(), search)]
            }
            Protocol::PubMed => {
                let term = match criterion {
                    Criterion::Field { field, value } => pubmed_clause(field, value),
                    Criterion::AnyOf { fields, value } => disjunction(fields, value, pubmed_clause),
                };
                vec![("term".to_string(), term)]
            }
            Protocol::ClinicalTrials => match criterion {
                Criterion::Field { field, value } => {
                    vec![(format!("query.{field}"), value.clone())]
                }
                Criterion::AnyOf { value, .. } => vec![("query.term".to_string(), value.clone())],
            },
        }
    }

    /// Whether the next page is addressed by an opaque token rather than an offset.
    pub fn uses_page_token(self) -> bool {
        matches!(self, Protocol::ClinicalTrials)
    }
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('"', ""))
}

fn openfda_clause(field: &str, value: &str) -> String {
    format!("{field}:{}", quoted(value))
}

fn pubmed_clause(field: &str, value: &str) -> String {
    format!("{}[{field}]", quoted(value))
}

fn disjunction(fields: &[String], value: &str, clause: fn(&str, &str) -> String) -> String {
    if fields.is_empty() {
        return quoted(value);
    }
    fields
        .iter()
        .map(|f| clause(f, value))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Ranked search fields per classification.
#[derive(Debug)]
pub struct FieldTable {
    pub drug: &'static [&'static str],
    pub device: &'static [&'static str],
    pub company: &'static [&'static str],
    pub condition: &'static [&'static str],
    pub codes: &'static [(CodeKind, &'static [&'static str])],
    /// Fields OR-ed together for the final broad query.
    pub fallback: &'static [&'static str],
}

impl FieldTable {
    /// Fields to try in order. An identifier binds its code fields when the
    /// source has any; otherwise the entity-type list applies.
    pub fn ranked(&self, entity: EntityType, code: Option<CodeKind>) -> &'static [&'static str] {
        if let Some(code) = code
            && let Some((_, fields)) = self.codes.iter().find(|(kind, _)| *kind == code)
        {
            return fields;
        }
        match entity {
            EntityType::Drug => self.drug,
            EntityType::Device => self.device,
            EntityType::Company => self.company,
            EntityType::Condition => self.condition,
            EntityType::Unknown => &[],
        }
    }
}

/// JSON pointers into one upstream record.
#[derive(Debug)]
pub struct RecordShape {
    /// Joined with `-` to form the external id.
    pub id: &'static [&'static str],
    /// First non-empty wins.
    pub name: &'static [&'static str],
    /// Concatenated for extraction.
    pub text: &'static [&'static str],
    pub regulation: &'static [&'static str],
}

#[derive(Debug)]
pub struct SourceSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub protocol: Protocol,
    pub path: &'static str,
    pub fields: FieldTable,
    pub shape: RecordShape,
    pub ruleset: Option<RulesetName>,
}

impl SourceSpec {
    /// Adapter from an opaque upstream record to a [`SourceRecord`].
    /// `position` numbers records lacking an id so they stay distinct.
    pub fn to_record(&self, raw: Value, position: usize) -> SourceRecord {
        let id_parts: Vec<String> = self
            .shape
            .id
            .iter()
            .filter_map(|p| strings_at(&raw, p).into_iter().next())
            .collect();
        let external_id = if id_parts.is_empty() {
            format!("{}#{position}", self.name)
        } else {
            id_parts.join("-")
        };
        let display_name = self
            .shape
            .name
            .iter()
            .find_map(|p| strings_at(&raw, p).into_iter().next())
            .unwrap_or_else(|| external_id.clone());

        SourceRecord {
            source: self.name.to_string(),
            external_id,
            display_name,
            raw,
            facts: Extraction::default(),
        }
    }

    /// Free text the source's ruleset runs over.
    pub fn text_of(&self, raw: &Value) -> String {
        self.shape
            .text
            .iter()
            .flat_map(|p| strings_at(raw, p))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn regulation_numbers(&self, raw: &Value) -> Vec<String> {
        let mut numbers: Vec<String> = self
            .shape
            .regulation
            .iter()
            .flat_map(|p| strings_at(raw, p))
            .collect();
        numbers.sort();
        numbers.dedup();
        numbers
    }
}

/// Scalar or array-of-scalar values at `pointer`, as trimmed non-empty strings.
fn strings_at(raw: &Value, pointer: &str) -> Vec<String> {
    let scalar = |v: &Value| match v {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    match raw.pointer(pointer) {
        Some(Value::Array(items)) => items.iter().filter_map(scalar).collect(),
        Some(v) => scalar(v).into_iter().collect(),
        None => Vec::new(),
    }
}

const NONE: &[&str] = &[];
const OPENFDA_REGULATION: &[&str] = &["/openfda/regulation_number"];

pub static SOURCES: &[SourceSpec] = &[
    SourceSpec {
        name: "device_510k",
        label: "FDA 510(k) clearances",
        protocol: Protocol::OpenFda,
        path: "/device/510k.json",
        fields: FieldTable {
            drug: NONE,
            device: &["device_name", "openfda.device_name"],
            company: &["applicant"],
            condition: NONE,
            codes: &[(CodeKind::KNumber, &["k_number"])],
            fallback: &["device_name", "applicant", "k_number"],
        },
        shape: RecordShape {
            id: &["/k_number"],
            name: &["/device_name"],
            text: NONE,
            regulation: OPENFDA_REGULATION,
        },
        ruleset: None,
    },
    SourceSpec {
        name: "device_pma",
        label: "FDA premarket approvals",
        protocol: Protocol::OpenFda,
        path: "/device/pma.json",
        fields: FieldTable {
            drug: NONE,
            device: &["trade_name", "generic_name"],
            company: &["applicant"],
            condition: NONE,
            codes: &[(CodeKind::PmaNumber, &["pma_number"])],
            fallback: &["trade_name", "generic_name", "applicant"],
        },
        shape: RecordShape {
            id: &["/pma_number", "/supplement_number"],
            name: &["/trade_name", "/generic_name"],
            text: &["/ao_statement"],
            regulation: OPENFDA_REGULATION,
        },
        ruleset: Some(RulesetName::Regulatory),
    },
    SourceSpec {
        name: "device_classification",
        label: "FDA device classification",
        protocol: Protocol::OpenFda,
        path: "/device/classification.json",
        fields: FieldTable {
            drug: NONE,
            device: &["device_name", "product_code"],
            company: NONE,
            condition: &["medical_specialty_description"],
            codes: NONE_CODES,
            fallback: &["device_name", "medical_specialty_description", "product_code"],
        },
        shape: RecordShape {
            id: &["/product_code"],
            name: &["/device_name"],
            text: &["/definition"],
            regulation: &["/regulation_number", "/openfda/regulation_number"],
        },
        ruleset: Some(RulesetName::Regulatory),
    },
    SourceSpec {
        name: "device_recall",
        label: "FDA device recalls",
        protocol: Protocol::OpenFda,
        path: "/device/recall.json",
        fields: FieldTable {
            drug: NONE,
            device: &["product_description"],
            company: &["recalling_firm"],
            condition: NONE,
            codes: &[
                (CodeKind::KNumber, &["k_numbers"]),
                (CodeKind::PmaNumber, &["pma_numbers"]),
            ],
            fallback: &["product_description", "recalling_firm"],
        },
        shape: RecordShape {
            id: &["/product_res_number", "/cfres_id"],
            name: &["/product_description"],
            text: NONE,
            regulation: OPENFDA_REGULATION,
        },
        ruleset: None,
    },
    SourceSpec {
        name: "device_event",
        label: "FDA device adverse events (MAUDE)",
        protocol: Protocol::OpenFda,
        path: "/device/event.json",
        fields: FieldTable {
            drug: NONE,
            device: &["device.generic_name", "device.brand_name"],
            company: &["device.manufacturer_d_name"],
            condition: NONE,
            codes: NONE_CODES,
            fallback: &[
                "device.generic_name",
                "device.brand_name",
                "device.manufacturer_d_name",
            ],
        },
        shape: RecordShape {
            id: &["/mdr_report_key"],
            name: &["/device/0/brand_name", "/device/0/generic_name"],
            text: &["/mdr_text/0/text"],
            regulation: &["/device/0/openfda/regulation_number"],
        },
        ruleset: None,
    },
    SourceSpec {
        name: "device_udi",
        label: "FDA unique device identifiers (GUDID)",
        protocol: Protocol::OpenFda,
        path: "/device/udi.json",
        fields: FieldTable {
            drug: NONE,
            device: &["brand_name", "device_description"],
            company: &["company_name"],
            condition: NONE,
            codes: NONE_CODES,
            fallback: &["brand_name", "company_name", "device_description"],
        },
        shape: RecordShape {
            id: &["/public_device_record_key"],
            name: &["/brand_name", "/device_description"],
            text: &["/device_description"],
            regulation: &["/product_codes/0/openfda/regulation_number"],
        },
        ruleset: None,
    },
    SourceSpec {
        name: "device_registration",
        label: "FDA establishment registration and listing",
        protocol: Protocol::OpenFda,
        path: "/device/registrationlisting.json",
        fields: FieldTable {
            drug: NONE,
            device: &["proprietary_name", "products.openfda.device_name"],
            company: &["registration.name"],
            condition: NONE,
            codes: &[(CodeKind::KNumber, &["k_number"])],
            fallback: &["registration.name", "proprietary_name"],
        },
        shape: RecordShape {
            id: &["/registration/registration_number", "/products/0/product_code"],
            name: &["/registration/name"],
            text: NONE,
            regulation: &["/products/0/openfda/regulation_number"],
        },
        ruleset: None,
    },
    SourceSpec {
        name: "device_enforcement",
        label: "FDA device enforcement reports",
        protocol: Protocol::OpenFda,
        path: "/device/enforcement.json",
        fields: FieldTable {
            drug: NONE,
            device: &["product_description"],
            company: &["recalling_firm"],
            condition: NONE,
            codes: NONE_CODES,
            fallback: &["product_description", "recalling_firm"],
        },
        shape: RecordShape {
            id: &["/recall_number"],
            name: &["/product_description"],
            text: &["/reason_for_recall"],
            regulation: NONE,
        },
        ruleset: None,
    },
    SourceSpec {
        name: "drug_label",
        label: "FDA drug labels (SPL)",
        protocol: Protocol::OpenFda,
        path: "/drug/label.json",
        fields: FieldTable {
            drug: &[
                "openfda.generic_name",
                "openfda.brand_name",
                "openfda.substance_name",
            ],
            device: NONE,
            company: &["openfda.manufacturer_name"],
            condition: &["indications_and_usage"],
            codes: &[
                (CodeKind::ApplicationNumber, &["openfda.application_number"]),
                (CodeKind::Ndc, &["openfda.product_ndc", "openfda.package_ndc"]),
            ],
            fallback: &["openfda.generic_name", "openfda.brand_name"],
        },
        shape: RecordShape {
            id: &["/set_id", "/version"],
            name: &["/openfda/brand_name/0", "/openfda/generic_name/0"],
            text: &[
                "/indications_and_usage/0",
                "/pharmacogenomics/0",
                "/clinical_pharmacology/0",
                "/boxed_warning/0",
            ],
            regulation: NONE,
        },
        ruleset: Some(RulesetName::Biomarker),
    },
    SourceSpec {
        name: "drug_event",
        label: "FDA drug adverse events (FAERS)",
        protocol: Protocol::OpenFda,
        path: "/drug/event.json",
        fields: FieldTable {
            drug: &[
                "patient.drug.medicinalproduct",
                "patient.drug.openfda.generic_name",
            ],
            device: NONE,
            company: &["companynumb"],
            condition: &["patient.reaction.reactionmeddrapt"],
            codes: &[(
                CodeKind::ApplicationNumber,
                &["patient.drug.openfda.application_number"],
            )],
            fallback: &[
                "patient.drug.medicinalproduct",
                "patient.drug.openfda.brand_name",
            ],
        },
        shape: RecordShape {
            id: &["/safetyreportid"],
            name: &["/patient/drug/0/medicinalproduct"],
            text: NONE,
            regulation: NONE,
        },
        ruleset: None,
    },
    SourceSpec {
        name: "drug_drugsfda",
        label: "Drugs@FDA applications",
        protocol: Protocol::OpenFda,
        path: "/drug/drugsfda.json",
        fields: FieldTable {
            drug: &[
                "openfda.brand_name",
                "openfda.generic_name",
                "products.brand_name",
            ],
            device: NONE,
            company: &["sponsor_name"],
            condition: NONE,
            codes: &[
                (CodeKind::ApplicationNumber, &["application_number"]),
                (CodeKind::Ndc, &["openfda.product_ndc"]),
            ],
            fallback: &["openfda.brand_name", "openfda.generic_name", "sponsor_name"],
        },
        shape: RecordShape {
            id: &["/application_number"],
            name: &["/products/0/brand_name", "/openfda/brand_name/0"],
            text: NONE,
            regulation: NONE,
        },
        ruleset: None,
    },
    SourceSpec {
        name: "drug_enforcement",
        label: "FDA drug enforcement reports",
        protocol: Protocol::OpenFda,
        path: "/drug/enforcement.json",
        fields: FieldTable {
            drug: &["product_description", "openfda.generic_name"],
            device: NONE,
            company: &["recalling_firm"],
            condition: NONE,
            codes: &[(CodeKind::Ndc, &["openfda.product_ndc"])],
            fallback: &["product_description", "recalling_firm"],
        },
        shape: RecordShape {
            id: &["/recall_number"],
            name: &["/product_description"],
            text: &["/reason_for_recall"],
            regulation: NONE,
        },
        ruleset: None,
    },
    SourceSpec {
        name: "pubmed",
        label: "PubMed literature",
        protocol: Protocol::PubMed,
        path: "pubmed",
        fields: FieldTable {
            drug: &[
                "Substance Name",
                "MeSH Terms",
                "Pharmacological Action",
                "Title/Abstract",
            ],
            device: &["Title/Abstract"],
            company: &["Affiliation"],
            condition: &["MeSH Terms", "Title/Abstract"],
            codes: NONE_CODES,
            fallback: &["Title/Abstract", "MeSH Terms"],
        },
        shape: RecordShape {
            id: &["/uid"],
            name: &["/title"],
            text: &["/title"],
            regulation: NONE,
        },
        ruleset: Some(RulesetName::Biomarker),
    },
    SourceSpec {
        name: "clinical_trials",
        label: "ClinicalTrials.gov studies",
        protocol: Protocol::ClinicalTrials,
        path: "/studies",
        fields: FieldTable {
            drug: &["intr"],
            device: &["intr"],
            company: &["spons"],
            condition: &["cond"],
            codes: NONE_CODES,
            fallback: &["term"],
        },
        shape: RecordShape {
            id: &["/protocolSection/identificationModule/nctId"],
            name: &[
                "/protocolSection/identificationModule/briefTitle",
                "/protocolSection/identificationModule/officialTitle",
            ],
            text: &[
                "/protocolSection/descriptionModule/briefSummary",
                "/protocolSection/eligibilityModule/eligibilityCriteria",
            ],
            regulation: NONE,
        },
        ruleset: Some(RulesetName::Biomarker),
    },
];

const NONE_CODES: &[(CodeKind, &[&str])] = &[];

pub fn find(name: &str) -> Option<&'static SourceSpec> {
    SOURCES.iter().find(|s| s.name == name)
}

/// Sources consulted when the caller names none.
pub fn default_sources(entity: EntityType) -> Vec<&'static SourceSpec> {
    let names: &[&str] = match entity {
        EntityType::Device | EntityType::Company => &[
            "device_510k",
            "device_pma",
            "device_classification",
            "device_recall",
            "device_event",
            "device_udi",
            "device_registration",
            "device_enforcement",
        ],
        EntityType::Drug => &[
            "drug_label",
            "drug_drugsfda",
            "drug_event",
            "drug_enforcement",
            "pubmed",
            "clinical_trials",
        ],
        EntityType::Condition => &["drug_label", "pubmed", "clinical_trials"],
        EntityType::Unknown => return SOURCES.iter().collect(),
    };
    names.iter().filter_map(|n| find(n)).collect()
}

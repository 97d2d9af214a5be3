use std::sync::LazyLock;

use regex::Regex;

use super::{CodeKind, EntityType};

const CODE_PATTERNS: &[(CodeKind, EntityType, &str)] = &[
    (CodeKind::KNumber, EntityType::Device, r"(?i)^k\d{6}$"),
    (CodeKind::PmaNumber, EntityType::Device, r"(?i)^p\d{6}$"),
    (
        CodeKind::ApplicationNumber,
        EntityType::Drug,
        r"(?i)^(?:nda|anda|bla)\s?\d{6}$",
    ),
    (CodeKind::Ndc, EntityType::Drug, r"^\d{4,5}-\d{3,4}(?:-\d{1,2})?$"),
];

const COMPANY_INDICATORS: &[&str] = &[
    "inc",
    "corp",
    "corporation",
    "ltd",
    "llc",
    "co",
    "company",
    "gmbh",
    "plc",
    "ag",
    "holdings",
    "laboratories",
    "labs",
    "pharma",
    "pharmaceuticals",
    "medical",
    "healthcare",
    "medtronic",
    "abbott",
    "pfizer",
    "johnson & johnson",
    "boston scientific",
];

const DRUG_SUFFIXES: &[&str] = &[
    "mycin", "cillin", "olol", "pril", "sartan", "statin", "zole", "mab", "tinib", "vir",
    "dipine", "parin", "oxacin", "cycline", "azepam", "tidine", "gliptin", "semide",
];

const DOSAGE_FORMS: &[&str] = &[
    "tablet",
    "tablets",
    "capsule",
    "capsules",
    "injection",
    "infusion",
    "solution",
    "suspension",
    "cream",
    "ointment",
    "inhaler",
];

const CONDITION_TERMS: &[&str] = &[
    "syndrome",
    "disease",
    "disorder",
    "infection",
    "deficiency",
    "cancer",
    "carcinoma",
    "tumor",
    "tumour",
    "covid",
    "covid-19",
    "depression",
    "diabetes",
    "hypertension",
    "asthma",
    "arthritis",
    "leukemia",
    "lymphoma",
    "failure",
];

static CODES: LazyLock<Vec<(CodeKind, EntityType, Regex)>> = LazyLock::new(|| {
    CODE_PATTERNS
        .iter()
        .map(|(code, entity, pattern)| (*code, *entity, compile(pattern)))
        .collect()
});

static COMPANY: LazyLock<Regex> = LazyLock::new(|| word_alternation(COMPANY_INDICATORS));

static DRUG_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(r"(?i)\b[a-z]{{2,}}(?:{})\b", DRUG_SUFFIXES.join("|")))
});

static DOSAGE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)\b\d+(?:\.\d+)?\s?(?:mg|mcg|g|ml)\b"));

static DOSAGE_FORM: LazyLock<Regex> = LazyLock::new(|| word_alternation(DOSAGE_FORMS));

static CONDITION: LazyLock<Regex> = LazyLock::new(|| word_alternation(CONDITION_TERMS));

// Literal table entries only; `all_tables_compile` covers every one.
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("classifier pattern table is valid")
}

fn word_alternation(words: &[&str]) -> Regex {
    let escaped: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
    compile(&format!(r"(?i)\b(?:{})\b", escaped.join("|")))
}

pub(super) fn match_code(term: &str) -> Option<(CodeKind, EntityType)> {
    CODES
        .iter()
        .find(|(_, _, re)| re.is_match(term))
        .map(|(code, entity, _)| (*code, *entity))
}

pub(super) fn is_company(term: &str) -> bool {
    COMPANY.is_match(term)
}

pub(super) fn is_drug(term: &str) -> bool {
    DRUG_SUFFIX.is_match(term) || DOSAGE.is_match(term) || DOSAGE_FORM.is_match(term)
}

pub(super) fn is_condition(term: &str) -> bool {
    CONDITION.is_match(term)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_tables_compile() {
        assert_eq!(CODES.len(), CODE_PATTERNS.len());
        assert!(COMPANY.is_match("LLC"));
        assert!(DRUG_SUFFIX.is_match("amoxicillin"));
        assert!(DOSAGE.is_match("5 mg"));
        assert!(DOSAGE_FORM.is_match("oral solution"));
        assert!(CONDITION.is_match("heart failure"));
    }

    #[test]
    fn suffix_needs_a_stem() {
        // A bare suffix is not a drug name.
        assert!(!is_drug("mab"));
        assert!(is_drug("adalimumab"));
    }

    #[test]
    fn eponymous_disease_is_not_a_firm() {
        assert!(!is_company("Stevens-Johnson syndrome"));
        assert!(is_company("Johnson & Johnson"));
    }

    #[test]
    fn trailing_period_after_indicator() {
        assert!(is_company("Acme Co."));
    }
}

use super::{Corroboration, Emit, RuleDef};

const BIOMARKER_MAX: usize = 10;

pub const BIOMARKER_RULES: &[RuleDef] = &[
    // Named driver genes followed by a protein change or alteration type.
    RuleDef {
        field: "genetic",
        pattern: r"\b(?:BRAF|KRAS|NRAS|HRAS|EGFR|ALK|ROS1|MET|RET|NTRK[123]?|BRCA[12]|TP53|PIK3CA|IDH[12]|FLT3|NPM1|KIT|PDGFRA|ERBB2|JAK2|PTEN|ESR1|FGFR[1-4]|BCR-ABL1?)\s+(?:p\.)?(?:[A-Z]\d+[A-Z*]|exon\s+\d+\s+(?:deletion|insertion|skipping)|(?:mutation|fusion|rearrangement|amplification|deletion)s?)",
        max_count: BIOMARKER_MAX,
        emit: Emit::Match,
    },
    RuleDef {
        field: "genetic",
        pattern: r"\bHLA-[A-Z]+\d*\*?\d+(?::\d+)*",
        max_count: BIOMARKER_MAX,
        emit: Emit::Match,
    },
    RuleDef {
        field: "genetic",
        pattern: r"\bCYP\d[A-Z]\d+(?:\*\d+)?",
        max_count: BIOMARKER_MAX,
        emit: Emit::Match,
    },
    RuleDef {
        field: "genetic",
        pattern: r"\b(?:DPYD|TPMT|NUDT15|UGT1A1|VKORC1|G6PD|SLCO1B1)(?:\*\d+)?\b",
        max_count: BIOMARKER_MAX,
        emit: Emit::Match,
    },
    RuleDef {
        field: "genetic",
        pattern: r"\brs\d{3,}\b",
        max_count: BIOMARKER_MAX,
        emit: Emit::Match,
    },
    RuleDef {
        field: "genetic",
        pattern: r"\b(?:MSI-(?:H|high|L)|dMMR|TMB-H)\b",
        max_count: BIOMARKER_MAX,
        emit: Emit::Match,
    },
    RuleDef {
        field: "protein",
        pattern: r"\b(?:HER2|PD-L1|PD-1|CTLA-4|Ki-67|PSA|CA-125|CA 19-9|CEA|AFP|BNP|NT-proBNP|CRP|CD\d{1,3})\b",
        max_count: BIOMARKER_MAX,
        emit: Emit::Match,
    },
    RuleDef {
        field: "protein",
        pattern: r"(?i)\b(?:estrogen receptor|progesterone receptor|troponin(?: [IT])?|interleukin-\d+)\b",
        max_count: BIOMARKER_MAX,
        emit: Emit::Match,
    },
    RuleDef {
        field: "metabolic",
        pattern: r"\b(?:HbA1c|eGFR|LDL-C|HDL-C|ALT|AST)\b",
        max_count: BIOMARKER_MAX,
        emit: Emit::Match,
    },
    RuleDef {
        field: "metabolic",
        pattern: r"(?i)\b(?:hemoglobin A1c|fasting glucose|blood glucose|triglycerides?|cholesterol|creatinine|bilirubin|lactate|uric acid)\b",
        max_count: BIOMARKER_MAX,
        emit: Emit::Match,
    },
    RuleDef {
        field: "tissue_type",
        pattern: r"(?i)\b(?:adenocarcinoma|squamous cell carcinoma|non-small cell|small cell|ductal carcinoma|lobular carcinoma|melanoma|glioblastoma|sarcoma|triple[- ]negative)\b",
        max_count: BIOMARKER_MAX,
        emit: Emit::Match,
    },
    RuleDef {
        field: "chromosomal",
        pattern: r"\bt\(\d{1,2};\d{1,2}\)",
        max_count: BIOMARKER_MAX,
        emit: Emit::Match,
    },
    RuleDef {
        field: "chromosomal",
        pattern: r"\b(?:del|dup|inv)\(\d{1,2}[pq]?\d*(?:\.\d+)?\)",
        max_count: BIOMARKER_MAX,
        emit: Emit::Match,
    },
    RuleDef {
        field: "chromosomal",
        pattern: r"(?i)\b(?:trisomy|monosomy) \d{1,2}\b|\b1p/19q co-?deletion\b|\bphiladelphia chromosome\b",
        max_count: BIOMARKER_MAX,
        emit: Emit::Match,
    },
];

pub const BIOMARKER_CORROBORATION: &[Corroboration] = &[
    (
        "genetic",
        &[
            "mutation",
            "mutations",
            "mutated",
            "variant",
            "polymorphism",
            "allele",
            "genotype",
            "fusion",
            "rearrangement",
            "germline",
            "somatic",
        ],
    ),
    (
        "protein",
        &[
            "expression",
            "overexpression",
            "immunohistochemistry",
            "IHC",
            "staining",
            "positive",
        ],
    ),
    (
        "metabolic",
        &["level", "levels", "serum", "plasma", "concentration", "fasting"],
    ),
    (
        "tissue_type",
        &["histology", "histologic", "biopsy", "subtype", "pathology"],
    ),
    (
        "chromosomal",
        &["translocation", "karyotype", "cytogenetic", "FISH", "chromosome"],
    ),
];

const REQUIREMENTS_MAX: usize = 10;
const TESTING_MAX: usize = 8;

fn roman_class(raw: &str) -> String {
    match raw {
        "1" => "I".to_string(),
        "2" => "II".to_string(),
        "3" => "III".to_string(),
        other => other.to_ascii_uppercase(),
    }
}

pub const REGULATORY_RULES: &[RuleDef] = &[
    RuleDef {
        field: "device_class",
        pattern: r"(?i)\bclass\s+(I{1,3}|[123])\b",
        max_count: 1,
        emit: Emit::Group(1, roman_class),
    },
    RuleDef {
        field: "exemptions",
        pattern: r"(?i)exempt from the premarket notification",
        max_count: REQUIREMENTS_MAX,
        emit: Emit::Label("510(k) exempt"),
    },
    RuleDef {
        field: "exemptions",
        pattern: r"(?i)exempt from the current good manufacturing practice",
        max_count: REQUIREMENTS_MAX,
        emit: Emit::Label("QSR exempt (if not sterile)"),
    },
    RuleDef {
        field: "exemptions",
        pattern: r"(?i)special controls",
        max_count: REQUIREMENTS_MAX,
        emit: Emit::Label("Requires special controls"),
    },
    RuleDef {
        field: "requirements",
        pattern: r"(?i)[^.;\n]*\b(?:must|shall|is required to)\b[^.;\n]*",
        max_count: REQUIREMENTS_MAX,
        emit: Emit::Match,
    },
    RuleDef {
        field: "requirements",
        pattern: r"(?i)[^.;\n]*\bdevice is intended\b[^.;\n]*",
        max_count: REQUIREMENTS_MAX,
        emit: Emit::Match,
    },
    RuleDef {
        field: "requirements",
        pattern: r"(?i)\b(?:special controls:|premarket approval)[^.;\n]*",
        max_count: REQUIREMENTS_MAX,
        emit: Emit::Match,
    },
    RuleDef {
        field: "testing_requirements",
        pattern: r"(?i)\b(?:biocompatibility|sterilization|electrical safety|electromagnetic compatibility|clinical testing|performance testing|software validation|shelf life)\b",
        max_count: TESTING_MAX,
        emit: Emit::Match,
    },
    RuleDef {
        field: "testing_requirements",
        pattern: r"\b(?:ISO|IEC) ?\d{4,5}(?:-\d+)*\b|\bASTM [A-Z]\d+\b",
        max_count: TESTING_MAX,
        emit: Emit::Match,
    },
];

#[cfg(test)]
mod tests {
    use super::super::{Confidence, Ruleset, extract};
    use super::*;

    fn regulatory() -> Ruleset {
        Ruleset::compile(REGULATORY_RULES, &[]).unwrap()
    }

    fn biomarker() -> Ruleset {
        Ruleset::compile(BIOMARKER_RULES, BIOMARKER_CORROBORATION).unwrap()
    }

    #[test]
    fn device_class_takes_first_and_normalizes() {
        let facts = extract(
            "This generic type of device is class 2 (special controls). Class III otherwise.",
            &regulatory(),
        );
        assert_eq!(facts.get("device_class"), ["II"]);
    }

    #[test]
    fn exemption_labels_from_phrases() {
        let text = "The device is exempt from the premarket notification procedures in \
            subpart E of part 807 subject to the limitations in 872.9. The device is also \
            exempt from the current good manufacturing practice requirements.";
        let facts = extract(text, &regulatory());
        assert_eq!(
            facts.get("exemptions"),
            ["510(k) exempt", "QSR exempt (if not sterile)"]
        );
    }

    #[test]
    fn requirements_are_sentence_fragments() {
        let text = "(a) Identification. A dental cement device is intended to bond a crown. \
            Labeling must include sterilization instructions.";
        let facts = extract(text, &regulatory());
        let reqs = facts.get("requirements");
        assert!(reqs.iter().any(|r| r.starts_with("Labeling must include")));
        assert!(reqs.iter().any(|r| r.contains("device is intended to bond a crown")));
    }

    #[test]
    fn testing_requirements_find_named_standards() {
        let text = "Performance testing per ISO 10993-1 and IEC 60601-1; ASTM F1980 shelf life.";
        let facts = extract(text, &regulatory());
        let tests = facts.get("testing_requirements");
        assert!(tests.contains(&"Performance testing".to_string()));
        assert!(tests.contains(&"ISO 10993-1".to_string()));
        assert!(tests.contains(&"IEC 60601-1".to_string()));
        assert!(tests.contains(&"ASTM F1980".to_string()));
    }

    #[test]
    fn pharmacogenomic_markers_are_genetic() {
        let facts = extract(
            "Poor metabolizers (CYP2C19*2 allele) and DPYD carriers need dose changes.",
            &biomarker(),
        );
        assert_eq!(facts.get("genetic"), ["CYP2C19*2", "DPYD"]);
    }

    #[test]
    fn chromosomal_and_tissue_categories() {
        let facts = extract(
            "CML with t(9;22) translocation; lung adenocarcinoma on biopsy.",
            &biomarker(),
        );
        assert_eq!(facts.get("chromosomal"), ["t(9;22)"]);
        assert_eq!(facts.get("tissue_type"), ["adenocarcinoma"]);
        assert_eq!(
            facts.confidence.get("chromosomal"),
            Some(&Confidence::VeryHigh)
        );
    }

    #[test]
    fn metabolic_markers() {
        let facts = extract("Serum creatinine and HbA1c were monitored.", &biomarker());
        assert_eq!(facts.get("metabolic"), ["HbA1c", "creatinine"]);
    }
}

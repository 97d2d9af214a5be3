//! Markdown rendering for CLI output.

use crate::classify::{Basis, Classification, CodeKind};
use crate::extract::{Confidence, Extraction};
use crate::markdown::{escape_md_link, sanitize_heading, table_cell, truncate};
use crate::registry::{SourceRecord, find};
use crate::regulation::RegulationSummary;
use crate::synonyms::{NameType, SynonymCandidate};

use super::UnifiedResult;

const MAX_NAME_CHARS: usize = 120;

pub fn format_result(result: &UnifiedResult, records_per_source: usize) -> String {
    let mut output = format!("# Search: {}\n\n", sanitize_heading(&result.term));
    output.push_str(&describe_classification(&result.classification));
    output.push_str("\n\n");

    if !result.expanded_with.is_empty() {
        output.push_str(&format!("Expanded with: {}\n\n", result.expanded_with.join(", ")));
    }

    output.push_str("| Source | Records | Matched on |\n|---|---|---|\n");
    for source in &result.sources {
        let matched = source
            .strategy
            .as_ref()
            .map(|s| format!("`{}`", table_cell(&s.describe())))
            .unwrap_or_else(|| "-".to_string());
        output.push_str(&format!(
            "| {} | {} | {} |\n",
            source.source,
            source.records.len(),
            matched
        ));
    }
    output.push_str(&format!("\n**Total records:** {}\n\n", result.total_records));

    for source in result.sources.iter().filter(|s| !s.records.is_empty()) {
        let label = find(&source.source).map_or(source.source.as_str(), |s| s.label);
        output.push_str(&format!("## {label} ({})\n\n", source.source));
        for record in source.records.iter().take(records_per_source) {
            push_record(&mut output, record);
        }
        if source.records.len() > records_per_source {
            output.push_str(&format!(
                "\n...and {} more\n",
                source.records.len() - records_per_source
            ));
        }
        output.push('\n');
    }

    if !result.regulation_numbers.is_empty() {
        output.push_str("## Regulation Numbers\n\n");
        for number in &result.regulation_numbers {
            output.push_str(&format!("- 21 CFR {number}\n"));
        }
        output.push('\n');
    }

    if !result.failed.is_empty() {
        output.push_str("## Failed Sources\n\n");
        for failed in &result.failed {
            output.push_str(&format!("- {} ({})\n", failed.source, failed.reason));
        }
        output.push('\n');
    }

    output
}

fn push_record(output: &mut String, record: &SourceRecord) {
    let name = truncate(&record.display_name, MAX_NAME_CHARS);
    match record_url(record) {
        Some(url) => output.push_str(&format!(
            "- [{}]({url}) `{}`\n",
            escape_md_link(&name),
            record.external_id
        )),
        None => output.push_str(&format!("- {name} `{}`\n", record.external_id)),
    }
    for line in extraction_lines(&record.facts) {
        output.push_str(&format!("  - {line}\n"));
    }
}

fn record_url(record: &SourceRecord) -> Option<String> {
    match record.source.as_str() {
        "pubmed" => Some(format!("https://pubmed.ncbi.nlm.nih.gov/{}/", record.external_id)),
        "clinical_trials" => Some(format!("https://clinicaltrials.gov/study/{}", record.external_id)),
        _ => None,
    }
}

fn describe_classification(c: &Classification) -> String {
    let basis = match c.basis {
        Basis::ExplicitHint => "explicit hint",
        Basis::PatternMatch => "identifier pattern",
        Basis::KeywordHeuristic => "keyword heuristic",
        Basis::CallerDefault => "default",
    };
    let mut line = format!("Classified as **{}** ({basis})", c.entity_type);
    if let Some(code) = c.code {
        let code = match code {
            CodeKind::KNumber => "510(k) number",
            CodeKind::PmaNumber => "PMA number",
            CodeKind::ApplicationNumber => "application number",
            CodeKind::Ndc => "NDC",
        };
        line.push_str(&format!(", {code}"));
    }
    line
}

fn extraction_lines(facts: &Extraction) -> Vec<String> {
    facts
        .fields
        .iter()
        .map(|(field, values)| match facts.confidence.get(field) {
            Some(grade) => format!("{field} ({}): {}", confidence_label(*grade), values.join(", ")),
            None => format!("{field}: {}", values.join(", ")),
        })
        .collect()
}

fn confidence_label(grade: Confidence) -> &'static str {
    match grade {
        Confidence::High => "high",
        Confidence::VeryHigh => "very high",
    }
}

pub fn format_extraction(ruleset: &str, facts: &Extraction) -> String {
    let mut output = format!("# Extraction ({ruleset})\n\n");
    if facts.is_empty() {
        output.push_str("No matches.\n");
        return output;
    }
    for line in extraction_lines(facts) {
        output.push_str(&format!("- {line}\n"));
    }
    output
}

pub fn format_synonyms(term: &str, candidates: &[SynonymCandidate]) -> String {
    let mut output = format!("# Synonyms: {}\n\n", sanitize_heading(term));
    if candidates.is_empty() {
        output.push_str("No synonyms found.\n");
        return output;
    }
    output.push_str("| Name | Type | Registry | ID |\n|---|---|---|---|\n");
    for c in candidates {
        let kind = match c.name_type {
            NameType::Generic => "generic",
            NameType::Brand => "brand",
            NameType::Chemical => "chemical",
            NameType::Code => "code",
            NameType::Synonym => "synonym",
        };
        output.push_str(&format!(
            "| {} | {kind} | {} | {} |\n",
            table_cell(&c.name),
            c.origin_registry,
            c.registry_id.as_deref().map_or("-".to_string(), table_cell)
        ));
    }
    output
}

pub fn format_regulation(summary: &RegulationSummary) -> String {
    let mut output = format!("# 21 CFR {}\n\n", summary.citation);
    output.push_str(&format!("**{}**\n\n", summary.title));
    if let Some(class) = &summary.device_class {
        output.push_str(&format!("**Device class:** {class}\n\n"));
    }
    if !summary.identification.is_empty() {
        output.push_str(&format!("## Identification\n\n{}\n\n", summary.identification));
    }
    if !summary.classification.is_empty() {
        output.push_str(&format!("## Classification\n\n{}\n\n", summary.classification));
    }
    let rest: Vec<String> = extraction_lines(&summary.facts)
        .into_iter()
        .filter(|l| !l.starts_with("device_class"))
        .collect();
    if !rest.is_empty() {
        output.push_str("## Extracted\n\n");
        for line in rest {
            output.push_str(&format!("- {line}\n"));
        }
        output.push('\n');
    }
    output.push_str(&format!("Source: {}\n", summary.url));
    output
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::aggregate::SourceFailure;
    use crate::cascade::SourceResult;
    use crate::classify::{EntityType, classify};
    use crate::synonyms::Authority;

    fn record(source: &str, id: &str, name: &str) -> SourceRecord {
        SourceRecord {
            source: source.into(),
            external_id: id.into(),
            display_name: name.into(),
            raw: json!({}),
            facts: Extraction::default(),
        }
    }

    fn source(name: &str, records: Vec<SourceRecord>, error: Option<&str>) -> SourceResult {
        SourceResult {
            source: name.into(),
            records,
            strategy: None,
            total_reported: None,
            last_error: error.map(String::from),
            attempts: 1,
        }
    }

    fn result() -> UnifiedResult {
        let mut counts = BTreeMap::new();
        counts.insert("pubmed".to_string(), 2);
        counts.insert("device_pma".to_string(), 0);
        UnifiedResult {
            term: "BRAF\nV600E".into(),
            classification: classify("BRAF V600E", None, EntityType::Condition),
            sources: vec![
                source(
                    "pubmed",
                    vec![
                        record("pubmed", "38000001", "Vemurafenib [review]"),
                        record("pubmed", "38000002", "Dabrafenib trial"),
                    ],
                    None,
                ),
                source("device_pma", vec![], Some("Upstream error (500): down")),
            ],
            counts,
            succeeded: vec!["pubmed".into()],
            failed: vec![SourceFailure {
                source: "device_pma".into(),
                reason: "Upstream error (500): down".into(),
            }],
            total_records: 2,
            expanded_with: vec![],
            regulation_numbers: vec!["872.3200".into()],
        }
    }

    #[test]
    fn result_report_has_sections() {
        let text = format_result(&result(), 10);
        assert!(text.starts_with("# Search: BRAF V600E\n"));
        assert!(text.contains("| pubmed | 2 | - |"));
        assert!(text.contains("[Vemurafenib \\[review\\]](https://pubmed.ncbi.nlm.nih.gov/38000001/)"));
        assert!(text.contains("## Regulation Numbers"));
        assert!(text.contains("- 21 CFR 872.3200"));
        assert!(text.contains("## Failed Sources"));
        assert!(text.contains("- device_pma (Upstream error (500): down)"));
    }

    #[test]
    fn long_source_lists_are_cut() {
        let text = format_result(&result(), 1);
        assert!(text.contains("...and 1 more"));
        assert!(!text.contains("Dabrafenib"));
    }

    #[test]
    fn extraction_lists_confidence() {
        let facts = crate::extract::extract_facts(
            "A BRAF V600E mutation was present.",
            "biomarker",
        )
        .unwrap();
        let text = format_extraction("biomarker", &facts);
        assert!(text.contains("genetic (very high): BRAF V600E"));
        assert!(format_extraction("biomarker", &Extraction::default()).contains("No matches."));
    }

    #[test]
    fn synonym_table_escapes_cells() {
        let candidates = vec![SynonymCandidate::new(
            "A|B",
            NameType::Brand,
            Authority::Chembl,
            Some("CHEMBL1487".into()),
        )];
        let text = format_synonyms("atorvastatin", &candidates);
        assert!(text.contains(r"| A\|B | brand | chembl | CHEMBL1487 |"));
        assert!(format_synonyms("x", &[]).contains("No synonyms found."));
    }
}

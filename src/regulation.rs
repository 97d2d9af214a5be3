//! 21 CFR section lookup through the eCFR renderer.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Settings;
use crate::extract::{Extraction, RulesetName, extract};
use crate::registry::{RegistryError, endpoint};
use crate::retry::{RetryPolicy, with_retry};

const MAX_RESPONSE_BYTES: usize = 10_000_000;
const CFR_TITLE: u32 = 21;

#[derive(Debug, thiserror::Error)]
pub enum RegulationError {
    #[error("invalid regulation number '{0}' (expected part.section, e.g. 872.3200)")]
    InvalidCitation(String),

    #[error("section {0} not found in title 21")]
    NotFound(String),

    #[error(transparent)]
    Upstream(#[from] RegistryError),
}

/// One CFR section with the regulatory ruleset applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegulationSummary {
    pub citation: String,
    pub title: String,
    pub identification: String,
    pub classification: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    pub facts: Extraction,
    pub url: String,
}

static CITATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{3})\.(\d{1,4})$").unwrap());
static MD_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
static IDENTIFICATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\(a\)\s*Identification\.\s*(.+?)\s*(?:\n\s*\n|\(b\)\s|$)").unwrap());
static CLASSIFICATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\(b\)\s*Classification\.\s*(.+?)\s*(?:\n\s*\n|\(c\)\s|$)").unwrap());

/// Fetch and summarize one section, e.g. `872.3200`.
pub async fn lookup_regulation(
    http: &Client,
    settings: &Settings,
    citation: &str,
) -> Result<RegulationSummary, RegulationError> {
    let citation = citation.trim().trim_start_matches('§').trim();
    let Some(caps) = CITATION.captures(citation) else {
        return Err(RegulationError::InvalidCitation(citation.to_string()));
    };
    let part = &caps[1];

    let mut url = endpoint(
        &settings.endpoints.ecfr,
        &format!("/api/renderer/v1/content/enhanced/current/title-{CFR_TITLE}"),
    )?;
    url.query_pairs_mut()
        .append_pair("part", part)
        .append_pair("section", citation);

    info!(citation, part, "fetching regulation");
    let policy = RetryPolicy::new(settings.max_retries, settings.backoff_unit);
    let html = match with_retry(&policy, || download(http, url.clone())).await {
        Ok(html) => html,
        Err(RegistryError::NotFound(_)) => return Err(RegulationError::NotFound(citation.to_string())),
        Err(e) => return Err(e.into()),
    };

    let text = to_plain_text(&html2md::rewrite_html(&html, false));
    let section =
        isolate_section(&text, citation).ok_or_else(|| RegulationError::NotFound(citation.to_string()))?;
    debug!(citation, chars = section.body.len(), "section isolated");

    Ok(summarize(citation, part, section))
}

async fn download(http: &Client, url: url::Url) -> Result<String, RegistryError> {
    let path = url.path().to_string();
    let response = http
        .get(url)
        .header("Accept", "text/html")
        .header("User-Agent", crate::USER_AGENT)
        .send()
        .await?;

    let status = response.status().as_u16();
    match status {
        200..=299 => {}
        404 => return Err(RegistryError::NotFound(path)),
        429 => return Err(RegistryError::RateLimited),
        code => {
            return Err(RegistryError::Status {
                code,
                message: format!("eCFR renderer returned {code}"),
            });
        }
    }

    if let Some(len) = response.content_length()
        && len as usize > MAX_RESPONSE_BYTES
    {
        return Err(too_large());
    }

    let mut body = Vec::new();
    let mut stream = response;
    while let Some(chunk) = stream.chunk().await? {
        body.extend_from_slice(&chunk);
        if body.len() > MAX_RESPONSE_BYTES {
            return Err(too_large());
        }
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

fn too_large() -> RegistryError {
    RegistryError::Malformed(format!("response too large (>{MAX_RESPONSE_BYTES} bytes)"))
}

/// Strip the markdown the converter adds: link targets, emphasis and escapes.
fn to_plain_text(markdown: &str) -> String {
    let unlinked = MD_LINK.replace_all(markdown, "$1");
    unlinked
        .lines()
        .map(|line| {
            line.chars()
                .filter(|c| !matches!(c, '*' | '\\'))
                .collect::<String>()
                .trim_start_matches('#')
                .trim()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

struct Section {
    title: String,
    body: String,
}

/// The lines from the section's own heading up to the next section heading.
fn isolate_section(text: &str, citation: &str) -> Option<Section> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.iter().position(|l| heads_section(l, citation))?;
    let end = lines[start + 1..]
        .iter()
        .position(|l| l.starts_with('§'))
        .map_or(lines.len(), |i| start + 1 + i);

    Some(Section {
        title: lines[start].to_string(),
        body: lines[start + 1..end].join("\n").trim().to_string(),
    })
}

fn heads_section(line: &str, citation: &str) -> bool {
    let Some(rest) = line.strip_prefix('§') else {
        return false;
    };
    rest.trim_start()
        .strip_prefix(citation)
        .is_some_and(|tail| tail.chars().next().is_none_or(|c| !c.is_ascii_digit()))
}

fn paragraph(re: &Regex, body: &str) -> String {
    re.captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

fn summarize(citation: &str, part: &str, section: Section) -> RegulationSummary {
    let ruleset = RulesetName::Regulatory.ruleset();
    let identification = paragraph(&IDENTIFICATION, &section.body);
    let classification = paragraph(&CLASSIFICATION, &section.body);

    let mut facts = extract(&section.body, ruleset);
    // Class and exemptions come from the classification paragraph when there is one.
    if !classification.is_empty() {
        let class_facts = extract(&classification, ruleset);
        for field in ["device_class", "exemptions"] {
            match class_facts.fields.get(field) {
                Some(values) => {
                    facts.fields.insert(field.to_string(), values.clone());
                }
                None => {
                    facts.fields.remove(field);
                }
            }
        }
    }
    let device_class = facts.get("device_class").first().cloned();

    RegulationSummary {
        citation: citation.to_string(),
        title: section.title,
        identification,
        classification,
        device_class,
        facts,
        url: format!(
            "https://www.ecfr.gov/current/title-{CFR_TITLE}/chapter-I/subchapter-H/part-{part}/section-{citation}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PART_TEXT: &str = "Part 872 Dental Devices\n\
        § 872.3190 Other device.\n\
        (a) Identification. Something else.\n\
        § 872.3200 Resin tooth bonding agent.\n\
        (a) Identification. A resin tooth bonding agent is a device composed of materials \
        intended to be painted on the interior of a prepared cavity.\n\
        \n\
        (b) Classification. Class II (special controls). The device is exempt from the \
        premarket notification procedures in subpart E of part 807, subject to § 872.9.\n\
        § 872.3220 Facebow.\n\
        (b) Classification. Class I (general controls).";

    #[test]
    fn citation_shape_is_validated() {
        assert!(CITATION.is_match("872.3200"));
        assert!(CITATION.is_match("880.5"));
        assert!(!CITATION.is_match("872"));
        assert!(!CITATION.is_match("21 CFR 872.3200"));
        assert!(!CITATION.is_match("8723.200"));
    }

    #[test]
    fn section_is_cut_at_the_next_heading() {
        let section = isolate_section(PART_TEXT, "872.3200").unwrap();
        assert_eq!(section.title, "§ 872.3200 Resin tooth bonding agent.");
        assert!(section.body.contains("subject to § 872.9"));
        assert!(!section.body.contains("Facebow"));
        assert!(!section.body.contains("Something else"));
    }

    #[test]
    fn longer_citation_with_same_prefix_is_not_matched() {
        assert!(heads_section("§ 872.3200 Resin.", "872.3200"));
        assert!(!heads_section("§ 872.32001 Other.", "872.3200"));
        assert!(!heads_section("(b) see § 872.3200.", "872.3200"));
    }

    #[test]
    fn missing_section_is_none() {
        assert!(isolate_section(PART_TEXT, "872.9999").is_none());
    }

    #[test]
    fn summary_pulls_paragraphs_and_class() {
        let section = isolate_section(PART_TEXT, "872.3200").unwrap();
        let summary = summarize("872.3200", "872", section);

        assert!(summary.identification.starts_with("A resin tooth bonding agent"));
        assert!(summary.classification.starts_with("Class II (special controls)"));
        assert_eq!(summary.device_class.as_deref(), Some("II"));
        assert!(summary.facts.get("exemptions").contains(&"510(k) exempt".to_string()));
        assert!(summary.url.ends_with("/part-872/section-872.3200"));
    }

    #[test]
    fn markdown_noise_is_stripped() {
        let text = to_plain_text("#### § 872.3200 *Resin*\n(a) _Identification._ See [part 807](https://x/807)\\.");
        assert_eq!(text, "§ 872.3200 Resin\n(a) _Identification._ See part 807.");
    }
}

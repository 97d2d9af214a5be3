use std::path::PathBuf;

use clap::Args;

use crate::aggregate::Expansion;
use crate::classify::EntityType;

#[derive(Debug, Args)]
pub struct SearchParams {
    /// Free-text term, e.g. "K123456", "Acme Medical Corp", "atorvastatin"
    pub term: String,
    /// Entity type to search as; skips classification
    #[arg(long = "as", value_name = "TYPE")]
    pub hint: Option<EntityType>,
    /// Entity type used when the term itself is inconclusive
    #[arg(long, value_name = "TYPE", default_value = "unknown")]
    pub default: EntityType,
    /// Source to consult (repeatable); defaults depend on the entity type
    #[arg(long = "source", short = 's', value_name = "NAME")]
    pub sources: Vec<String>,
    /// Maximum records per source
    #[arg(long)]
    pub cap: Option<usize>,
    /// Synonym expansion: off, upfront, or reactive
    #[arg(long, default_value = "off")]
    pub expand: Expansion,
    /// Number of synonyms searched when expanding (1-10)
    #[arg(long, default_value_t = 3)]
    pub expand_terms: usize,
    /// Records listed per source in the report
    #[arg(long, default_value_t = 10)]
    pub show: usize,
    /// Give up after this many seconds
    #[arg(long, default_value_t = 120)]
    pub timeout: u64,
    /// Emit JSON instead of Markdown
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SynonymParams {
    /// Drug or substance name
    pub term: String,
    /// Emit JSON instead of Markdown
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ExtractParams {
    /// Ruleset: "biomarker" or "regulatory"
    #[arg(long, short = 'r', default_value = "biomarker")]
    pub ruleset: String,
    /// File to read; stdin when omitted
    pub file: Option<PathBuf>,
    /// Emit JSON instead of Markdown
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct RegulationParams {
    /// Title 21 citation, e.g. "872.3200"
    pub citation: String,
    /// Emit JSON instead of Markdown
    #[arg(long)]
    pub json: bool,
}

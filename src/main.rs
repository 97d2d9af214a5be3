use clap::{Parser, Subcommand};
use regintel::Settings;
use regintel::commands::{
    CommandError, ExtractParams, Regintel, RegulationParams, SearchParams, SynonymParams,
};
use tracing::info;
use tracing_subscriber::filter::Directive;

#[derive(Parser)]
#[command(name = "regintel", version, about = "Search drug, device and biomarker registries")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify a term and search every relevant registry
    Search(SearchParams),
    /// Collect alternate names from RxNorm, openFDA, PubChem and ChEMBL
    Synonyms(SynonymParams),
    /// Run an extraction ruleset over a document
    Extract(ExtractParams),
    /// Summarize one 21 CFR section
    Regulation(RegulationParams),
    /// List the registries that can be searched
    Sources,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "regintel=info".parse::<Directive>() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    match run(cli).await {
        Ok(output) => println!("{output}"),
        Err(e) => {
            match e.retry_hint() {
                Some(hint) => eprintln!("error: {e} {hint}"),
                None => eprintln!("error: {e}"),
            }
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<String, CommandError> {
    let settings = Settings::from_env()?;
    let app = Regintel::new(settings)?;
    info!("regintel ready");

    match cli.command {
        Command::Search(params) => app.search(params).await,
        Command::Synonyms(params) => app.synonyms(params).await,
        Command::Extract(params) => app.extract(params).await,
        Command::Regulation(params) => app.regulation(params).await,
        Command::Sources => Ok(app.sources()),
    }
}

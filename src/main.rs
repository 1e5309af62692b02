use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use column_dictionary::config::{parse_page_size, AppConfig};
use column_dictionary::ingestion::{
    AlationConnector, CatalogConnector, IngestionOrchestrator, IngestionSummary, JsonConnector,
};
use column_dictionary::{Dictionary, NameMatcher, Record, Scorer};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "column-dictionary")]
#[command(about = "Approved column descriptions from the data catalog, with exact and fuzzy lookup")]
struct Args {
    /// Path to the dictionary file (or set DICTIONARY_PATH)
    #[arg(short, long, global = true)]
    path: Option<PathBuf>,

    /// Catalog base URI used to resolve record links (or set ALATION_BASE_URL)
    #[arg(long, global = true)]
    base_uri: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pull records from the catalog API and save the dictionary
    Sync {
        /// API endpoint to page through (or set ALATION_ENDPOINT)
        #[arg(long)]
        endpoint: Option<String>,

        /// Records per request (or set ALATION_PAGE_SIZE)
        #[arg(long)]
        page_size: Option<String>,

        /// API token (or set ALATION_API_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },

    /// Add raw records from a JSON file and save the dictionary
    Import {
        file: PathBuf,
    },

    /// Print the records with exactly this name
    Lookup {
        name: String,
    },

    /// Print the records of the closest matching name
    Fuzzy {
        name: String,

        /// Minimum score (0-100); the best match must score above it
        #[arg(short, long, default_value_t = 90.0)]
        threshold: f64,

        #[arg(long, value_enum, default_value_t = Scorer::Ratio)]
        scorer: Scorer,
    },

    /// Show dictionary size and last update
    Stats,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(path) = args.path {
        config.dictionary_path = path;
    }
    if let Some(base_uri) = args.base_uri {
        config.base_url = base_uri;
    }

    let dictionary = Dictionary::open(config.dictionary())
        .with_context(|| format!("Failed to open {}", config.dictionary_path.display()))?;

    match args.command {
        Command::Sync {
            endpoint,
            page_size,
            token,
        } => {
            if let Some(endpoint) = endpoint {
                config.endpoint = endpoint;
            }
            if let Some(page_size) = page_size {
                config.page_size = parse_page_size(&page_size)?;
            }
            if token.is_some() {
                config.api_token = token;
            }

            let mut connector = AlationConnector::new(config.catalog()?)?;
            run_ingestion(dictionary, &mut connector).await?;
        }
        Command::Import { file } => {
            let mut connector = JsonConnector::from_file(&file)
                .with_context(|| format!("Failed to read records from {}", file.display()))?;
            run_ingestion(dictionary, &mut connector).await?;
        }
        Command::Lookup { name } => {
            let Some(records) = dictionary.lookup(&name) else {
                eprintln!("No records named '{}'", name);
                return Ok(ExitCode::FAILURE);
            };
            print_records(&records)?;
        }
        Command::Fuzzy {
            name,
            threshold,
            scorer,
        } => {
            let dictionary = dictionary.with_matcher(NameMatcher::new(scorer));
            match dictionary.fuzzy_lookup_with_score(&name, threshold) {
                Some(hit) => {
                    info!("'{}' matched '{}' ({:.1})", name, hit.name, hit.score);
                    print_records(&hit.records)?;
                }
                None => {
                    match dictionary.best_match(&name) {
                        Some((best, score)) => eprintln!(
                            "No match above {} for '{}' (closest: '{}' at {:.1})",
                            threshold, name, best, score
                        ),
                        None => eprintln!("Dictionary is empty"),
                    }
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::Stats => {
            println!("path:         {}", dictionary.path().display());
            println!("records:      {}", dictionary.len());
            println!("names:        {}", dictionary.names().len());
            println!(
                "last update:  {}",
                dictionary
                    .last_update()
                    .map(|ts| ts.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string())
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn run_ingestion(
    mut dictionary: Dictionary,
    connector: &mut dyn CatalogConnector,
) -> Result<IngestionSummary> {
    let summary = IngestionOrchestrator::new()
        .ingest(&mut dictionary, connector)
        .await?;

    println!("=== Ingestion Summary ===");
    println!("source:     {}", summary.source_id);
    println!("pages:      {}", summary.pages);
    println!("records:    {}", summary.records_seen);
    println!("new:        {}", summary.new);
    println!("updated:    {}", summary.updated);
    println!("unchanged:  {}", summary.unchanged);
    println!(
        "saved:      {}",
        if summary.saved { "yes" } else { "no changes" }
    );

    Ok(summary)
}

fn print_records(records: &[&Record]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(records)?);
    Ok(())
}

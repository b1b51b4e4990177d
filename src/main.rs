use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use structdex::config::{load_config, StructdexConfig};
use structdex::db::{open_store, ChunkStore};
use structdex::error::Result;
use structdex::indexer::embedder::EmbeddingTask;
use structdex::indexer::enricher::build_enricher;
use structdex::indexer::hierarchy::{self, HierarchyScanner};
use structdex::indexer::pipeline::IngestionPipeline;
use structdex::indexer::structure::StructuralParser;
use structdex::observability::{init_logging, DEFAULT_LOG_DIRECTIVE};

#[derive(Parser)]
#[command(name = "structdex")]
#[command(about = "Inheritance-aware method indexing for Java codebases", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./structdex.yaml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full two-pass ingestion
    Ingest(IngestArgs),

    /// Pass 1 only: scan classes and write the hierarchy map
    Scan(ScanArgs),

    /// Print the chunks of one file as JSON
    Parse(ParseArgs),

    /// Search the index
    Search(SearchArgs),

    /// Show how many records are stored
    Stats(DbArgs),
}

#[derive(Args)]
struct IngestArgs {
    /// Root of the Java source tree
    #[arg(long)]
    root: Option<PathBuf>,

    #[command(flatten)]
    db: DbArgs,

    /// Use the offline mock enricher
    #[arg(long)]
    mock: bool,

    /// Chunks per enrichment batch
    #[arg(long)]
    flush_size: Option<usize>,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ScanArgs {
    #[arg(long)]
    root: Option<PathBuf>,

    /// Where to write the hierarchy map
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct ParseArgs {
    file: PathBuf,

    /// Hierarchy map used to resolve inherited methods
    #[arg(long)]
    hierarchy: Option<PathBuf>,
}

#[derive(Args)]
struct SearchArgs {
    query: String,

    #[arg(short, long, default_value_t = 5)]
    limit: usize,

    #[command(flatten)]
    db: DbArgs,
}

#[derive(Args)]
struct DbArgs {
    /// SQLite database file
    #[arg(long)]
    db: Option<PathBuf>,
}

impl DbArgs {
    fn apply(&self, config: &mut StructdexConfig) {
        if let Some(db) = &self.db {
            config.paths.database_path = db.clone();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(if cli.verbose {
        "structdex=debug"
    } else {
        DEFAULT_LOG_DIRECTIVE
    });

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest(args) => {
            if let Some(root) = args.root {
                config.paths.project_root = root;
            }
            if let Some(flush_size) = args.flush_size {
                config.ingestion.flush_size = flush_size;
            }
            if args.no_progress {
                config.ingestion.show_progress = false;
            }
            args.db.apply(&mut config);
            let mock = args.mock || config.ingestion.mock_enrichment;

            let enricher = build_enricher(&config.enrichment, mock)?;
            let store = open_store(&config)?;
            let report = IngestionPipeline::new(config, enricher, Box::new(store))?
                .run()
                .await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.summary());
            }
        }
        Commands::Scan(args) => {
            if let Some(root) = args.root {
                config.paths.project_root = root;
            }
            if let Some(output) = args.output {
                config.paths.hierarchy_file = Some(output);
            }
            let map = HierarchyScanner::new().scan(&config.paths.project_root)?;
            let path = config.hierarchy_path();
            hierarchy::persist(&map, &path)?;
            println!("{} classes written to {}", map.len(), path.display());
        }
        Commands::Parse(args) => {
            let hierarchy_path = args.hierarchy.unwrap_or_else(|| config.hierarchy_path());
            let parser = StructuralParser::from_hierarchy_file(
                &hierarchy_path,
                config.ingestion.max_inheritance_depth,
            );
            let chunks = parser.parse_file(&args.file)?;
            println!("{}", serde_json::to_string_pretty(&chunks)?);
        }
        Commands::Search(args) => {
            args.db.apply(&mut config);
            let store = open_store(&config)?;
            let hits = store.search(&args.query, args.limit, EmbeddingTask::Query)?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (rank, hit) in hits.iter().enumerate() {
                println!(
                    "{}. {}.{} ({:.4})\n   {}\n   {}\n   {}",
                    rank + 1,
                    hit.class_name,
                    hit.method_name,
                    hit.distance,
                    hit.signature,
                    hit.summary,
                    hit.file_path,
                );
            }
        }
        Commands::Stats(args) => {
            args.apply(&mut config);
            let stats = open_store(&config)?.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}

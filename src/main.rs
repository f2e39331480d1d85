use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use fnx::config::EngineConfig;
use fnx::engine::Engine;
use fnx::providers::{Capabilities, FsEnumerator, JsonPersistence};
use fnx::query::{FoldersFirst, MatchOptions, SearchState, SortField, SortOrder};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Phrases timed by `fnx bench` when none are given
const BENCH_PHRASES: &[&str] = &["* ext:txt", "* ext:cfg", "* ext:ini", "files:", "folders:", "*"];

#[derive(Parser)]
#[command(name = "fnx")]
#[command(about = "Instant file-name search with live index updates")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Catalog file (defaults to catalog.json in the app data directory)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Enumerate volumes and save the catalog
    Index {
        /// Roots to index
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,
    },
    /// Search the saved catalog
    Search(SearchArgs),
    /// Print the number of matches
    Count {
        /// Search expression
        #[arg(required = true)]
        phrase: Vec<String>,
    },
    /// Time `count` for a list of phrases
    Bench {
        phrases: Vec<String>,
    },
    /// Show catalog statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct SearchArgs {
    /// Search expression
    #[arg(required = true)]
    query: Vec<String>,

    /// Skip this many results
    #[arg(long, default_value_t = 0)]
    offset: usize,

    /// Maximum results (0 for all)
    #[arg(short = 'n', long, default_value_t = 100)]
    count: usize,

    /// Match case
    #[arg(short = 'c', long)]
    case: bool,

    /// Match whole words only
    #[arg(short = 'w', long)]
    whole_word: bool,

    /// Treat the query as a regular expression
    #[arg(short = 'r', long)]
    regex: bool,

    /// Match terms against full paths
    #[arg(short = 'p', long)]
    path: bool,

    /// Sort field: name, path, size, dm, dc
    #[arg(short = 's', long, default_value = "name")]
    sort: SortField,

    /// Sort descending
    #[arg(long)]
    desc: bool,

    /// Keep folders and files interleaved
    #[arg(long)]
    no_folders_first: bool,
}

impl SearchArgs {
    fn state(&self) -> SearchState {
        let options = MatchOptions {
            match_case: self.case,
            match_whole_word: self.whole_word,
            regex: self.regex,
            match_path: self.path,
            ..Default::default()
        };
        let order = if self.desc {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        };
        let folders_first = if self.no_folders_first {
            FoldersFirst::Never
        } else {
            FoldersFirst::Ascending
        };
        SearchState::new(self.query.join(" "))
            .with_options(options)
            .with_sort(self.sort, order)
            .with_folders_first(folders_first)
            .with_viewport(self.offset, self.count)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("FNX_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let persistence = match cli.catalog {
        Some(path) => JsonPersistence::new(path),
        None => JsonPersistence::default_location().context("Failed to locate app data directory")?,
    };
    let config = EngineConfig::load();

    match cli.command {
        Commands::Index { paths } => {
            let roots = paths
                .iter()
                .map(|p| p.canonicalize().with_context(|| format!("Invalid path: {}", p.display())))
                .collect::<Result<Vec<_>>>()?;
            let capabilities = Capabilities::new()
                .with_enumerator(FsEnumerator::new(roots))
                .with_persistence(persistence.clone());
            let engine = Engine::new(config, capabilities).with_progress(true);

            let stats = engine.rebuild().context("Failed to build catalog")?;
            engine.save().context("Failed to save catalog")?;
            println!(
                "Indexed {} files and {} folders in {:.2?} ({} excluded, {} unreadable)",
                stats.files, stats.folders, stats.elapsed, stats.excluded, stats.unreadable
            );
            println!("Catalog saved to {}", persistence.path().display());
            for diagnostic in engine.take_diagnostics() {
                eprintln!("warning: {}", diagnostic);
            }
        }
        Commands::Search(args) => {
            let engine = open(config, persistence)?;
            let list = engine.search(&args.state())?;
            for item in &list.items {
                println!("{}", item.path);
            }
            for failure in &list.errors {
                eprintln!("warning: path of entry {} exceeds {} characters", failure.id, failure.limit);
            }
            eprintln!(
                "{} of {} matches",
                list.items.len(),
                list.total_matches
            );
        }
        Commands::Count { phrase } => {
            let engine = open(config, persistence)?;
            println!("{}", engine.count(&phrase.join(" "))?);
        }
        Commands::Bench { phrases } => {
            let engine = open(config, persistence)?;
            let phrases: Vec<String> = if phrases.is_empty() {
                BENCH_PHRASES.iter().map(|p| p.to_string()).collect()
            } else {
                phrases
            };
            for phrase in &phrases {
                let start = Instant::now();
                let n = engine.count(phrase)?;
                let elapsed = start.elapsed().as_secs_f64();
                println!("Phrase \"{phrase:12}\" - Time: {elapsed:.4}s, Results: {n}");
            }
        }
        Commands::Stats { json } => {
            let engine = open(config, persistence.clone())?;
            let stats = engine.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Catalog Statistics");
                println!("==================");
                println!();
                println!("Catalog location: {}", persistence.path().display());
                println!("Entries:          {}", stats.entries);
                println!("Files:            {}", stats.files);
                println!("Folders:          {}", stats.folders);
                println!("Generation:       {}", stats.generation);
            }
        }
    }

    Ok(())
}

/// An engine over the saved catalog
fn open(config: EngineConfig, persistence: JsonPersistence) -> Result<Engine> {
    let engine = Engine::new(config, Capabilities::new().with_persistence(persistence));
    if !engine.load().context("Failed to load catalog")? {
        bail!("No catalog found; run `fnx index <paths>` first");
    }
    Ok(engine)
}

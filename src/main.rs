use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use history_tracker::history::{
    read_history, IdSource, LogParser, MovementTracker, ParserOptions, CACHE_FILE,
};
use history_tracker::{HistoryAnalyzer, HistoryConfig, ProviderKind};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    version,
    about = "Reconstructs per-file change history of Git repositories",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the history cache of a repository
    Update(UpdateArgs),

    /// Print the cached history
    Show {
        /// Path to Git repository
        #[arg(short, long)]
        repo: PathBuf,

        /// Cache directory (defaults to <repo>/.history-tracker)
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// What to print
        #[arg(short, long, value_enum, default_value_t = ShowFormat::History)]
        format: ShowFormat,
    },

    /// Parse a raw log file and print the resulting history as JSON
    Parse {
        /// Log file produced with the START_HEADER/END_HEADER pretty format
        #[arg(short, long)]
        log: PathBuf,

        /// Regular expression extracting work items from commit messages
        #[arg(short = 'w', long = "work-items")]
        work_items: Option<String>,

        /// Assign file identities by tracking renames, copies and deletes
        #[arg(long)]
        track: bool,

        /// Number identities sequentially from this value instead of using UUIDs
        #[arg(long, requires = "track")]
        first_id: Option<u64>,

        /// Repair committer names that were decoded with the wrong code page
        #[arg(long)]
        repair_author_encoding: bool,
    },
}

#[derive(clap::Args)]
struct UpdateArgs {
    /// Path to Git repository
    #[arg(short, long)]
    repo: Option<PathBuf>,

    /// JSON configuration file; command line flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cache directory (defaults to <repo>/.history-tracker)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// How the history is collected
    #[arg(short, long, value_enum)]
    provider: Option<ProviderKind>,

    /// Regular expression extracting work items from commit messages
    #[arg(short = 'w', long = "work-items")]
    work_items: Option<String>,

    /// Track only files matching these patterns (glob format, e.g., "*.rs", "src/**/*.py")
    #[arg(short = 'i', long = "include")]
    include_patterns: Option<Vec<String>>,

    /// Do not track files matching these patterns
    #[arg(short = 'e', long = "exclude")]
    exclude_patterns: Option<Vec<String>>,

    /// Number of worker threads (0 uses one per CPU)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Repair committer names that were decoded with the wrong code page
    #[arg(long)]
    repair_author_encoding: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ShowFormat {
    History,
    Files,
}

impl UpdateArgs {
    fn into_config(self) -> anyhow::Result<HistoryConfig> {
        let mut config = match &self.config {
            Some(path) => HistoryConfig::from_file(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?,
            None => HistoryConfig::default(),
        };

        if let Some(repo) = self.repo {
            config.repo = repo;
        }
        if config.repo.as_os_str().is_empty() {
            anyhow::bail!("No repository given; pass --repo or set \"repo\" in the config file");
        }
        if let Some(cache_dir) = self.cache_dir {
            config.cache_dir = Some(cache_dir);
        }
        if let Some(provider) = self.provider {
            config.provider = provider;
        }
        if let Some(pattern) = self.work_items {
            config.work_item_pattern = Some(pattern);
        }
        if let Some(patterns) = self.include_patterns {
            config.include_patterns = patterns;
        }
        if let Some(patterns) = self.exclude_patterns {
            config.exclude_patterns = patterns;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        config.repair_author_encoding |= self.repair_author_encoding;

        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Update(args) => update(args),
        Command::Show {
            repo,
            cache_dir,
            format,
        } => show(repo, cache_dir, format),
        Command::Parse {
            log,
            work_items,
            track,
            first_id,
            repair_author_encoding,
        } => parse(log, work_items, track, first_id, repair_author_encoding),
    }
}

fn update(args: UpdateArgs) -> anyhow::Result<()> {
    let config = args.into_config()?;

    let mut analyzer = HistoryAnalyzer::new(&config).context("Failed to initialize analyzer")?;

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::with_template("{spinner} {elapsed} {msg}")
            .context("Failed to build progress style")?,
    );
    progress.enable_steady_tick(Duration::from_millis(120));

    let report = analyzer
        .rebuild(&progress)
        .context("Failed to rebuild history")?;
    progress.finish_and_clear();

    for warning in &report.warnings {
        eprintln!("warning: {}", warning);
    }
    eprintln!(
        "Stored {} change sets in {} ({} warnings)",
        report.change_sets,
        config.cache_dir().join(CACHE_FILE).display(),
        report.warnings.len()
    );
    Ok(())
}

fn show(repo: PathBuf, cache_dir: Option<PathBuf>, format: ShowFormat) -> anyhow::Result<()> {
    let config = HistoryConfig {
        cache_dir,
        ..HistoryConfig::new(repo)
    };
    let cache_file = config.cache_dir().join(CACHE_FILE);
    let history = read_history(&cache_file).with_context(|| {
        format!(
            "Failed to read {}; run `update` first",
            cache_file.display()
        )
    })?;

    let output = match format {
        ShowFormat::History => serde_json::to_string_pretty(&history),
        ShowFormat::Files => serde_json::to_string_pretty(&history.tracked_files()),
    }
    .context("Failed to serialize to JSON")?;
    println!("{}", output);
    Ok(())
}

fn parse(
    log: PathBuf,
    work_items: Option<String>,
    track: bool,
    first_id: Option<u64>,
    repair_author_encoding: bool,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&log)
        .with_context(|| format!("Failed to read log file {}", log.display()))?;

    let options = ParserOptions::new(work_items.as_deref(), repair_author_encoding)
        .context("Invalid work item pattern")?;
    let mapping = |path: &str| path.to_string();
    let mut history = LogParser::new(&mapping, options)
        .parse(&text, None)
        .context("Failed to parse log")?;

    if track {
        let ids = first_id.map_or(IdSource::Uuid, IdSource::Sequential);
        let mut tracker = MovementTracker::new(ids);
        tracker.apply_history(&mut history);
        for warning in tracker.warnings() {
            eprintln!("warning: {}", warning);
        }
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&history).context("Failed to serialize to JSON")?
    );
    Ok(())
}

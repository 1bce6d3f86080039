//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use repoindex_core::{
    ImportContext, ImportReport, ProgressReporter, RepositoryImporter, Stage,
};
use repoindex_shared::{
    AppConfig, RepositorySource, config_file_path, init_config, load_config, load_config_from,
    servers::{find_server, servers},
};
use repoindex_storage::{SearchIndex, Storage};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// repoindex: aggregate file metadata from genomic data repositories.
#[derive(Parser)]
#[command(
    name = "repoindex",
    version,
    about = "Aggregate file metadata from multiple genomic data repositories into one searchable index.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.repoindex/repoindex.toml).
    #[arg(long, global = true, env = "REPOINDEX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Import all active sources, then publish and index the combined files.
    Import {
        /// Sources to import (comma-separated). Defaults to the configured set.
        #[arg(long, value_delimiter = ',')]
        sources: Vec<RepositorySource>,
    },

    /// Search the published files.
    Search {
        /// Terms to match (file name, object id, repository, project, donor).
        query: String,

        /// Maximum number of hits.
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Show one published file with all of its copies.
    Show {
        /// Canonical file id.
        id: String,
    },

    /// Summarize staged sources, published files and the last import run.
    Status,

    /// List the known repository servers.
    Servers,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "repoindex=info",
        1 => "repoindex=debug",
        _ => "repoindex=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Import { sources } => cmd_import(cli.config.as_deref(), &sources).await,
        Command::Search { query, limit } => cmd_search(cli.config.as_deref(), &query, limit).await,
        Command::Show { id } => cmd_show(cli.config.as_deref(), &id).await,
        Command::Status => cmd_status(cli.config.as_deref()).await,
        Command::Servers => cmd_servers(),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_import(config_path: Option<&Path>, sources: &[RepositorySource]) -> Result<()> {
    let config = resolve_config(config_path)?;
    let requested = (!sources.is_empty()).then_some(sources);
    let importer =
        RepositoryImporter::new(&config, ImportContext::from_config(&config, requested))?;
    let context = importer.context();

    let config_source = match config_path {
        Some(path) => path.display().to_string(),
        None => config_file_path()?.display().to_string(),
    };
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_source,
        sources = ?context.sources,
        db = %context.db_path.display(),
        index = %context.index_path.display(),
        require_donor_ids = context.require_donor_ids,
        "repoindex import"
    );

    if context.sources.is_empty() {
        return Err(eyre!("no sources selected"));
    }

    let reporter = CliProgress::new();
    importer.execute(&reporter).await?;
    Ok(())
}

async fn cmd_search(config_path: Option<&Path>, query: &str, limit: u32) -> Result<()> {
    let config = resolve_config(config_path)?;
    let index_path = PathBuf::from(&config.defaults.index_path);
    if !index_path.exists() {
        return Err(eyre!(
            "no search index at '{}'; run `repoindex import` first",
            index_path.display()
        ));
    }

    let index = SearchIndex::open(&index_path).await?;
    let hits = index.search(query, limit).await?;

    if hits.is_empty() {
        println!("No files match '{query}'.");
        return Ok(());
    }
    for hit in &hits {
        println!("  {}  {:>8.2}  {}", hit.id, hit.score, hit.file_name);
    }
    println!();
    println!("  {} file(s)", hits.len());
    Ok(())
}

async fn cmd_show(config_path: Option<&Path>, id: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = Storage::open_readonly(Path::new(&config.defaults.db_path)).await?;
    let Some(file) = storage.get_file(id).await? else {
        return Err(eyre!("no published file with id '{id}'"));
    };

    println!("  Id:        {}", file.id);
    println!("  Object id: {}", file.object_id);
    println!("  Name:      {}", file.file_name);
    println!("  Type:      {}", file.data_type.as_str());
    if let Some(size) = file.size {
        println!("  Size:      {size}");
    }
    if let Some(md5) = &file.md5sum {
        println!("  MD5:       {md5}");
    }

    println!();
    println!("  Copies:");
    for copy in &file.copies {
        let repo = find_server(&copy.repo_code).map_or(copy.repo_code.as_str(), |s| s.name);
        println!("    {:<32} {}", repo, copy.url);
    }

    println!();
    let resolution = if file.has_donor_id() { "" } else { " (unresolved)" };
    println!("  Donors{resolution}:");
    for donor in &file.donors {
        println!(
            "    {:<10} {:<20} {}",
            donor.project_code,
            donor.submitted_donor_id,
            donor.donor_id.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn cmd_status(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = Storage::open_readonly(Path::new(&config.defaults.db_path)).await?;

    println!("  {:<8} STAGED", "SOURCE");
    for source in RepositorySource::ALL {
        let staged = storage.count_source_files(source).await?;
        println!("  {source:<8} {staged}");
    }

    println!();
    println!("  Published: {}", storage.list_files().await?.len());
    println!("  Digest:    {}", storage.files_digest().await?);

    let index_path = PathBuf::from(&config.defaults.index_path);
    if index_path.exists() {
        let index = SearchIndex::open(&index_path).await?;
        println!("  Indexed:   {}", index.count().await?);
    }

    match storage.last_import_run().await? {
        Some((run_id, Some(stats))) => println!("  Last run:  {run_id} {stats}"),
        Some((run_id, None)) => println!("  Last run:  {run_id} (unfinished)"),
        None => println!("  Last run:  none"),
    }
    Ok(())
}

fn cmd_servers() -> Result<()> {
    println!("  {:<15} {:<32} {:<8} {:<12} URL", "CODE", "NAME", "COUNTRY", "TYPE");
    for server in servers() {
        println!(
            "  {:<15} {:<32} {:<8} {:<12} {}",
            server.code,
            server.name,
            server.country,
            format!("{:?}", server.kind),
            server.base_url
        );
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, stage: Stage) {
        let message = match stage {
            Stage::WriteSourceFiles => "Importing sources",
            Stage::Collect => "Collecting staged files",
            Stage::Combine => "Combining files",
            Stage::Filter => "Filtering files",
            Stage::Write => "Publishing files",
            Stage::Index => "Building search index",
        };
        self.spinner.set_message(message);
    }

    fn source_finished(&self, source: RepositorySource, staged: Option<usize>) {
        let line = match staged {
            Some(n) => format!("  {source:<8} {n} file(s)"),
            None => format!("  {source:<8} FAILED"),
        };
        self.spinner.println(line);
    }

    fn done(&self, report: &ImportReport) {
        self.spinner.finish_and_clear();

        println!();
        if report.is_success() {
            println!("  Import finished successfully!");
        } else {
            println!("  Import finished with {} failure(s).", report.failures.len());
        }
        println!("  Combined:  {}", report.combined);
        println!("  Published: {}", report.published);
        println!("  Indexed:   {}", report.indexed);
        if let Some(digest) = &report.digest {
            println!("  Digest:    {digest}");
        }
        println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
        for failure in &report.failures {
            println!("  ! {failure}");
        }
        println!();
    }
}

//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use courtscout_core::{
    ConversationRunConfig, ProgressReporter, RunContext, RunOutcome, WebRunConfig,
    run_conversation_mode, run_web_mode,
};
use courtscout_export::CsvExporter;
use courtscout_fetch::HttpContentSource;
use courtscout_llm::OpenAiCompatClient;
use courtscout_search::{HtmlSearchSource, PaginatedSearchCollector};
use courtscout_shared::{
    AppConfig, ExtractConfig, FetchConfig, Location, RunMode, SearchConfig, init_config,
    load_config, validate_api_key,
};
use courtscout_storage::{FacilityStore, MemoryStore, Storage};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// CourtScout: find basketball courts and store them as structured records.
#[derive(Parser)]
#[command(
    name = "courtscout",
    version,
    about = "Collect basketball court records from web search or a model conversation.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
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

/// Target location flags; unset flags fall back to `[defaults]`.
#[derive(Args)]
pub(crate) struct LocationArgs {
    /// Province, e.g. 浙江省.
    #[arg(long)]
    pub province: Option<String>,

    /// City; pass an empty string for county-level cities.
    #[arg(long)]
    pub city: Option<String>,

    /// District or county.
    #[arg(long)]
    pub district: Option<String>,
}

/// Storage and export flags.
#[derive(Args)]
pub(crate) struct OutputArgs {
    /// Database file (defaults to `[defaults] db_path`).
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Directory for the CSV export (defaults to `[defaults] export_dir`).
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Keep records in memory instead of the database.
    #[arg(long)]
    pub dry_run: bool,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Search the web, read each result page and extract courts from it.
    Search {
        #[command(flatten)]
        location: LocationArgs,

        /// Number of search results to process.
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Search query (defaults to the configured template).
        #[arg(short, long)]
        query: Option<String>,

        /// Collect image URLs from each page.
        #[arg(long)]
        images: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Ask the model for courts round by round until it has no more.
    Converse {
        #[command(flatten)]
        location: LocationArgs,

        /// Topic passed to the model (defaults to the configured template).
        #[arg(short, long)]
        query: Option<String>,

        /// Maximum number of conversation rounds.
        #[arg(long)]
        max_rounds: Option<u32>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show what a database holds without modifying it.
    Stats {
        /// Database file (defaults to `[defaults] db_path`).
        #[arg(long)]
        db: Option<PathBuf>,

        /// Also show the stored report of this run.
        #[arg(long)]
        run: Option<String>,
    },

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
        0 => "courtscout=info",
        1 => "courtscout=debug",
        _ => "courtscout=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
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
        Command::Search {
            location,
            count,
            query,
            images,
            output,
        } => cmd_search(&location, count, query, images, &output).await,
        Command::Converse {
            location,
            query,
            max_rounds,
            output,
        } => cmd_converse(&location, query, max_rounds, &output).await,
        Command::Stats { db, run } => cmd_stats(db, run.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

fn resolve_location(config: &AppConfig, args: &LocationArgs) -> Result<Location> {
    let defaults = config.default_location();
    let location = Location::new(
        args.province.as_deref().unwrap_or(&defaults.province),
        args.city.as_deref().unwrap_or(&defaults.city),
        args.district.as_deref().unwrap_or(&defaults.district),
    );
    if location.province.is_empty() {
        return Err(eyre!("a province is required (--province or [defaults] province)"));
    }
    Ok(location)
}

async fn open_store(config: &AppConfig, output: &OutputArgs) -> Result<Box<dyn FacilityStore>> {
    if output.dry_run {
        info!("dry run, records are kept in memory");
        return Ok(Box::new(MemoryStore::new()));
    }
    let path = output
        .db
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.defaults.db_path));
    info!(db = %path.display(), "opening database");
    Ok(Box::new(Storage::open(&path).await?))
}

fn exporter(
    config: &AppConfig,
    output: &OutputArgs,
    location: &Location,
    mode: RunMode,
) -> CsvExporter {
    let dir = output
        .export_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.defaults.export_dir));
    CsvExporter::new(dir, location.clone(), mode)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_search(
    location_args: &LocationArgs,
    count: Option<usize>,
    query: Option<String>,
    images: bool,
    output: &OutputArgs,
) -> Result<()> {
    let mut config = load_config()?;
    if images {
        config.fetch.extract_images = true;
    }
    let api_key = validate_api_key(&config)?;

    let location = resolve_location(&config, location_args)?;
    let query = query.unwrap_or_else(|| config.search_query(&location));
    let result_count = count.unwrap_or(config.search.result_count);

    let search_config = SearchConfig::from(&config);
    let fetch_config = FetchConfig::from(&config);
    let item_delay = fetch_config.item_delay;

    let model = OpenAiCompatClient::new(&config.llm.base_url, api_key)?;
    let collector = PaginatedSearchCollector::new(
        HtmlSearchSource::new(&search_config)?,
        search_config.page_delay,
    );
    let mut content = HttpContentSource::open(fetch_config)?;
    let store = open_store(&config, output).await?;
    let mut export = exporter(&config, output, &location, RunMode::Web);

    info!(%location, query = %query, result_count, "searching for courts");

    let progress = CliProgress::new();
    let ctx = RunContext {
        store: store.as_ref(),
        model: &model,
        export: &mut export,
        progress: &progress,
    };
    let run_config = WebRunConfig {
        location: location.clone(),
        query,
        result_count,
        item_delay,
        extract: ExtractConfig::from(&config),
    };

    let outcome = run_web_mode(&collector, &mut content, ctx, &run_config).await?;
    progress.finish();

    print_summary(RunMode::Web, &location, &outcome);
    check_outcome(&outcome)
}

async fn cmd_converse(
    location_args: &LocationArgs,
    query: Option<String>,
    max_rounds: Option<u32>,
    output: &OutputArgs,
) -> Result<()> {
    let mut config = load_config()?;
    if let Some(rounds) = max_rounds {
        config.llm.max_rounds = rounds;
    }
    let api_key = validate_api_key(&config)?;

    let location = resolve_location(&config, location_args)?;
    let query = query.unwrap_or_else(|| config.search_query(&location));

    let model = OpenAiCompatClient::new(&config.llm.base_url, api_key)?;
    let store = open_store(&config, output).await?;
    let mut export = exporter(&config, output, &location, RunMode::Conversation);

    info!(%location, query = %query, max_rounds = config.llm.max_rounds, "starting conversation");

    let progress = CliProgress::new();
    let ctx = RunContext {
        store: store.as_ref(),
        model: &model,
        export: &mut export,
        progress: &progress,
    };
    let run_config = ConversationRunConfig {
        location: location.clone(),
        query,
        extract: ExtractConfig::from(&config),
    };

    let outcome = run_conversation_mode(ctx, &run_config).await?;
    progress.finish();

    print_summary(RunMode::Conversation, &location, &outcome);
    check_outcome(&outcome)
}

fn print_summary(mode: RunMode, location: &Location, outcome: &RunOutcome) {
    let r = &outcome.report;
    println!();
    println!("  Run finished ({mode})");
    println!("  Run ID:    {}", outcome.run_id);
    println!("  Location:  {location}");
    if mode == RunMode::Web {
        println!(
            "  Items:     {}/{} processed, {} skipped, {} failed",
            r.items_processed, r.items_total, r.items_skipped, r.items_failed
        );
    } else {
        let reason = r
            .end_reason
            .map(|reason| format!("{reason:?}"))
            .unwrap_or_else(|| "-".into());
        println!("  Rounds:    {} (ended: {reason})", r.rounds);
    }
    println!(
        "  Groups:    {} seen, {} discarded, {} rejected",
        r.groups_seen, r.groups_discarded, r.records_rejected
    );
    println!(
        "  Courts:    {} inserted, {} already stored",
        r.courts_inserted, r.courts_reused
    );
    println!("  Units:     {} inserted", r.units_inserted);
    if r.malformed_responses > 0 || r.persistence_failures > 0 {
        println!(
            "  Problems:  {} malformed replies, {} store failures",
            r.malformed_responses, r.persistence_failures
        );
    }
    match &outcome.export_path {
        Some(path) => println!("  Export:    {}", path.display()),
        None => println!("  Export:    nothing to export"),
    }
    println!();
}

fn check_outcome(outcome: &RunOutcome) -> Result<()> {
    if let Some(reason) = &outcome.report.abort_reason {
        return Err(eyre!("run aborted: {reason}"));
    }
    if let Some(e) = &outcome.export_error {
        return Err(eyre!("export failed: {e}"));
    }
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
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item(&self, current: usize, total: usize, detail: &str) {
        self.spinner
            .set_message(format!("[{current}/{total}] {detail}"));
    }

    fn court(&self, name: &str, created: bool) {
        let verb = if created { "stored" } else { "known" };
        self.spinner.println(format!("  {verb}: {name}"));
    }
}

async fn cmd_stats(db: Option<PathBuf>, run_id: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let path = db.unwrap_or_else(|| PathBuf::from(&config.defaults.db_path));
    let storage = Storage::open_readonly(&path).await?;

    println!();
    println!("  Database:  {}", path.display());
    println!("  Courts:    {}", storage.count_courts().await?);
    println!("  Units:     {}", storage.count_units().await?);

    if let Some(run_id) = run_id {
        let run = storage
            .get_run(run_id)
            .await?
            .ok_or_else(|| eyre!("no run with id {run_id}"))?;
        println!("  Run:       {} ({})", run.id, run.mode);
        println!("  Started:   {}", run.started_at);
        println!(
            "  Finished:  {}",
            run.finished_at.as_deref().unwrap_or("not finished")
        );
        if let Some(stats) = run.stats_json {
            println!("  Report:    {stats}");
        }
    }
    println!();
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

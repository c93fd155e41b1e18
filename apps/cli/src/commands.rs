//! CLI command definitions, routing, and tracing setup.

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use hrlex_discovery::DiscoveryClient;
use hrlex_embeddings::EmbeddingClient;
use hrlex_extract::Extractor;
use hrlex_retrieval::{
    IngestLimits, RealtimeIngestor, Reranker, Retriever, SeedOptions, SeedProgress,
    default_seed_urls, refresh_passages, seed_passages,
};
use hrlex_shared::{
    AppConfig, SeedUrl, Topic, config_file_path, expand_home, init_config, load_config,
    resolve_api_key,
};
use hrlex_storage::PassageStore;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// hrlex: retrieval and real-time ingestion for employment guidance.
#[derive(Parser)]
#[command(
    name = "hrlex",
    version,
    about = "Seed, refresh, and query the employment-guidance passage store.",
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

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ingest the seed URL registry into the passage store.
    Seed,

    /// Purge stale passages, then re-run seeding.
    Refresh,

    /// Retrieve ranked passages for a question (prints JSON).
    Query {
        /// The question to retrieve passages for.
        question: String,

        /// Optional topic filter (e.g. "Holiday", "TUPE").
        #[arg(short, long)]
        topic: Option<String>,
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
        0 => "hrlex=info",
        1 => "hrlex=debug",
        _ => "hrlex=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
        Command::Seed => cmd_seed().await,
        Command::Refresh => cmd_refresh().await,
        Command::Query { question, topic } => cmd_query(&question, topic.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared construction
// ---------------------------------------------------------------------------

/// Everything the ingestion commands need.
struct IngestContext {
    store: PassageStore,
    embeddings: EmbeddingClient,
    extractor: Extractor,
    config: AppConfig,
}

async fn ingest_context() -> Result<IngestContext> {
    let config = load_config()?;
    let api_key = resolve_api_key(&config)?;

    let db_path = expand_home(&config.defaults.db_path)?;
    let store = PassageStore::open(&db_path, config.openai.embedding_dimensions).await?;

    let embeddings = EmbeddingClient::new(
        &config.openai.endpoint,
        api_key,
        &config.openai.embedding_model,
        config.openai.embedding_dimensions,
    )?;
    let extractor = Extractor::new(config.ingest.min_extract_chars)?;

    Ok(IngestContext {
        store,
        embeddings,
        extractor,
        config,
    })
}

/// Seed registry from config, falling back to the built-in list.
fn resolve_seeds(config: &AppConfig) -> Vec<SeedUrl> {
    if config.seeds.is_empty() {
        default_seed_urls()
    } else {
        config.seeds.clone()
    }
}

// ---------------------------------------------------------------------------
// Progress bar adapter
// ---------------------------------------------------------------------------

/// Renders seeding progress with indicatif.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_msg}")
                .expect("valid template"),
        );
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl SeedProgress for BarProgress {
    fn url_started(&self, url: &str, current: usize, _total: usize) {
        self.bar.set_position(current.saturating_sub(1) as u64);
        self.bar.set_message(url.to_string());
    }

    fn chunk_stored(&self, _section: &str) {
        self.bar.tick();
    }

    fn url_failed(&self, url: &str, error: &str) {
        self.bar.println(format!("skipped {url}: {error}"));
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_seed() -> Result<()> {
    let ctx = ingest_context().await?;
    let seeds = resolve_seeds(&ctx.config);
    let options = SeedOptions::from(&ctx.config.ingest);

    info!(seeds = seeds.len(), "seeding passage store");
    let progress = BarProgress::new(seeds.len());

    let report = seed_passages(
        &ctx.store,
        &ctx.embeddings,
        &ctx.extractor,
        &ctx.config.defaults.jurisdiction,
        &seeds,
        &options,
        &progress,
    )
    .await?;
    progress.finish();

    println!(
        "Seeded {} URLs ({} failed): {} chunks stored, {} chunks failed.",
        report.urls_processed, report.urls_failed, report.chunks_stored, report.chunks_failed
    );
    Ok(())
}

async fn cmd_refresh() -> Result<()> {
    let ctx = ingest_context().await?;
    let seeds = resolve_seeds(&ctx.config);
    let options = SeedOptions::from(&ctx.config.ingest);

    info!(
        staleness_days = ctx.config.ingest.staleness_days,
        "refreshing passage store"
    );
    let progress = BarProgress::new(seeds.len());

    let report = refresh_passages(
        &ctx.store,
        &ctx.embeddings,
        &ctx.extractor,
        &ctx.config.defaults.jurisdiction,
        &seeds,
        &options,
        ctx.config.ingest.staleness_days,
        &progress,
    )
    .await?;
    progress.finish();

    println!(
        "Refresh complete: {} rows before, {} purged, {} after.",
        report.rows_before, report.rows_purged, report.rows_after
    );
    println!(
        "Re-seeded {} URLs ({} failed): {} chunks stored.",
        report.seed.urls_processed, report.seed.urls_failed, report.seed.chunks_stored
    );
    Ok(())
}

async fn cmd_query(question: &str, topic: Option<&str>) -> Result<()> {
    let topic = topic
        .map(|t| t.parse::<Topic>())
        .transpose()
        .map_err(|e| eyre!("invalid --topic: {e}"))?;

    let ctx = ingest_context().await?;
    let api_key = resolve_api_key(&ctx.config)?;

    let reranker = Reranker::new(
        &ctx.config.openai.endpoint,
        api_key,
        &ctx.config.openai.chat_model,
    )?;
    let ingestor = RealtimeIngestor::new(
        DiscoveryClient::new()?,
        ctx.extractor,
        ctx.embeddings.clone(),
        ctx.config.defaults.jurisdiction.clone(),
        IngestLimits::from(&ctx.config.ingest),
    );

    let retriever = Retriever::new(
        ctx.store,
        ctx.embeddings,
        reranker,
        ingestor,
        ctx.config.defaults.jurisdiction.clone(),
    );

    let outcome = retriever.retrieve(question, topic).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let path = config_file_path()?;
    println!("# Config file: {}", path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

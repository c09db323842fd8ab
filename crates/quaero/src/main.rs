//! quaero: semantic search over question/answer collections
//!
//! Loads every JSON collection in a data directory, embeds the questions in
//! the background, and answers similarity queries over HTTP or the command
//! line.

mod config;

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::Config;
use quaero_index::{
    CollectionSource, CollectionSummary, EncoderProvider, HashingEncoderProvider, IndexBuilder,
    JsonDirSource, OllamaEncoderConfig, OllamaEncoderProvider, QueryCoordinator, Readiness,
    SearchIndex, Target,
};
use quaero_server::{DatasetsResponse, SearchResponse, SearchServer, ServerConfig};

/// Semantic search over question/answer collections
#[derive(Parser)]
#[command(name = "quaero")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to .quaero directory or config file (default: search for .quaero/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Port for the HTTP server (overrides [server] port)
    #[arg(long, global = true, env = "QUAERO_PORT")]
    port: Option<u16>,

    /// Directory of JSON collections (overrides [data] dir)
    #[arg(long, global = true, env = "QUAERO_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Encoder provider: hashing, ollama (overrides [encoder] provider)
    #[arg(long, global = true)]
    encoder: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server and build the index in the background
    Serve {
        /// Host to bind to (overrides [server] host)
        #[arg(long)]
        host: Option<String>,

        /// Write logs to .quaero/logs/ instead of stderr
        #[arg(long)]
        log_to_file: bool,
    },

    /// Build the index and run a single query, printing JSON
    Search {
        /// Free-text query
        query: String,

        /// Dataset to search, or "all"
        #[arg(long)]
        dataset: Option<String>,

        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List the collections in the data directory and their record counts
    Datasets,

    /// Initialize a new .quaero directory with config file
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

/// Initialize logging to stderr.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Initialize logging to rotating files in .quaero/logs/ with daily rotation.
fn init_file_logging(quaero_dir: &Path, verbose: bool) {
    let logs_dir = quaero_dir.join("logs");

    if let Err(e) = std::fs::create_dir_all(&logs_dir) {
        eprintln!("Warning: Failed to create logs directory: {}", e);
        init_logging(verbose);
        return;
    }

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, "quaero.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // dropping the guard stops the writer thread
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(filter)
        .init();
}

/// Load config from an explicit path or by searching upwards.
///
/// Returns the config and its `.quaero` directory, if one was found.
fn load_config(override_path: Option<&PathBuf>) -> Result<(Config, Option<PathBuf>)> {
    if let Some(path) = override_path {
        let config_file = if path.is_dir() {
            path.join(config::CONFIG_FILE)
        } else {
            path.clone()
        };
        let quaero_dir = config_file.parent().unwrap_or(path).to_path_buf();
        let config = Config::from_file(&config_file)?;
        Ok((config, Some(quaero_dir)))
    } else {
        match Config::find_and_load()? {
            Some((config, quaero_dir)) => Ok((config, Some(quaero_dir))),
            None => Ok((Config::default(), None)),
        }
    }
}

/// Apply command-line overrides on top of the file configuration.
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(dir) = &cli.data_dir {
        config.data.dir = dir.clone();
    }
    if let Some(provider) = &cli.encoder {
        config.encoder.provider = provider.clone();
    }
}

/// Create the encoder provider named by `[encoder] provider`.
fn create_encoder_provider(config: &config::EncoderSection) -> Result<Arc<dyn EncoderProvider>> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEncoderProvider::new(config.dimension))),
        "ollama" => {
            let ollama_config = OllamaEncoderConfig::new()
                .with_model(&config.model)
                .with_base_url(&config.base_url)
                .with_timeout(Duration::from_secs(config.timeout_secs))
                .with_max_retries(config.max_retries);
            Ok(Arc::new(OllamaEncoderProvider::new(ollama_config)))
        }
        other => {
            anyhow::bail!("Unknown encoder provider: {}", other)
        }
    }
}

fn create_builder(config: &Config, data_dir: &Path) -> Result<Arc<IndexBuilder>> {
    let source = Arc::new(JsonDirSource::new(data_dir));
    let encoders = create_encoder_provider(&config.encoder)?;
    Ok(Arc::new(IndexBuilder::new(source, encoders)))
}

fn ensure_valid(config: &Config) -> Result<()> {
    let errors = config.validate();
    if errors.is_empty() {
        return Ok(());
    }
    for e in &errors {
        tracing::error!("Invalid configuration: {}", e);
    }
    anyhow::bail!("{} configuration error(s)", errors.len())
}

/// Socket address for `host` (IPv4 or IPv6, optionally bracketed) and `port`.
fn bind_addr(host: &str, port: u16) -> Result<SocketAddr> {
    let ip: IpAddr = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .with_context(|| format!("Invalid host address: {}", host))?;
    Ok(SocketAddr::new(ip, port))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging depends on the command and on where the config lives, so the
    // config is loaded first and reported once logging is up.
    let loaded = load_config(cli.config.as_ref());
    let log_dir = match &loaded {
        Ok((_, Some(dir))) => dir.clone(),
        _ => PathBuf::from(config::QUAERO_DIR),
    };
    match &cli.command {
        Commands::Serve {
            log_to_file: true, ..
        } => init_file_logging(&log_dir, cli.verbose),
        _ => init_logging(cli.verbose),
    }

    let (mut config, quaero_dir) = loaded?;
    match &quaero_dir {
        Some(dir) => info!("Found config at {}", dir.display()),
        None => tracing::debug!("No .quaero/config.toml found, using defaults"),
    }
    apply_overrides(&mut config, &cli);
    let data_dir = config.resolve_data_dir(quaero_dir.as_deref());

    match cli.command {
        Commands::Serve { host, .. } => {
            ensure_valid(&config)?;
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let addr = bind_addr(&host, config.server.port)?;

            let index = Arc::new(SearchIndex::new());
            let builder = create_builder(&config, &data_dir)?;

            info!(
                data_dir = %data_dir.display(),
                encoder = %config.encoder.provider,
                "Building index in the background"
            );
            // the server answers "initializing" until the build publishes
            let _build = builder.spawn(index.clone())?;

            let server_config = ServerConfig::new(addr)
                .with_cors(config.server.cors)
                .with_default_dataset(&config.search.default_dataset)
                .with_default_limit(config.search.default_limit);
            SearchServer::new(server_config, index, builder)
                .run_with_shutdown(shutdown_signal())
                .await?;
        }

        Commands::Search {
            query,
            dataset,
            limit,
        } => {
            ensure_valid(&config)?;
            let started = Instant::now();

            let index = Arc::new(SearchIndex::new());
            let builder = create_builder(&config, &data_dir)?;
            let build = builder.spawn(index.clone())?;

            if index.wait_until_settled().await == Readiness::Failed {
                let reason = match build.await? {
                    Err(e) => e.to_string(),
                    Ok(_) => "unknown error".to_string(),
                };
                anyhow::bail!("Index build failed: {}", reason);
            }

            let dataset = dataset.unwrap_or_else(|| config.search.default_dataset.clone());
            let limit = limit.unwrap_or(config.search.default_limit);
            let results = QueryCoordinator::new(index)
                .search(&query, &Target::parse(&dataset), limit)
                .await?;

            let response = SearchResponse::new(results, started.elapsed().as_secs_f64());
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Commands::Datasets => {
            let source = JsonDirSource::new(&data_dir);
            let mut datasets = Vec::new();
            for name in source.discover().await? {
                match source.load(&name).await {
                    Ok(records) => datasets.push(CollectionSummary {
                        name,
                        count: records.len(),
                    }),
                    Err(e) => tracing::warn!("Skipping {}: {}", name, e),
                }
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&DatasetsResponse { datasets })?
            );
        }

        Commands::Init { force } => {
            use config::{CONFIG_FILE, DEFAULT_CONFIG, QUAERO_DIR};

            let quaero_dir = PathBuf::from(QUAERO_DIR);
            let config_path = quaero_dir.join(CONFIG_FILE);

            if config_path.exists() && !force {
                anyhow::bail!(".quaero/config.toml already exists. Use --force to overwrite.");
            }

            if !quaero_dir.exists() {
                std::fs::create_dir_all(&quaero_dir)?;
                info!("Created {}/", quaero_dir.display());
            }

            std::fs::write(&config_path, DEFAULT_CONFIG)?;
            info!("Created {}", config_path.display());
            info!("Next steps:");
            info!("  1. Put one JSON array of {{question, answer}} objects per file in data/");
            info!("  2. Run 'quaero datasets' to check what will be indexed");
            info!("  3. Run 'quaero serve' to start the search API");
        }
    }

    Ok(())
}

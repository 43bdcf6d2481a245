//! smart-restore CLI - copy a referentially consistent slice of one
//! PostgreSQL database into another.

use clap::Parser;
use smart_restore::config::{merge_unique, DEFAULT_CONFIG_FILE};
use smart_restore::{RestoreConfig, RestoreError, Restorer};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

/// Exit code after an interrupt (128 + SIGINT).
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "smart-restore")]
#[command(about = "Copy rows and everything they reference between PostgreSQL databases")]
#[command(version)]
struct Cli {
    /// Table expressions to copy: table[:where-fragment]
    #[arg(value_name = "TABLE_EXPR")]
    tables: Vec<String>,

    /// Source database URL or database name
    #[arg(long, env = "SMART_RESTORE_SOURCE")]
    source: Option<String>,

    /// Target database URL or database name
    #[arg(long, env = "SMART_RESTORE_TARGET")]
    target: Option<String>,

    /// Copy rows of TABLE that reference copied rows (repeatable)
    #[arg(long, value_name = "TABLE")]
    fanout: Vec<String>,

    /// Never read or write TABLE (repeatable)
    #[arg(long = "exclude-table", value_name = "TABLE")]
    exclude_table: Vec<String>,

    /// Write inline, committing each batch, instead of through the background writer
    #[arg(long)]
    sync: bool,

    /// Debug logging (same as --verbosity debug)
    #[arg(short, long)]
    verbose: bool,

    /// Schema to restore [default: public]
    #[arg(long)]
    schema: Option<String>,

    /// Rows fetched per source query [default: 1000]
    #[arg(long)]
    page_size: Option<usize>,

    /// Rows per copy batch [default: 100]
    #[arg(long)]
    batch_size: Option<usize>,

    /// Bound the background write queue to N batches [default: unbounded]
    #[arg(long, value_name = "N")]
    queue_capacity: Option<usize>,

    /// Metadata cache file [default: .smart_restore_meta.json]
    #[arg(long)]
    metadata_cache: Option<PathBuf>,

    /// Reflect the schema on every run
    #[arg(long)]
    no_metadata_cache: bool,

    /// Path to YAML configuration file [default: smart_restore.yaml, if present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tokio::select! {
        result = run() => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{}", e.format_detailed());
                ExitCode::from(e.exit_code())
            }
        },
        _ = tokio::signal::ctrl_c() => {
            // Dropping the run rolls back the pipelined writer's open transaction.
            eprintln!("\nReceived Ctrl-C. Aborting restore.");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}

async fn run() -> Result<(), RestoreError> {
    let cli = Cli::parse();

    let config = build_config(&cli)?;

    let verbosity = if config.verbose { "debug" } else { cli.verbosity.as_str() };
    setup_logging(verbosity, &cli.log_format).map_err(RestoreError::Config)?;

    debug!("Configuration hash: {}", config.hash());

    let exprs = config.table_exprs()?;
    if exprs.is_empty() {
        return Err(RestoreError::Config(
            "at least one TABLE_EXPR is required".to_string(),
        ));
    }
    info!(
        "Restoring {} table expression(s) from {} into {}",
        exprs.len(),
        describe(&config.source),
        describe(&config.target)
    );

    let restorer = Restorer::connect(&config).await?;
    let summary = restorer.run(&exprs, &config.fanout_set()).await?;

    if cli.output_json {
        println!("{}", summary.to_json()?);
    } else {
        print!("{}", summary.render_text());
        if summary.sequences_repaired > 0 {
            println!("Sequences repaired: {}", summary.sequences_repaired);
        }
    }

    Ok(())
}

/// Start from the config file (explicit, or the default one when present),
/// then apply command-line options on top.
fn build_config(cli: &Cli) -> Result<RestoreConfig, RestoreError> {
    let mut config = match &cli.config {
        Some(path) => RestoreConfig::read(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => RestoreConfig::read(DEFAULT_CONFIG_FILE)?,
        None => RestoreConfig::default(),
    };

    if let Some(source) = &cli.source {
        config.source = source.clone();
    }
    if let Some(target) = &cli.target {
        config.target = target.clone();
    }
    if let Some(schema) = &cli.schema {
        config.schema = schema.clone();
    }
    if let Some(n) = cli.page_size {
        config.page_size = n;
    }
    if let Some(n) = cli.batch_size {
        config.batch_size = n;
    }
    if let Some(n) = cli.queue_capacity {
        config.write_queue_capacity = Some(n);
    }
    if let Some(path) = &cli.metadata_cache {
        config.metadata_cache = path.clone();
    }

    config.sync |= cli.sync;
    config.verbose |= cli.verbose;
    config.no_metadata_cache |= cli.no_metadata_cache;
    config.progress |= cli.progress;

    merge_unique(&mut config.fanout, cli.fanout.iter().cloned());
    merge_unique(&mut config.exclude_tables, cli.exclude_table.iter().cloned());
    merge_unique(&mut config.tables, cli.tables.iter().cloned());

    config.validate()?;
    Ok(config)
}

/// Host, port and database of a URL, without credentials.
fn describe(url: &str) -> String {
    smart_restore::connection::ConnectionSpec::parse(url)
        .map(|spec| spec.display().to_string())
        .unwrap_or_else(|_| "<invalid url>".to_string())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

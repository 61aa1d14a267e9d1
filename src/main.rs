use anyhow::{Context, Result};
use clap::Parser;
use sitefence::guidance::status_notice;
use sitefence::{
    Location, OfflineLogQueue, SimulatedPositionSource, SitefenceApp, SitefenceConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "sitefence")]
#[command(about = "Real-time geofence validation and location tracking for field workers")]
#[command(version)]
#[command(long_about = "Validates a worker's position against the project work-site boundary, \
fans status updates out to subscribers and keeps location logs queued on disk while the \
backend is unreachable.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "sitefence.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Print pending offline log entries and exit
    #[arg(long, help = "Print the offline log queue as JSON and exit")]
    show_queue: bool,

    /// Replay a recorded track through real-time validation
    #[arg(long, value_name = "FILE", help = "JSON array of locations to replay")]
    track: Option<PathBuf>,

    /// Delay between replayed fixes
    #[arg(long, default_value_t = 1000, help = "Milliseconds between replayed fixes")]
    interval_ms: u64,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to daily rolling files in this directory
    #[arg(long, value_name = "DIR", help = "Directory for rolling log files")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting Sitefence v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match SitefenceConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    if args.show_queue {
        let queue = OfflineLogQueue::open(&config.queue).await?;
        println!("{}", serde_json::to_string_pretty(&queue.snapshot())?);
        return Ok(());
    }

    let track = match &args.track {
        Some(path) => Some(load_track(path)?),
        None => None,
    };

    let source = Arc::new(SimulatedPositionSource::new());
    let support = config.support.clone();
    let mut app = SitefenceApp::new(config, source.clone()).await.map_err(|e| {
        error!("Failed to create application: {}", e);
        e
    })?;

    app.start().await.map_err(|e| {
        error!("Failed to start: {}", e);
        e
    })?;

    let exit_code = match track {
        Some(track) => {
            let subscription = app
                .coordinator()
                .start_real_time_validation(None, move |status| {
                    if let Ok(line) = serde_json::to_string(status) {
                        println!("{}", line);
                    }
                    if let Some(notice) = status_notice(status, &support) {
                        warn!("{}: {}", notice.title, notice.message);
                    }
                })
                .await?;
            info!("Replay subscription {} active", subscription.id());

            let interval = Duration::from_millis(args.interval_ms);
            let replay = async move { source.replay(track, interval).await };
            app.run_until(replay).await?
        }
        None => app.run().await?,
    };

    info!("Sitefence exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn load_track(path: &Path) -> Result<Vec<Location>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read track file {}", path.display()))?;
    let track: Vec<Location> = serde_json::from_str(&raw)
        .with_context(|| format!("Track file {} is not a JSON array of locations", path.display()))?;
    info!("Loaded {} fixes from {}", track.len(), path.display());
    Ok(track)
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sitefence={}", log_level)));

    // Status lines go to stdout in replay mode, so logs use stderr
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "sitefence.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Sitefence Configuration File");
    println!("# This is the default configuration with all available options");
    println!("#");
    println!("# Optional sections not shown:");
    println!("#   [site] project_id, latitude, longitude, radius_meters, strict_mode, allowed_variance_meters");
    println!("#   [support.supervisor] / [support.site_manager] name, phone, email");
    println!("#   [backend] auth_token");
    println!();

    let rendered = toml::to_string_pretty(&SitefenceConfig::default())
        .context("Failed to render default configuration")?;
    println!("{}", rendered);
    Ok(())
}

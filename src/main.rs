use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use focuscam::{
    AlternatingDetector, FocuscamConfig, PersonDetector, SessionManager, StaticDetector,
};

#[derive(Parser, Debug)]
#[command(name = "focuscam")]
#[command(about = "Presence monitoring engine deriving focus and leave time blocks from a camera feed")]
#[command(version)]
#[command(long_about = "Monitors whether a person is present in front of a camera and converts \
the presence signal into contiguous focus and leave time blocks. Runs one monitoring session \
per camera; the library API supports many concurrent sessions behind a registry.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "focuscam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Session identifier
    #[arg(short, long, default_value = "default", help = "Identifier for the monitoring session")]
    session: String,

    /// Camera device index override
    #[arg(long, help = "Camera device index, overriding the configured one")]
    camera: Option<u32>,

    /// Simulate presence changes instead of using a real detector
    #[arg(long, help = "Drive the session with a simulated detector that flips presence periodically")]
    simulate: bool,

    /// Period in seconds for the simulated presence flips
    #[arg(long, default_value_t = 30, help = "Seconds between simulated presence flips")]
    simulate_period: u64,

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
    #[arg(long, help = "Validate configuration file and exit without starting monitoring")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args);

    info!("Starting focuscam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match FocuscamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    config.validate()?;

    // The real person-detection model is an external capability plugged in
    // through the PersonDetector trait; the binary ships with stand-ins.
    let detector: Arc<dyn PersonDetector> = if args.simulate {
        info!(
            "Using simulated detector (presence flips every {}s)",
            args.simulate_period
        );
        Arc::new(AlternatingDetector::new(Duration::from_secs(
            args.simulate_period,
        )))
    } else {
        info!("No detector backend configured, treating every frame as presence");
        Arc::new(StaticDetector::present())
    };

    let manager = SessionManager::new(config, detector);
    let session = manager.create_session(&args.session, args.camera)?;
    session.start(false).await;

    if !session.is_running() {
        error!("Session failed to start, check camera availability");
        std::process::exit(1);
    }

    println!("Monitoring session '{}' started, Ctrl+C to stop", args.session);

    let mut status_interval = tokio::time::interval(Duration::from_secs(10));
    status_interval.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping monitor...");
                break;
            }
            _ = status_interval.tick() => {
                while let Some(record) = session.latest_record() {
                    println!("New record: {}", record.format_human());
                }
                println!("Status: {}", serde_json::to_string(&session.status())?);
            }
        }
    }

    manager.shutdown_all().await;

    let stats = session.summary();
    println!("=== Final statistics ===");
    println!("Total focus time: {:.1} min", stats.total_focus_minutes);
    println!("Total leave time: {:.1} min", stats.total_leave_minutes);
    println!("Focus blocks: {}", stats.focus_blocks);
    println!("Leave blocks: {}", stats.leave_blocks);
    println!("Focus score: {:.2}", session.focus_score());

    Ok(())
}

fn init_logging(args: &Args) {
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
        .unwrap_or_else(|_| EnvFilter::new(format!("focuscam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .boxed(),
        Some("pretty") => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
        None => fmt::layer().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Focuscam Configuration File");
    println!("# Default configuration with all available options");
    println!();
    println!("{}", toml::to_string_pretty(&FocuscamConfig::default())?);
    Ok(())
}

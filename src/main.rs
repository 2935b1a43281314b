use anyhow::Result;
use clap::Parser;
use pipehealth::{HealthCheckConfig, HealthCheckExtension};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pipehealth")]
#[command(about = "Health checks for telemetry pipelines")]
#[command(version)]
#[command(long_about = "Tracks the latest status reported by each receiver, processor and \
exporter, folds them into per-pipeline and collector verdicts, and answers health checks over \
HTTP. Without a host, the pipelines listed in the config file are reported healthy until a \
signal arrives.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "pipehealth.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without starting the server")]
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

    init_logging(&args)?;

    info!("Starting pipehealth v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match HealthCheckConfig::load_from_file(&args.config) {
        Ok(config) => config,
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
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let extension = HealthCheckExtension::new(config).map_err(|e| {
        error!("Failed to create health check extension: {}", e);
        e
    })?;

    let exit_code = extension.run().await.map_err(|e| {
        error!("Health check error during execution: {}", e);
        e
    })?;

    info!("pipehealth exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<()> {
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
        .unwrap_or_else(|_| EnvFilter::new(format!("pipehealth={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# pipehealth configuration file");
    println!("# Environment overrides use the PIPEHEALTH_ prefix, e.g. PIPEHEALTH_HTTP__PORT=9090");
    println!();
    println!("{}", toml::to_string_pretty(&HealthCheckConfig::default())?);
    println!("# Pipelines reported on in standalone mode");
    println!("# [pipelines.traces]");
    println!("# receivers = [\"otlp\"]");
    println!("# processors = [\"batch\"]");
    println!("# exporters = [\"debug\"]");
    Ok(())
}

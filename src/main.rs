use clap::{Parser, Subcommand};
use std::path::PathBuf;
use sugo_serialport::config::{Config, ConfigError, ConfigLoader, LogFormat, LoggingConfig};
use sugo_serialport::error::AppResult;
use sugo_serialport::service::IdleTimeout;
use sugo_serialport::{stdio, ModuleSpec, SerialPortActor, Variant};
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Serial port adapter for SUGO actors.",
    long_about = "Exposes a serial port driver behind the SUGO actor module contract: a $spec descriptor, \
                  one method per driver operation, and the driver's events relayed as they happen."
)]
struct Cli {
    /// Configuration file. Overrides the standard resolution order.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the $spec descriptor as JSON.
    Spec {
        #[arg(long, value_enum)]
        variant: Option<Variant>,
    },
    /// List serial ports on this machine.
    List,
    /// Serve the adapter over newline-delimited JSON on stdin/stdout.
    Serve {
        #[arg(long, value_enum)]
        variant: Option<Variant>,
        /// Default port path for connect/open.
        #[arg(long)]
        path: Option<String>,
        /// Default baud rate for connect/open.
        #[arg(long)]
        baud_rate: Option<u32>,
        /// Idle auto-close in ms, or "Infinity". Interface variant only.
        #[arg(long)]
        timeout: Option<IdleTimeout>,
    },
    /// Print the effective configuration, or write it to a file.
    Config {
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

// --- Main Application Entry Point ---
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loader = match load_config(&cli) {
        Ok(loader) => loader,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };
    init_tracing(&loader.config().logging);

    if let Err(e) = run(cli.command, loader).await {
        error!(error = %e, kind = e.kind(), "command failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> AppResult<ConfigLoader> {
    let mut loader = match &cli.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    if let Some(level) = &cli.log_level {
        loader.config.logging.level = level.clone();
    }
    Ok(loader)
}

async fn run(command: Command, loader: ConfigLoader) -> AppResult<()> {
    let mut config: Config = loader.config().clone();

    match command {
        Command::Spec { variant } => {
            let spec = ModuleSpec::for_variant(variant.unwrap_or(config.adapter.variant));
            println!("{}", serde_json::to_string_pretty(&spec)?);
        }
        Command::List => {
            let actor = SerialPortActor::with_system_driver(&config);
            let ports = actor.list().await?;
            println!("{}", serde_json::to_string_pretty(&ports)?);
        }
        Command::Serve {
            variant,
            path,
            baud_rate,
            timeout,
        } => {
            if let Some(variant) = variant {
                config.adapter.variant = variant;
            }
            if path.is_some() {
                config.adapter.path = path;
            }
            if let Some(baud_rate) = baud_rate {
                config.adapter.options.baud_rate = baud_rate;
            }
            if let Some(timeout) = timeout {
                config.adapter.timeout = timeout;
            }

            let actor = SerialPortActor::with_system_driver(&config);
            tokio::select! {
                result = stdio::run_stdio_interface(actor.clone()) => result?,
                _ = shutdown_signal() => info!("signal received, shutting down"),
            }
            if actor.service().is_connected() && actor.is_open().await.unwrap_or(false) {
                actor.close().await?;
            }
        }
        Command::Config { write } => match write {
            Some(path) => {
                loader.save_to(&path)?;
                info!(path = %path.display(), "configuration written");
            }
            None => {
                let text = toml::to_string_pretty(&config).map_err(ConfigError::from)?;
                print!("{text}");
            }
        },
    }

    Ok(())
}

/// Install the tracing subscriber. Logs go to stderr; stdout belongs to the pipe.
fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|err| {
            eprintln!("invalid log level '{}' ({err}); defaulting to info", config.level);
            EnvFilter::new("info")
        });

    let layer = match config.format {
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
    };

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
}

// --- Graceful Shutdown Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

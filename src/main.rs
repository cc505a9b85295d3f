use std::path::PathBuf;

use anyhow::Result;
use awsh::aws::AwsCredentials;
use awsh::config::Config;
use awsh::session::Session;
use awsh::shell::Shell;
use clap::{Parser, ValueEnum};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Interactive shell for AWS
#[derive(Parser, Debug)]
#[command(name = "awsh", version, about, long_about = None)]
struct Args {
    /// File containing AWS credentials (AWSAccessKeyId=... and
    /// AWSSecretKey=... lines)
    #[arg(short = 'I', long = "credentials")]
    credentials_file: Option<PathBuf>,

    /// Default AWS region
    #[arg(short = 'r', long)]
    region: Option<String>,

    /// Run the shell in debug mode (full error detail)
    #[arg(short = 'd', long)]
    debug: bool,

    /// Send all API calls to this endpoint (localstack-style setups)
    #[arg(long)]
    endpoint_url: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", log_path.display());
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("awsh started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("awsh").join("awsh.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".awsh").join("awsh.log");
    }
    PathBuf::from("awsh.log")
}

fn fatal(msg: &str) -> ! {
    eprintln!("{msg}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let config = Config::load();
    let region = args.region.clone().unwrap_or_else(|| config.effective_region());

    // Without credentials there is nothing the shell can do.
    let cred_path = AwsCredentials::resolve_path(args.credentials_file.clone());
    if !cred_path.exists() {
        fatal(&format!(
            "Credentials file does not exist: {}",
            cred_path.display()
        ));
    }
    let creds = match AwsCredentials::from_file(&cred_path) {
        Ok(creds) => creds,
        Err(err) => fatal(&format!("{err}\nExiting due to lack of AWS credentials")),
    };

    tracing::info!("Using region: {region}");

    let session = match args.endpoint_url {
        Some(endpoint_url) => {
            Session::with_endpoint_url(creds, region, args.debug, config, endpoint_url)
        }
        None => Session::new(creds, region, args.debug, config),
    };
    let mut shell = Shell::new(session)?;
    shell.run().await
}

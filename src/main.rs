use clap::Parser;
use scribe_live::config::schema::AppConfig;
use scribe_live::transport::TransportMode;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "/etc/scribe-live/config.toml";

/// scribe-live: keeps a live view of a Scribe printer's discovered printers and status
#[derive(Parser)]
#[command(name = "scribe-live", version, about)]
struct Cli {
    /// Path to the config file (TOML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device base URL, overriding the config file.
    #[arg(short, long)]
    device: Option<String>,

    /// Transport: auto, stream or polling.
    #[arg(short, long)]
    transport: Option<TransportMode>,

    /// Enable JSON log output (for journald).
    #[arg(long)]
    json: bool,

    /// Validate config and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Init tracing.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scribe_live=info"));

    if cli.json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }

    info!("scribe-live v{}", env!("CARGO_PKG_VERSION"));

    // An explicit path must exist; the default one is optional.
    let (mut config, config_path) = match cli.config {
        Some(path) => {
            let path = path.canonicalize().unwrap_or(path);
            (scribe_live::config::load(&path)?, Some(path))
        }
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if path.exists() {
                (scribe_live::config::load(&path)?, Some(path))
            } else {
                info!("no config at {DEFAULT_CONFIG_PATH}, using defaults");
                (AppConfig::default(), None)
            }
        }
    };

    if let Some(url) = cli.device {
        config.device.url = url;
    }
    if let Some(mode) = cli.transport {
        config.live.transport = mode;
    }
    scribe_live::config::validate(&config)?;

    if cli.check {
        println!(
            "config OK: device {}, transport {}",
            config.device.url, config.live.transport
        );
        return Ok(());
    }

    // Run the daemon.
    scribe_live::daemon::run(config, config_path).await?;

    Ok(())
}

//! lumen sender: entry point.
//!
//! ```text
//! lumen-sender                          Stream to the configured viewer
//! lumen-sender --address 10.0.0.2       Override the viewer address
//! lumen-sender --port 6000              Override the viewer port
//! lumen-sender --source pattern         Stream a synthetic test pattern
//! lumen-sender --config <path>          Load a custom config TOML
//! lumen-sender --gen-config             Write default config to stdout
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lumen_core::ScreenSender;
use lumen_sender::config::SenderAppConfig;
use lumen_sender::source::open_source;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lumen-sender", about = "Capture this screen and stream it to a lumen viewer")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "lumen-sender.toml")]
    config: PathBuf,

    /// Viewer address (overrides the config file).
    #[arg(short, long)]
    address: Option<String>,

    /// Viewer port (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// Capture source: "dxgi" or "pattern".
    #[arg(long)]
    source: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&SenderAppConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = SenderAppConfig::load(&cli.config);
    if let Some(address) = cli.address {
        config.network.address = address;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Some(source) = cli.source {
        config.capture.source = source;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("lumen-sender v{}", env!("CARGO_PKG_VERSION"));
    info!("viewer: {}:{}", config.network.address, config.network.port);
    info!("source: {}, target FPS: {}", config.capture.source, config.fps());
    info!("codec: {} @ {} bit/s", config.encoder.codec, config.encoder.bitrate);

    let capture = config.capture.clone();
    let mut sender =
        ScreenSender::start(config.to_sender_config(), move || open_source(&capture)).await?;

    let mut status = sender.status().subscribe();
    let stats_every = Duration::from_secs(config.logging.stats_interval_secs.max(1));
    let log_stats = config.logging.stats_interval_secs > 0;
    let mut ticker = tokio::time::interval(stats_every);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            _ = sender.closed() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                info!("status: {}", *status.borrow_and_update());
            }
            _ = ticker.tick(), if log_stats => {
                let s = sender.stats();
                info!(
                    captured = s.captured,
                    dropped = s.dropped,
                    encoded = s.encoded,
                    sent = s.packets_sent,
                    kbps = s.throughput_bps * 8 / 1000,
                    "stats"
                );
            }
        }
    }

    if let Err(e) = sender.stop().await {
        error!("sender stopped with error: {e}");
        return Err(e.into());
    }
    Ok(())
}

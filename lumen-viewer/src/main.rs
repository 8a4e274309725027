//! lumen viewer: entry point.
//!
//! ```text
//! lumen-viewer                         Listen with defaults
//! lumen-viewer --port 6000             Listen on another port
//! lumen-viewer --snapshot last.png     Keep the latest frame on disk
//! lumen-viewer --config <path>         Use custom config TOML
//! lumen-viewer --gen-config            Dump default config and exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lumen_core::ScreenServer;
use lumen_viewer::config::ViewerConfig;
use lumen_viewer::render::FrameRenderer;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lumen-viewer", about = "Receive and display a lumen screen stream")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "lumen-viewer.toml")]
    config: PathBuf,

    /// Port to listen on (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Write PNG snapshots of the stream to this file.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ViewerConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Some(path) = cli.snapshot {
        config.display.snapshot_path = path.display().to_string();
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("lumen-viewer v{}", env!("CARGO_PKG_VERSION"));

    let (mut server, events) = ScreenServer::listen(config.to_server_config()).await?;
    info!("listening on {}", server.local_addr());

    let mut status = server.status().subscribe();
    let status_log = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            info!("status: {}", *status.borrow_and_update());
        }
    });

    let renderer = FrameRenderer::new(config.to_render_config(), server.status(), server.metrics());
    let renderer = renderer
        .run(events, async {
            tokio::signal::ctrl_c().await.ok();
            info!("Ctrl-C received, shutting down");
        })
        .await;

    server.stop().await;
    status_log.abort();
    info!(frames = renderer.frames(), "viewer stopped");

    Ok(())
}

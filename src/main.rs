//! kiosk-attract - Attract-mode overlay for an idle kiosk.
//!
//! `serve` runs the caching items endpoint, `kiosk` runs the display
//! controller in the terminal, `fetch` performs a single cache fetch.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kiosk_attract::api::ItemsBody;
use kiosk_attract::cache::ItemCache;
use kiosk_attract::config::Config;
use kiosk_attract::display::{DisplayController, RetryHandle, TerminalRenderer};
use kiosk_attract::feed::{FeedSource, HttpFeedSource, ItemFeed, LocalFeedSource};
use kiosk_attract::idle::{ActivityHub, InputEvent};
use kiosk_attract::server;
use kiosk_attract::upstream::GithubUpstream;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Attract-mode kiosk controller.
///
/// Serves a cached view of an upstream commits feed and rotates through it
/// while the device is idle.
#[derive(Parser, Debug)]
#[command(name = "kiosk-attract")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the cached items endpoint.
    Serve,

    /// Run the attract-mode controller in this terminal.
    ///
    /// Every line typed on stdin counts as a key press; the line `retry`
    /// also requests a manual refetch.
    Kiosk {
        /// Use an in-process cache instead of calling the endpoint.
        #[arg(long)]
        local: bool,
    },

    /// Fetch once through the cache and print the endpoint body.
    Fetch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("kiosk-attract v{} starting", env!("CARGO_PKG_VERSION"));

    let config =
        Config::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;

    debug!(
        "Configuration loaded (upstream={}/{}, ttl={}s)",
        config.upstream.owner, config.upstream.repo, config.cache.ttl_seconds
    );

    match args.command {
        Command::Serve => run_server(&config).await,
        Command::Kiosk { local } => run_kiosk(config, local).await,
        Command::Fetch => run_fetch(&config).await,
    }
}

/// Initialize logging with the specified level.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(format!("kiosk_attract={level}"))
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Invalid log level")?;

    // Logs go to stderr so the terminal overlay and `fetch` output stay clean.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn build_cache(config: &Config) -> Result<Arc<ItemCache>> {
    let upstream =
        GithubUpstream::from_config(&config.upstream).context("Failed to initialize upstream")?;
    Ok(Arc::new(ItemCache::new(
        Arc::new(upstream),
        config.cache.ttl(),
    )))
}

/// Cancelled on Ctrl+C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, shutting down"),
                Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
            }
            token.cancel();
        }
    });
    token
}

async fn run_server(config: &Config) -> Result<()> {
    let cache = build_cache(config)?;
    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    server::serve(listener, cache, shutdown_on_ctrl_c()).await
}

async fn run_kiosk(config: Config, local: bool) -> Result<()> {
    let source: Arc<dyn FeedSource> = if local {
        info!("Using in-process cache");
        Arc::new(LocalFeedSource::new(build_cache(&config)?))
    } else {
        let source =
            HttpFeedSource::new(&config.display.endpoint, config.display.request_timeout())
                .context("Failed to initialize feed client")?;
        info!("Using cache endpoint {}", source.url());
        Arc::new(source)
    };

    let hub = ActivityHub::new();
    let controller = DisplayController::new(
        config.display,
        Arc::new(hub.clone()),
        ItemFeed::new(source),
        TerminalRenderer::stdout(),
    );
    spawn_stdin_reader(hub, controller.retry_handle());

    controller.run(shutdown_on_ctrl_c()).await;
    Ok(())
}

/// Feed stdin lines into the activity hub.
///
/// Runs on a plain thread: a blocked stdin read must not hold up runtime
/// shutdown.
fn spawn_stdin_reader(hub: ActivityHub, retry: RetryHandle) {
    let spawned = std::thread::Builder::new()
        .name("stdin-activity".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                hub.emit(InputEvent::KeyPress);
                if line.trim().eq_ignore_ascii_case("retry") {
                    retry.retry();
                }
            }
            debug!("stdin closed, no further activity will be reported");
        });

    if let Err(e) = spawned {
        warn!("Failed to start stdin reader: {}", e);
    }
}

async fn run_fetch(config: &Config) -> Result<()> {
    let cache = build_cache(config)?;
    let (status, body) = ItemsBody::from_outcome(cache.get().await);
    info!("Fetch finished with status {}", status);

    let json = serde_json::to_string_pretty(&body).context("Failed to encode response")?;
    println!("{json}");
    Ok(())
}

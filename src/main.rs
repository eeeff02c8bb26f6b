use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use deckd::{config::ServerConfig, deck::CommandRegistry, server::DeckServer, DeckContext};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "deckd",
    about = "deckd — single-user local command deck server",
    version
)]
struct Args {
    /// TCP port to listen on (1-65535)
    #[arg(long, env = "DECKD_PORT", value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Bind address (default: 0.0.0.0 so phones on the LAN can reach the deck)
    #[arg(long, env = "DECKD_BIND")]
    bind: Option<String>,

    /// Directory served as the deck UI
    #[arg(long, env = "DECKD_WEB_ROOT")]
    web_root: Option<PathBuf>,

    /// Deck manifest: one `title,token,icon,executable` record per line
    #[arg(long, env = "DECKD_DECK_FILE")]
    deck_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DECKD_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "DECKD_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// TOML config file (default: deckd.toml in the working directory)
    #[arg(long, env = "DECKD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Arc::new(ServerConfig::new(
        args.port,
        args.bind,
        args.web_root,
        args.deck_file,
        args.log,
        args.config.as_deref(),
    ));
    let _log_guard = setup_logging(&config.log, args.log_file.as_deref(), &config.log_format);

    info!(version = env!("CARGO_PKG_VERSION"), "deckd starting");
    info!(
        web_root = %config.web_root.display(),
        deck_file = %config.deck_file.display(),
        port = config.port,
        "config loaded"
    );

    // The whole deck is read once, up front. A malformed line or missing
    // icon stops startup with a diagnostic naming the offending record;
    // later manifest edits are not observed until restart.
    let registry =
        Arc::new(CommandRegistry::load(&config).context("deck manifest rejected")?);

    let ctx = Arc::new(
        DeckContext::new(config.clone(), registry).with_context(|| {
            format!("web root {} is not usable", config.web_root.display())
        })?,
    );
    let server = DeckServer::new(ctx.clone());
    let port = server
        .start()
        .await
        .with_context(|| format!("cannot bind {}:{}", config.bind_address, config.port))?;
    info!(port, "deck ready");

    wait_for_shutdown().await;
    info!(
        uptime_secs = ctx.started_at.elapsed().as_secs(),
        "shutdown signal received"
    );
    server.stop().await;
    server.join().await;
    Ok(())
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a guard that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default) or `"json"`. If the log
/// directory cannot be created, falls back to stdout-only logging with a
/// warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";
    let stdout_only = || {
        if use_json {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(log_level)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(log_level)
                .compact()
                .init();
        }
    };

    let Some(path) = log_file else {
        stdout_only();
        return None;
    };

    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let filename = path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("deckd.log"));
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!(
            "warn: could not create log directory '{}': {e} — falling back to stdout",
            dir.display()
        );
        stdout_only();
        return None;
    }

    let appender = tracing_appender::rolling::daily(dir, filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    if use_json {
        tracing_subscriber::registry()
            .with(EnvFilter::new(log_level))
            .with(fmt::layer().json())
            .with(fmt::layer().json().with_writer(non_blocking))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(EnvFilter::new(log_level))
            .with(fmt::layer().compact())
            .with(fmt::layer().with_writer(non_blocking))
            .init();
    }
    Some(guard)
}

/// Resolves when a shutdown signal is received: SIGTERM or Ctrl-C on Unix,
/// Ctrl-C elsewhere.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(_) => {
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

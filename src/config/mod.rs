use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_PORT: u16 = 25525;
const DEFAULT_READ_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_WEB_ROOT: &str = "www";
const DEFAULT_INDEX_FILE: &str = "index.html";
const DEFAULT_NOT_FOUND_FILE: &str = "index.html";
const DEFAULT_DECK_FILE: &str = "deck.csv";
const DEFAULT_SNAPSHOT_FILE: &str = "deck.json";
const DEFAULT_CONFIG_FILE: &str = "deckd.toml";

fn default_bind_address() -> String {
    // The deck is meant to be opened from a phone on the same LAN.
    "0.0.0.0".to_string()
}

// ─── ServerConfig ─────────────────────────────────────────────────────────────

/// Immutable server configuration, fixed before the accept loop starts and
/// shared read-only for the process lifetime.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port the deck listens on (1-65535).
    pub port: u16,
    /// Bind address (default: "0.0.0.0"; use "127.0.0.1" to stay local-only).
    pub bind_address: String,
    /// Per-connection read deadline. A slow client is dropped, not waited on.
    pub read_timeout: Duration,
    /// Per-connection write deadline.
    pub write_timeout: Duration,
    /// Directory all served static content is confined to.
    pub web_root: PathBuf,
    /// File served for directory requests and for unsafe (escaping) paths.
    pub index_file: String,
    /// File served when a safe path does not exist. Defaults to the index
    /// document, so a logical miss renders as the landing page with 200.
    pub not_found_file: String,
    /// Deck manifest: one `title,token,icon-path,executable-path` per line.
    pub deck_file: PathBuf,
    /// Where the serialized manifest JSON is persisted at startup.
    pub snapshot_file: PathBuf,
    /// Log level (trace, debug, info, warn, error).
    pub log: String,
    /// Log output format: "pretty" (default) | "json".
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: default_bind_address(),
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
            web_root: PathBuf::from(DEFAULT_WEB_ROOT),
            index_file: DEFAULT_INDEX_FILE.to_string(),
            not_found_file: DEFAULT_NOT_FOUND_FILE.to_string(),
            deck_file: PathBuf::from(DEFAULT_DECK_FILE),
            snapshot_file: PathBuf::from(DEFAULT_SNAPSHOT_FILE),
            log: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ServerConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file (`--config`, default `deckd.toml`)
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        bind_address: Option<String>,
        web_root: Option<PathBuf>,
        deck_file: Option<PathBuf>,
        log: Option<String>,
        config_file: Option<&Path>,
    ) -> Self {
        let config_path = config_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let toml = load_toml(&config_path).unwrap_or_default();
        let defaults = Self::default();

        let log_format = std::env::var("DECKD_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or(defaults.log_format);

        Self {
            port: port.or(toml.port).unwrap_or(defaults.port),
            bind_address: bind_address
                .or(toml.bind_address)
                .unwrap_or(defaults.bind_address),
            read_timeout: toml
                .read_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.read_timeout),
            write_timeout: toml
                .write_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.write_timeout),
            web_root: web_root.or(toml.web_root).unwrap_or(defaults.web_root),
            index_file: toml.index_file.unwrap_or(defaults.index_file),
            not_found_file: toml.not_found_file.unwrap_or(defaults.not_found_file),
            deck_file: deck_file.or(toml.deck_file).unwrap_or(defaults.deck_file),
            snapshot_file: toml.snapshot_file.unwrap_or(defaults.snapshot_file),
            log: log.or(toml.log).unwrap_or(defaults.log),
            log_format,
        }
    }
}

// ─── TOML override layer ──────────────────────────────────────────────────────

/// Every field optional; absent fields fall through to the next layer.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TomlConfig {
    port: Option<u16>,
    bind_address: Option<String>,
    read_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
    web_root: Option<PathBuf>,
    index_file: Option<String>,
    not_found_file: Option<String>,
    deck_file: Option<PathBuf>,
    snapshot_file: Option<PathBuf>,
    log: Option<String>,
    log_format: Option<String>,
}

/// Config parsing happens before the tracing subscriber is installed, so
/// diagnostics go to stderr directly.
fn load_toml(path: &Path) -> Option<TomlConfig> {
    let contents = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            eprintln!(
                "warn: failed to parse {} — using defaults: {e}",
                path.display()
            );
            None
        }
    }
}

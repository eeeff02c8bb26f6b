pub mod config;
pub mod deck;
pub mod server;

pub use config::ServerConfig;
pub use deck::CommandRegistry;
pub use server::DeckServer;

use std::io;
use std::sync::Arc;

use server::resolver::PathResolver;

/// Shared state handed to every connection: the immutable configuration, the
/// one-time command registry, and the resolver holding the canonical web
/// root. Everything here is read-only after construction and is shared
/// across connections without locking.
pub struct DeckContext {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<CommandRegistry>,
    pub resolver: PathResolver,
    pub started_at: std::time::Instant,
}

impl DeckContext {
    /// Canonicalizes the configured web root; a missing root is an error
    /// here, before the listener ever binds.
    pub fn new(config: Arc<ServerConfig>, registry: Arc<CommandRegistry>) -> io::Result<Self> {
        let resolver = PathResolver::new(&config)?;
        Ok(Self {
            config,
            registry,
            resolver,
            started_at: std::time::Instant::now(),
        })
    }
}

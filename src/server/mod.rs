pub mod request;
pub mod resolver;
pub mod response;

use std::io::{self, ErrorKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::deck::dispatch::{self, DispatchError};
use crate::DeckContext;
use self::request::Request;

/// The query string that requests the manifest snapshot instead of a file
/// or a command launch.
const MANIFEST_QUERY: &str = "REQTOP";

/// What a parsed request resolves to.
#[derive(Debug, PartialEq, Eq)]
enum ResolvedTarget {
    StaticFile(PathBuf),
    ManifestSnapshot,
    CommandInvocation(String),
}

// ─── DeckServer ───────────────────────────────────────────────────────────────

/// The accept loop. `start` is idempotent; `stop` is observed between
/// connections, so an in-flight request is always served to completion and
/// quiescence after `stop` is not immediate.
pub struct DeckServer {
    ctx: Arc<DeckContext>,
    running: Mutex<Option<Running>>,
}

struct Running {
    port: u16,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl DeckServer {
    pub fn new(ctx: Arc<DeckContext>) -> Self {
        Self {
            ctx,
            running: Mutex::new(None),
        }
    }

    /// Binds the listener and spawns exactly one accept task. Calling this
    /// while the server is running is a no-op returning the bound port.
    pub async fn start(&self) -> io::Result<u16> {
        let mut running = self.running.lock().await;
        if let Some(running) = running.as_ref() {
            debug!(port = running.port, "server already running");
            return Ok(running.port);
        }

        let addr = format!("{}:{}", self.ctx.config.bind_address, self.ctx.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        info!(%addr, port, "deck server listening");

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(accept_loop(listener, self.ctx.clone(), shutdown_rx));
        *running = Some(Running {
            port,
            shutdown,
            handle: Some(handle),
        });
        Ok(port)
    }

    /// Requests shutdown. The flag is checked between connections; whatever
    /// connection is being served finishes first.
    pub async fn stop(&self) {
        if let Some(running) = self.running.lock().await.as_ref() {
            let _ = running.shutdown.send(true);
            info!("deck server stop requested");
        }
    }

    /// Waits for the accept loop to finish and clears the running state.
    /// Returns immediately if the server was never started.
    pub async fn join(&self) {
        let running = self.running.lock().await.take();
        if let Some(mut running) = running {
            if let Some(handle) = running.handle.take() {
                if let Err(e) = handle.await {
                    error!(err = %e, "accept loop panicked");
                }
            }
        }
    }

    /// The bound port, if the server is running.
    pub async fn port(&self) -> Option<u16> {
        self.running.lock().await.as_ref().map(|r| r.port)
    }
}

async fn accept_loop(
    listener: TcpListener,
    ctx: Arc<DeckContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                info!("deck server stopped");
                break;
            }

            conn = listener.accept() => {
                let (stream, peer) = match conn {
                    Ok(c) => c,
                    Err(e) => {
                        // Transient accept failures must not kill the loop.
                        error!(err = %e, "accept error");
                        continue;
                    }
                };
                debug!(peer = %peer, "client connected");
                // One connection at a time: the next accept happens only
                // after this response is written and the socket closed.
                if let Err(e) = handle_connection(stream, &ctx).await {
                    warn!(peer = %peer, err = %e, "connection abandoned");
                }
                debug!(peer = %peer, "client disconnected");
            }
        }
    }
}

// ─── Per-connection handling ──────────────────────────────────────────────────

async fn handle_connection(mut stream: TcpStream, ctx: &DeckContext) -> io::Result<()> {
    let raw = read_request(&mut stream, ctx.config.read_timeout).await?;
    if raw.is_empty() {
        debug!("peer closed without sending a request");
        return Ok(());
    }

    let response = match Request::parse(&raw) {
        Ok(req) => {
            debug!(method = %req.method, path = %req.raw_path, query = %req.query, "request");
            route(&req, ctx).await
        }
        Err(e) => {
            debug!(err = %e, "unparseable request");
            response::build(response::BODY_BAD_REQUEST.as_bytes())
        }
    };

    time::timeout(ctx.config.write_timeout, stream.write_all(&response))
        .await
        .map_err(|_| io::Error::new(ErrorKind::TimedOut, "write timed out"))??;
    stream.shutdown().await
}

/// Reads until the peer closes or no more data is immediately available.
/// Only the first read waits (bounded by the configured timeout); afterwards
/// the socket is drained, never blocked on. Headers and bodies are consumed
/// here but never interpreted.
async fn read_request(stream: &mut TcpStream, timeout: Duration) -> io::Result<String> {
    let mut buf = [0u8; 1024];
    let mut raw = Vec::new();

    let n = time::timeout(timeout, stream.read(&mut buf))
        .await
        .map_err(|_| io::Error::new(ErrorKind::TimedOut, "read timed out"))??;
    raw.extend_from_slice(&buf[..n]);

    if n > 0 {
        loop {
            match stream.try_read(&mut buf) {
                Ok(0) => break,
                Ok(n) => raw.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
    }
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn resolve_target(req: &Request, ctx: &DeckContext) -> ResolvedTarget {
    if req.query.is_empty() {
        ResolvedTarget::StaticFile(ctx.resolver.resolve(&req.raw_path))
    } else if req.query == MANIFEST_QUERY {
        ResolvedTarget::ManifestSnapshot
    } else {
        ResolvedTarget::CommandInvocation(req.query.clone())
    }
}

async fn route(req: &Request, ctx: &DeckContext) -> Vec<u8> {
    if req.method != "GET" {
        // Any other method: empty body under the standard headers.
        debug!(method = %req.method, "unsupported method");
        return response::build(&[]);
    }

    match resolve_target(req, ctx) {
        ResolvedTarget::StaticFile(path) => {
            debug!(request = %req.raw_path, physical = %path.display(), "serving static file");
            match tokio::fs::read(&path).await {
                Ok(body) => response::build(&body),
                Err(e) => {
                    warn!(path = %path.display(), err = %e, "resolved file unreadable");
                    response::build(response::BODY_UNREADABLE.as_bytes())
                }
            }
        }
        ResolvedTarget::ManifestSnapshot => {
            response::build(ctx.registry.snapshot_json().as_bytes())
        }
        ResolvedTarget::CommandInvocation(token) => {
            match dispatch::invoke(&ctx.registry, &token) {
                Ok(()) => response::build(response::BODY_OK.as_bytes()),
                Err(e @ DispatchError::UnknownToken(_)) => {
                    warn!(err = %e, "command dispatch failed");
                    response::build(response::BODY_UNKNOWN_COMMAND.as_bytes())
                }
                Err(e) => {
                    warn!(err = %e, "command dispatch failed");
                    response::build(response::BODY_LAUNCH_FAILURE.as_bytes())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::deck::CommandRegistry;
    use std::fs;
    use tempfile::TempDir;

    fn make_ctx() -> (TempDir, Arc<DeckContext>) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("www");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("index.html"), "top").unwrap();
        fs::write(dir.path().join("icon.png"), b"icon").unwrap();

        let deck_file = dir.path().join("deck.csv");
        fs::write(
            &deck_file,
            format!(
                "Terminal,CMD-A,{},/bin/true\n",
                dir.path().join("icon.png").display()
            ),
        )
        .unwrap();

        let config = Arc::new(ServerConfig {
            web_root: root,
            deck_file,
            snapshot_file: dir.path().join("deck.json"),
            ..ServerConfig::default()
        });
        let registry = Arc::new(CommandRegistry::load(&config).unwrap());
        let ctx = Arc::new(DeckContext::new(config, registry).unwrap());
        (dir, ctx)
    }

    fn get(target: &str) -> Request {
        Request::parse(&format!("GET {target} HTTP/1.0\r\n\r\n")).unwrap()
    }

    #[test]
    fn empty_query_targets_a_static_file() {
        let (_dir, ctx) = make_ctx();
        assert_eq!(
            resolve_target(&get("/"), &ctx),
            ResolvedTarget::StaticFile(ctx.resolver.root().join("index.html"))
        );
    }

    #[test]
    fn manifest_query_targets_the_snapshot() {
        let (_dir, ctx) = make_ctx();
        assert_eq!(
            resolve_target(&get("/?REQTOP"), &ctx),
            ResolvedTarget::ManifestSnapshot
        );
    }

    #[test]
    fn any_other_query_is_a_command_token() {
        let (_dir, ctx) = make_ctx();
        assert_eq!(
            resolve_target(&get("/?CMD-A"), &ctx),
            ResolvedTarget::CommandInvocation("CMD-A".to_string())
        );
        // Unknown tokens still resolve to an invocation; the miss surfaces
        // at dispatch time as a defined error body.
        assert_eq!(
            resolve_target(&get("/index.html?CMD-NOPE"), &ctx),
            ResolvedTarget::CommandInvocation("CMD-NOPE".to_string())
        );
    }

    #[tokio::test]
    async fn non_get_gets_an_empty_success_body() {
        let (_dir, ctx) = make_ctx();
        let req = Request::parse("POST / HTTP/1.0\r\n\r\n").unwrap();
        let response = route(&req, &ctx).await;
        assert_eq!(response, response::build(&[]));
    }
}

use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::info;

use super::CommandRegistry;

/// Dispatch-time failures. Both are surfaced to the client as a defined
/// error body; neither ends the connection loop.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown command token {0:?}")]
    UnknownToken(String),
    #[error("cannot launch {}: {source}", .path.display())]
    Launch { path: PathBuf, source: io::Error },
}

/// Launches the executable mapped to `token`, detached from the server:
/// stdio is nulled and the child handle is dropped. No exit status or
/// output is ever observed, and launches are never queued or retried.
pub fn invoke(registry: &CommandRegistry, token: &str) -> Result<(), DispatchError> {
    let path = registry
        .executable(token)
        .ok_or_else(|| DispatchError::UnknownToken(token.to_string()))?;

    Command::new(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| DispatchError::Launch {
            path: path.to_path_buf(),
            source,
        })?;

    info!(token, path = %path.display(), "command launched");
    Ok(())
}

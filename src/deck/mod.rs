pub mod dispatch;

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ServerConfig;

// ─── Manifest data ────────────────────────────────────────────────────────────

/// One shortcut as served to the deck UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(rename = "Title")]
    pub title: String,
    /// The dispatch key a client sends back to launch this shortcut.
    #[serde(rename = "Cmd")]
    pub token: String,
    /// Icon file contents, base64-encoded.
    #[serde(rename = "Icon")]
    pub icon: String,
}

// ─── Errors ───────────────────────────────────────────────────────────────────

/// Manifest construction failures. All of these are startup-fatal: the deck
/// either loads completely or not at all.
#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    #[error("cannot read deck manifest {}: {source}", .path.display())]
    Manifest { path: PathBuf, source: io::Error },
    #[error("{}:{line}: expected 4 comma-separated fields, found {found}", .path.display())]
    MalformedLine {
        path: PathBuf,
        line: usize,
        found: usize,
    },
    #[error("{}:{line}: cannot read icon file {}: {source}", .path.display(), .icon.display())]
    Icon {
        path: PathBuf,
        line: usize,
        icon: PathBuf,
        source: io::Error,
    },
    #[error("cannot serialize deck manifest: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("cannot write manifest snapshot {}: {source}", .path.display())]
    Snapshot { path: PathBuf, source: io::Error },
}

// ─── CommandRegistry ──────────────────────────────────────────────────────────

/// The deck's shortcut table: the ordered manifest entries, the token →
/// executable mapping, and the serialized snapshot served on manifest
/// requests. Built once before the server starts; immutable afterwards, so
/// it is shared across connections without locking. Manifest edits are not
/// observed until restart.
#[derive(Debug)]
pub struct CommandRegistry {
    entries: Vec<ManifestEntry>,
    commands: HashMap<String, PathBuf>,
    snapshot: String,
}

impl CommandRegistry {
    /// Reads the deck manifest line by line. Each line holds exactly four
    /// comma-separated fields — title, token, icon path, executable path —
    /// with no quoting, so a comma inside any field is rejected here rather
    /// than misparsed. Icons are read and base64-encoded eagerly; the
    /// serialized manifest is persisted to the snapshot file.
    pub fn load(config: &ServerConfig) -> Result<Self, DeckError> {
        let path = &config.deck_file;
        let raw = fs::read_to_string(path).map_err(|source| DeckError::Manifest {
            path: path.clone(),
            source,
        })?;

        let mut entries = Vec::new();
        let mut commands = HashMap::new();
        for (idx, line) in raw.lines().enumerate() {
            let line_no = idx + 1;
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != 4 {
                return Err(DeckError::MalformedLine {
                    path: path.clone(),
                    line: line_no,
                    found: fields.len(),
                });
            }

            let icon_path = Path::new(fields[2]);
            let icon_raw = fs::read(icon_path).map_err(|source| DeckError::Icon {
                path: path.clone(),
                line: line_no,
                icon: icon_path.to_path_buf(),
                source,
            })?;

            entries.push(ManifestEntry {
                title: fields[0].to_string(),
                token: fields[1].to_string(),
                icon: BASE64.encode(icon_raw),
            });
            // Duplicate token: the later line wins.
            commands.insert(fields[1].to_string(), PathBuf::from(fields[3]));
        }

        let snapshot = serde_json::to_string(&entries)?;
        fs::write(&config.snapshot_file, &snapshot).map_err(|source| DeckError::Snapshot {
            path: config.snapshot_file.clone(),
            source,
        })?;

        info!(
            entries = entries.len(),
            snapshot = %config.snapshot_file.display(),
            "deck manifest loaded"
        );
        Ok(Self {
            entries,
            commands,
            snapshot,
        })
    }

    /// The serialized manifest, exactly as persisted to the snapshot file.
    pub fn snapshot_json(&self) -> &str {
        &self.snapshot
    }

    /// The executable mapped to `token`, if any.
    pub fn executable(&self, token: &str) -> Option<&Path> {
        self.commands.get(token).map(PathBuf::as_path)
    }

    /// Manifest entries in source-file order.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }
}

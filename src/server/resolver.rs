use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::config::ServerConfig;

/// Maps untrusted request paths onto the web root. Every path handed out is
/// lexically contained in the canonicalized root: escapes fall back to the
/// index document, misses to the not-found document.
pub struct PathResolver {
    root: PathBuf,
    index_file: String,
    not_found_file: String,
}

impl PathResolver {
    /// Canonicalizes the web root once, up front. A missing root is a
    /// startup error, not a per-request surprise.
    pub fn new(config: &ServerConfig) -> io::Result<Self> {
        let root = fs::canonicalize(&config.web_root)?;
        Ok(Self {
            root,
            index_file: config.index_file.clone(),
            not_found_file: config.not_found_file.clone(),
        })
    }

    /// The canonical web root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a requested path to a physical path under the root.
    ///
    /// Backslash separators are folded to `/` first, then the candidate is
    /// joined onto the canonical root and lexically normalized; a request
    /// ending in a separator gets the index document appended. Containment
    /// is decided only on the fully normalized form.
    pub fn resolve(&self, raw_path: &str) -> PathBuf {
        let request = raw_path.replace('\\', "/");
        let trailing_separator = request.ends_with('/');

        let mut candidate = normalize(&self.root.join(request.trim_start_matches('/')));
        if trailing_separator {
            candidate.push(&self.index_file);
        }

        if !candidate.starts_with(&self.root) {
            debug!(path = raw_path, "request escapes web root");
            return self.root.join(&self.index_file);
        }
        if candidate.is_file() {
            candidate
        } else {
            self.root.join(&self.not_found_file)
        }
    }
}

/// Lexical normalization: `.` segments are dropped, `..` pops the previous
/// component (saturating at the filesystem root). No filesystem access, so
/// escaping candidates are caught before anything is opened.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// A web root with an index, a page, a subdirectory — and a secret file
    /// outside the root that must never be reachable.
    fn fixture() -> (TempDir, PathResolver) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("www");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("index.html"), "top").unwrap();
        fs::write(root.join("page.html"), "page").unwrap();
        fs::write(root.join("sub").join("index.html"), "sub").unwrap();
        fs::write(dir.path().join("secret.txt"), "secret").unwrap();

        let config = ServerConfig {
            web_root: root,
            ..ServerConfig::default()
        };
        let resolver = PathResolver::new(&config).unwrap();
        (dir, resolver)
    }

    #[test]
    fn serves_an_existing_file() {
        let (_dir, resolver) = fixture();
        assert_eq!(
            resolver.resolve("/page.html"),
            resolver.root().join("page.html")
        );
    }

    #[test]
    fn root_request_serves_the_index() {
        let (_dir, resolver) = fixture();
        assert_eq!(resolver.resolve("/"), resolver.root().join("index.html"));
    }

    #[test]
    fn trailing_separator_appends_the_index() {
        let (_dir, resolver) = fixture();
        assert_eq!(
            resolver.resolve("/sub/"),
            resolver.root().join("sub").join("index.html")
        );
    }

    #[test]
    fn dotdot_that_stays_inside_the_root_is_allowed() {
        let (_dir, resolver) = fixture();
        assert_eq!(
            resolver.resolve("/sub/../page.html"),
            resolver.root().join("page.html")
        );
    }

    #[test]
    fn traversal_falls_back_to_the_index() {
        let (_dir, resolver) = fixture();
        let index = resolver.root().join("index.html");
        assert_eq!(resolver.resolve("/../secret.txt"), index);
        assert_eq!(resolver.resolve("/../../secret.txt"), index);
        assert_eq!(resolver.resolve("/a/../../secret.txt"), index);
        assert_eq!(resolver.resolve("/../../../../../../etc/passwd"), index);
    }

    #[test]
    fn backslash_traversal_is_contained() {
        let (_dir, resolver) = fixture();
        let index = resolver.root().join("index.html");
        assert_eq!(resolver.resolve("\\..\\..\\secret.txt"), index);
        assert_eq!(resolver.resolve("/sub\\..\\..\\secret.txt"), index);
    }

    #[test]
    fn sibling_directory_with_root_prefix_is_not_contained() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("www");
        let sibling = dir.path().join("www2");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&sibling).unwrap();
        fs::write(root.join("index.html"), "top").unwrap();
        fs::write(sibling.join("leak.html"), "leak").unwrap();

        let config = ServerConfig {
            web_root: root,
            ..ServerConfig::default()
        };
        let resolver = PathResolver::new(&config).unwrap();
        assert_eq!(
            resolver.resolve("/../www2/leak.html"),
            resolver.root().join("index.html")
        );
    }

    #[test]
    fn missing_file_serves_the_not_found_document() {
        let (_dir, resolver) = fixture();
        // Default config points not-found at the index document.
        assert_eq!(
            resolver.resolve("/nope.html"),
            resolver.root().join("index.html")
        );
    }

    #[test]
    fn custom_not_found_document_is_used_for_misses() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("www");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("index.html"), "top").unwrap();
        fs::write(root.join("404.html"), "gone").unwrap();

        let config = ServerConfig {
            web_root: root,
            not_found_file: "404.html".to_string(),
            ..ServerConfig::default()
        };
        let resolver = PathResolver::new(&config).unwrap();
        assert_eq!(
            resolver.resolve("/nope.html"),
            resolver.root().join("404.html")
        );
        // Traversal still lands on the index, not the not-found document.
        assert_eq!(
            resolver.resolve("/../../secret"),
            resolver.root().join("index.html")
        );
    }

    #[test]
    fn directory_without_trailing_separator_is_a_miss() {
        let (_dir, resolver) = fixture();
        assert_eq!(resolver.resolve("/sub"), resolver.root().join("index.html"));
    }

    #[test]
    fn missing_web_root_is_a_startup_error() {
        let config = ServerConfig {
            web_root: PathBuf::from("/nonexistent/www"),
            ..ServerConfig::default()
        };
        assert!(PathResolver::new(&config).is_err());
    }

    #[test]
    fn resolution_is_deterministic() {
        let (_dir, resolver) = fixture();
        assert_eq!(resolver.resolve("/page.html"), resolver.resolve("/page.html"));
        assert_eq!(
            resolver.resolve("/sub/"),
            resolver.resolve("/sub/index.html")
        );
    }
}

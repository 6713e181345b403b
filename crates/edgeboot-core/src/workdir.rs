// Working directory layout. Every generated file has exactly one path,
// and the pipeline never writes outside the root.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::CoreError;

/// Files regenerated on every run; stale copies are removed up front.
const GENERATED: [&str; 5] = ["config.json", "boot.log", "tunnel.json", "tunnel.yml", "sub.txt"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workdir {
    root: PathBuf,
}

impl Workdir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn proxy_config(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn tunnel_log(&self) -> PathBuf {
        self.root.join("boot.log")
    }

    pub fn tunnel_credentials(&self) -> PathBuf {
        self.root.join("tunnel.json")
    }

    pub fn tunnel_descriptor(&self) -> PathBuf {
        self.root.join("tunnel.yml")
    }

    pub fn subscription(&self) -> PathBuf {
        self.root.join("sub.txt")
    }

    pub fn binary(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Create the root and remove stale generated files.
    ///
    /// Returns how many files were purged. Cached binaries are left alone.
    pub async fn prepare(&self) -> Result<usize, CoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CoreError::io(&self.root, e))?;

        let mut purged = 0;
        for name in GENERATED {
            let path = self.root.join(name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "purged stale file");
                    purged += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CoreError::io(&path, e)),
            }
        }
        Ok(purged)
    }
}

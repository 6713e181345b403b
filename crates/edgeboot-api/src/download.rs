// Artifact download: one manually followed redirect, streamed to a
// temporary file beside the destination, then renamed into place.

use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Fetches release artifacts onto the local filesystem.
#[derive(Debug, Clone)]
pub struct Downloader {
    http: reqwest::Client,
}

impl Downloader {
    /// Build a downloader with the download transport (30 s connect,
    /// 60 s between reads, client-level redirects disabled).
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            http: TransportConfig::for_downloads().build_client()?,
        })
    }

    /// Wrap an existing client. The client must not follow redirects on
    /// its own or the single-hop rule cannot be enforced.
    pub fn from_reqwest(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Download `url` to `dest` and mark it executable.
    ///
    /// Returns the number of bytes written.
    pub async fn fetch_to(&self, url: &Url, dest: &Path) -> Result<u64, Error> {
        let staging = staging_path(dest, "part");
        let written = self.stream_to(url, &staging).await?;
        set_executable(&staging).await?;
        tokio::fs::rename(&staging, dest)
            .await
            .map_err(|e| Error::io(dest, e))?;
        info!(url = %url, path = %dest.display(), bytes = written, "artifact saved");
        Ok(written)
    }

    /// Download a zip archive from `url`, extract the single member named
    /// `entry` to `dest` (executable), and remove the archive.
    pub async fn fetch_entry(&self, url: &Url, entry: &str, dest: &Path) -> Result<u64, Error> {
        let archive = staging_path(dest, "zip");
        self.stream_to(url, &archive).await?;

        let staging = staging_path(dest, "part");
        let extracted = {
            let archive = archive.clone();
            let staging = staging.clone();
            let entry = entry.to_owned();
            tokio::task::spawn_blocking(move || extract_entry(&archive, &entry, &staging))
                .await
                .map_err(|e| Error::Archive(format!("extraction task failed: {e}")))?
        };

        let _ = tokio::fs::remove_file(&archive).await;
        let written = match extracted {
            Ok(n) => n,
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(e);
            }
        };

        set_executable(&staging).await?;
        tokio::fs::rename(&staging, dest)
            .await
            .map_err(|e| Error::io(dest, e))?;
        info!(url = %url, entry, path = %dest.display(), bytes = written, "artifact extracted");
        Ok(written)
    }

    /// GET `url`, following at most one redirect.
    async fn get(&self, url: &Url) -> Result<reqwest::Response, Error> {
        let resp = self.http.get(url.clone()).send().await?;
        if !resp.status().is_redirection() {
            return check_status(resp);
        }

        let next = redirect_target(url, &resp)?;
        debug!(from = %url, to = %next, "following redirect");
        let resp = self.http.get(next.clone()).send().await?;
        if resp.status().is_redirection() {
            return Err(Error::Redirect {
                url: next.to_string(),
                reason: "more than one redirect".into(),
            });
        }
        check_status(resp)
    }

    async fn stream_to(&self, url: &Url, path: &Path) -> Result<u64, Error> {
        let mut resp = self.get(url).await?;
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| Error::io(path, e))?;

        let mut written: u64 = 0;
        let result = async {
            while let Some(chunk) = resp.chunk().await? {
                file.write_all(&chunk).await.map_err(|e| Error::io(path, e))?;
                written += u64::try_from(chunk.len()).unwrap_or(u64::MAX);
            }
            file.flush().await.map_err(|e| Error::io(path, e))?;
            Ok::<_, Error>(())
        }
        .await;

        if let Err(e) = result {
            drop(file);
            let _ = tokio::fs::remove_file(path).await;
            return Err(e);
        }
        Ok(written)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(Error::Status {
            status: status.as_u16(),
            url: resp.url().to_string(),
        })
    }
}

fn redirect_target(from: &Url, resp: &reqwest::Response) -> Result<Url, Error> {
    let location = resp
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Redirect {
            url: from.to_string(),
            reason: format!("HTTP {} without Location header", resp.status().as_u16()),
        })?;
    Ok(from.join(location)?)
}

/// Sibling path in the destination directory so the final rename stays on
/// one filesystem.
fn staging_path(dest: &Path, suffix: &str) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.{}.{suffix}", std::process::id()))
}

fn extract_entry(archive: &Path, entry: &str, out: &Path) -> Result<u64, Error> {
    let file = std::fs::File::open(archive).map_err(|e| Error::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file)?;

    // Release archives sometimes nest the binary in a folder.
    let name = zip
        .file_names()
        .find(|n| *n == entry || n.rsplit('/').next() == Some(entry))
        .map(str::to_owned)
        .ok_or_else(|| Error::Archive(format!("entry '{entry}' not found")))?;

    let mut member = zip.by_name(&name)?;
    let mut target = std::fs::File::create(out).map_err(|e| Error::io(out, e))?;
    let written = std::io::copy(&mut member, &mut target)
        .map_err(|e| Error::Archive(format!("extracting '{name}': {e}")))?;
    target.flush().map_err(|e| Error::io(out, e))?;
    Ok(written)
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| Error::io(path, e))
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> Result<(), Error> {
    Ok(())
}

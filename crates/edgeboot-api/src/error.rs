use thiserror::Error;

/// Top-level error type for the `edgeboot-api` crate.
///
/// Covers the outbound HTTP surfaces: artifact downloads, geo lookups and
/// registry notifications. `edgeboot-core` decides which of these are fatal.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Could not construct the HTTP client.
    #[error("HTTP client setup failed: {0}")]
    ClientBuild(String),

    /// Non-success response that the caller did not expect.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    // ── Download ────────────────────────────────────────────────────
    /// A redirect pointed somewhere we refuse to go.
    #[error("redirect from {url}: {reason}")]
    Redirect { url: String, reason: String },

    /// Local filesystem failure while writing an artifact.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The archive could not be read or lacks the requested entry.
    #[error("archive error: {0}")]
    Archive(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

// Extractor trait and common types

use std::fmt;
use std::io;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Deserialize;
use url::Url;

use crate::downloader::errors::ExtractionError;
use crate::downloader::models::{MediaMetadata, MediaRequest};

/// Extraction backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorMode {
    /// CLI binary yt-dlp (faster, no Python dependency)
    Cli,
    /// Python module yt_dlp (`python3 -m yt_dlp`)
    Python,
    /// HTTP extraction helper service
    Remote,
    /// CLI first, Python when the binary is missing
    #[default]
    Auto,
}

impl fmt::Display for ExtractorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "cli"),
            Self::Python => write!(f, "python"),
            Self::Remote => write!(f, "remote"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for ExtractorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cli" => Ok(Self::Cli),
            "python" => Ok(Self::Python),
            "remote" => Ok(Self::Remote),
            "auto" => Ok(Self::Auto),
            other => Err(format!(
                "unknown extractor mode '{}' (expected cli, python, remote or auto)",
                other
            )),
        }
    }
}

/// Configuration for the extractor backends (`[extractor]` table)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Which backend serves requests
    pub mode: ExtractorMode,
    /// Explicit yt-dlp binary; discovered when unset
    pub ytdlp_path: Option<String>,
    /// Python interpreter for the python backend
    pub python: Option<String>,
    /// Base URL of the extraction helper (remote backend)
    pub remote_url: Option<String>,
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    /// Path to cookies.txt file
    pub cookies_path: Option<String>,
    /// YouTube player client (android, web, tv)
    pub player_client: Option<String>,
    /// yt-dlp `--socket-timeout`
    pub socket_timeout_secs: u32,
    /// Upper bound for a metadata lookup
    pub metadata_timeout_secs: u64,
    /// Appended to every yt-dlp invocation before the URL
    pub extra_args: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            mode: ExtractorMode::Auto,
            ytdlp_path: None,
            python: None,
            remote_url: None,
            proxy: None,
            cookies_path: None,
            player_client: None,
            socket_timeout_secs: 20,
            metadata_timeout_secs: 30,
            extra_args: Vec::new(),
        }
    }
}

impl ExtractorConfig {
    pub fn with_mode(mut self, mode: ExtractorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_ytdlp_path(mut self, path: Option<String>) -> Self {
        self.ytdlp_path = path;
        self
    }

    pub fn with_remote_url(mut self, url: Option<String>) -> Self {
        self.remote_url = url;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }
}

/// Raw media bytes, pulled on demand
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Control over the producer behind a `MediaStream`
#[async_trait]
pub trait StreamHandle: Send {
    /// Stop the producer now. Must not block; safe to call more than once.
    fn terminate(&mut self);

    /// Wait up to `grace` for the producer to exit and report its status.
    async fn finish(&mut self, grace: Duration) -> Result<(), ExtractionError>;
}

/// A live bitstream for one rendition
pub struct MediaStream {
    pub bytes: ByteStream,
    pub handle: Box<dyn StreamHandle>,
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream").finish_non_exhaustive()
    }
}

/// Trait for extractors
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    /// Resolve normalized metadata for a URL
    async fn fetch_metadata(&self, url: &Url) -> Result<MediaMetadata, ExtractionError>;

    /// Start producing the requested rendition
    async fn open_stream(&self, request: &MediaRequest) -> Result<MediaStream, ExtractionError>;
}

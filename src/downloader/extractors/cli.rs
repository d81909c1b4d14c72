// CLI Extractor - runs yt-dlp as a subprocess
//
// The same argument builder serves the native binary (`yt-dlp ...`) and the
// Python module (`python3 -m yt_dlp ...`); only the launcher differs.
//
// Metadata: `--dump-single-json`, whole stdout collected under a deadline.
// Stream:   `-f <spec> -o -`, stdout relayed chunk by chunk.

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::io::ReaderStream;
use url::Url;

use super::traits::{Extractor, ExtractorConfig, MediaStream};
use crate::downloader::errors::ExtractionError;
use crate::downloader::format_selector::FormatSelector;
use crate::downloader::models::{MediaMetadata, MediaRequest};
use crate::downloader::normalizer::metadata_from_json;
use crate::downloader::process::ExtractorProcess;
use crate::downloader::tools::resolve_ytdlp_binary;
use crate::downloader::utils::run_output_with_timeout;

/// Read size for the media pipe
pub const CHUNK_SIZE: usize = 64 * 1024;

/// yt-dlp based extractor
pub struct YtDlpExtractor {
    name: &'static str,
    program: String,
    /// Arguments placed before any yt-dlp option (`-m yt_dlp` for Python)
    launcher_args: Vec<String>,
    config: ExtractorConfig,
}

impl YtDlpExtractor {
    pub fn new(
        name: &'static str,
        program: impl Into<String>,
        launcher_args: Vec<String>,
        config: ExtractorConfig,
    ) -> Self {
        Self {
            name,
            program: program.into(),
            launcher_args,
            config,
        }
    }

    /// Native binary, resolved from config, well-known paths or PATH
    pub fn cli(config: ExtractorConfig) -> Self {
        let program = resolve_ytdlp_binary(config.ytdlp_path.as_deref());
        Self::new("cli", program, Vec::new(), config)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Options shared by both modes
    fn common_args(&self) -> Vec<String> {
        let mut args = self.launcher_args.clone();
        args.extend(
            [
                "--no-playlist",
                "--no-warnings",
                "--no-cache-dir",
                "--socket-timeout",
            ]
            .iter()
            .map(ToString::to_string),
        );
        args.push(self.config.socket_timeout_secs.to_string());

        // Proxy
        if let Some(proxy) = &self.config.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        // Cookies
        if let Some(path) = &self.config.cookies_path {
            args.push("--cookies".to_string());
            args.push(path.clone());
        }

        // Player client for YouTube
        if let Some(client) = &self.config.player_client {
            args.push("--extractor-args".to_string());
            args.push(format!("youtube:player_client={}", client));
        }

        args.extend(self.config.extra_args.iter().cloned());
        args
    }

    /// Build metadata arguments. The URL always follows `--`.
    pub fn metadata_args(&self, url: &Url) -> Vec<String> {
        let mut args = self.common_args();
        args.push("--dump-single-json".to_string());
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    /// Build streaming arguments: selected rendition to stdout, no temp files.
    pub fn stream_args(&self, request: &MediaRequest) -> Vec<String> {
        let mut args = self.common_args();
        args.extend([
            "-f".to_string(),
            FormatSelector::format_spec(request.rendition()),
            "-o".to_string(),
            "-".to_string(),
            "--no-part".to_string(),
            "--no-progress".to_string(),
            "--".to_string(),
            request.url().to_string(),
        ]);
        args
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_metadata(&self, url: &Url) -> Result<MediaMetadata, ExtractionError> {
        let args = self.metadata_args(url);
        tracing::debug!(extractor = self.name, program = %self.program, ?args, "Fetching metadata");

        let output =
            run_output_with_timeout(&self.program, &args, self.config.metadata_timeout()).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::from_exit(&self.program, output.status, &stderr));
        }

        metadata_from_json(&output.stdout)
    }

    async fn open_stream(&self, request: &MediaRequest) -> Result<MediaStream, ExtractionError> {
        let args = self.stream_args(request);
        tracing::debug!(extractor = self.name, program = %self.program, ?args, "Opening stream");

        let (process, stdout) = ExtractorProcess::spawn(&self.program, &args)?;

        Ok(MediaStream {
            bytes: ReaderStream::with_capacity(stdout, CHUNK_SIZE).boxed(),
            handle: Box::new(process),
        })
    }
}

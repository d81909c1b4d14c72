// Extractor module - invokes yt-dlp for metadata and media streams
//
// Backends:
// - cli: native `yt-dlp` binary
// - python: `python3 -m yt_dlp`
// - remote: HTTP extraction helper
// - auto: cli, then python when the binary is missing

use std::sync::Arc;

mod cli;
pub mod diagnostics;
mod orchestrator;
mod python;
mod remote;
mod traits;

pub use cli::{YtDlpExtractor, CHUNK_SIZE};
pub use diagnostics::{diagnose_error, BlockingReason};
pub use orchestrator::FallbackExtractor;
pub use python::{find_python, python_extractor, ytdlp_module_version};
pub use remote::RemoteExtractor;
pub use traits::{ByteStream, Extractor, ExtractorConfig, ExtractorMode, MediaStream, StreamHandle};

use crate::downloader::errors::ExtractionError;

/// Build the extractor selected by `config.mode`
pub fn build_extractor(config: &ExtractorConfig) -> Result<Arc<dyn Extractor>, ExtractionError> {
    let extractor: Arc<dyn Extractor> = match config.mode {
        ExtractorMode::Cli => Arc::new(YtDlpExtractor::cli(config.clone())),
        ExtractorMode::Python => Arc::new(python_extractor(config.clone())),
        ExtractorMode::Remote => {
            let base = config.remote_url.as_deref().ok_or_else(|| {
                ExtractionError::ExtractorUnavailable("remote backend requires remote_url".to_string())
            })?;
            Arc::new(RemoteExtractor::new(base, config)?)
        }
        ExtractorMode::Auto => {
            let auto = FallbackExtractor::new(vec![
                Arc::new(YtDlpExtractor::cli(config.clone())),
                Arc::new(python_extractor(config.clone())),
            ]);
            tracing::debug!(backends = ?auto.backend_names(), "Extractor fallback order");
            Arc::new(auto)
        }
    };

    tracing::info!(mode = %config.mode, extractor = extractor.name(), "Extractor ready");
    Ok(extractor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_each_mode() {
        for (mode, name) in [
            (ExtractorMode::Cli, "cli"),
            (ExtractorMode::Python, "python"),
            (ExtractorMode::Auto, "auto"),
        ] {
            let config = ExtractorConfig::default().with_mode(mode);
            assert_eq!(build_extractor(&config).unwrap().name(), name);
        }
    }

    #[test]
    fn test_remote_requires_url() {
        let config = ExtractorConfig::default().with_mode(ExtractorMode::Remote);
        assert!(build_extractor(&config).is_err());

        let config = config.with_remote_url(Some("http://127.0.0.1:5000".into()));
        assert_eq!(build_extractor(&config).unwrap().name(), "remote");
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("python".parse::<ExtractorMode>(), Ok(ExtractorMode::Python));
        assert_eq!("AUTO".parse::<ExtractorMode>(), Ok(ExtractorMode::Auto));
        assert!("lux".parse::<ExtractorMode>().is_err());
    }
}

// Python launcher - runs yt-dlp as `python3 -m yt_dlp`
//
// Useful when only the pip package is installed, or when the module is
// newer than the packaged binary.

use std::time::Duration;

use super::cli::YtDlpExtractor;
use super::traits::ExtractorConfig;
use crate::downloader::utils::run_output_with_timeout;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Find Python interpreter: config, then `YTDLP_PYTHON`, then `python3` on PATH
pub fn find_python(configured: Option<&str>) -> String {
    if let Some(path) = configured.filter(|p| !p.trim().is_empty()) {
        return path.to_string();
    }

    // Allow override via environment variable
    if let Ok(custom) = std::env::var("YTDLP_PYTHON") {
        if !custom.trim().is_empty() {
            return custom;
        }
    }

    which::which("python3")
        .ok()
        .and_then(|p| p.to_str().map(ToString::to_string))
        .unwrap_or_else(|| "python3".to_string())
}

/// yt-dlp through the Python module
pub fn python_extractor(config: ExtractorConfig) -> YtDlpExtractor {
    let python = find_python(config.python.as_deref());
    YtDlpExtractor::new(
        "python",
        python,
        vec!["-m".to_string(), "yt_dlp".to_string()],
        config,
    )
}

/// Version of the installed yt_dlp module, if importable
pub async fn ytdlp_module_version(python: &str) -> Option<String> {
    let args = vec![
        "-c".to_string(),
        "import yt_dlp.version; print(yt_dlp.version.__version__)".to_string(),
    ];

    match run_output_with_timeout(python, &args, PROBE_TIMEOUT).await {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Some(version).filter(|v| !v.is_empty())
        }
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(python, error = %e, "yt_dlp module probe failed");
            None
        }
    }
}

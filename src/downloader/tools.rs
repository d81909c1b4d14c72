// Tool discovery - where the extractor lives and which version it is

use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use super::extractors::{find_python, ytdlp_module_version, ExtractorConfig};
use super::utils::run_output_with_timeout;

const YTDLP_BINARY: &str = "yt-dlp";
const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    /// Native yt-dlp binary
    YtDlp,
    /// yt_dlp Python module
    YtDlpModule,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::YtDlpModule => "python -m yt_dlp",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

/// Resolve the yt-dlp binary: configured path, well-known install
/// locations, then PATH. Falls back to the bare name so the spawn error
/// reports the tool as unavailable.
pub fn resolve_ytdlp_binary(configured: Option<&str>) -> String {
    locate_ytdlp_binary(configured).unwrap_or_else(|| YTDLP_BINARY.to_string())
}

fn locate_ytdlp_binary(configured: Option<&str>) -> Option<String> {
    if let Some(path) = configured.filter(|p| !p.trim().is_empty()) {
        return Some(path.to_string());
    }

    let common_paths = [
        "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
        "/usr/local/bin/yt-dlp",    // Homebrew on Intel Mac, pip --user installs
        "/usr/bin/yt-dlp",          // System installation
    ];

    for path in common_paths {
        if Path::new(path).exists() {
            return Some(path.to_string());
        }
    }

    which::which(YTDLP_BINARY)
        .ok()
        .and_then(|p| p.to_str().map(ToString::to_string))
}

/// `<program> --version`, first line of stdout
pub async fn binary_version(program: &str) -> Option<String> {
    let args = vec!["--version".to_string()];
    match run_output_with_timeout(program, &args, VERSION_TIMEOUT).await {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(|line| line.trim().to_string())
            .filter(|v| !v.is_empty()),
        _ => None,
    }
}

/// Availability of every local extractor backend
pub async fn detect_tools(config: &ExtractorConfig) -> Vec<ToolInfo> {
    let binary = locate_ytdlp_binary(config.ytdlp_path.as_deref());
    let cli_version = match &binary {
        Some(path) => binary_version(path).await,
        None => None,
    };

    let python = find_python(config.python.as_deref());
    let module_version = ytdlp_module_version(&python).await;

    vec![
        ToolInfo {
            name: ToolType::YtDlp.as_str().to_string(),
            tool_type: ToolType::YtDlp,
            is_available: cli_version.is_some(),
            version: cli_version,
            path: binary,
        },
        ToolInfo {
            name: ToolType::YtDlpModule.as_str().to_string(),
            tool_type: ToolType::YtDlpModule,
            is_available: module_version.is_some(),
            version: module_version,
            path: Some(python),
        },
    ]
}

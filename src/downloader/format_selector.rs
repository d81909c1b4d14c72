// FormatSelector - maps a client rendition selector to a yt-dlp format spec
//
// Handles:
// - Default (no selector) and "best"
// - Standard resolution caps (1080p, 720p, 480p, 360p)
// - Audio only
// - Explicit format ids / expressions, passed through verbatim
//
// The relay writes to a single pipe, so every preset resolves to a
// pre-muxed format (`best`) rather than a merge (`bv*+ba`), which would
// need ffmpeg and a seekable output.

/// Format spec used when the client does not pick a rendition
pub const DEFAULT_FORMAT_SPEC: &str = "best";

const RESOLUTION_PRESETS: [(&str, u32); 4] =
    [("1080p", 1080), ("720p", 720), ("480p", 480), ("360p", 360)];

pub struct FormatSelector;

impl FormatSelector {
    /// Get format spec for yt-dlp based on the requested rendition
    pub fn format_spec(rendition: Option<&str>) -> String {
        let rendition = match rendition.map(str::trim) {
            None | Some("") => return DEFAULT_FORMAT_SPEC.to_string(),
            Some(r) => r,
        };

        match rendition {
            "best" => DEFAULT_FORMAT_SPEC.to_string(),
            "audio" => "bestaudio/best".to_string(),
            preset => match Self::preset_height(preset) {
                Some(height) => format!("best[height<={}]/best", height),
                // Explicit format id ("18", "137+140") or selector expression
                None => preset.to_string(),
            },
        }
    }

    /// Height cap for a named resolution preset
    pub fn preset_height(rendition: &str) -> Option<u32> {
        RESOLUTION_PRESETS
            .iter()
            .find(|(label, _)| *label == rendition)
            .map(|(_, height)| *height)
    }
}

// Normalizer - extractor metadata to the stable API schema
//
// Rules per format entry:
// - id: format_id, else itag, else "<kind>-<codec>"; entries with none are dropped
// - mime: "<kind>/<codec>" (video codec first), else the raw mime string, else ""
// - quality: format_note, else height, else empty
//
// Source order is preserved. Normalizing the lifted form of a normalized
// value (`RawMetadata::from(&metadata)`) returns the same value.

use super::errors::ExtractionError;
use super::models::{MediaMetadata, QualityLabel, RawFormat, RawMetadata, Rendition};

/// Parse `--dump-single-json` output and normalize it.
pub fn metadata_from_json(stdout: &[u8]) -> Result<MediaMetadata, ExtractionError> {
    let raw: RawMetadata = serde_json::from_slice(stdout)
        .map_err(|e| ExtractionError::MalformedMetadata(format!("Invalid JSON: {}", e)))?;
    Ok(normalize(raw))
}

pub fn normalize(raw: RawMetadata) -> MediaMetadata {
    let renditions = raw
        .formats
        .unwrap_or_default()
        .into_iter()
        .filter_map(to_rendition)
        .collect();

    MediaMetadata {
        title: raw.title,
        thumbnail_url: non_empty(raw.thumbnail),
        duration_seconds: raw.duration.filter(|d| d.is_finite() && *d >= 0.0),
        renditions,
    }
}

fn to_rendition(format: RawFormat) -> Option<Rendition> {
    let codec = known_codec(&format);

    let id = non_empty(format.format_id)
        .or_else(|| non_empty(format.itag))
        .or_else(|| codec.as_ref().map(|(kind, codec)| format!("{}-{}", kind, codec)))?;

    let media_type = match codec {
        Some((kind, codec)) => format!("{}/{}", kind, codec),
        None => non_empty(format.mime)
            .or_else(|| non_empty(format.mime_type))
            .unwrap_or_default(),
    };

    let quality_label = match (non_empty(format.format_note), format.height) {
        (Some(note), _) => QualityLabel::Note(note),
        (None, Some(height)) => QualityLabel::Height(height),
        (None, None) => QualityLabel::Empty,
    };

    Some(Rendition {
        id,
        container: format.ext.unwrap_or_default(),
        media_type,
        quality_label,
    })
}

/// yt-dlp writes "none" for an absent stream; treat it like a missing field.
fn known_codec(format: &RawFormat) -> Option<(&'static str, String)> {
    let usable = |codec: &Option<String>| {
        codec
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("none"))
            .map(ToString::to_string)
    };

    usable(&format.vcodec)
        .map(|c| ("video", c))
        .or_else(|| usable(&format.acodec).map(|c| ("audio", c)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

// Common data models for the extractors, the normalizer and the relay

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use super::errors::ValidationError;

lazy_static! {
    // Format ids and yt-dlp selector expressions: `18`, `137+140`, `best[height<=720]/best`
    static ref SELECTOR_RE: Regex = Regex::new(r"^[A-Za-z0-9_+*/\[\]<>=!.,:-]{1,128}$").unwrap();
}

/// A validated request for one media resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    url: Url,
    rendition: Option<String>,
}

impl MediaRequest {
    /// Validate client input. Only absolute http(s) URLs are accepted; the
    /// rendition selector must not look like a command-line option.
    pub fn new(url: &str, rendition: Option<&str>) -> Result<Self, ValidationError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ValidationError::MissingUrl);
        }

        let parsed =
            Url::parse(url).map_err(|e| ValidationError::InvalidUrl(format!("{}: {}", url, e)))?;

        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
        }

        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(ValidationError::InvalidUrl(format!("{}: missing host", url)));
        }

        let rendition = match rendition.map(str::trim).filter(|s| !s.is_empty()) {
            None => None,
            Some(s) if s.starts_with('-') || !SELECTOR_RE.is_match(s) => {
                return Err(ValidationError::InvalidSelector(s.to_string()));
            }
            Some(s) => Some(s.to_string()),
        };

        Ok(Self {
            url: parsed,
            rendition,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Explicit rendition id or selector; `None` means the extractor's default.
    pub fn rendition(&self) -> Option<&str> {
        self.rendition.as_deref()
    }
}

/// Normalized metadata returned by `POST /metadata`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaMetadata {
    pub title: String,
    #[serde(rename = "thumbnail")]
    pub thumbnail_url: Option<String>,
    #[serde(rename = "duration", serialize_with = "serialize_duration")]
    pub duration_seconds: Option<f64>,
    #[serde(rename = "formats")]
    pub renditions: Vec<Rendition>,
}

/// One selectable variant of a media resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rendition {
    /// Extractor-native format id (e.g. "18", "137")
    pub id: String,
    #[serde(rename = "ext")]
    pub container: String,
    #[serde(rename = "mime")]
    pub media_type: String,
    #[serde(rename = "quality")]
    pub quality_label: QualityLabel,
}

/// Human-readable quality. A bare height is kept numeric on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QualityLabel {
    /// Extractor note such as "720p60" or "medium"
    Note(String),
    /// Pixel height when no note exists
    Height(u32),
    #[default]
    Empty,
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Note(note) => f.write_str(note),
            Self::Height(height) => write!(f, "{}", height),
            Self::Empty => Ok(()),
        }
    }
}

impl Serialize for QualityLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Note(note) => serializer.serialize_str(note),
            Self::Height(height) => serializer.serialize_u32(*height),
            Self::Empty => serializer.serialize_str(""),
        }
    }
}

// yt-dlp reports whole-second durations as integers; keep them integral in JSON
fn serialize_duration<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) if d.fract() == 0.0 && *d >= 0.0 && *d < u64::MAX as f64 => {
            serializer.serialize_u64(*d as u64)
        }
        Some(d) => serializer.serialize_f64(*d),
        None => serializer.serialize_none(),
    }
}

/// Extractor output schema (`yt-dlp --dump-single-json`). Only the fields
/// the normalizer reads are declared; everything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawMetadata {
    pub title: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub formats: Option<Vec<RawFormat>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawFormat {
    #[serde(default, deserialize_with = "lenient_id")]
    pub format_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub itag: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub mime: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub format_note: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl From<&MediaMetadata> for RawMetadata {
    /// Lift normalized metadata back into the extractor schema.
    fn from(metadata: &MediaMetadata) -> Self {
        let formats = metadata
            .renditions
            .iter()
            .map(|r| RawFormat {
                format_id: Some(r.id.clone()),
                ext: Some(r.container.clone()).filter(|s| !s.is_empty()),
                mime: Some(r.media_type.clone()).filter(|s| !s.is_empty()),
                format_note: match &r.quality_label {
                    QualityLabel::Note(note) => Some(note.clone()),
                    _ => None,
                },
                height: match r.quality_label {
                    QualityLabel::Height(h) => Some(h),
                    _ => None,
                },
                ..RawFormat::default()
            })
            .collect();

        Self {
            title: metadata.title.clone(),
            thumbnail: metadata.thumbnail_url.clone(),
            duration: metadata.duration_seconds,
            formats: Some(formats),
        }
    }
}

/// Accept ids as strings or numbers (`"18"` and `18` are the same format).
pub(crate) fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Id>::deserialize(deserializer)?.map(|id| match id {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    }))
}

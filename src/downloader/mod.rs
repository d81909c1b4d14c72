// Downloader module - metadata resolution and stream relay on top of yt-dlp

pub mod errors;
pub mod extractors;
pub mod format_selector;
pub mod models;
pub mod normalizer;
pub mod process;
pub mod relay;
pub mod tools;
pub mod utils;

pub use errors::{ExtractionError, ValidationError};
pub use extractors::{build_extractor, BlockingReason, Extractor, ExtractorConfig, ExtractorMode};
pub use models::{MediaMetadata, MediaRequest, QualityLabel, RawMetadata, Rendition};
pub use normalizer::normalize;
pub use relay::{RelayError, RelaySession, RelaySettings, RelayState, StreamRelay};

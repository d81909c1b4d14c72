// Extractor Orchestrator - ordered fallback across backends
//
// Strategy:
// 1. Try backends in order (CLI binary first, then the Python module)
// 2. Move on only when a backend is unavailable (tool missing)
// 3. Any other failure is final: retrying a bad URL on a second backend
//    would only double the latency

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use super::traits::{Extractor, MediaStream};
use crate::downloader::errors::ExtractionError;
use crate::downloader::models::{MediaMetadata, MediaRequest};

pub struct FallbackExtractor {
    backends: Vec<Arc<dyn Extractor>>,
}

impl FallbackExtractor {
    pub fn new(backends: Vec<Arc<dyn Extractor>>) -> Self {
        Self { backends }
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    fn exhausted(last: Option<ExtractionError>) -> ExtractionError {
        last.unwrap_or_else(|| ExtractionError::ExtractorUnavailable("No extractor configured".to_string()))
    }
}

#[async_trait]
impl Extractor for FallbackExtractor {
    fn name(&self) -> &'static str {
        "auto"
    }

    async fn fetch_metadata(&self, url: &Url) -> Result<MediaMetadata, ExtractionError> {
        let mut last = None;
        for backend in &self.backends {
            match backend.fetch_metadata(url).await {
                Err(ExtractionError::ExtractorUnavailable(reason)) => {
                    tracing::info!(backend = backend.name(), %reason, "Extractor unavailable, trying next");
                    last = Some(ExtractionError::ExtractorUnavailable(reason));
                }
                result => return result,
            }
        }
        Err(Self::exhausted(last))
    }

    async fn open_stream(&self, request: &MediaRequest) -> Result<MediaStream, ExtractionError> {
        let mut last = None;
        for backend in &self.backends {
            match backend.open_stream(request).await {
                Err(ExtractionError::ExtractorUnavailable(reason)) => {
                    tracing::info!(backend = backend.name(), %reason, "Extractor unavailable, trying next");
                    last = Some(ExtractionError::ExtractorUnavailable(reason));
                }
                result => return result,
            }
        }
        Err(Self::exhausted(last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        name: &'static str,
        result: Result<MediaMetadata, ExtractionError>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(name: &'static str, result: Result<MediaMetadata, ExtractionError>) -> Arc<Self> {
            Arc::new(Self {
                name,
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Extractor for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch_metadata(&self, _url: &Url) -> Result<MediaMetadata, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }

        async fn open_stream(&self, _request: &MediaRequest) -> Result<MediaStream, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ExtractionError::ExtractorUnavailable(self.name.to_string()))
        }
    }

    fn metadata(title: &str) -> MediaMetadata {
        MediaMetadata {
            title: title.to_string(),
            thumbnail_url: None,
            duration_seconds: None,
            renditions: Vec::new(),
        }
    }

    fn url() -> Url {
        Url::parse("https://example.com/v").unwrap()
    }

    #[tokio::test]
    async fn test_falls_back_when_unavailable() {
        let cli = Fixed::new("cli", Err(ExtractionError::ExtractorUnavailable("missing".into())));
        let python = Fixed::new("python", Ok(metadata("from python")));
        let auto = FallbackExtractor::new(vec![cli.clone(), python.clone()]);

        let result = auto.fetch_metadata(&url()).await.unwrap();
        assert_eq!(result.title, "from python");
        assert_eq!(cli.calls.load(Ordering::SeqCst), 1);
        assert_eq!(python.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_extraction_failure_is_final() {
        let cli = Fixed::new("cli", Err(ExtractionError::failed("Video unavailable")));
        let python = Fixed::new("python", Ok(metadata("unused")));
        let auto = FallbackExtractor::new(vec![cli, python.clone()]);

        assert!(auto.fetch_metadata(&url()).await.is_err());
        assert_eq!(python.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_unavailable_reports_last() {
        let auto = FallbackExtractor::new(vec![
            Fixed::new("cli", Err(ExtractionError::ExtractorUnavailable("a".into()))),
            Fixed::new("python", Err(ExtractionError::ExtractorUnavailable("b".into()))),
        ]);
        let request = MediaRequest::new("https://example.com/v", None).unwrap();

        match auto.open_stream(&request).await {
            Err(ExtractionError::ExtractorUnavailable(reason)) => assert_eq!(reason, "python"),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        assert_eq!(auto.backend_names(), vec!["cli", "python"]);
    }
}

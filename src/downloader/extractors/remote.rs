// Remote Extractor - delegates to an HTTP extraction helper
//
// The helper wraps yt-dlp behind two endpoints:
//   GET {base}/metadata?url=<url>             -> yt-dlp JSON
//   GET {base}/stream?url=<url>&format=<spec> -> raw media bytes
// Errors come back as a non-2xx status, usually with `{"error": "..."}`.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use url::Url;

use super::traits::{Extractor, ExtractorConfig, MediaStream, StreamHandle};
use crate::downloader::errors::ExtractionError;
use crate::downloader::format_selector::FormatSelector;
use crate::downloader::models::{MediaMetadata, MediaRequest};
use crate::downloader::normalizer::metadata_from_json;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct HelperError {
    error: String,
}

pub struct RemoteExtractor {
    client: reqwest::Client,
    base: Url,
    metadata_timeout: Duration,
}

impl RemoteExtractor {
    pub fn new(base_url: &str, config: &ExtractorConfig) -> Result<Self, ExtractionError> {
        let mut base = Url::parse(base_url).map_err(|e| {
            ExtractionError::ExtractorUnavailable(format!("Invalid helper url {}: {}", base_url, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(ExtractionError::ExtractorUnavailable(format!(
                "Invalid helper url {}",
                base_url
            )));
        }
        // Keep the base path when joining endpoint names
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ExtractionError::failed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base,
            metadata_timeout: config.metadata_timeout(),
        })
    }

    fn endpoint(&self, name: &str) -> Result<Url, ExtractionError> {
        self.base
            .join(name)
            .map_err(|e| ExtractionError::failed(format!("Invalid helper endpoint {}: {}", name, e)))
    }

    fn map_error(&self, err: reqwest::Error) -> ExtractionError {
        if err.is_timeout() {
            ExtractionError::ExtractionTimeout(self.metadata_timeout)
        } else if err.is_connect() {
            ExtractionError::ExtractorUnavailable(format!("Helper unreachable: {}", err))
        } else {
            ExtractionError::failed(format!("Helper request failed: {}", err))
        }
    }

    /// Turn a non-2xx helper response into an extraction error
    async fn error_from_response(response: reqwest::Response) -> ExtractionError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        match serde_json::from_str::<HelperError>(&body) {
            Ok(helper) => ExtractionError::from_stderr(&helper.error),
            Err(_) if !body.trim().is_empty() => ExtractionError::from_stderr(&body),
            Err(_) => ExtractionError::failed(format!("Helper responded with {}", status)),
        }
    }
}

#[async_trait]
impl Extractor for RemoteExtractor {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn fetch_metadata(&self, url: &Url) -> Result<MediaMetadata, ExtractionError> {
        let endpoint = self.endpoint("metadata")?;
        tracing::debug!(%endpoint, %url, "Fetching metadata from helper");

        let response = self
            .client
            .get(endpoint)
            .query(&[("url", url.as_str())])
            .timeout(self.metadata_timeout)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body = response.bytes().await.map_err(|e| self.map_error(e))?;
        metadata_from_json(&body)
    }

    async fn open_stream(&self, request: &MediaRequest) -> Result<MediaStream, ExtractionError> {
        let endpoint = self.endpoint("stream")?;
        let format = FormatSelector::format_spec(request.rendition());
        tracing::debug!(%endpoint, url = %request.url(), %format, "Opening helper stream");

        let response = self
            .client
            .get(endpoint)
            .query(&[("url", request.url().as_str()), ("format", format.as_str())])
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e)))
            .boxed();

        Ok(MediaStream {
            bytes,
            handle: Box::new(ConnectionHandle),
        })
    }
}

/// The connection lives inside the byte stream; dropping it closes the
/// socket, and the helper stops its own process.
struct ConnectionHandle;

#[async_trait]
impl StreamHandle for ConnectionHandle {
    fn terminate(&mut self) {}

    async fn finish(&mut self, _grace: Duration) -> Result<(), ExtractionError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use futures::TryStreamExt;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn extractor(base: &str) -> RemoteExtractor {
        RemoteExtractor::new(base, &ExtractorConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_metadata_is_normalized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata"))
            .and(query_param("url", "https://example.com/v"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "title": "T",
                "duration": 10,
                "formats": [{"format_id": "18", "ext": "mp4", "height": 360}]
            })))
            .mount(&server)
            .await;

        let url = Url::parse("https://example.com/v").unwrap();
        let metadata = extractor(&server.uri()).fetch_metadata(&url).await.unwrap();
        assert_eq!(metadata.title, "T");
        assert_eq!(metadata.renditions[0].id, "18");
    }

    #[tokio::test]
    async fn test_base_path_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/metadata"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"title": "T"})))
            .mount(&server)
            .await;

        let url = Url::parse("https://example.com/v").unwrap();
        let metadata = extractor(&format!("{}/api", server.uri()))
            .fetch_metadata(&url)
            .await
            .unwrap();
        assert!(metadata.renditions.is_empty());
    }

    #[tokio::test]
    async fn test_helper_error_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": "ERROR: [youtube] abc: Private video"
            })))
            .mount(&server)
            .await;

        let url = Url::parse("https://example.com/v").unwrap();
        let err = extractor(&server.uri()).fetch_metadata(&url).await.unwrap_err();
        assert_eq!(err.to_string(), "Extraction failed: [youtube] abc: Private video");
        assert_eq!(
            err.reason(),
            Some(crate::downloader::extractors::BlockingReason::PrivateVideo)
        );
    }

    #[tokio::test]
    async fn test_stream_relays_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stream"))
            .and(query_param("format", "18"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"media-bytes".to_vec()))
            .mount(&server)
            .await;

        let request = MediaRequest::new("https://example.com/v", Some("18")).unwrap();
        let mut stream = extractor(&server.uri()).open_stream(&request).await.unwrap();

        let mut body = Vec::new();
        while let Some(chunk) = stream.bytes.try_next().await.unwrap() {
            body.extend_from_slice(&chunk);
        }
        assert_eq!(body, b"media-bytes");
        assert!(stream.handle.finish(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_stream_error_before_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stream"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let request = MediaRequest::new("https://example.com/v", None).unwrap();
        let err = extractor(&server.uri()).open_stream(&request).await.unwrap_err();
        assert_eq!(err.code(), "extraction_failed");
    }

    #[tokio::test]
    async fn test_unreachable_helper_is_unavailable() {
        let url = Url::parse("https://example.com/v").unwrap();
        let err = extractor("http://127.0.0.1:1").fetch_metadata(&url).await.unwrap_err();
        assert_matches!(err, ExtractionError::ExtractorUnavailable(_));
    }
}

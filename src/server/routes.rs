//! `POST /metadata` and `POST /download`.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::error::ApiError;
use super::identity::CurrentUser;
use super::AppContext;
use crate::downloader::models::lenient_id;
use crate::downloader::utils::attachment_filename;
use crate::downloader::{MediaMetadata, MediaRequest, ValidationError};

#[derive(Debug, Deserialize)]
pub struct MetadataBody {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadBody {
    #[serde(default)]
    pub url: Option<String>,
    /// Older clients send `itag` or `format`
    #[serde(default, alias = "itag", alias = "format", deserialize_with = "lenient_id")]
    pub rendition_id: Option<String>,
}

fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ValidationError::MalformedBody(rejection.body_text()).into())
}

/// Resolve metadata for a URL.
pub async fn metadata(
    State(ctx): State<AppContext>,
    user: Option<CurrentUser>,
    payload: Result<Json<MetadataBody>, JsonRejection>,
) -> Result<Json<MediaMetadata>, ApiError> {
    let body = parse_body(payload)?;
    let request = MediaRequest::new(body.url.as_deref().unwrap_or_default(), None)?;

    let _permit = ctx
        .metadata_slots
        .clone()
        .try_acquire_owned()
        .map_err(|_| ApiError::Busy {
            what: "metadata",
            limit: ctx.config.server.max_concurrent_metadata,
        })?;

    tracing::info!(
        url = %request.url(),
        user = user.as_ref().map(|u| u.id.as_str()),
        extractor = ctx.extractor.name(),
        "Metadata requested"
    );

    let metadata = ctx.extractor.fetch_metadata(request.url()).await?;

    tracing::info!(
        url = %request.url(),
        title = %metadata.title,
        renditions = metadata.renditions.len(),
        "Metadata resolved"
    );
    Ok(Json(metadata))
}

/// Relay one rendition as an attachment.
///
/// Headers are only sent once the first chunk is in hand; until then every
/// failure is still a JSON error response.
pub async fn download(
    State(ctx): State<AppContext>,
    user: Option<CurrentUser>,
    payload: Result<Json<DownloadBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = parse_body(payload)?;
    let request = MediaRequest::new(
        body.url.as_deref().unwrap_or_default(),
        body.rendition_id.as_deref(),
    )?;

    tracing::info!(
        url = %request.url(),
        rendition = request.rendition().unwrap_or("best"),
        user = user.as_ref().map(|u| u.id.as_str()),
        "Download requested"
    );

    let filename = attachment_filename(&request);
    let session = ctx.relay.start(request).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        Body::from_stream(session.into_stream()),
    )
        .into_response())
}

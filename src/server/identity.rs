//! Current user, as asserted by the upstream auth layer.
//!
//! Session handling lives in front of this service; it forwards the
//! authenticated user id in `x-forwarded-user`. The id is only logged.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderName, StatusCode};

pub static X_FORWARDED_USER: HeaderName = HeaderName::from_static("x-forwarded-user");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(&X_FORWARDED_USER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| CurrentUser { id: id.to_string() })
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn reads_forwarded_user() {
        let (mut parts, _) = Request::builder()
            .header("x-forwarded-user", " alice ")
            .body(())
            .unwrap()
            .into_parts();
        let user = CurrentUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(user.id, "alice");
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        assert_eq!(
            CurrentUser::from_request_parts(&mut parts, &()).await,
            Err(StatusCode::UNAUTHORIZED)
        );
    }
}

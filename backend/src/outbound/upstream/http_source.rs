//! Reqwest-backed upstream page source.
//!
//! This adapter owns transport details only: collection URL construction,
//! bearer authentication, HTTP status mapping, and JSON:API decoding into
//! domain envelopes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, RETRY_AFTER};
use reqwest::{Client, StatusCode, Url};
use zeroize::Zeroizing;

use super::dto::PageDto;
use crate::domain::ports::{PageRequest, ResourcePageSource, SourceError};
use crate::domain::registry::EntityDescriptor;
use crate::domain::resource::ResourcePage;

const JSON_API_MEDIA_TYPE: &str = "application/vnd.api+json";

/// Page source adapter performing authenticated GETs against one base URL.
pub struct UpstreamHttpSource {
    client: Client,
    base_url: Url,
    token: Zeroizing<String>,
}

impl UpstreamHttpSource {
    /// Build an adapter using a reqwest client with an explicit request
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(
        base_url: Url,
        token: Zeroizing<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn collection_url(
        &self,
        descriptor: &EntityDescriptor,
        page: PageRequest,
    ) -> Result<Url, SourceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SourceError::validation("upstream base URL cannot be a base"))?
            .pop_if_empty()
            .push(descriptor.resource_type);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page[number]", &page.number.to_string());
            query.append_pair("page[size]", &page.size.to_string());
            if !descriptor.includes.is_empty() {
                query.append_pair("include", &descriptor.includes.join(","));
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl ResourcePageSource for UpstreamHttpSource {
    async fn fetch_page(
        &self,
        descriptor: &EntityDescriptor,
        page: PageRequest,
    ) -> Result<ResourcePage, SourceError> {
        let url = self.collection_url(descriptor, page)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(self.token.as_str())
            .header(ACCEPT, JSON_API_MEDIA_TYPE)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, retry_after, body.as_ref()));
        }
        parse_page(body.as_ref())
    }
}

fn parse_page(body: &[u8]) -> Result<ResourcePage, SourceError> {
    let decoded: PageDto = serde_json::from_slice(body)
        .map_err(|error| SourceError::decode(format!("invalid JSON:API payload: {error}")))?;
    decoded.into_page().map_err(SourceError::decode)
}

fn map_transport_error(error: reqwest::Error) -> SourceError {
    if error.is_timeout() {
        SourceError::timeout(error.to_string())
    } else {
        SourceError::upstream(error.to_string())
    }
}

fn map_status_error(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &[u8],
) -> SourceError {
    let body_preview = body_preview(body);
    let message = if body_preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {}", status.as_u16(), body_preview)
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SourceError::auth(message),
        StatusCode::TOO_MANY_REQUESTS => SourceError::rate_limited(message, retry_after),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => SourceError::timeout(message),
        StatusCode::NOT_FOUND => SourceError::not_found(message),
        _ if status.is_client_error() => SourceError::validation(message),
        _ => SourceError::upstream(message),
    }
}

/// Only the delay-seconds form of `Retry-After` is honoured; HTTP-date
/// values fall back to the retry policy's own backoff.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for non-network mapping helpers.

    use reqwest::header::HeaderValue;
    use rstest::rstest;

    use super::*;
    use crate::domain::registry::EntityKind;

    fn source() -> UpstreamHttpSource {
        UpstreamHttpSource::new(
            Url::parse("https://api.example.com/v1").expect("valid URL"),
            Zeroizing::new("secret".to_owned()),
            Duration::from_secs(30),
        )
        .expect("client should build")
    }

    #[test]
    fn collection_url_carries_pagination_and_includes() {
        let url = source()
            .collection_url(
                EntityKind::Projects.descriptor(),
                PageRequest {
                    number: 3,
                    size: 100,
                },
            )
            .expect("URL should build");

        assert_eq!(url.path(), "/v1/projects");
        let query = url.query().expect("query should be present");
        assert!(query.contains("page%5Bnumber%5D=3"), "query: {query}");
        assert!(query.contains("page%5Bsize%5D=100"), "query: {query}");
        assert!(
            query.contains("include=company%2Cproject_manager%2Cworkflow"),
            "query: {query}"
        );
    }

    #[rstest]
    #[case::unauthorized(StatusCode::UNAUTHORIZED)]
    #[case::forbidden(StatusCode::FORBIDDEN)]
    fn credential_rejections_map_to_auth_errors(#[case] status: StatusCode) {
        let error = map_status_error(status, None, b"{\"errors\":[]}");
        assert!(matches!(error, SourceError::Auth { .. }), "error: {error}");
    }

    #[test]
    fn throttling_carries_the_advertised_retry_after() {
        let error = map_status_error(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(7)),
            b"",
        );
        assert_eq!(
            error,
            SourceError::rate_limited("status 429", Some(Duration::from_secs(7)))
        );
    }

    #[rstest]
    #[case::request_timeout(StatusCode::REQUEST_TIMEOUT)]
    #[case::gateway_timeout(StatusCode::GATEWAY_TIMEOUT)]
    fn timeout_statuses_map_to_timeout_errors(#[case] status: StatusCode) {
        let error = map_status_error(status, None, b"");
        assert!(matches!(error, SourceError::Timeout { .. }), "error: {error}");
    }

    #[test]
    fn other_client_errors_are_validation_and_server_errors_are_upstream() {
        assert!(matches!(
            map_status_error(StatusCode::UNPROCESSABLE_ENTITY, None, b""),
            SourceError::Validation { .. }
        ));
        assert!(matches!(
            map_status_error(StatusCode::BAD_GATEWAY, None, b""),
            SourceError::Upstream { .. }
        ));
    }

    #[test]
    fn retry_after_parses_delay_seconds_only() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn undecodable_payloads_map_to_decode_errors() {
        let error = parse_page(b"<html>oops</html>").expect_err("decode should fail");
        assert!(matches!(error, SourceError::Decode { .. }), "error: {error}");
    }

    #[test]
    fn long_error_bodies_are_previewed_compactly() {
        let body = "x".repeat(500);
        let preview = body_preview(body.as_bytes());
        assert!(preview.ends_with("..."));
        assert!(preview.chars().count() <= 163);
    }
}

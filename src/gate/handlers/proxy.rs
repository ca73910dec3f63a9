//! Relay of forwarded requests to the front-end origin.

use axum::{
    body::{to_bytes, Body},
    extract::{Extension, Request},
    http::{
        header::{
            CONNECTION, HOST, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER,
            TRANSFER_ENCODING, UPGRADE,
        },
        uri::PathAndQuery,
        HeaderMap, HeaderName, StatusCode,
    },
    response::{IntoResponse, Response},
};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, instrument};

/// Largest request body relayed upstream.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("request body too large or unreadable")]
    Body(#[from] axum::Error),
    #[error("upstream request failed")]
    Upstream(#[from] reqwest::Error),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Body(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        status.into_response()
    }
}

/// The front-end origin that forwarded requests are relayed to.
#[derive(Clone, Debug)]
pub struct Upstream {
    client: Client,
    base_url: String,
}

impl Upstream {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        // Upstream redirects belong to the browser, not to us.
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .redirect(Policy::none())
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip_all, fields(upstream = %self.base_url))]
    async fn relay(&self, request: Request) -> Result<Response, RelayError> {
        let (parts, body) = request.into_parts();

        let path = parts
            .uri
            .path_and_query()
            .map_or("/", PathAndQuery::as_str);
        let url = format!("{}{path}", self.base_url);

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        if let Some(host) = headers.remove(HOST) {
            headers.insert(X_FORWARDED_HOST, host);
        }

        let body = to_bytes(body, MAX_BODY_BYTES).await?;

        let upstream = self
            .client
            .request(parts.method, url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);
        let bytes = upstream.bytes().await?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;

        Ok(response)
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in [
        CONNECTION,
        KEEP_ALIVE,
        PROXY_AUTHENTICATE,
        PROXY_AUTHORIZATION,
        TE,
        TRAILER,
        TRANSFER_ENCODING,
        UPGRADE,
    ] {
        headers.remove(name);
    }
}

// axum fallback handler for every gated page
pub async fn forward(Extension(upstream): Extension<Upstream>, request: Request) -> Response {
    match upstream.relay(request).await {
        Ok(response) => response,
        Err(err) => {
            error!("Failed to relay request upstream: {err}");
            err.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn hop_by_hop_headers_are_removed() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(KEEP_ALIVE, HeaderValue::from_static("timeout=5"));
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert("x-request-id", HeaderValue::from_static("01J"));
        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("x-request-id"));
    }

    #[test]
    fn base_url_is_trimmed() -> Result<(), reqwest::Error> {
        let upstream = Upstream::new("http://127.0.0.1:3000/", Duration::from_secs(1))?;
        assert_eq!(upstream.base_url(), "http://127.0.0.1:3000");
        Ok(())
    }

    #[tokio::test]
    async fn oversized_body_is_payload_too_large() -> Result<(), reqwest::Error> {
        let upstream = Upstream::new("http://127.0.0.1:9", Duration::from_secs(1))?;
        let request = Request::new(Body::from(vec![b'x'; MAX_BODY_BYTES + 1]));
        let response = forward(Extension(upstream), request).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_upstream_is_bad_gateway() -> Result<(), reqwest::Error> {
        let upstream = Upstream::new("http://127.0.0.1:9", Duration::from_secs(1))?;
        let response = forward(Extension(upstream), Request::new(Body::empty())).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        Ok(())
    }
}

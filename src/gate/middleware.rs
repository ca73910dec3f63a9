//! The request gate: provider exchange, classification and decision for
//! every inbound page request.

use axum::{
    extract::{Request, State},
    http::{
        header::{InvalidHeaderValue, SET_COOKIE},
        uri::PathAndQuery,
        HeaderMap, StatusCode, Uri,
    },
    middleware::Next,
    response::{IntoResponse, Json, Redirect, Response},
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, instrument};

use super::{
    cookies::{append_set_cookies, CookieJar, CookieUpdate},
    decision::{Decision, GateConfig},
    provider::{Exchange, Identity, IdentityProvider, ProviderError},
    route::{normalize_path, RouteClass},
};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("identity provider unavailable")]
    ProviderUnavailable(#[from] ProviderError),
    #[error("cookie cannot be carried in a header")]
    InvalidCookie(#[from] InvalidHeaderValue),
    #[error("request path cannot be rewritten")]
    InvalidPath(#[from] axum::http::Error),
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidCookie(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidPath(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Everything the gate decided for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GateOutcome {
    pub class: RouteClass,
    pub identity: Option<Identity>,
    pub decision: Decision,
    /// Inbound cookies merged with the provider's updates.
    pub cookies: CookieJar,
    pub updates: Vec<CookieUpdate>,
}

impl GateOutcome {
    /// Attach the provider's cookie updates to a response.
    ///
    /// # Errors
    /// Returns an error if an update cannot be rendered as `Set-Cookie`.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<(), GateError> {
        append_set_cookies(headers, &self.updates)?;
        Ok(())
    }

    /// Turn a failure that happened after the exchange into a response that
    /// still carries every update that can be rendered.
    fn failure(&self, err: GateError) -> Response {
        let mut response = failure(err);
        for update in &self.updates {
            if let Ok(value) = update.to_header_value() {
                response.headers_mut().append(SET_COOKIE, value);
            }
        }
        response
    }
}

pub struct RequestGate<P> {
    provider: P,
    config: GateConfig,
}

impl<P: IdentityProvider> RequestGate<P> {
    #[must_use]
    pub fn new(provider: P, config: GateConfig) -> Self {
        Self { provider, config }
    }

    /// Exchange cookies, classify the normalized `path` and apply the
    /// decision table.
    ///
    /// # Errors
    /// Returns [`GateError::ProviderUnavailable`] when the exchange fails; the
    /// caller's identity is never guessed.
    #[instrument(skip(self, cookies))]
    pub async fn evaluate(
        &self,
        path: &str,
        cookies: &CookieJar,
    ) -> Result<GateOutcome, GateError> {
        let class = self.config.routes().classify(&normalize_path(path));

        let exchange = if class == RouteClass::Public && !self.config.refresh_public() {
            Exchange::anonymous()
        } else {
            self.provider.exchange(cookies).await?
        };

        let decision = self.config.decide(class, exchange.identity.as_ref());

        debug!(
            ?class,
            ?decision,
            authenticated = exchange.identity.is_some(),
            updates = exchange.updates.len(),
            "request gated"
        );

        Ok(GateOutcome {
            class,
            decision,
            cookies: cookies.merged(&exchange.updates),
            identity: exchange.identity,
            updates: exchange.updates,
        })
    }

    /// Gate a live request: forward it through `next` or answer with a
    /// redirect. Either way the response carries the cookie updates.
    ///
    /// A forwarded request continues with its normalized path, so the path
    /// that was classified is the one the origin serves.
    pub async fn handle(&self, mut request: Request, next: Next) -> Response {
        let path = normalize_path(request.uri().path());
        let cookies = CookieJar::from_headers(request.headers());
        let outcome = match self.evaluate(&path, &cookies).await {
            Ok(outcome) => outcome,
            Err(err) => return failure(err),
        };

        let mut response = match &outcome.decision {
            Decision::Forward => {
                if let Err(err) = prepare_forward(&mut request, &path, &outcome.cookies) {
                    return outcome.failure(err);
                }
                next.run(request).await
            }
            Decision::Redirect(target) => Redirect::temporary(target).into_response(),
        };

        if let Err(err) = outcome.apply(response.headers_mut()) {
            return outcome.failure(err);
        }

        response
    }
}

fn prepare_forward(
    request: &mut Request,
    path: &str,
    cookies: &CookieJar,
) -> Result<(), GateError> {
    cookies.write_request_header(request.headers_mut())?;

    if request.uri().path() != path {
        let path_and_query = match request.uri().query() {
            Some(query) => format!("{path}?{query}"),
            None => path.to_string(),
        };
        let mut parts = request.uri().clone().into_parts();
        parts.path_and_query = Some(
            PathAndQuery::try_from(path_and_query).map_err(axum::http::Error::from)?,
        );
        *request.uri_mut() = Uri::from_parts(parts).map_err(axum::http::Error::from)?;
    }

    Ok(())
}

fn failure(err: GateError) -> Response {
    match &err {
        GateError::ProviderUnavailable(source) => {
            error!("Identity provider exchange failed: {source}");
        }
        GateError::InvalidCookie(source) => error!("Failed to write cookies: {source}"),
        GateError::InvalidPath(source) => error!("Failed to rewrite request path: {source}"),
    }
    err.into_response()
}

/// axum middleware entry point, see [`RequestGate::handle`].
pub async fn enforce<P: IdentityProvider>(
    State(gate): State<Arc<RequestGate<P>>>,
    request: Request,
    next: Next,
) -> Response {
    gate.handle(request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::cookies::CookieOptions;
    use crate::gate::route::RouteTable;
    use axum::{
        body::{to_bytes, Body},
        http::header::{COOKIE, LOCATION},
        middleware::from_fn_with_state,
        Router,
    };
    use tower::ServiceExt;

    /// Provider that recognises one fixed token and rotates it.
    struct FakeProvider;

    impl IdentityProvider for FakeProvider {
        async fn exchange(&self, cookies: &CookieJar) -> Result<Exchange, ProviderError> {
            match cookies.get("session") {
                Some("valid") => Ok(Exchange::authenticated(Identity::new("user-1"))),
                Some("stale") => Ok(Exchange {
                    identity: Some(Identity::new("user-1")),
                    updates: vec![CookieUpdate::new(
                        "session",
                        "valid",
                        CookieOptions::session(false).with_max_age(60),
                    )],
                }),
                Some("broken") => Ok(Exchange {
                    identity: Some(Identity::new("user-1")),
                    updates: vec![
                        CookieUpdate::new("session", "line\nbreak", CookieOptions::session(false)),
                        CookieUpdate::new("refresh", "r2", CookieOptions::session(false)),
                    ],
                }),
                Some(_) => Ok(Exchange {
                    identity: None,
                    updates: vec![CookieUpdate::expire(
                        "session",
                        CookieOptions::session(false),
                    )],
                }),
                None => Ok(Exchange::anonymous()),
            }
        }
    }

    struct PanickingProvider;

    impl IdentityProvider for PanickingProvider {
        async fn exchange(&self, _cookies: &CookieJar) -> Result<Exchange, ProviderError> {
            panic!("public paths must not reach the provider");
        }
    }

    fn gate() -> RequestGate<FakeProvider> {
        RequestGate::new(FakeProvider, GateConfig::default())
    }

    #[tokio::test]
    async fn stale_session_is_rotated_and_allowed() -> Result<(), GateError> {
        let outcome = gate()
            .evaluate("/app/dashboard", &CookieJar::parse("session=stale; theme=dark"))
            .await?;
        assert_eq!(outcome.class, RouteClass::Protected);
        assert_eq!(outcome.decision, Decision::Forward);
        assert_eq!(outcome.cookies.to_string(), "session=valid; theme=dark");
        assert_eq!(outcome.updates.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn dead_session_redirects_and_clears_cookie() -> Result<(), GateError> {
        let outcome = gate()
            .evaluate("/app/dashboard", &CookieJar::parse("session=revoked"))
            .await?;
        assert_eq!(outcome.decision, Decision::Redirect("/login".to_string()));
        assert!(outcome.cookies.is_empty());
        assert!(outcome.updates.iter().all(CookieUpdate::is_removal));
        Ok(())
    }

    #[tokio::test]
    async fn rerun_with_rotated_cookies_decides_the_same() -> Result<(), GateError> {
        let gate = gate();
        for path in ["/app/dashboard", "/login", "/verify", "/about"] {
            let first = gate.evaluate(path, &CookieJar::parse("session=stale")).await?;
            let second = gate.evaluate(path, &first.cookies).await?;
            let fresh = gate.evaluate(path, &CookieJar::parse("session=valid")).await?;
            assert_eq!(first.decision, second.decision, "path {path}");
            assert_eq!(second.decision, fresh.decision, "path {path}");
            assert!(second.updates.is_empty());
        }
        Ok(())
    }

    #[tokio::test]
    async fn public_refresh_can_be_skipped() -> Result<(), GateError> {
        let gate = RequestGate::new(
            PanickingProvider,
            GateConfig::new(RouteTable::default()).with_refresh_public(false),
        );
        let outcome = gate
            .evaluate("/about", &CookieJar::parse("session=valid"))
            .await?;
        assert_eq!(outcome.decision, Decision::Forward);
        assert!(outcome.identity.is_none());
        assert_eq!(outcome.cookies.to_string(), "session=valid");
        Ok(())
    }

    // Origin stand-in that answers with the URI it was handed.
    fn app() -> Router {
        Router::new()
            .fallback(|request: Request| async move { request.uri().to_string() })
            .layer(from_fn_with_state(Arc::new(gate()), enforce::<FakeProvider>))
    }

    async fn send(uri: &str, cookie: Option<&str>) -> anyhow::Result<Response> {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        Ok(app().oneshot(builder.body(Body::empty())?).await?)
    }

    #[tokio::test]
    async fn dot_segments_cannot_reach_protected_pages() -> anyhow::Result<()> {
        for uri in ["/./app/dashboard", "//app/dashboard", "/%61pp/dashboard", "/about/../app"] {
            let response = send(uri, None).await?;
            assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT, "uri {uri}");
            assert_eq!(
                response.headers().get(LOCATION).and_then(|v| v.to_str().ok()),
                Some("/login")
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn forwarded_request_carries_normalized_path() -> anyhow::Result<()> {
        let response = send("/./app//reports/%7Euser?range=7d", Some("session=valid")).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        assert_eq!(&body[..], b"/app/reports/~user?range=7d");
        Ok(())
    }

    #[tokio::test]
    async fn late_failure_still_sets_renderable_cookies() -> anyhow::Result<()> {
        let response = send("/app/dashboard", Some("session=broken")).await?;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let issued: Vec<_> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();
        assert_eq!(issued.len(), 1);
        assert!(issued[0].starts_with("refresh=r2;"));
        Ok(())
    }

    #[test]
    fn provider_failure_is_service_unavailable() {
        let err = GateError::ProviderUnavailable(ProviderError::Status {
            endpoint: "http://idp/auth/v1/user".to_string(),
            status: StatusCode::BAD_GATEWAY,
        });
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

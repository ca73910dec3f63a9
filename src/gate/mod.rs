pub mod cookies;
pub mod decision;
pub mod handlers;
pub mod middleware;
pub mod provider;
pub mod route;

pub use self::{
    cookies::{CookieJar, CookieOptions, CookieUpdate, SameSite},
    decision::{Decision, GateConfig},
    handlers::Upstream,
    middleware::{enforce, GateError, GateOutcome, RequestGate},
    provider::{
        Exchange, HttpIdentityProvider, Identity, IdentityProvider, ProviderConfig, ProviderError,
    },
    route::{classify, normalize_path, RouteClass, RouteTable},
};

use anyhow::Result;
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{HeaderName, HeaderValue, Request},
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

/// Build the application router: `/health` outside the gate, every other
/// path gated and relayed upstream.
pub fn router<P: IdentityProvider>(gate: Arc<RequestGate<P>>, upstream: Upstream) -> Router {
    let gated = Router::new()
        .fallback(handlers::forward)
        .layer(from_fn_with_state(gate, enforce::<P>))
        .layer(Extension(upstream));

    Router::new()
        .route("/health", get(handlers::health).options(handlers::health))
        .merge(gated)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new<P: IdentityProvider>(
    port: u16,
    gate: RequestGate<P>,
    upstream: Upstream,
) -> Result<()> {
    let app = router(Arc::new(gate), upstream);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

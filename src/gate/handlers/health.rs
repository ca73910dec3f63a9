use axum::{
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Json},
};
use serde::Serialize;

use crate::GIT_COMMIT_HASH;

const X_APP: HeaderName = HeaderName::from_static("x-app");

#[derive(Debug, Serialize)]
struct Health {
    name: &'static str,
    version: &'static str,
    build: &'static str,
}

impl Health {
    const fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            build: GIT_COMMIT_HASH,
        }
    }

    /// `name:version:short-hash`
    fn app_header(&self) -> Option<HeaderValue> {
        let short_hash = self.build.get(..7).unwrap_or_default();
        HeaderValue::from_str(&format!("{}:{}:{short_hash}", self.name, self.version)).ok()
    }
}

// axum handler for health, answered outside the gate
pub async fn health() -> impl IntoResponse {
    let health = Health::current();
    let app = health.app_header().map(|value| [(X_APP, value)]);
    (app, Json(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn app_header_uses_short_hash() {
        let health = Health {
            name: "atal-gate",
            version: "1.2.3",
            build: "0123456789abcdef",
        };
        assert_eq!(
            health.app_header(),
            Some(HeaderValue::from_static("atal-gate:1.2.3:0123456"))
        );

        let unknown = Health { build: "", ..health };
        assert_eq!(
            unknown.app_header(),
            Some(HeaderValue::from_static("atal-gate:1.2.3:"))
        );
    }

    #[tokio::test]
    async fn health_reports_name_and_version() {
        let response = health().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let app = response
            .headers()
            .get("X-App")
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        assert!(app.is_some_and(|value| value.starts_with(concat!(
            env!("CARGO_PKG_NAME"),
            ":",
            env!("CARGO_PKG_VERSION")
        ))));
    }
}

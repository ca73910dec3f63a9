use crate::gate::{
    self, GateConfig, HttpIdentityProvider, ProviderConfig, RequestGate, RouteTable, Upstream,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub upstream_url: String,
    pub upstream_timeout_seconds: u64,
    pub provider_url: String,
    pub provider_key: SecretString,
    pub provider_timeout_seconds: u64,
    pub cookie_prefix: String,
    pub cookie_secure: bool,
    pub session_max_age_seconds: i64,
    pub protected_prefixes: Vec<String>,
    pub auth_prefixes: Vec<String>,
    pub login_path: String,
    pub landing_path: String,
    pub skip_public_refresh: bool,
}

impl Args {
    fn gate_config(&self) -> GateConfig {
        GateConfig::new(RouteTable::new(
            self.protected_prefixes.clone(),
            self.auth_prefixes.clone(),
        ))
        .with_login_path(self.login_path.clone())
        .with_landing_path(self.landing_path.clone())
        .with_refresh_public(!self.skip_public_refresh)
    }

    fn provider_config(&self) -> ProviderConfig {
        ProviderConfig::new(&self.provider_url, self.provider_key.clone())
            .with_cookie_prefix(self.cookie_prefix.clone())
            .with_cookie_secure(self.cookie_secure)
            .with_session_max_age_seconds(self.session_max_age_seconds)
            .with_timeout(Duration::from_secs(self.provider_timeout_seconds))
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the HTTP clients cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!("Server args: {:?}", args);

    let provider = HttpIdentityProvider::new(args.provider_config())
        .context("Failed to build identity provider client")?;

    let upstream = Upstream::new(
        &args.upstream_url,
        Duration::from_secs(args.upstream_timeout_seconds),
    )
    .context("Failed to build upstream client")?;

    let gate = RequestGate::new(provider, args.gate_config());

    gate::new(args.port, gate, upstream).await
}

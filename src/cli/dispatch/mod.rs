//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action the binary executes.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{provider, routes, ARG_PORT, ARG_UPSTREAM_TIMEOUT, ARG_UPSTREAM_URL};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let upstream_url = matches
        .get_one::<String>(ARG_UPSTREAM_URL)
        .cloned()
        .context("missing required argument: --upstream-url")?;
    let upstream_timeout_seconds = matches
        .get_one::<u64>(ARG_UPSTREAM_TIMEOUT)
        .copied()
        .unwrap_or(30);

    let provider_opts = provider::Options::parse(matches)?;
    let routes_opts = routes::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        upstream_url,
        upstream_timeout_seconds,
        provider_url: provider_opts.url,
        provider_key: provider_opts.key,
        provider_timeout_seconds: provider_opts.timeout_seconds,
        cookie_prefix: provider_opts.cookie_prefix,
        cookie_secure: provider_opts.cookie_secure,
        session_max_age_seconds: provider_opts.session_max_age_seconds,
        protected_prefixes: routes_opts.protected_prefixes,
        auth_prefixes: routes_opts.auth_prefixes,
        login_path: routes_opts.login_path,
        landing_path: routes_opts.landing_path,
        skip_public_refresh: routes_opts.skip_public_refresh,
    }))
}

use clap::{builder::ValueParser, Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

pub const ARG_PROVIDER_URL: &str = "provider-url";
pub const ARG_PROVIDER_KEY: &str = "provider-key";
pub const ARG_PROVIDER_TIMEOUT: &str = "provider-timeout";
pub const ARG_COOKIE_PREFIX: &str = "cookie-prefix";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_SESSION_MAX_AGE: &str = "session-max-age";

#[derive(Debug)]
pub struct Options {
    pub url: String,
    pub key: SecretString,
    pub timeout_seconds: u64,
    pub cookie_prefix: String,
    pub cookie_secure: bool,
    pub session_max_age_seconds: i64,
}

impl Options {
    /// Parse identity provider arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read_required = |id: &str| -> anyhow::Result<String> {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        Ok(Self {
            url: read_required(ARG_PROVIDER_URL)?,
            key: SecretString::from(read_required(ARG_PROVIDER_KEY)?),
            timeout_seconds: matches
                .get_one::<u64>(ARG_PROVIDER_TIMEOUT)
                .copied()
                .unwrap_or(5),
            cookie_prefix: read_required(ARG_COOKIE_PREFIX)?,
            cookie_secure: matches.get_flag(ARG_COOKIE_SECURE),
            session_max_age_seconds: matches
                .get_one::<i64>(ARG_SESSION_MAX_AGE)
                .copied()
                .unwrap_or(604_800),
        })
    }
}

/// Accept only absolute http(s) URLs.
#[must_use]
pub fn validator_http_url() -> ValueParser {
    ValueParser::from(move |value: &str| -> std::result::Result<String, String> {
        let url = Url::parse(value).map_err(|e| format!("invalid URL: {e}"))?;
        match url.scheme() {
            "http" | "https" if url.host_str().is_some() => Ok(value.to_string()),
            "http" | "https" => Err("URL must include a host".to_string()),
            scheme => Err(format!("unsupported URL scheme: {scheme}")),
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PROVIDER_URL)
                .long(ARG_PROVIDER_URL)
                .help("Identity provider base URL, example: https://<project>.supabase.co")
                .env("ATAL_PROVIDER_URL")
                .required(true)
                .value_parser(validator_http_url()),
        )
        .arg(
            Arg::new(ARG_PROVIDER_KEY)
                .long(ARG_PROVIDER_KEY)
                .help("Identity provider project API key, sent as the apikey header")
                .env("ATAL_PROVIDER_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_PROVIDER_TIMEOUT)
                .long(ARG_PROVIDER_TIMEOUT)
                .help("Identity provider request timeout in seconds")
                .env("ATAL_PROVIDER_TIMEOUT")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_COOKIE_PREFIX)
                .long(ARG_COOKIE_PREFIX)
                .help("Prefix for the session cookie names")
                .long_help(
                    "Cookies are named <prefix>-access-token and <prefix>-refresh-token",
                )
                .env("ATAL_COOKIE_PREFIX")
                .default_value("atal"),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark session cookies Secure (enable when served over HTTPS)")
                .env("ATAL_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_SESSION_MAX_AGE)
                .long(ARG_SESSION_MAX_AGE)
                .help("Refresh token cookie lifetime in seconds")
                .env("ATAL_SESSION_MAX_AGE")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}

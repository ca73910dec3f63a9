use clap::{builder::ValueParser, Arg, ArgAction, ArgMatches, Command};

pub const ARG_PROTECTED_PREFIXES: &str = "protected-prefixes";
pub const ARG_AUTH_PREFIXES: &str = "auth-prefixes";
pub const ARG_LOGIN_PATH: &str = "login-path";
pub const ARG_LANDING_PATH: &str = "landing-path";
pub const ARG_SKIP_PUBLIC_REFRESH: &str = "skip-public-refresh";

#[derive(Debug)]
pub struct Options {
    pub protected_prefixes: Vec<String>,
    pub auth_prefixes: Vec<String>,
    pub login_path: String,
    pub landing_path: String,
    pub skip_public_refresh: bool,
}

impl Options {
    /// Parse route classification arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a redirect target is missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read_list = |id: &str| -> Vec<String> {
            matches
                .get_many::<String>(id)
                .map(|values| values.cloned().collect())
                .unwrap_or_default()
        };
        let read_required = |id: &str| -> anyhow::Result<String> {
            matches
                .get_one::<String>(id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        Ok(Self {
            protected_prefixes: read_list(ARG_PROTECTED_PREFIXES),
            auth_prefixes: read_list(ARG_AUTH_PREFIXES),
            login_path: read_required(ARG_LOGIN_PATH)?,
            landing_path: read_required(ARG_LANDING_PATH)?,
            skip_public_refresh: matches.get_flag(ARG_SKIP_PUBLIC_REFRESH),
        })
    }
}

/// Paths and prefixes must be absolute, e.g. `/app`.
#[must_use]
pub fn validator_path() -> ValueParser {
    ValueParser::from(move |value: &str| -> std::result::Result<String, String> {
        let value = value.trim();
        if value.starts_with('/') {
            Ok(value.to_string())
        } else {
            Err(format!("path must start with '/': {value}"))
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PROTECTED_PREFIXES)
                .long(ARG_PROTECTED_PREFIXES)
                .help("Comma separated path prefixes that require a session")
                .env("ATAL_PROTECTED_PREFIXES")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .default_values(["/app"])
                .value_parser(validator_path()),
        )
        .arg(
            Arg::new(ARG_AUTH_PREFIXES)
                .long(ARG_AUTH_PREFIXES)
                .help("Comma separated path prefixes only shown to signed-out users")
                .env("ATAL_AUTH_PREFIXES")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .default_values(["/login", "/verify"])
                .value_parser(validator_path()),
        )
        .arg(
            Arg::new(ARG_LOGIN_PATH)
                .long(ARG_LOGIN_PATH)
                .help("Redirect target for signed-out users on protected paths")
                .env("ATAL_LOGIN_PATH")
                .default_value("/login")
                .value_parser(validator_path()),
        )
        .arg(
            Arg::new(ARG_LANDING_PATH)
                .long(ARG_LANDING_PATH)
                .help("Redirect target for signed-in users on auth-flow paths")
                .env("ATAL_LANDING_PATH")
                .default_value("/app/dashboard")
                .value_parser(validator_path()),
        )
        .arg(
            Arg::new(ARG_SKIP_PUBLIC_REFRESH)
                .long(ARG_SKIP_PUBLIC_REFRESH)
                .help("Do not refresh the session on paths outside both prefix lists")
                .env("ATAL_SKIP_PUBLIC_REFRESH")
                .action(ArgAction::SetTrue),
        )
}

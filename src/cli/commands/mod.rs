pub mod logging;
pub mod provider;
pub mod routes;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_UPSTREAM_URL: &str = "upstream-url";
pub const ARG_UPSTREAM_TIMEOUT: &str = "upstream-timeout";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("atal-gate")
        .about("Session-aware request gate for the ATAL AI web application")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("ATAL_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_UPSTREAM_URL)
                .short('u')
                .long(ARG_UPSTREAM_URL)
                .help("Front-end origin that allowed requests are relayed to")
                .env("ATAL_UPSTREAM_URL")
                .required(true)
                .value_parser(provider::validator_http_url()),
        )
        .arg(
            Arg::new(ARG_UPSTREAM_TIMEOUT)
                .long(ARG_UPSTREAM_TIMEOUT)
                .help("Upstream request timeout in seconds")
                .env("ATAL_UPSTREAM_TIMEOUT")
                .default_value("30")
                .value_parser(clap::value_parser!(u64).range(1..)),
        );

    let command = provider::with_args(command);
    let command = routes::with_args(command);
    logging::with_args(command)
}

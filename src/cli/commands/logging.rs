use clap::{builder::ValueParser, Arg, ArgAction, Command};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names accepted by `ATAL_LOG_LEVEL`, indexed by verbosity count.
const LEVEL_NAMES: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Parse a log level given either as a name or as a verbosity count.
///
/// # Errors
/// Returns an error for unknown names and counts above `trace`.
pub fn parse_log_level(level: &str) -> Result<u8, String> {
    let level = level.trim().to_ascii_lowercase();
    if let Ok(count) = level.parse::<u8>() {
        return if usize::from(count) < LEVEL_NAMES.len() {
            Ok(count)
        } else {
            Err(format!("verbosity must be 0-{}", LEVEL_NAMES.len() - 1))
        };
    }

    LEVEL_NAMES
        .iter()
        .position(|name| *name == level)
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| format!("invalid log level, expected one of: {}", LEVEL_NAMES.join(", ")))
}

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(parse_log_level)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Log verbosity, repeat for more; ATAL_LOG_LEVEL takes a level name")
            .env("ATAL_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_map_to_counts() {
        assert_eq!(parse_log_level("error"), Ok(0));
        assert_eq!(parse_log_level("WARN"), Ok(1));
        assert_eq!(parse_log_level(" debug "), Ok(3));
        assert_eq!(parse_log_level("trace"), Ok(4));
    }

    #[test]
    fn counts_are_bounded() {
        assert_eq!(parse_log_level("2"), Ok(2));
        assert!(parse_log_level("5").is_err());
        assert!(parse_log_level("verbose").is_err());
    }
}

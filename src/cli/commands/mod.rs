pub mod auth;
pub mod logging;
pub mod tokens;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_ROSTER: &str = "roster";

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

    let command = Command::new("matrikulo")
        .about("Roster-gated identity and session management for a student portal")
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
                .env("MATRIKULO_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_ROSTER)
                .short('r')
                .long(ARG_ROSTER)
                .help("Path to the roster JSON file loaded at startup")
                .long_help(
                    "Path to the roster JSON file loaded at startup. An array of\n{fullName, sectionNumber, group, studentId?, email?} objects; every entry\nstarts unregistered.",
                )
                .env("MATRIKULO_ROSTER")
                .required(true),
        );

    let command = tokens::with_args(command);
    let command = auth::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "matrikulo");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Roster-gated identity and session management for a student portal".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_check_port_and_roster() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "matrikulo",
            "--port",
            "8081",
            "--roster",
            "/tmp/roster.json",
            "--admin-token",
            "sekret",
        ]);

        assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(8081));
        assert_eq!(
            matches.get_one::<String>(ARG_ROSTER).cloned(),
            Some("/tmp/roster.json".to_string())
        );
        assert_eq!(
            matches.get_one::<String>(auth::ARG_ADMIN_TOKEN).cloned(),
            Some("sekret".to_string())
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("MATRIKULO_PORT", Some("443")),
                ("MATRIKULO_ROSTER", Some("/tmp/roster.json")),
                ("MATRIKULO_TOKEN_ISSUER", Some("issuer.example")),
                ("MATRIKULO_LOGIN_CEILING", Some("3")),
                ("MATRIKULO_LOG_LEVEL", Some("info")),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["matrikulo"]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(443));
                assert_eq!(
                    matches.get_one::<String>(ARG_ROSTER).cloned(),
                    Some("/tmp/roster.json".to_string())
                );
                assert_eq!(
                    matches
                        .get_one::<String>(tokens::ARG_TOKEN_ISSUER)
                        .cloned(),
                    Some("issuer.example".to_string())
                );
                assert_eq!(
                    matches.get_one::<u32>(auth::ARG_LOGIN_CEILING).copied(),
                    Some(3)
                );
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars(
                [
                    ("MATRIKULO_LOG_LEVEL", Some(level)),
                    ("MATRIKULO_ROSTER", Some("/tmp/roster.json")),
                ],
                || {
                    let command = new();
                    let matches = command.get_matches_from(vec!["matrikulo"]);
                    assert_eq!(
                        matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                        u8::try_from(index).ok()
                    );
                },
            );
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        // loop cover all possible value_parse
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("MATRIKULO_LOG_LEVEL", None::<String>)], || {
                let mut args = vec![
                    "matrikulo".to_string(),
                    "--roster".to_string(),
                    "/tmp/roster.json".to_string(),
                ];

                // Add the appropriate number of "-v" flags based on the index
                if index > 0 {
                    let v = format!("-{}", "v".repeat(index));
                    args.push(v);
                }

                let command = new();
                let matches = command.get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }
}

use clap::{Arg, ArgMatches, Command};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_MIN_LOGIN_DELAY_MS: &str = "min-login-delay-ms";
pub const ARG_ADMIN_TOKEN: &str = "admin-token";
pub const ARG_LOGIN_WINDOW_SECONDS: &str = "login-window-seconds";
pub const ARG_LOGIN_CEILING: &str = "login-ceiling";
pub const ARG_LOGIN_BLOCK_SECONDS: &str = "login-block-seconds";
pub const ARG_CODE_TTL_SECONDS: &str = "code-ttl-seconds";
pub const ARG_PENDING_TTL_SECONDS: &str = "pending-ttl-seconds";

#[derive(Debug, Clone)]
pub struct RateLimitOptions {
    pub window_seconds: i64,
    pub ceiling: u32,
    pub block_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub frontend_base_url: String,
    pub min_login_delay_ms: u64,
    pub admin_token: Option<String>,
    pub rate_limit: RateLimitOptions,
    pub code_ttl_seconds: i64,
    pub pending_ttl_seconds: i64,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        Ok(Self {
            frontend_base_url: get_non_empty(ARG_FRONTEND_BASE_URL)
                .unwrap_or_else(|| "http://localhost:5173".to_string()),
            min_login_delay_ms: matches
                .get_one::<u64>(ARG_MIN_LOGIN_DELAY_MS)
                .copied()
                .unwrap_or(350),
            admin_token: get_non_empty(ARG_ADMIN_TOKEN),
            rate_limit: RateLimitOptions {
                window_seconds: matches
                    .get_one::<i64>(ARG_LOGIN_WINDOW_SECONDS)
                    .copied()
                    .unwrap_or(900),
                ceiling: matches
                    .get_one::<u32>(ARG_LOGIN_CEILING)
                    .copied()
                    .unwrap_or(5),
                block_seconds: matches
                    .get_one::<i64>(ARG_LOGIN_BLOCK_SECONDS)
                    .copied()
                    .unwrap_or(1800),
            },
            code_ttl_seconds: matches
                .get_one::<i64>(ARG_CODE_TTL_SECONDS)
                .copied()
                .unwrap_or(600),
            pending_ttl_seconds: matches
                .get_one::<i64>(ARG_PENDING_TTL_SECONDS)
                .copied()
                .unwrap_or(900),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL, used as the CORS origin")
                .env("MATRIKULO_FRONTEND_BASE_URL")
                .default_value("http://localhost:5173"),
        )
        .arg(
            Arg::new(ARG_MIN_LOGIN_DELAY_MS)
                .long(ARG_MIN_LOGIN_DELAY_MS)
                .help("Minimum response time for failed logins in milliseconds")
                .env("MATRIKULO_MIN_LOGIN_DELAY_MS")
                .default_value("350")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_ADMIN_TOKEN)
                .long(ARG_ADMIN_TOKEN)
                .help("Static bearer token for the admin endpoints (unset disables them)")
                .env("MATRIKULO_ADMIN_TOKEN"),
        );

    let command = command
        .arg(
            Arg::new(ARG_LOGIN_WINDOW_SECONDS)
                .long(ARG_LOGIN_WINDOW_SECONDS)
                .help("Login rate-limit counting window in seconds")
                .env("MATRIKULO_LOGIN_WINDOW_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_LOGIN_CEILING)
                .long(ARG_LOGIN_CEILING)
                .help("Login attempts allowed per window before blocking")
                .env("MATRIKULO_LOGIN_CEILING")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_LOGIN_BLOCK_SECONDS)
                .long(ARG_LOGIN_BLOCK_SECONDS)
                .help("Login block duration in seconds once the ceiling is exceeded")
                .env("MATRIKULO_LOGIN_BLOCK_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(i64)),
        );

    command
        .arg(
            Arg::new(ARG_CODE_TTL_SECONDS)
                .long(ARG_CODE_TTL_SECONDS)
                .help("One-time registration code TTL in seconds")
                .env("MATRIKULO_CODE_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_PENDING_TTL_SECONDS)
                .long(ARG_PENDING_TTL_SECONDS)
                .help("Pending registration TTL in seconds")
                .env("MATRIKULO_PENDING_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
}

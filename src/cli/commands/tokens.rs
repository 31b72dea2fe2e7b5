use clap::{Arg, ArgMatches, Command};

pub const ARG_TOKEN_SEED: &str = "token-seed";
pub const ARG_TOKEN_ISSUER: &str = "token-issuer";
pub const ARG_TOKEN_AUDIENCE: &str = "token-audience";
pub const ARG_ACCESS_TTL_SECONDS: &str = "access-ttl-seconds";
pub const ARG_REFRESH_TTL_SECONDS: &str = "refresh-ttl-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    /// Base64url-encoded Ed25519 seed; `None` means an ephemeral keypair.
    pub seed: Option<String>,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

impl Options {
    /// Parse token arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        // Filter empty strings which clap might pass through if env vars are set to ""
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        Ok(Self {
            seed: get_non_empty(ARG_TOKEN_SEED),
            issuer: get_non_empty(ARG_TOKEN_ISSUER)
                .unwrap_or_else(|| "matrikulo".to_string()),
            audience: get_non_empty(ARG_TOKEN_AUDIENCE)
                .unwrap_or_else(|| "matrikulo-portal".to_string()),
            access_ttl_seconds: matches
                .get_one::<i64>(ARG_ACCESS_TTL_SECONDS)
                .copied()
                .unwrap_or(1800),
            refresh_ttl_seconds: matches
                .get_one::<i64>(ARG_REFRESH_TTL_SECONDS)
                .copied()
                .unwrap_or(604_800),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_SEED)
                .long(ARG_TOKEN_SEED)
                .help("Base64url-encoded 32-byte Ed25519 seed for signing access tokens")
                .long_help(
                    "Base64url-encoded (unpadded) 32-byte Ed25519 seed for signing access tokens.\n\nWhen omitted an ephemeral keypair is generated at startup: every restart\ninvalidates all outstanding access tokens.",
                )
                .env("MATRIKULO_TOKEN_SEED"),
        )
        .arg(
            Arg::new(ARG_TOKEN_ISSUER)
                .long(ARG_TOKEN_ISSUER)
                .help("Access token issuer (iss)")
                .env("MATRIKULO_TOKEN_ISSUER")
                .default_value("matrikulo"),
        )
        .arg(
            Arg::new(ARG_TOKEN_AUDIENCE)
                .long(ARG_TOKEN_AUDIENCE)
                .help("Access token audience (aud)")
                .env("MATRIKULO_TOKEN_AUDIENCE")
                .default_value("matrikulo-portal"),
        )
        .arg(
            Arg::new(ARG_ACCESS_TTL_SECONDS)
                .long(ARG_ACCESS_TTL_SECONDS)
                .help("Access token TTL in seconds")
                .env("MATRIKULO_ACCESS_TTL_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL_SECONDS)
                .long(ARG_REFRESH_TTL_SECONDS)
                .help("Refresh token TTL in seconds")
                .env("MATRIKULO_REFRESH_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
}

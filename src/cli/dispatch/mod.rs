//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, tokens, ARG_PORT, ARG_ROSTER};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let roster_path = matches
        .get_one::<String>(ARG_ROSTER)
        .cloned()
        .context("missing required argument: --roster")?;

    let token_opts = tokens::Options::parse(matches)?;
    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Box::new(Args {
        port,
        roster_path,
        token_seed: token_opts.seed,
        token_issuer: token_opts.issuer,
        token_audience: token_opts.audience,
        access_ttl_seconds: token_opts.access_ttl_seconds,
        refresh_ttl_seconds: token_opts.refresh_ttl_seconds,
        frontend_base_url: auth_opts.frontend_base_url,
        min_login_delay_ms: auth_opts.min_login_delay_ms,
        admin_token: auth_opts.admin_token,
        login_window_seconds: auth_opts.rate_limit.window_seconds,
        login_ceiling: auth_opts.rate_limit.ceiling,
        login_block_seconds: auth_opts.rate_limit.block_seconds,
        code_ttl_seconds: auth_opts.code_ttl_seconds,
        pending_ttl_seconds: auth_opts.pending_ttl_seconds,
    })))
}

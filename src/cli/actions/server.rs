use crate::{
    api,
    api::handlers::auth::{AuthConfig, AuthState},
    rate_limit::{LoginRateLimiter, RateLimitConfig},
    registration::{code::MemoryCodeGate, Registrar},
    roster::{RosterEntry, RosterStore},
    token::{TokenConfig, TokenKeys, TokenService},
};
use anyhow::{Context, Result};
use std::{fs, sync::Arc};
use time::Duration;
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub roster_path: String,
    pub token_seed: Option<String>,
    pub token_issuer: String,
    pub token_audience: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub frontend_base_url: String,
    pub min_login_delay_ms: u64,
    pub admin_token: Option<String>,
    pub login_window_seconds: i64,
    pub login_ceiling: u32,
    pub login_block_seconds: i64,
    pub code_ttl_seconds: i64,
    pub pending_ttl_seconds: i64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the roster cannot be loaded, the token seed is
/// invalid, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let roster = Arc::new(RosterStore::new());
    let report = roster.import(load_roster(&args.roster_path)?);
    info!(
        loaded = report.loaded,
        rejected = report.rejected.len(),
        "roster imported from {}",
        args.roster_path
    );

    let keys = match &args.token_seed {
        Some(seed) => TokenKeys::from_seed_b64(seed).context("Invalid token seed")?,
        None => {
            warn!("No token seed configured, using an ephemeral keypair");
            TokenKeys::generate().context("Failed to generate token keypair")?
        }
    };
    info!(kid = keys.kid(), "access token key loaded");

    let token_config = TokenConfig::new(args.token_issuer, args.token_audience)
        .with_access_ttl(Duration::seconds(args.access_ttl_seconds))
        .with_refresh_ttl(Duration::seconds(args.refresh_ttl_seconds));
    let tokens = Arc::new(TokenService::new(keys, token_config));

    let rate_limiter = Arc::new(LoginRateLimiter::new(RateLimitConfig {
        window: Duration::seconds(args.login_window_seconds),
        ceiling: args.login_ceiling,
        block: Duration::seconds(args.login_block_seconds),
    }));

    let gate = Arc::new(MemoryCodeGate::new(Duration::seconds(args.code_ttl_seconds)));
    let registrar = Arc::new(
        Registrar::new(roster, Arc::new(crate::account::AccountStore::new()), gate)
            .with_pending_ttl(Duration::seconds(args.pending_ttl_seconds)),
    );

    let config = AuthConfig::default()
        .with_frontend_base_url(args.frontend_base_url)
        .with_min_login_delay(std::time::Duration::from_millis(args.min_login_delay_ms))
        .with_admin_token(args.admin_token);

    let auth_state = Arc::new(AuthState::new(config, registrar, rate_limiter, tokens));

    api::new(args.port, auth_state).await
}

fn load_roster(path: &str) -> Result<Vec<RosterEntry>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read roster file: {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid roster JSON: {path}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_roster_parses_entries() -> Result<()> {
        let mut file = tempfile_path("matrikulo-roster-ok")?;
        writeln!(
            file.1,
            r#"[{{"fullName": "Jane Doe", "sectionNumber": 3, "group": "Group 1", "studentId": "S-100"}}]"#
        )?;

        let entries = load_roster(&file.0)?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].full_name, "Jane Doe");
        fs::remove_file(&file.0)?;
        Ok(())
    }

    #[test]
    fn load_roster_rejects_garbage() -> Result<()> {
        let mut file = tempfile_path("matrikulo-roster-bad")?;
        writeln!(file.1, "not json")?;

        assert!(load_roster(&file.0).is_err());
        fs::remove_file(&file.0)?;
        Ok(())
    }

    #[test]
    fn load_roster_missing_file() {
        assert!(load_roster("/nonexistent/roster.json").is_err());
    }

    fn tempfile_path(prefix: &str) -> Result<(String, fs::File)> {
        let path = std::env::temp_dir().join(format!("{prefix}-{}.json", std::process::id()));
        let path = path.to_string_lossy().into_owned();
        let file = fs::File::create(&path)?;
        Ok((path, file))
    }
}

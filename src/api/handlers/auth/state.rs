//! Shared auth state and configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::rate_limit::LoginRateLimiter;
use crate::registration::Registrar;
use crate::token::TokenService;

const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:5173";
const DEFAULT_MIN_LOGIN_DELAY_MS: u64 = 350;

/// Knobs for the auth surface, filled in from the CLI.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    frontend_base_url: String,
    min_login_delay: Duration,
    admin_token: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            frontend_base_url: DEFAULT_FRONTEND_BASE_URL.to_string(),
            min_login_delay: Duration::from_millis(DEFAULT_MIN_LOGIN_DELAY_MS),
            admin_token: None,
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn with_frontend_base_url(mut self, url: String) -> Self {
        self.frontend_base_url = url;
        self
    }

    /// Floor on failed-login response time, to mask whether the username
    /// or the password was the wrong half.
    #[must_use]
    pub fn with_min_login_delay(mut self, delay: Duration) -> Self {
        self.min_login_delay = delay;
        self
    }

    #[must_use]
    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn min_login_delay(&self) -> Duration {
        self.min_login_delay
    }

    #[must_use]
    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref()
    }
}

/// Everything the auth handlers share, injected as one `Extension`.
pub struct AuthState {
    config: AuthConfig,
    registrar: Arc<Registrar>,
    rate_limiter: Arc<LoginRateLimiter>,
    tokens: Arc<TokenService>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        registrar: Arc<Registrar>,
        rate_limiter: Arc<LoginRateLimiter>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            config,
            registrar,
            rate_limiter,
            tokens,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn registrar(&self) -> &Registrar {
        &self.registrar
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &LoginRateLimiter {
        &self.rate_limiter
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }
}

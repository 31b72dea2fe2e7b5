//! Login rate limiting with windowed counting and progressive blocking.
//!
//! One entry per client identifier. An attempt past the ceiling inside a
//! single window marks the identifier blocked for longer than the window
//! itself; while blocked, every attempt is rejected regardless of window
//! state. The count and the block transition are one read-modify-write under
//! the map lock, so parallel attempts from one client cannot slip past the
//! ceiling.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;
use time::{Duration, OffsetDateTime};

const DEFAULT_WINDOW_MINUTES: i64 = 15;
const DEFAULT_CEILING: u32 = 5;
const DEFAULT_BLOCK_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Counting window W.
    pub window: Duration,
    /// Attempt ceiling C within one window.
    pub ceiling: u32,
    /// Block duration B once the ceiling is exceeded; stickier than a
    /// window expiry (B > W).
    pub block: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::minutes(DEFAULT_WINDOW_MINUTES),
            ceiling: DEFAULT_CEILING,
            block: Duration::minutes(DEFAULT_BLOCK_MINUTES),
        }
    }
}

/// Outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Attempts left in the current window when allowed, zero otherwise.
    pub remaining: u32,
    /// When a denied identifier may try again.
    pub reset_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy)]
struct AttemptWindow {
    count: u32,
    window_start: OffsetDateTime,
    blocked_until: Option<OffsetDateTime>,
}

/// Per-identifier limiter. Process-local; a multi-instance deployment needs
/// a shared keyed store behind the same check semantics.
#[derive(Debug)]
pub struct LoginRateLimiter {
    config: RateLimitConfig,
    entries: Mutex<HashMap<String, AttemptWindow>>,
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl LoginRateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register an attempt for `identifier` and decide whether it may
    /// proceed.
    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        self.check_at(identifier, OffsetDateTime::now_utc())
    }

    /// Clock-injected variant of [`check`](Self::check) for deterministic
    /// tests.
    pub fn check_at(&self, identifier: &str, now: OffsetDateTime) -> RateLimitDecision {
        let mut entries = self.entries.lock().expect("rate limiter poisoned");

        // Opportunistic cleanup of identifiers whose state can no longer
        // influence a decision.
        entries.retain(|_, entry| {
            entry.blocked_until.is_some_and(|until| now < until)
                || now - entry.window_start < self.config.window
        });

        let entry = match entries.entry(identifier.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(AttemptWindow {
                    count: 1,
                    window_start: now,
                    blocked_until: None,
                });
                return RateLimitDecision {
                    allowed: true,
                    remaining: self.config.ceiling.saturating_sub(1),
                    reset_at: None,
                };
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        if let Some(blocked_until) = entry.blocked_until {
            if now < blocked_until {
                return RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    reset_at: Some(blocked_until),
                };
            }
            // Block elapsed: the identifier starts over with a fresh window.
            *entry = AttemptWindow {
                count: 1,
                window_start: now,
                blocked_until: None,
            };
            return RateLimitDecision {
                allowed: true,
                remaining: self.config.ceiling.saturating_sub(1),
                reset_at: None,
            };
        }

        if now - entry.window_start >= self.config.window {
            *entry = AttemptWindow {
                count: 1,
                window_start: now,
                blocked_until: None,
            };
            return RateLimitDecision {
                allowed: true,
                remaining: self.config.ceiling.saturating_sub(1),
                reset_at: None,
            };
        }

        entry.count += 1;
        if entry.count > self.config.ceiling {
            let blocked_until = now + self.config.block;
            entry.blocked_until = Some(blocked_until);
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: Some(blocked_until),
            };
        }

        RateLimitDecision {
            allowed: true,
            remaining: self.config.ceiling - entry.count,
            reset_at: None,
        }
    }
}

/// Human-readable backoff estimate for rate-limit responses.
#[must_use]
pub fn retry_estimate(reset_at: OffsetDateTime, now: OffsetDateTime) -> String {
    let remaining = reset_at - now;
    let seconds = remaining.whole_seconds().max(0);
    if seconds >= 60 {
        // Round up so the estimate never promises an earlier retry.
        let minutes = (seconds + 59) / 60;
        format!("about {minutes} minute{}", if minutes == 1 { "" } else { "s" })
    } else {
        format!("about {seconds} second{}", if seconds == 1 { "" } else { "s" })
    }
}
